use crate::common::*;

use anyhow::anyhow;
use fnv::{FnvHashMap, FnvHashSet};
use matrix_util::parquet::{write_columns, ColumnData};
use serde::{Deserialize, Serialize};
use statrs::distribution::{DiscreteCDF, Hypergeometric};
use std::hash::{Hash, Hasher};

/// One gene set out of a GMT database
#[derive(Debug, Clone)]
pub struct GeneSet {
    pub id: Box<str>,
    pub description: Box<str>,
    pub genes: Vec<Box<str>>,
}

pub struct GeneSetDb {
    pub name: Box<str>,
    pub sets: Vec<GeneSet>,
}

impl GeneSetDb {
    /// GMT line: `id <TAB> description <TAB> gene1 <TAB> gene2 ...`;
    /// lines with fewer than three fields are skipped with a warning
    pub fn from_gmt(gmt_file: &str) -> anyhow::Result<Self> {
        let parsed = read_lines_of_words_delim(gmt_file, "\t", -1)?;

        let mut sets = vec![];
        for (i, words) in parsed.lines.iter().enumerate() {
            if words.len() < 3 {
                warn!("skipping line {} of {}: fewer than three fields", i + 1, gmt_file);
                continue;
            }
            sets.push(GeneSet {
                id: words[0].clone(),
                description: words[1].clone(),
                genes: words[2..].to_vec(),
            });
        }

        if sets.is_empty() {
            return Err(anyhow!("no gene sets in {}", gmt_file));
        }

        info!("{}: {} gene sets", gmt_file, sets.len());
        Ok(Self {
            name: basename(gmt_file)?,
            sets,
        })
    }
}

/// One tested gene set for one foreground
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentHit {
    pub gene_set: Box<str>,
    pub description: Box<str>,
    /// set size after intersecting with the background
    pub size: usize,
    pub overlap: usize,
    /// observed over expected overlap
    pub ratio: f64,
    pub p_value: f64,
    /// step-up adjusted within one foreground
    pub adjusted_p: f64,
}

/// Over-representation backends
pub trait EnrichmentService {
    fn name(&self) -> &str;

    fn enrich(
        &self,
        foreground: &[Box<str>],
        background: &[Box<str>],
        db: &GeneSetDb,
    ) -> anyhow::Result<Vec<EnrichmentHit>>;
}

///
/// Hypergeometric over-representation: for each set, the probability
/// of drawing at least the observed overlap when sampling the
/// foreground from the background without replacement.
///
pub struct HypergeomOra {
    /// sets overlapping fewer foreground genes are dropped
    pub min_overlap: usize,
}

impl Default for HypergeomOra {
    fn default() -> Self {
        Self { min_overlap: 1 }
    }
}

impl EnrichmentService for HypergeomOra {
    fn name(&self) -> &str {
        "hypergeometric"
    }

    fn enrich(
        &self,
        foreground: &[Box<str>],
        background: &[Box<str>],
        db: &GeneSetDb,
    ) -> anyhow::Result<Vec<EnrichmentHit>> {
        if background.is_empty() {
            return Err(anyhow!("empty background"));
        }

        let background_set: FnvHashSet<&str> = background.iter().map(|x| x.as_ref()).collect();
        let foreground_set: FnvHashSet<&str> = foreground
            .iter()
            .map(|x| x.as_ref())
            .filter(|g| background_set.contains(g))
            .collect();

        let nn = background_set.len() as u64;
        let kk = foreground_set.len() as u64;
        if kk == 0 {
            return Ok(vec![]);
        }

        let mut hits = vec![];
        for set in db.sets.iter() {
            let set_in_background: FnvHashSet<&str> = set
                .genes
                .iter()
                .map(|x| x.as_ref())
                .filter(|g| background_set.contains(g))
                .collect();

            let mm = set_in_background.len() as u64;
            if mm == 0 {
                continue;
            }

            let overlap = set_in_background
                .iter()
                .filter(|g| foreground_set.contains(*g))
                .count() as u64;
            if (overlap as usize) < self.min_overlap {
                continue;
            }

            let distrib = Hypergeometric::new(nn, mm, kk)?;
            let p_value = if overlap == 0 {
                1.0
            } else {
                distrib.sf(overlap - 1)
            };

            let expected = (mm as f64) * (kk as f64) / (nn as f64);
            hits.push(EnrichmentHit {
                gene_set: set.id.clone(),
                description: set.description.clone(),
                size: mm as usize,
                overlap: overlap as usize,
                ratio: overlap as f64 / expected,
                p_value,
                adjusted_p: 1.0,
            });
        }

        let p_values: Vec<f64> = hits.iter().map(|h| h.p_value).collect();
        for (h, q) in hits
            .iter_mut()
            .zip(crate::discovery::benjamini_hochberg(&p_values))
        {
            h.adjusted_p = q;
        }

        hits.sort_by(|a, b| a.p_value.total_cmp(&b.p_value).then(a.gene_set.cmp(&b.gene_set)));
        Ok(hits)
    }
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    foreground: Vec<Box<str>>,
    background_size: usize,
    hits: Vec<EnrichmentHit>,
}

///
/// File-backed cache around any enrichment backend, keyed by the
/// database name and a digest of the sorted query. Unreadable cache
/// entries are recomputed.
///
pub struct CachedEnrichment<S: EnrichmentService> {
    service: S,
    cache_dir: Box<str>,
}

impl<S: EnrichmentService> CachedEnrichment<S> {
    pub fn new(service: S, cache_dir: &str) -> Self {
        Self {
            service,
            cache_dir: cache_dir.into(),
        }
    }

    fn cache_file(
        &self,
        db: &GeneSetDb,
        foreground: &[Box<str>],
        background: &[Box<str>],
    ) -> Box<str> {
        let mut sorted_fg = foreground.to_vec();
        sorted_fg.sort();
        let mut sorted_bg = background.to_vec();
        sorted_bg.sort();

        let mut hasher = fnv::FnvHasher::default();
        self.service.name().hash(&mut hasher);
        db.name.hash(&mut hasher);
        sorted_fg.hash(&mut hasher);
        sorted_bg.hash(&mut hasher);

        format!("{}/{}.{:016x}.json", self.cache_dir, db.name, hasher.finish()).into()
    }
}

impl<S: EnrichmentService> EnrichmentService for CachedEnrichment<S> {
    fn name(&self) -> &str {
        self.service.name()
    }

    fn enrich(
        &self,
        foreground: &[Box<str>],
        background: &[Box<str>],
        db: &GeneSetDb,
    ) -> anyhow::Result<Vec<EnrichmentHit>> {
        let cache_file = self.cache_file(db, foreground, background);

        if std::path::Path::new(cache_file.as_ref()).exists() {
            let text = std::fs::read_to_string(cache_file.as_ref())?;
            match serde_json::from_str::<CacheEntry>(&text) {
                Ok(entry) => {
                    info!("cache hit: {}", cache_file);
                    return Ok(entry.hits);
                }
                Err(_) => {
                    warn!("discarding unreadable cache entry: {}", cache_file);
                }
            }
        }

        let hits = self.service.enrich(foreground, background, db)?;

        mkdir(&cache_file)?;
        let entry = CacheEntry {
            foreground: foreground.to_vec(),
            background_size: background.len(),
            hits: hits.clone(),
        };
        std::fs::write(cache_file.as_ref(), serde_json::to_string(&entry)?)?;
        Ok(hits)
    }
}

/// One retained term with its smallest p-value across targets
#[derive(Debug, Clone)]
pub struct TermSummary {
    pub gene_set: Box<str>,
    pub description: Box<str>,
    pub size: usize,
    pub min_p: f64,
}

///
/// Enrichment hits filtered and pivoted into a term x target ratio
/// matrix; a zero marks a term that never passed for that target.
///
pub struct EnrichmentMatrix {
    pub terms: Vec<TermSummary>,
    pub targets: Vec<Box<str>>,
    pub ratios: Mat,
}

///
/// Keep hits passing both knobs, then pivot. Terms are identified by
/// `(gene_set, description, size)` so the same id at two background
/// sizes stays two rows. Rows come out ordered by min p-value.
///
pub fn summarize_enrichment(
    per_target: &[(Box<str>, Vec<EnrichmentHit>)],
    max_fdr: f64,
    min_ratio: f64,
) -> EnrichmentMatrix {
    let targets: Vec<Box<str>> = per_target.iter().map(|(t, _)| t.clone()).collect();

    let mut keys: Vec<(Box<str>, Box<str>, usize)> = vec![];
    let mut index: FnvHashMap<(Box<str>, Box<str>, usize), usize> = FnvHashMap::default();
    let mut min_p: Vec<f64> = vec![];
    let mut cells: Vec<(usize, usize, f64)> = vec![];

    for (j, (_, hits)) in per_target.iter().enumerate() {
        for h in hits
            .iter()
            .filter(|h| h.adjusted_p <= max_fdr && h.ratio >= min_ratio)
        {
            let key = (h.gene_set.clone(), h.description.clone(), h.size);
            let i = match index.get(&key) {
                Some(&i) => i,
                None => {
                    let i = keys.len();
                    index.insert(key.clone(), i);
                    keys.push(key);
                    min_p.push(f64::INFINITY);
                    i
                }
            };
            min_p[i] = min_p[i].min(h.p_value);
            cells.push((i, j, h.ratio));
        }
    }

    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&a, &b| min_p[a].total_cmp(&min_p[b]).then(keys[a].0.cmp(&keys[b].0)));
    let mut rank = vec![0usize; keys.len()];
    for (new_i, &old_i) in order.iter().enumerate() {
        rank[old_i] = new_i;
    }

    let mut ratios = Mat::zeros(keys.len(), targets.len());
    for (i, j, x) in cells {
        ratios[(rank[i], j)] = x as f32;
    }

    let summaries: Vec<TermSummary> = keys
        .into_iter()
        .zip(min_p)
        .map(|((gene_set, description, size), p)| TermSummary {
            gene_set,
            description,
            size,
            min_p: p,
        })
        .collect();
    let terms: Vec<TermSummary> = order.iter().map(|&old_i| summaries[old_i].clone()).collect();

    EnrichmentMatrix {
        terms,
        targets,
        ratios,
    }
}

impl EnrichmentMatrix {
    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn to_parquet(&self, matrix_file: &str, term_file: &str) -> anyhow::Result<()> {
        let row_names: Vec<Box<str>> = self.terms.iter().map(|t| t.gene_set.clone()).collect();
        self.ratios
            .to_parquet(matrix_file, Some(&row_names), Some(&self.targets))?;

        let ids: Vec<Box<str>> = self.terms.iter().map(|t| t.gene_set.clone()).collect();
        let descriptions: Vec<Box<str>> =
            self.terms.iter().map(|t| t.description.clone()).collect();
        let sizes: Vec<i64> = self.terms.iter().map(|t| t.size as i64).collect();
        let min_p: Vec<f64> = self.terms.iter().map(|t| t.min_p).collect();

        write_columns(
            term_file,
            &[
                ("gene_set", ColumnData::Str(ids)),
                ("description", ColumnData::Str(descriptions)),
                ("size", ColumnData::I64(sizes)),
                ("min_p", ColumnData::F64(min_p)),
            ],
        )
    }
}
