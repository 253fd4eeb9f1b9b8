use crate::association::AssociationResult;
use crate::common::*;
use crate::pair_universe::PairType;

use matrix_util::parquet::{read_columns, write_columns, ColumnData};

///
/// Benjamini-Hochberg step-up adjustment. The output vector keeps the
/// input order; tied p-values receive the same adjusted value, so the
/// original order alone breaks ties downstream.
///
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let mm = p_values.len();
    if mm == 0 {
        return vec![];
    }

    let mut order: Vec<usize> = (0..mm).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]).then(a.cmp(&b)));

    let mut adjusted = vec![0.0; mm];
    let mut running_min = 1.0f64;
    for (rank, &idx) in order.iter().enumerate().rev() {
        let stepped = p_values[idx] * mm as f64 / (rank + 1) as f64;
        running_min = running_min.min(stepped);
        adjusted[idx] = running_min.clamp(0.0, 1.0);
    }
    adjusted
}

/// One pair after the discovery decision; negative controls carry no
/// adjusted p-value and are never discovered
#[derive(Debug, Clone)]
pub struct DiscoveryRecord {
    pub gene: Box<str>,
    pub target: Box<str>,
    pub pair_type: PairType,
    pub effect: f64,
    pub p_value: f64,
    pub adjusted_p: Option<f64>,
    pub discovered: bool,
}

pub struct DiscoverySet {
    records: Vec<DiscoveryRecord>,
}

impl DiscoverySet {
    ///
    /// Adjust candidate pairs only; the number of candidates is the
    /// multiple-testing burden. Negative controls pass through with
    /// their raw p-values.
    ///
    pub fn from_results(results: &[AssociationResult], fdr_cutoff: f64) -> Self {
        let candidate_idx: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.pair_type == PairType::Candidate)
            .map(|(i, _)| i)
            .collect();

        let candidate_p: Vec<f64> = candidate_idx.iter().map(|&i| results[i].p_value).collect();
        let adjusted = benjamini_hochberg(&candidate_p);

        let mut adjusted_by_row: Vec<Option<f64>> = vec![None; results.len()];
        for (k, &i) in candidate_idx.iter().enumerate() {
            adjusted_by_row[i] = Some(adjusted[k]);
        }

        let records = results
            .iter()
            .zip(adjusted_by_row)
            .map(|(r, adjusted_p)| DiscoveryRecord {
                gene: r.gene.clone(),
                target: r.target.clone(),
                pair_type: r.pair_type,
                effect: r.effect,
                p_value: r.p_value,
                adjusted_p,
                discovered: adjusted_p.map(|q| q <= fdr_cutoff).unwrap_or(false),
            })
            .collect();

        Self { records }
    }

    pub fn records(&self) -> &[DiscoveryRecord] {
        &self.records
    }

    pub fn num_discovered(&self) -> usize {
        self.records.iter().filter(|r| r.discovered).count()
    }

    pub fn discovered(&self) -> impl Iterator<Item = &DiscoveryRecord> {
        self.records.iter().filter(|r| r.discovered)
    }

    /// All distinct genes in record order, discovered or not
    pub fn genes(&self) -> Vec<Box<str>> {
        let mut seen = fnv::FnvHashSet::default();
        let mut genes = vec![];
        for r in self.records.iter() {
            if seen.insert(r.gene.clone()) {
                genes.push(r.gene.clone());
            }
        }
        genes
    }

    /// Discovered genes grouped per target, targets in record order
    pub fn discovered_genes_by_target(&self) -> Vec<(Box<str>, Vec<Box<str>>)> {
        let mut order: Vec<Box<str>> = vec![];
        let mut by_target: fnv::FnvHashMap<Box<str>, Vec<Box<str>>> = fnv::FnvHashMap::default();

        for r in self.records.iter().filter(|r| r.discovered) {
            if !by_target.contains_key(&r.target) {
                order.push(r.target.clone());
            }
            by_target
                .entry(r.target.clone())
                .or_default()
                .push(r.gene.clone());
        }

        order
            .into_iter()
            .map(|t| {
                let genes = by_target.remove(&t).unwrap_or_default();
                (t, genes)
            })
            .collect()
    }

    pub fn to_parquet(&self, file_path: &str) -> anyhow::Result<()> {
        mkdir(file_path)?;

        let genes: Vec<Box<str>> = self.records.iter().map(|r| r.gene.clone()).collect();
        let targets: Vec<Box<str>> = self.records.iter().map(|r| r.target.clone()).collect();
        let types: Vec<Box<str>> = self
            .records
            .iter()
            .map(|r| r.pair_type.as_str().into())
            .collect();
        let effects: Vec<f64> = self.records.iter().map(|r| r.effect).collect();
        let p_values: Vec<f64> = self.records.iter().map(|r| r.p_value).collect();
        let adjusted: Vec<f64> = self
            .records
            .iter()
            .map(|r| r.adjusted_p.unwrap_or(f64::NAN))
            .collect();
        let discovered: Vec<i64> = self
            .records
            .iter()
            .map(|r| if r.discovered { 1 } else { 0 })
            .collect();

        write_columns(
            file_path,
            &[
                ("gene", ColumnData::Str(genes)),
                ("target", ColumnData::Str(targets)),
                ("pair_type", ColumnData::Str(types)),
                ("effect", ColumnData::F64(effects)),
                ("p_value", ColumnData::F64(p_values)),
                ("adjusted_p", ColumnData::F64(adjusted)),
                ("discovered", ColumnData::I64(discovered)),
            ],
        )
    }

    pub fn from_parquet(file_path: &str) -> anyhow::Result<Self> {
        let table = read_columns(file_path)?;
        let genes = table.str_column("gene")?;
        let targets = table.str_column("target")?;
        let types = table.str_column("pair_type")?;
        let effects = table.f64_column("effect")?;
        let p_values = table.f64_column("p_value")?;
        let adjusted = table.f64_column("adjusted_p")?;
        let discovered = table.i64_column("discovered")?;

        let mut records = Vec::with_capacity(genes.len());
        for i in 0..genes.len() {
            records.push(DiscoveryRecord {
                gene: genes[i].clone(),
                target: targets[i].clone(),
                pair_type: crate::pair_universe::PairType::parse(&types[i])?,
                effect: effects[i],
                p_value: p_values[i],
                adjusted_p: if adjusted[i].is_nan() {
                    None
                } else {
                    Some(adjusted[i])
                },
                discovered: discovered[i] != 0,
            });
        }
        Ok(Self { records })
    }
}
