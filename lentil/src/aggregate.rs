use crate::common::*;
use crate::error::ScreenError;

use anyhow::anyhow;
use fnv::FnvHashMap;
use matrix_util::parquet::{write_columns, ColumnData};

///
/// Canonical target labels plus alias resolution. Lookup order:
/// exact, then the alias table, then case-insensitive.
///
pub struct LabelMap {
    canonical: Vec<Box<str>>,
    index: FnvHashMap<Box<str>, usize>,
    aliases: FnvHashMap<Box<str>, usize>,
    folded: FnvHashMap<String, usize>,
}

impl LabelMap {
    pub fn new(canonical: &[Box<str>]) -> Self {
        let index: FnvHashMap<Box<str>, usize> = canonical
            .iter()
            .enumerate()
            .map(|(i, x)| (x.clone(), i))
            .collect();

        let mut folded = FnvHashMap::default();
        for (i, x) in canonical.iter().enumerate() {
            if let Some(prev) = folded.insert(x.to_lowercase(), i) {
                warn!(
                    "labels '{}' and '{}' collide after case folding",
                    canonical[prev], x
                );
            }
        }

        Self {
            canonical: canonical.to_vec(),
            index,
            aliases: FnvHashMap::default(),
            folded,
        }
    }

    pub fn canonical(&self) -> &[Box<str>] {
        &self.canonical
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    /// Register `alias -> canonical`; the canonical side must exist
    pub fn add_alias(&mut self, alias: &str, canonical: &str) -> anyhow::Result<()> {
        let &i = self
            .index
            .get(canonical)
            .ok_or_else(|| anyhow!("unknown canonical label '{}'", canonical))?;
        self.aliases.insert(alias.into(), i);
        Ok(())
    }

    /// Load `alias <TAB> canonical` pairs, one per line, no header
    pub fn read_alias_file(&mut self, alias_file: &str) -> anyhow::Result<()> {
        let parsed = read_lines_of_words_delim(alias_file, &['\t', ','], -1)?;
        for (i, words) in parsed.lines.iter().enumerate() {
            if words.len() != 2 {
                return Err(anyhow!(
                    "line {} of {}: want 'alias<TAB>canonical'",
                    i + 1,
                    alias_file
                ));
            }
            self.add_alias(&words[0], &words[1])?;
        }
        Ok(())
    }

    pub fn resolve(&self, label: &str) -> Option<usize> {
        if let Some(&i) = self.index.get(label) {
            return Some(i);
        }
        if let Some(&i) = self.aliases.get(label) {
            return Some(i);
        }
        self.folded.get(&label.to_lowercase()).copied()
    }
}

/// How a method marks a row significant: `measure <= cutoff` or
/// `measure >= cutoff`
#[derive(Debug, Clone)]
pub struct SignificanceRule {
    pub measure: Box<str>,
    pub cutoff: f64,
    pub keep_below: bool,
}

impl SignificanceRule {
    /// Parse `column<=0.05` or `column>=2.0`
    pub fn parse(rule: &str) -> anyhow::Result<Self> {
        if let Some((measure, cutoff)) = rule.split_once("<=") {
            Ok(Self {
                measure: measure.trim().into(),
                cutoff: cutoff.trim().parse()?,
                keep_below: true,
            })
        } else if let Some((measure, cutoff)) = rule.split_once(">=") {
            Ok(Self {
                measure: measure.trim().into(),
                cutoff: cutoff.trim().parse()?,
                keep_below: false,
            })
        } else {
            Err(anyhow!(
                "cannot parse rule '{}'; want 'column<=cutoff' or 'column>=cutoff'",
                rule
            ))
        }
    }

    pub fn passes(&self, x: f64) -> bool {
        if self.keep_below {
            x <= self.cutoff
        } else {
            x >= self.cutoff
        }
    }
}

/// Long-format significance table of one reference method
#[derive(Debug)]
pub struct MethodTable {
    pub name: Box<str>,
    pub targets: Vec<Box<str>>,
    pub genes: Vec<Box<str>>,
    pub measures: Vec<f64>,
}

///
/// Read a method's table with a header line carrying `target`,
/// `gene`, and the rule's measure column.
///
pub fn read_method_table(
    file: &str,
    name: &str,
    measure_column: &str,
) -> anyhow::Result<MethodTable> {
    let parsed = read_lines_of_words_delim(file, &['\t', ','], 0)?;

    let find = |column: &str| -> Result<usize, ScreenError> {
        parsed
            .header
            .iter()
            .position(|x| x.as_ref() == column)
            .ok_or_else(|| ScreenError::MissingColumn {
                column: column.into(),
                file: file.into(),
            })
    };

    let t_idx = find("target")?;
    let g_idx = find("gene")?;
    let m_idx = find(measure_column)?;
    let width = parsed.header.len();

    let mut targets = Vec::with_capacity(parsed.lines.len());
    let mut genes = Vec::with_capacity(parsed.lines.len());
    let mut measures = Vec::with_capacity(parsed.lines.len());

    for (i, words) in parsed.lines.iter().enumerate() {
        if words.len() != width {
            return Err(anyhow!(
                "line {} of {} has {} fields, expected {}",
                i + 2,
                file,
                words.len(),
                width
            ));
        }
        targets.push(words[t_idx].clone());
        genes.push(words[g_idx].clone());
        measures.push(words[m_idx].parse::<f64>().map_err(|_| {
            anyhow!(
                "line {} of {}: '{}' is not a number",
                i + 2,
                file,
                words[m_idx]
            )
        })?);
    }

    Ok(MethodTable {
        name: name.into(),
        targets,
        genes,
        measures,
    })
}

///
/// Count rows passing the rule per canonical target. An unresolvable
/// target label is fatal for this method.
///
pub fn count_significant(
    table: &MethodTable,
    rule: &SignificanceRule,
    labels: &LabelMap,
) -> Result<Vec<usize>, ScreenError> {
    let mut counts = vec![0usize; labels.len()];
    for (target, &x) in table.targets.iter().zip(table.measures.iter()) {
        let i = labels
            .resolve(target)
            .ok_or_else(|| ScreenError::LabelMismatch {
                method: table.name.clone(),
                label: target.clone(),
            })?;
        if rule.passes(x) {
            counts[i] += 1;
        }
    }
    Ok(counts)
}

/// Count entries passing the rule in each column of a gene x target
/// significance matrix
pub fn significant_counts_matrix(mat: &Mat, rule: &SignificanceRule) -> Vec<usize> {
    mat.column_iter()
        .map(|col| col.iter().filter(|&&x| rule.passes(x as f64)).count())
        .collect()
}

///
/// target x method table of significant-gene counts. Rows are the
/// canonical targets; a method that never mentions a target keeps a
/// zero there.
///
pub struct MethodComparison {
    pub targets: Vec<Box<str>>,
    pub methods: Vec<Box<str>>,
    pub counts: Vec<Vec<usize>>,
}

impl MethodComparison {
    pub fn new(labels: &LabelMap) -> Self {
        Self {
            targets: labels.canonical().to_vec(),
            methods: vec![],
            counts: vec![],
        }
    }

    pub fn add_counts(&mut self, name: &str, counts: Vec<usize>) -> anyhow::Result<()> {
        if counts.len() != self.targets.len() {
            return Err(anyhow!(
                "method '{}' has {} counts for {} targets",
                name,
                counts.len(),
                self.targets.len()
            ));
        }
        if name == "target" || self.methods.iter().any(|m| m.as_ref() == name) {
            return Err(anyhow!("method name '{}' collides", name));
        }
        self.methods.push(name.into());
        self.counts.push(counts);
        Ok(())
    }

    pub fn add_method(
        &mut self,
        table: &MethodTable,
        rule: &SignificanceRule,
        labels: &LabelMap,
    ) -> anyhow::Result<()> {
        let counts = count_significant(table, rule, labels)?;
        self.add_counts(&table.name, counts)
    }

    /// Targets ordered by one method's count, largest first; ties fall
    /// back to the label order
    pub fn ranking(&self, method: &str) -> anyhow::Result<Vec<(Box<str>, usize)>> {
        let m = self
            .methods
            .iter()
            .position(|x| x.as_ref() == method)
            .ok_or_else(|| anyhow!("unknown method '{}'", method))?;

        let mut rows: Vec<(Box<str>, usize)> = self
            .targets
            .iter()
            .cloned()
            .zip(self.counts[m].iter().copied())
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(rows)
    }

    pub fn to_parquet(&self, file_path: &str) -> anyhow::Result<()> {
        mkdir(file_path)?;

        let mut columns: Vec<(&str, ColumnData)> =
            vec![("target", ColumnData::Str(self.targets.clone()))];
        for (name, counts) in self.methods.iter().zip(self.counts.iter()) {
            let counts: Vec<i64> = counts.iter().map(|&x| x as i64).collect();
            columns.push((name.as_ref(), ColumnData::I64(counts)));
        }
        write_columns(file_path, &columns)
    }

    pub fn to_tsv(&self, file_path: &str) -> anyhow::Result<()> {
        let header = std::iter::once("target".to_string())
            .chain(self.methods.iter().map(|m| m.to_string()))
            .collect::<Vec<_>>()
            .join("\t");

        let mut lines: Vec<Box<str>> = vec![header.into()];
        for (i, target) in self.targets.iter().enumerate() {
            let row = std::iter::once(target.to_string())
                .chain(self.counts.iter().map(|c| c[i].to_string()))
                .collect::<Vec<_>>()
                .join("\t");
            lines.push(row.into());
        }
        write_lines(&lines, file_path)
    }
}
