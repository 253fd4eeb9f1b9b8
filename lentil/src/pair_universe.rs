use crate::common::*;
use crate::error::ScreenError;

use anyhow::anyhow;
use matrix_util::parquet::{read_columns, write_columns, ColumnData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairType {
    Candidate,
    NegativeControl,
}

impl PairType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairType::Candidate => "candidate",
            PairType::NegativeControl => "negative_control",
        }
    }

    pub fn parse(label: &str) -> anyhow::Result<Self> {
        match label {
            "candidate" => Ok(PairType::Candidate),
            "negative_control" => Ok(PairType::NegativeControl),
            _ => Err(anyhow!("unknown pair type '{}'", label)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestPair {
    pub gene: Box<str>,
    pub target: Box<str>,
    pub pair_type: PairType,
}

///
/// The exhaustive gene x target cross product in row-major order:
/// all targets of `genes[0]`, then all targets of `genes[1]`, and so
/// on. Pairs hitting the control target are negative controls; every
/// other pair is a candidate.
///
#[derive(Debug)]
pub struct PairUniverse {
    pairs: Vec<TestPair>,
    num_genes: usize,
    num_targets: usize,
}

impl PairUniverse {
    /// `genes` and `targets` must already be free of repeats
    pub fn build(genes: &[Box<str>], targets: &[Box<str>], control_label: &str) -> Self {
        if !targets.iter().any(|t| t.as_ref() == control_label) {
            warn!(
                "no '{}' among {} targets; every pair becomes a candidate",
                control_label,
                targets.len()
            );
        }

        let mut pairs = Vec::with_capacity(genes.len() * targets.len());
        for gene in genes.iter() {
            for target in targets.iter() {
                let pair_type = if target.as_ref() == control_label {
                    PairType::NegativeControl
                } else {
                    PairType::Candidate
                };
                pairs.push(TestPair {
                    gene: gene.clone(),
                    target: target.clone(),
                    pair_type,
                });
            }
        }

        Self {
            pairs,
            num_genes: genes.len(),
            num_targets: targets.len(),
        }
    }

    pub fn pairs(&self) -> &[TestPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn num_genes(&self) -> usize {
        self.num_genes
    }

    pub fn num_targets(&self) -> usize {
        self.num_targets
    }

    pub fn num_candidates(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| p.pair_type == PairType::Candidate)
            .count()
    }

    pub fn num_negative_controls(&self) -> usize {
        self.len() - self.num_candidates()
    }

    pub fn to_parquet(&self, file_path: &str) -> anyhow::Result<()> {
        mkdir(file_path)?;

        let genes: Vec<Box<str>> = self.pairs.iter().map(|p| p.gene.clone()).collect();
        let targets: Vec<Box<str>> = self.pairs.iter().map(|p| p.target.clone()).collect();
        let types: Vec<Box<str>> = self
            .pairs
            .iter()
            .map(|p| p.pair_type.as_str().into())
            .collect();

        write_columns(
            file_path,
            &[
                ("gene", ColumnData::Str(genes)),
                ("target", ColumnData::Str(targets)),
                ("pair_type", ColumnData::Str(types)),
            ],
        )
    }

    pub fn from_parquet(file_path: &str) -> anyhow::Result<Self> {
        let table = read_columns(file_path)?;
        let genes = table.str_column("gene")?;
        let targets = table.str_column("target")?;
        let types = table.str_column("pair_type")?;

        let mut pairs = Vec::with_capacity(genes.len());
        for ((gene, target), pair_type) in genes.iter().zip(targets.iter()).zip(types.iter()) {
            pairs.push(TestPair {
                gene: gene.clone(),
                target: target.clone(),
                pair_type: PairType::parse(pair_type)?,
            });
        }

        let mut seen = fnv::FnvHashSet::default();
        for pair in pairs.iter() {
            if !seen.insert((pair.gene.as_ref(), pair.target.as_ref())) {
                return Err(ScreenError::InvariantViolation {
                    reason: format!(
                        "pair ({}, {}) repeats in {}",
                        pair.gene, pair.target, file_path
                    ),
                }
                .into());
            }
        }

        // duplicate-free, so matching the count means the full cross
        // product is present
        let num_genes = count_distinct(genes);
        let num_targets = count_distinct(targets);
        if pairs.len() != num_genes * num_targets {
            return Err(ScreenError::InvariantViolation {
                reason: format!(
                    "{} pairs in {} do not cover {} genes x {} targets",
                    pairs.len(),
                    file_path,
                    num_genes,
                    num_targets
                ),
            }
            .into());
        }

        Ok(Self {
            pairs,
            num_genes,
            num_targets,
        })
    }
}

fn count_distinct(names: &[Box<str>]) -> usize {
    names
        .iter()
        .map(|x| x.as_ref())
        .collect::<fnv::FnvHashSet<&str>>()
        .len()
}
