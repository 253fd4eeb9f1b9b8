use crate::association::AssociationResult;
use crate::common::*;
use crate::pair_universe::PairType;

use anyhow::anyhow;
use matrix_util::parquet::{read_columns, write_columns, ColumnData};
use special::Error;

/// One candidate p-value drawn under a permuted replicate
#[derive(Debug, Clone)]
pub struct NullDraw {
    pub replicate: usize,
    pub gene: Box<str>,
    pub target: Box<str>,
    pub p_value: f64,
}

///
/// Permutation null pooled across replicates. Only candidate pairs
/// contribute; every draw keeps the replicate it came from.
///
pub struct NullPool {
    draws: Vec<NullDraw>,
    num_replicates: usize,
}

impl NullPool {
    pub fn pool(replicates: &[Vec<AssociationResult>]) -> Self {
        let mut draws = vec![];
        for (r, results) in replicates.iter().enumerate() {
            for res in results
                .iter()
                .filter(|x| x.pair_type == PairType::Candidate)
            {
                draws.push(NullDraw {
                    replicate: r,
                    gene: res.gene.clone(),
                    target: res.target.clone(),
                    p_value: res.p_value,
                });
            }
        }
        Self {
            draws,
            num_replicates: replicates.len(),
        }
    }

    pub fn draws(&self) -> &[NullDraw] {
        &self.draws
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    pub fn num_replicates(&self) -> usize {
        self.num_replicates
    }

    pub fn p_values(&self) -> Vec<f64> {
        self.draws.iter().map(|x| x.p_value).collect()
    }

    ///
    /// How far the pooled p-values sit from `U(0,1)`: the KS distance
    /// against the uniform cdf, a z-score for the pooled mean, and a
    /// coarse quantile profile.
    ///
    pub fn uniformity(&self) -> UniformitySummary {
        let mut ps = self.p_values();
        ps.sort_by(f64::total_cmp);
        let nn = ps.len();

        if nn == 0 {
            return UniformitySummary {
                num_draws: 0,
                mean: 0.0,
                mean_z: 0.0,
                mean_p: 1.0,
                ks_statistic: 0.0,
                quantiles: vec![],
            };
        }

        let mut ks = 0.0f64;
        for (i, &p) in ps.iter().enumerate() {
            let above = (i + 1) as f64 / nn as f64 - p;
            let below = p - i as f64 / nn as f64;
            ks = ks.max(above).max(below);
        }

        let mean = ps.iter().sum::<f64>() / nn as f64;
        // mean of n uniforms ~ N(1/2, 1/(12 n))
        let mean_z = (mean - 0.5) * (12.0 * nn as f64).sqrt();
        let mean_p = (mean_z.abs() / std::f64::consts::SQRT_2).compl_error();

        let grid = [0.01, 0.05, 0.1, 0.25, 0.5, 0.75, 0.9, 0.95, 0.99];
        let quantiles = grid
            .iter()
            .map(|&q| {
                let k = ((q * nn as f64).ceil() as usize).clamp(1, nn) - 1;
                (q, ps[k])
            })
            .collect();

        UniformitySummary {
            num_draws: nn,
            mean,
            mean_z,
            mean_p,
            ks_statistic: ks,
            quantiles,
        }
    }

    pub fn to_parquet(&self, file_path: &str) -> anyhow::Result<()> {
        mkdir(file_path)?;

        let replicates: Vec<i64> = self.draws.iter().map(|x| x.replicate as i64).collect();
        let genes: Vec<Box<str>> = self.draws.iter().map(|x| x.gene.clone()).collect();
        let targets: Vec<Box<str>> = self.draws.iter().map(|x| x.target.clone()).collect();
        let p_values: Vec<f64> = self.draws.iter().map(|x| x.p_value).collect();

        write_columns(
            file_path,
            &[
                ("replicate", ColumnData::I64(replicates)),
                ("gene", ColumnData::Str(genes)),
                ("target", ColumnData::Str(targets)),
                ("p_value", ColumnData::F64(p_values)),
            ],
        )
    }

    pub fn from_parquet(file_path: &str) -> anyhow::Result<Self> {
        let table = read_columns(file_path)?;
        let replicates = table.i64_column("replicate")?;
        let genes = table.str_column("gene")?;
        let targets = table.str_column("target")?;
        let p_values = table.f64_column("p_value")?;

        let mut draws = Vec::with_capacity(genes.len());
        for i in 0..genes.len() {
            if replicates[i] < 0 {
                return Err(anyhow!(
                    "negative replicate index {} in {}",
                    replicates[i],
                    file_path
                ));
            }
            draws.push(NullDraw {
                replicate: replicates[i] as usize,
                gene: genes[i].clone(),
                target: targets[i].clone(),
                p_value: p_values[i],
            });
        }

        let num_replicates = draws.iter().map(|x| x.replicate + 1).max().unwrap_or(0);
        Ok(Self {
            draws,
            num_replicates,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UniformitySummary {
    pub num_draws: usize,
    pub mean: f64,
    pub mean_z: f64,
    pub mean_p: f64,
    pub ks_statistic: f64,
    pub quantiles: Vec<(f64, f64)>,
}

impl UniformitySummary {
    pub fn to_tsv(&self, file_path: &str) -> anyhow::Result<()> {
        let mut lines: Vec<Box<str>> = vec![
            "statistic\tvalue".into(),
            format!("num_draws\t{}", self.num_draws).into(),
            format!("mean\t{:.6}", self.mean).into(),
            format!("mean_z\t{:.6}", self.mean_z).into(),
            format!("mean_p\t{:.6}", self.mean_p).into(),
            format!("ks\t{:.6}", self.ks_statistic).into(),
        ];
        for (q, x) in self.quantiles.iter() {
            lines.push(format!("q{}\t{:.6}", q, x).into());
        }
        write_lines(&lines, file_path)
    }
}
