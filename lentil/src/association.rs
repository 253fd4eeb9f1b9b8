use crate::assemble::MatrixBundle;
use crate::common::*;
use crate::error::ScreenError;
use crate::pair_universe::{PairType, PairUniverse};

use anyhow::anyhow;
use fnv::FnvHashMap;
use matrix_util::parquet::{read_columns, write_columns, ColumnData};
use nalgebra::linalg::Cholesky;
use rand::prelude::SliceRandom;
use rand::SeedableRng;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// effective carrier variance below this is treated as monomorphic
const XTX_MIN: f32 = 1e-8;

/// Which draw of the data a runner sees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMode {
    Observed,
    /// cell-to-guide assignment shuffled under a replicate-specific
    /// seed
    Permuted { replicate: usize },
}

/// One row of runner output, aligned with the pair universe
#[derive(Debug, Clone)]
pub struct AssociationResult {
    pub gene: Box<str>,
    pub target: Box<str>,
    pub pair_type: PairType,
    pub effect: f64,
    pub p_value: f64,
}

pub struct AssociationIn<'a> {
    pub bundle: &'a MatrixBundle,
    pub universe: &'a PairUniverse,
}

/// The seam every association method implements
pub trait AssociationRunner {
    fn name(&self) -> &str;

    /// One result per universe pair, in universe order
    fn run(
        &self,
        input: &AssociationIn<'_>,
        mode: TestMode,
    ) -> anyhow::Result<Vec<AssociationResult>>;
}

///
/// Check a runner's output against its contract: one row per universe
/// pair, in universe order, with the pair type copied through and
/// p-values inside `[0, 1]`.
///
pub fn validate_results(
    results: &[AssociationResult],
    universe: &PairUniverse,
) -> Result<(), ScreenError> {
    if results.len() != universe.len() {
        return Err(ScreenError::ContractViolation {
            index: results.len().min(universe.len()),
            expected: format!("{} result rows", universe.len()),
            found: format!("{} result rows", results.len()),
        });
    }

    for (i, (res, pair)) in results.iter().zip(universe.pairs().iter()).enumerate() {
        if res.gene != pair.gene
            || res.target != pair.target
            || res.pair_type != pair.pair_type
        {
            return Err(ScreenError::ContractViolation {
                index: i,
                expected: format!(
                    "pair ({}, {}, {})",
                    pair.gene,
                    pair.target,
                    pair.pair_type.as_str()
                ),
                found: format!(
                    "pair ({}, {}, {})",
                    res.gene,
                    res.target,
                    res.pair_type.as_str()
                ),
            });
        }
        if !(0.0..=1.0).contains(&res.p_value) {
            return Err(ScreenError::ContractViolation {
                index: i,
                expected: "p-value in [0, 1]".to_string(),
                found: format!("{}", res.p_value),
            });
        }
    }
    Ok(())
}

///
/// Marginal OLS on `log1p` expression with the covariates projected
/// out of both sides. Each pair (gene, target) is scored by the slope
/// of the residualized regression and a two-sided Student-t p-value.
///
pub struct MarginalOlsRunner {
    /// base random seed; replicate `r` shuffles under `rseed + r`
    pub rseed: u64,
}

impl AssociationRunner for MarginalOlsRunner {
    fn name(&self) -> &str {
        "marginal_ols"
    }

    fn run(
        &self,
        input: &AssociationIn<'_>,
        mode: TestMode,
    ) -> anyhow::Result<Vec<AssociationResult>> {
        let bundle = input.bundle;
        let nn = bundle.num_cells();
        let num_covar = bundle.covariates.ncols();

        if nn < num_covar + 3 {
            return Err(anyhow!(
                "{} cells cannot support {} covariates",
                nn,
                num_covar
            ));
        }

        // cell x gene response on the log1p scale
        let mut yy = bundle.expression.transpose().map(|x| x.ln_1p());

        // cell x target design
        let mut xx = bundle.perturbation.transpose();
        if let TestMode::Permuted { replicate } = mode {
            let mut rng = rand::rngs::StdRng::seed_from_u64(self.rseed + replicate as u64);
            let mut order: Vec<usize> = (0..nn).collect();
            order.shuffle(&mut rng);
            xx = Mat::from_fn(nn, xx.ncols(), |i, j| xx[(order[i], j)]);
        }

        // project out [1, covariates] from both sides
        let cc = design_with_intercept(&bundle.covariates);
        let chol = Cholesky::new(cc.transpose() * &cc)
            .ok_or_else(|| anyhow!("covariate design is rank-deficient"))?;
        residualize_inplace(&mut yy, &cc, &chol);
        residualize_inplace(&mut xx, &cc, &chol);

        let df = (nn as f64) - (num_covar as f64) - 2.0;
        if df < 1.0 {
            return Err(anyhow!("no residual degrees of freedom with {} cells", nn));
        }
        let t_dist = StudentsT::new(0.0, 1.0, df)?;

        let xtx: Vec<f32> = xx.column_iter().map(|x| x.dot(&x)).collect();
        let yty: Vec<f32> = yy.column_iter().map(|y| y.dot(&y)).collect();
        let xty = xx.transpose() * &yy; // target x gene

        let gene_to_row: FnvHashMap<&str, usize> = bundle
            .genes
            .iter()
            .enumerate()
            .map(|(i, x)| (x.as_ref(), i))
            .collect();
        let target_to_row: FnvHashMap<&str, usize> = bundle
            .targets
            .iter()
            .enumerate()
            .map(|(i, x)| (x.as_ref(), i))
            .collect();

        let mut results = Vec::with_capacity(input.universe.len());

        for pair in input.universe.pairs().iter() {
            let g = *gene_to_row
                .get(pair.gene.as_ref())
                .ok_or_else(|| anyhow!("gene '{}' not in the assembled bundle", pair.gene))?;
            let t = *target_to_row
                .get(pair.target.as_ref())
                .ok_or_else(|| anyhow!("target '{}' not in the assembled bundle", pair.target))?;

            let (effect, p_value) = if xtx[t] < XTX_MIN {
                // monomorphic after residualization
                (0.0, 1.0)
            } else {
                let xty_tg = xty[(t, g)];
                let beta = xty_tg / xtx[t];
                let rss = (yty[g] - beta * xty_tg).max(0.0);
                let se = (rss as f64 / df).sqrt() / (xtx[t] as f64).sqrt();
                let z = if se > 1e-12 { beta as f64 / se } else { 0.0 };
                let pv = if z.is_finite() {
                    2.0 * (1.0 - t_dist.cdf(z.abs()))
                } else {
                    1.0
                };
                (beta as f64, pv.clamp(0.0, 1.0))
            };

            results.push(AssociationResult {
                gene: pair.gene.clone(),
                target: pair.target.clone(),
                pair_type: pair.pair_type,
                effect,
                p_value,
            });
        }

        Ok(results)
    }
}

fn design_with_intercept(covariates: &Mat) -> Mat {
    let nn = covariates.nrows();
    let mut cc = Mat::zeros(nn, covariates.ncols() + 1);
    cc.column_mut(0).fill(1.0);
    if covariates.ncols() > 0 {
        cc.columns_mut(1, covariates.ncols()).copy_from(covariates);
    }
    cc
}

fn residualize_inplace(mat: &mut Mat, cc: &Mat, chol: &Cholesky<f32, nalgebra::Dyn>) {
    let coef = chol.solve(&(cc.transpose() * &*mat));
    *mat -= cc * coef;
}

pub fn write_results(results: &[AssociationResult], file_path: &str) -> anyhow::Result<()> {
    mkdir(file_path)?;

    let genes: Vec<Box<str>> = results.iter().map(|r| r.gene.clone()).collect();
    let targets: Vec<Box<str>> = results.iter().map(|r| r.target.clone()).collect();
    let types: Vec<Box<str>> = results
        .iter()
        .map(|r| r.pair_type.as_str().into())
        .collect();
    let effects: Vec<f64> = results.iter().map(|r| r.effect).collect();
    let p_values: Vec<f64> = results.iter().map(|r| r.p_value).collect();

    write_columns(
        file_path,
        &[
            ("gene", ColumnData::Str(genes)),
            ("target", ColumnData::Str(targets)),
            ("pair_type", ColumnData::Str(types)),
            ("effect", ColumnData::F64(effects)),
            ("p_value", ColumnData::F64(p_values)),
        ],
    )
}

pub fn read_results(file_path: &str) -> anyhow::Result<Vec<AssociationResult>> {
    let table = read_columns(file_path)?;
    let genes = table.str_column("gene")?;
    let targets = table.str_column("target")?;
    let types = table.str_column("pair_type")?;
    let effects = table.f64_column("effect")?;
    let p_values = table.f64_column("p_value")?;

    let mut results = Vec::with_capacity(genes.len());
    for i in 0..genes.len() {
        results.push(AssociationResult {
            gene: genes[i].clone(),
            target: targets[i].clone(),
            pair_type: PairType::parse(&types[i])?,
            effect: effects[i],
            p_value: p_values[i],
        });
    }
    Ok(results)
}
