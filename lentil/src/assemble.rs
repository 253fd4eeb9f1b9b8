use crate::common::*;
use crate::error::ScreenError;
use crate::input::{AnnotationTable, CountTable};

use anyhow::anyhow;
use fnv::FnvHashMap;

/// targets with fewer carrier cells than this are flagged
pub const MIN_CELLS_PER_TARGET: usize = 20;

///
/// Aligned matrices for one condition. The three matrices share one
/// cell order: expression and perturbation columns and covariate rows
/// all refer to `cells[j]`.
///
#[derive(Debug)]
pub struct MatrixBundle {
    pub condition: Box<str>,
    pub genes: Vec<Box<str>>,
    pub targets: Vec<Box<str>>,
    pub cells: Vec<Box<str>>,
    pub covariate_names: Vec<Box<str>>,
    /// gene x cell
    pub expression: Mat,
    /// target x cell, coded 0/1
    pub perturbation: Mat,
    /// cell x covariate, centred within the condition
    pub covariates: Mat,
}

pub struct AssemblerIn<'a> {
    pub annotations: &'a AnnotationTable,
    pub counts: &'a CountTable,
    pub gene_subset: &'a [Box<str>],
    pub condition: &'a str,
    /// cells whose sample identifier ends with this belong here
    pub sample_suffix: &'a str,
    pub control_label: &'a str,
}

impl MatrixBundle {
    pub fn num_genes(&self) -> usize {
        self.genes.len()
    }

    pub fn num_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Check the shared-cell-order contract and the 0/1 coding of the
    /// perturbation matrix
    pub fn validate(&self) -> Result<(), ScreenError> {
        let broken = |reason: String| ScreenError::InvariantViolation { reason };

        if self.expression.nrows() != self.genes.len() {
            return Err(broken(format!(
                "expression has {} rows for {} genes",
                self.expression.nrows(),
                self.genes.len()
            )));
        }
        if self.perturbation.nrows() != self.targets.len() {
            return Err(broken(format!(
                "perturbation has {} rows for {} targets",
                self.perturbation.nrows(),
                self.targets.len()
            )));
        }
        if self.covariates.ncols() != self.covariate_names.len() {
            return Err(broken(format!(
                "covariates have {} columns for {} names",
                self.covariates.ncols(),
                self.covariate_names.len()
            )));
        }

        let nn = self.cells.len();
        if self.expression.ncols() != nn {
            return Err(broken(format!(
                "expression covers {} cells, cell list has {}",
                self.expression.ncols(),
                nn
            )));
        }
        if self.perturbation.ncols() != nn {
            return Err(broken(format!(
                "perturbation covers {} cells, cell list has {}",
                self.perturbation.ncols(),
                nn
            )));
        }
        if self.covariates.nrows() != nn {
            return Err(broken(format!(
                "covariates cover {} cells, cell list has {}",
                self.covariates.nrows(),
                nn
            )));
        }

        for (k, x) in self.perturbation.iter().enumerate() {
            if *x != 0.0 && *x != 1.0 {
                let t = k % self.perturbation.nrows();
                let j = k / self.perturbation.nrows();
                return Err(broken(format!(
                    "perturbation for target '{}', cell '{}' is {} (want 0/1)",
                    self.targets[t], self.cells[j], x
                )));
            }
        }
        Ok(())
    }

    /// Carrier cells for each target row
    pub fn cells_per_target(&self) -> Vec<usize> {
        self.perturbation
            .row_iter()
            .map(|row| row.iter().filter(|&&x| x > 0.0).count())
            .collect()
    }

    pub fn to_parquet(&self, out_header: &str) -> anyhow::Result<()> {
        mkdir(out_header)?;

        self.expression.to_parquet(
            &format!("{}.expression.parquet", out_header),
            Some(&self.genes),
            Some(&self.cells),
        )?;
        self.perturbation.to_parquet(
            &format!("{}.perturbation.parquet", out_header),
            Some(&self.targets),
            Some(&self.cells),
        )?;
        self.covariates.to_parquet(
            &format!("{}.covariates.parquet", out_header),
            Some(&self.cells),
            Some(&self.covariate_names),
        )?;

        info!(
            "wrote {} cells of condition '{}' under {}",
            self.num_cells(),
            self.condition,
            out_header
        );
        Ok(())
    }

    /// Reload a snapshot written by `to_parquet`, revalidating the
    /// alignment across the three files
    pub fn from_parquet(out_header: &str, condition: &str) -> anyhow::Result<Self> {
        let expression = Mat::from_parquet(&format!("{}.expression.parquet", out_header))?;
        let perturbation = Mat::from_parquet(&format!("{}.perturbation.parquet", out_header))?;
        let covariates = Mat::from_parquet(&format!("{}.covariates.parquet", out_header))?;

        if perturbation.cols != expression.cols {
            return Err(ScreenError::InvariantViolation {
                reason: format!("cell names differ between expression and perturbation under {}", out_header),
            }
            .into());
        }
        if covariates.rows != expression.cols {
            return Err(ScreenError::InvariantViolation {
                reason: format!("cell names differ between expression and covariates under {}", out_header),
            }
            .into());
        }

        let ret = Self {
            condition: condition.into(),
            genes: expression.rows,
            targets: perturbation.rows,
            cells: expression.cols,
            covariate_names: covariates.cols,
            expression: expression.mat,
            perturbation: perturbation.mat,
            covariates: covariates.mat,
        };
        ret.validate()?;
        Ok(ret)
    }
}

///
/// Pull one condition's cells out of the annotation table and join
/// them with the count matrix, producing aligned expression,
/// perturbation, and covariate matrices. Cells carrying no guide are
/// folded into the control column when one exists.
///
pub fn assemble_condition(input: AssemblerIn<'_>) -> anyhow::Result<MatrixBundle> {
    let annotations = input.annotations;
    let counts = input.counts;

    let subset: Vec<usize> = annotations
        .samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.ends_with(input.sample_suffix))
        .map(|(i, _)| i)
        .collect();

    if subset.is_empty() {
        return Err(anyhow!(
            "no cells with sample suffix '{}' for condition '{}'",
            input.sample_suffix,
            input.condition
        ));
    }

    let cell_to_column: FnvHashMap<&str, usize> = counts
        .cells
        .iter()
        .enumerate()
        .map(|(j, x)| (x.as_ref(), j))
        .collect();

    let gene_to_row: FnvHashMap<&str, usize> = counts
        .genes
        .iter()
        .enumerate()
        .map(|(i, x)| (x.as_ref(), i))
        .collect();

    let missing: Vec<&str> = input
        .gene_subset
        .iter()
        .map(|g| g.as_ref())
        .filter(|g| !gene_to_row.contains_key(g))
        .collect();
    if !missing.is_empty() {
        return Err(anyhow!(
            "{} selected genes absent from the count table, e.g. '{}'",
            missing.len(),
            missing[0]
        ));
    }

    let mut row_to_selected = vec![None; counts.genes.len()];
    for (g, gene) in input.gene_subset.iter().enumerate() {
        row_to_selected[gene_to_row[gene.as_ref()]] = Some(g);
    }

    let num_cells = subset.len();
    let num_genes = input.gene_subset.len();
    let num_targets = annotations.target_names.len();

    let mut expression = Mat::zeros(num_genes, num_cells);
    let mut perturbation = Mat::zeros(num_targets, num_cells);
    let mut covariates = Mat::zeros(num_cells, annotations.covariate_names.len());

    for (jj, &i_cell) in subset.iter().enumerate() {
        let barcode = annotations.cells[i_cell].as_ref();
        let j = *cell_to_column
            .get(barcode)
            .ok_or_else(|| ScreenError::InvariantViolation {
                reason: format!("cell '{}' missing from the count table", barcode),
            })?;

        let column = counts.counts.col(j);
        for (&i_row, &x) in column.row_indices().iter().zip(column.values().iter()) {
            if let Some(g) = row_to_selected[i_row] {
                expression[(g, jj)] = x;
            }
        }

        perturbation
            .column_mut(jj)
            .copy_from(&annotations.guide_indicator.column(i_cell));
        covariates
            .row_mut(jj)
            .copy_from(&annotations.covariates.row(i_cell));
    }

    // cells without any guide call
    let control = annotations
        .target_names
        .iter()
        .position(|t| t.as_ref() == input.control_label);

    let unassigned: Vec<usize> = (0..num_cells)
        .filter(|&jj| perturbation.column(jj).sum() == 0.0)
        .collect();

    if !unassigned.is_empty() {
        match control {
            Some(k) => {
                for &jj in unassigned.iter() {
                    perturbation[(k, jj)] = 1.0;
                }
                info!(
                    "folded {} unassigned cells into '{}' in condition '{}'",
                    unassigned.len(),
                    input.control_label,
                    input.condition
                );
            }
            None => {
                warn!(
                    "{} cells carry no guide and no '{}' column exists in condition '{}'",
                    unassigned.len(),
                    input.control_label,
                    input.condition
                );
            }
        }
    }

    covariates.centre_columns_inplace();

    let bundle = MatrixBundle {
        condition: input.condition.into(),
        genes: input.gene_subset.to_vec(),
        targets: annotations.target_names.clone(),
        cells: subset.iter().map(|&i| annotations.cells[i].clone()).collect(),
        covariate_names: annotations.covariate_names.clone(),
        expression,
        perturbation,
        covariates,
    };
    bundle.validate()?;

    for (target, nn) in bundle.targets.iter().zip(bundle.cells_per_target()) {
        if nn < MIN_CELLS_PER_TARGET {
            warn!(
                "target '{}' has only {} cells in condition '{}'",
                target, nn, input.condition
            );
        }
    }

    let num_silent = bundle
        .expression
        .row_iter()
        .filter(|row| row.iter().all(|&x| x == 0.0))
        .count();
    if num_silent > 0 {
        warn!(
            "{} of {} selected genes have no counts in condition '{}'",
            num_silent,
            bundle.num_genes(),
            input.condition
        );
    }

    info!(
        "assembled condition '{}': {} genes x {} cells, {} targets",
        input.condition,
        bundle.num_genes(),
        bundle.num_cells(),
        bundle.num_targets()
    );

    Ok(bundle)
}
