use crate::common::*;
use crate::error::ScreenError;
use crate::layout::AnnotationLayout;

use anyhow::anyhow;
use fnv::FnvHashSet;
use matrix_util::mtx_io::read_mtx_triplets;
use nalgebra_sparse::coo::CooMatrix;

/// delimiters accepted in annotation and list files
pub const FIELD_DELIM: &[char] = &['\t', ','];

/// Cell annotation table parsed under a layout, in file row order
#[derive(Debug)]
pub struct AnnotationTable {
    pub cells: Vec<Box<str>>,
    pub samples: Vec<Box<str>>,
    /// target x cell indicators taken from the guide span
    pub guide_indicator: Mat,
    pub target_names: Vec<Box<str>>,
    /// cell x covariate values
    pub covariates: Mat,
    pub covariate_names: Vec<Box<str>>,
}

pub fn read_annotation_table(
    annot_file: &str,
    layout: &AnnotationLayout,
) -> anyhow::Result<AnnotationTable> {
    let parsed = read_lines_of_words_delim(annot_file, FIELD_DELIM, 0)?;

    if parsed.header.is_empty() {
        return Err(anyhow!("no header line in {}", annot_file));
    }
    if parsed.lines.is_empty() {
        return Err(anyhow!("no cells in {}", annot_file));
    }

    let resolved = layout.resolve(&parsed.header, annot_file)?;
    let width = parsed.header.len();

    let num_cells = parsed.lines.len();
    let num_targets = resolved.target_names.len();
    let (span_lb, span_ub) = resolved.guide_span;

    let mut cells = Vec::with_capacity(num_cells);
    let mut samples = Vec::with_capacity(num_cells);
    let mut guide_indicator = Mat::zeros(num_targets, num_cells);
    let mut covariates = Mat::zeros(num_cells, resolved.covariates.len());

    for (i, words) in parsed.lines.iter().enumerate() {
        if words.len() != width {
            return Err(ScreenError::InvariantViolation {
                reason: format!(
                    "line {} of {} has {} fields, expected {}",
                    i + 2,
                    annot_file,
                    words.len(),
                    width
                ),
            }
            .into());
        }

        let barcode = &words[resolved.barcode];

        for (k, j) in (span_lb..=span_ub).enumerate() {
            let x: f32 = words[j].parse().map_err(|_| ScreenError::InvariantViolation {
                reason: format!(
                    "guide indicator '{}' of cell '{}' is not numeric",
                    words[j], barcode
                ),
            })?;
            if x != 0.0 && x != 1.0 {
                return Err(ScreenError::InvariantViolation {
                    reason: format!(
                        "guide indicator for cell '{}', target '{}' is {} (want 0/1)",
                        barcode, resolved.target_names[k], x
                    ),
                }
                .into());
            }
            guide_indicator[(k, i)] = x;
        }

        for (k, &j) in resolved.covariates.iter().enumerate() {
            covariates[(i, k)] = words[j].parse().map_err(|_| {
                anyhow!(
                    "covariate '{}' of cell '{}' is not numeric: '{}'",
                    layout.covariate_columns[k],
                    barcode,
                    words[j]
                )
            })?;
        }

        cells.push(barcode.clone());
        samples.push(words[resolved.sample].clone());
    }

    let mut seen = FnvHashSet::default();
    for barcode in cells.iter() {
        if !seen.insert(barcode.as_ref()) {
            return Err(ScreenError::InvariantViolation {
                reason: format!("duplicate cell barcode '{}' in {}", barcode, annot_file),
            }
            .into());
        }
    }

    info!(
        "annotation: {} cells, {} targets, {} covariates",
        num_cells,
        num_targets,
        resolved.covariates.len()
    );

    Ok(AnnotationTable {
        cells,
        samples,
        guide_indicator,
        target_names: resolved.target_names,
        covariates,
        covariate_names: layout.covariate_columns.clone(),
    })
}

/// Gene x cell counts with row and column names
#[derive(Debug)]
pub struct CountTable {
    pub counts: CscMat,
    pub genes: Vec<Box<str>>,
    pub cells: Vec<Box<str>>,
}

///
/// Read a count matrix, either a matrix market `.mtx[.gz]` file with
/// `.rows.gz` and `.cols.gz` side files or a named tsv with genes on
/// the rows and cell barcodes on the columns.
///
pub fn read_count_table(count_file: &str) -> anyhow::Result<CountTable> {
    let is_mtx = count_file.ends_with(".mtx") || count_file.ends_with(".mtx.gz");

    let (triplets, nrow, ncol, genes, cells) = if is_mtx {
        let (triplets, (nrow, ncol, _nnz)) = read_mtx_triplets(count_file)?;
        let genes = read_lines(&sidecar_file(count_file, ".rows.gz"))?;
        let cells = read_lines(&sidecar_file(count_file, ".cols.gz"))?;
        let triplets = triplets
            .into_iter()
            .map(|(i, j, x)| (i as usize, j as usize, x))
            .collect::<Vec<_>>();
        (triplets, nrow, ncol, genes, cells)
    } else {
        let named = Mat::read_named_delim(count_file, FIELD_DELIM)?;
        let (nrow, ncol) = (named.mat.nrows(), named.mat.ncols());
        let mut triplets = Vec::with_capacity(nrow * ncol / 4);
        for j in 0..ncol {
            for i in 0..nrow {
                let x = named.mat[(i, j)];
                if x != 0.0 {
                    triplets.push((i, j, x));
                }
            }
        }
        (triplets, nrow, ncol, named.rows, named.cols)
    };

    if genes.len() != nrow {
        return Err(ScreenError::InvariantViolation {
            reason: format!("{} row names for {} rows in {}", genes.len(), nrow, count_file),
        }
        .into());
    }
    if cells.len() != ncol {
        return Err(ScreenError::InvariantViolation {
            reason: format!("{} column names for {} columns in {}", cells.len(), ncol, count_file),
        }
        .into());
    }

    let mut coo = CooMatrix::new(nrow, ncol);
    for &(i, j, x) in triplets.iter() {
        if i >= nrow || j >= ncol {
            return Err(ScreenError::InvariantViolation {
                reason: format!(
                    "entry ({}, {}) outside the declared {} x {} shape of {}",
                    i, j, nrow, ncol, count_file
                ),
            }
            .into());
        }
        if x < 0.0 {
            return Err(ScreenError::InvariantViolation {
                reason: format!("negative count {} at ({}, {}) in {}", x, i, j, count_file),
            }
            .into());
        }
        coo.push(i, j, x);
    }

    info!(
        "counts: {} genes x {} cells, {} non-zero",
        nrow,
        ncol,
        triplets.len()
    );

    Ok(CountTable {
        counts: CscMat::from(&coo),
        genes,
        cells,
    })
}

fn sidecar_file(mtx_file: &str, suffix: &str) -> Box<str> {
    if mtx_file.ends_with(".mtx.gz") {
        mtx_file.replace(".mtx.gz", suffix).into()
    } else {
        mtx_file.replace(".mtx", suffix).into()
    }
}

/// Read a gene list, one name per line; repeated names are dropped
/// with a warning
pub fn read_gene_list(gene_file: &str) -> anyhow::Result<Vec<Box<str>>> {
    let mut genes = vec![];
    let mut seen = FnvHashSet::default();

    for line in read_lines(gene_file)? {
        if let Some(gene) = line.split_whitespace().next() {
            if seen.insert(gene.to_string()) {
                genes.push(gene.into());
            } else {
                warn!("duplicate gene '{}' in {}", gene, gene_file);
            }
        }
    }

    if genes.is_empty() {
        return Err(anyhow!("no genes in {}", gene_file));
    }
    Ok(genes)
}
