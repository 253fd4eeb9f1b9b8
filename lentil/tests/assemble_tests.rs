use lentil::assemble::{assemble_condition, AssemblerIn, MatrixBundle};
use lentil::common::{CscMat, Mat};
use lentil::input::{AnnotationTable, CountTable};

use matrix_util::traits::IoOps;
use nalgebra_sparse::CooMatrix;

///
/// Six cells alternating between stim and ctrl samples. Cells 0..3
/// carry T1, cells 3 and 5 carry the control, cell 4 has no guide.
///
fn toy_annotations() -> AnnotationTable {
    let cells: Vec<Box<str>> = (0..6).map(|j| format!("c{}", j).into()).collect();
    let samples: Vec<Box<str>> = (0..6)
        .map(|j| {
            if j % 2 == 0 {
                "b0_stim".into()
            } else {
                "b0_ctrl".into()
            }
        })
        .collect();

    let guide_indicator = Mat::from_row_slice(
        2,
        6,
        &[
            1.0, 1.0, 1.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0, 0.0, 1.0,
        ],
    );

    let covariates = Mat::from_column_slice(6, 1, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

    AnnotationTable {
        cells,
        samples,
        guide_indicator,
        target_names: vec!["T1".into(), "NTC".into()],
        covariates,
        covariate_names: vec!["log1p_total".into()],
    }
}

/// Counts with shuffled cell columns; the value at (gene i, cell j)
/// is `(i + 1) * 100 + j` so joins are easy to spot-check
fn toy_counts(keep: &[usize]) -> CountTable {
    let genes: Vec<Box<str>> = (0..3).map(|i| format!("g{}", i).into()).collect();
    let cells: Vec<Box<str>> = keep.iter().map(|j| format!("c{}", j).into()).collect();

    let mut coo = CooMatrix::new(3, keep.len());
    for (col, &j) in keep.iter().enumerate() {
        for i in 0..3 {
            coo.push(i, col, ((i + 1) * 100 + j) as f32);
        }
    }
    CountTable {
        counts: CscMat::from(&coo),
        genes,
        cells,
    }
}

#[test]
fn aligned_matrices_share_one_cell_order() -> anyhow::Result<()> {
    let annotations = toy_annotations();
    let counts = toy_counts(&[3, 0, 5, 2, 1, 4]);
    let genes: Vec<Box<str>> = vec!["g0".into(), "g2".into()];

    let bundle = assemble_condition(AssemblerIn {
        annotations: &annotations,
        counts: &counts,
        gene_subset: &genes,
        condition: "stim",
        sample_suffix: "stim",
        control_label: "NTC",
    })?;

    let expected_cells: Vec<Box<str>> = vec!["c0".into(), "c2".into(), "c4".into()];
    assert_eq!(bundle.cells, expected_cells);
    assert_eq!(bundle.genes, genes);
    assert_eq!(bundle.num_targets(), 2);

    // expression columns follow the annotation cell order, not the
    // count file order
    let expected_expression = Mat::from_row_slice(
        2,
        3,
        &[
            100.0, 102.0, 104.0, //
            300.0, 302.0, 304.0,
        ],
    );
    approx::assert_abs_diff_eq!(bundle.expression, expected_expression);

    // cell 4 carried no guide and lands in the control row
    let expected_perturbation = Mat::from_row_slice(
        2,
        3,
        &[
            1.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        ],
    );
    approx::assert_abs_diff_eq!(bundle.perturbation, expected_perturbation);
    assert_eq!(bundle.cells_per_target(), vec![2, 1]);

    // covariates for cells 0, 2, 4 were 1, 3, 5; centred per condition
    let expected_covariates = Mat::from_column_slice(3, 1, &[-2.0, 0.0, 2.0]);
    approx::assert_abs_diff_eq!(bundle.covariates, expected_covariates, epsilon = 1e-5);

    Ok(())
}

#[test]
fn unassigned_cells_stay_empty_without_a_control_column() -> anyhow::Result<()> {
    let mut annotations = toy_annotations();
    annotations.target_names = vec!["T1".into(), "T2".into()];
    let counts = toy_counts(&[0, 1, 2, 3, 4, 5]);
    let genes: Vec<Box<str>> = vec!["g0".into()];

    let bundle = assemble_condition(AssemblerIn {
        annotations: &annotations,
        counts: &counts,
        gene_subset: &genes,
        condition: "stim",
        sample_suffix: "stim",
        control_label: "NTC",
    })?;

    // cell 4 is the third stim cell and keeps an all-zero column
    assert_eq!(bundle.perturbation.column(2).sum(), 0.0);
    Ok(())
}

#[test]
fn missing_genes_and_cells_are_fatal() {
    let annotations = toy_annotations();
    let counts = toy_counts(&[0, 1, 2, 3, 4, 5]);

    let missing_gene: Vec<Box<str>> = vec!["g0".into(), "nope".into()];
    let err = assemble_condition(AssemblerIn {
        annotations: &annotations,
        counts: &counts,
        gene_subset: &missing_gene,
        condition: "stim",
        sample_suffix: "stim",
        control_label: "NTC",
    })
    .unwrap_err();
    assert!(err.to_string().contains("absent"));

    // drop cell c4 from the counts while the annotation still has it
    let counts = toy_counts(&[0, 1, 2, 3, 5]);
    let genes: Vec<Box<str>> = vec!["g0".into()];
    let err = assemble_condition(AssemblerIn {
        annotations: &annotations,
        counts: &counts,
        gene_subset: &genes,
        condition: "stim",
        sample_suffix: "stim",
        control_label: "NTC",
    })
    .unwrap_err();
    assert!(err.to_string().contains("c4"));
}

#[test]
fn unmatched_sample_suffix_is_fatal() {
    let annotations = toy_annotations();
    let counts = toy_counts(&[0, 1, 2, 3, 4, 5]);
    let genes: Vec<Box<str>> = vec!["g0".into()];

    let result = assemble_condition(AssemblerIn {
        annotations: &annotations,
        counts: &counts,
        gene_subset: &genes,
        condition: "treated",
        sample_suffix: "treated",
        control_label: "NTC",
    });
    assert!(result.is_err());
}

#[test]
fn validate_checks_dimensions_and_coding() {
    let bundle = MatrixBundle {
        condition: "stim".into(),
        genes: vec!["g0".into()],
        targets: vec!["T1".into()],
        cells: vec!["c0".into(), "c1".into()],
        covariate_names: vec![],
        expression: Mat::zeros(1, 2),
        perturbation: Mat::from_row_slice(1, 2, &[1.0, 0.5]),
        covariates: Mat::zeros(2, 0),
    };
    let err = bundle.validate().unwrap_err();
    assert!(err.to_string().contains("0/1"));

    let bundle = MatrixBundle {
        condition: "stim".into(),
        genes: vec!["g0".into()],
        targets: vec!["T1".into()],
        cells: vec!["c0".into(), "c1".into()],
        covariate_names: vec![],
        expression: Mat::zeros(1, 3),
        perturbation: Mat::zeros(1, 2),
        covariates: Mat::zeros(2, 0),
    };
    assert!(bundle.validate().is_err());
}

#[test]
fn bundle_roundtrip_through_parquet() -> anyhow::Result<()> {
    let annotations = toy_annotations();
    let counts = toy_counts(&[0, 1, 2, 3, 4, 5]);
    let genes: Vec<Box<str>> = vec!["g1".into(), "g0".into()];

    let bundle = assemble_condition(AssemblerIn {
        annotations: &annotations,
        counts: &counts,
        gene_subset: &genes,
        condition: "ctrl",
        sample_suffix: "ctrl",
        control_label: "NTC",
    })?;

    let dir = tempfile::tempdir()?;
    let header = dir.path().join("assembled.ctrl");
    let header = header.to_str().unwrap();
    bundle.to_parquet(header)?;

    let reloaded = MatrixBundle::from_parquet(header, "ctrl")?;
    assert_eq!(reloaded.genes, bundle.genes);
    assert_eq!(reloaded.targets, bundle.targets);
    assert_eq!(reloaded.cells, bundle.cells);
    assert_eq!(reloaded.covariate_names, bundle.covariate_names);
    approx::assert_abs_diff_eq!(reloaded.expression, bundle.expression);
    approx::assert_abs_diff_eq!(reloaded.perturbation, bundle.perturbation);
    approx::assert_abs_diff_eq!(reloaded.covariates, bundle.covariates);
    Ok(())
}

#[test]
fn snapshot_with_disagreeing_cells_fails_to_load() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let header = dir.path().join("broken");
    let header = header.to_str().unwrap();

    let genes: Vec<Box<str>> = vec!["g0".into()];
    let targets: Vec<Box<str>> = vec!["T1".into()];
    let two_cells: Vec<Box<str>> = vec!["c0".into(), "c1".into()];
    let one_cell: Vec<Box<str>> = vec!["c0".into()];

    Mat::zeros(1, 2).to_parquet(
        &format!("{}.expression.parquet", header),
        Some(&genes),
        Some(&two_cells),
    )?;
    Mat::zeros(1, 1).to_parquet(
        &format!("{}.perturbation.parquet", header),
        Some(&targets),
        Some(&one_cell),
    )?;
    Mat::zeros(2, 0).to_parquet(
        &format!("{}.covariates.parquet", header),
        Some(&two_cells),
        Some(&[]),
    )?;

    assert!(MatrixBundle::from_parquet(header, "stim").is_err());
    Ok(())
}
