use crate::assemble::{assemble_condition, AssemblerIn};
use crate::common::*;
use crate::input::{read_annotation_table, read_count_table, read_gene_list};
use crate::layout::AnnotationLayout;
use crate::pair_universe::PairUniverse;

use anyhow::anyhow;
use clap::Parser;
use serde_json::json;

#[derive(Parser, Debug, Clone)]
pub struct AssembleArgs {
    /// gene x cell counts: `.mtx[.gz]` trio or a named tsv
    #[arg(long, short = 'd', required = true)]
    count_file: Box<str>,

    /// cell annotation table with guide indicators and covariates
    #[arg(long, short = 'a', required = true)]
    annotation_file: Box<str>,

    /// JSON layout describing the annotation columns
    #[arg(long, short = 'l', required = true)]
    layout_file: Box<str>,

    /// selected genes, one per line
    #[arg(long, short = 'g', required = true)]
    gene_file: Box<str>,

    /// condition names
    #[arg(long, short = 'c', value_delimiter(','), required = true)]
    conditions: Vec<Box<str>>,

    /// sample-id suffixes marking each condition, matched by position
    /// (default: the condition names themselves)
    #[arg(long, short = 's', value_delimiter(','))]
    sample_suffixes: Option<Vec<Box<str>>>,

    /// output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

///
/// Assemble aligned expression, perturbation, and covariate matrices
/// for each condition, plus the shared test-pair universe.
///
pub fn run_assemble(args: AssembleArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = env_logger::try_init();

    let suffixes = args
        .sample_suffixes
        .clone()
        .unwrap_or_else(|| args.conditions.clone());
    if suffixes.len() != args.conditions.len() {
        return Err(anyhow!(
            "{} sample suffixes for {} conditions",
            suffixes.len(),
            args.conditions.len()
        ));
    }
    for a in suffixes.iter() {
        for b in suffixes.iter() {
            if a.as_ref() != b.as_ref() && a.ends_with(b.as_ref()) {
                warn!(
                    "suffix '{}' also matches cells of suffix '{}'",
                    b, a
                );
            }
        }
    }

    let layout = AnnotationLayout::from_json_file(&args.layout_file)?;
    let annotations = read_annotation_table(&args.annotation_file, &layout)?;
    let counts = read_count_table(&args.count_file)?;
    let genes = read_gene_list(&args.gene_file)?;

    mkdir(&args.out)?;

    for (condition, suffix) in args.conditions.iter().zip(suffixes.iter()) {
        let bundle = assemble_condition(AssemblerIn {
            annotations: &annotations,
            counts: &counts,
            gene_subset: &genes,
            condition,
            sample_suffix: suffix,
            control_label: &layout.control_label,
        })?;
        bundle.to_parquet(&format!("{}.{}", args.out, condition))?;
    }

    let universe = PairUniverse::build(&genes, &annotations.target_names, &layout.control_label);
    universe.to_parquet(&format!("{}.pairs.parquet", args.out))?;
    info!(
        "pair universe: {} candidates, {} negative controls",
        universe.num_candidates(),
        universe.num_negative_controls()
    );

    write_parameters(
        &format!("{}.parameters.json", args.out),
        &json!({
            "count_file": args.count_file,
            "annotation_file": args.annotation_file,
            "gene_file": args.gene_file,
            "layout": layout,
            "conditions": args.conditions,
            "sample_suffixes": suffixes,
        }),
    )?;

    Ok(())
}
