use crate::aggregate::{
    read_method_table, significant_counts_matrix, LabelMap, MethodComparison, SignificanceRule,
};
use crate::common::*;
use crate::input::FIELD_DELIM;

use anyhow::anyhow;
use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct AggregateArgs {
    /// primary gene x target significance matrix (`.parquet` or named
    /// tsv), smaller means more significant
    #[arg(long, short = 'm', required = true)]
    primary_file: Box<str>,

    /// row label of the primary method in the comparison
    #[arg(long, default_value = "primary")]
    primary_name: Box<str>,

    /// significance cutoff applied to the primary matrix
    #[arg(long, default_value_t = 0.05)]
    primary_cutoff: f64,

    /// count primary entries at or above the cutoff instead
    #[arg(long)]
    primary_greater: bool,

    /// reference methods as `name:file:rule`, e.g.
    /// `gsfa:gsfa.tsv.gz:lfsr<=0.05`; may repeat
    #[arg(long = "method")]
    methods: Vec<Box<str>>,

    /// optional `alias<TAB>canonical` label table
    #[arg(long)]
    alias_file: Option<Box<str>>,

    /// output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

///
/// Compare discovery counts per target across methods. The primary
/// matrix fixes the canonical target set; reference methods join onto
/// it, defaulting to zero where they are silent, and a method that
/// cannot be joined is skipped rather than sinking the run.
///
pub fn run_aggregate(args: AggregateArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = env_logger::try_init();

    let primary = read_significance_matrix(&args.primary_file)?;
    info!(
        "primary matrix: {} genes x {} targets",
        primary.rows.len(),
        primary.cols.len()
    );

    let mut labels = LabelMap::new(&primary.cols);
    if let Some(alias_file) = &args.alias_file {
        labels.read_alias_file(alias_file)?;
    }

    let primary_rule = SignificanceRule {
        measure: "value".into(),
        cutoff: args.primary_cutoff,
        keep_below: !args.primary_greater,
    };

    let mut comparison = MethodComparison::new(&labels);
    comparison.add_counts(
        &args.primary_name,
        significant_counts_matrix(&primary.mat, &primary_rule),
    )?;

    for spec in args.methods.iter() {
        match add_reference_method(&mut comparison, &labels, spec) {
            Ok(name) => info!("added method '{}'", name),
            Err(e) => warn!("skipping method spec '{}': {:#}", spec, e),
        }
    }

    mkdir(&args.out)?;
    comparison.to_parquet(&format!("{}.comparison.parquet", args.out))?;
    comparison.to_tsv(&format!("{}.comparison.tsv.gz", args.out))?;

    for (target, count) in comparison.ranking(&args.primary_name)?.iter().take(10) {
        info!("{}\t{}", target, count);
    }

    Ok(())
}

fn add_reference_method(
    comparison: &mut MethodComparison,
    labels: &LabelMap,
    spec: &str,
) -> anyhow::Result<Box<str>> {
    let parts: Vec<&str> = spec.splitn(3, ':').collect();
    if parts.len() != 3 {
        return Err(anyhow!("want 'name:file:rule', got '{}'", spec));
    }
    let (name, file, rule_str) = (parts[0], parts[1], parts[2]);

    let rule = SignificanceRule::parse(rule_str)?;
    let table = read_method_table(file, name, &rule.measure)?;
    comparison.add_method(&table, &rule, labels)?;
    Ok(name.into())
}

fn read_significance_matrix(file: &str) -> anyhow::Result<MatWithNames<Mat>> {
    if extension(file)?.as_ref() == "parquet" {
        Mat::from_parquet(file)
    } else {
        Mat::read_named_delim(file, FIELD_DELIM)
    }
}
