use crate::association::read_results;
use crate::common::*;
use crate::discovery::DiscoverySet;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct DiscoverArgs {
    /// observed association results (parquet)
    #[arg(long, short = 'i', required = true)]
    result_file: Box<str>,

    /// FDR cutoff over candidate pairs
    #[arg(long, short = 'f', default_value_t = 0.1)]
    fdr: f64,

    /// output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

///
/// Adjust candidate p-values by the step-up rule and mark pairs
/// passing the FDR cutoff as discoveries.
///
pub fn run_discover(args: DiscoverArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = env_logger::try_init();

    let results = read_results(&args.result_file)?;
    let discovery = DiscoverySet::from_results(&results, args.fdr);

    let num_candidates = discovery
        .records()
        .iter()
        .filter(|r| r.adjusted_p.is_some())
        .count();
    info!(
        "{} discoveries among {} candidate pairs at FDR {}",
        discovery.num_discovered(),
        num_candidates,
        args.fdr
    );

    mkdir(&args.out)?;
    discovery.to_parquet(&format!("{}.discovery.parquet", args.out))?;

    let mut count_lines: Vec<Box<str>> = vec!["target\tnum_discovered".into()];
    for (target, genes) in discovery.discovered_genes_by_target() {
        count_lines.push(format!("{}\t{}", target, genes.len()).into());
    }
    write_lines(&count_lines, &format!("{}.discovery_counts.tsv", args.out))?;

    Ok(())
}
