use crate::assemble::MatrixBundle;
use crate::association::{
    validate_results, write_results, AssociationIn, AssociationResult, AssociationRunner,
    MarginalOlsRunner, TestMode,
};
use crate::common::*;
use crate::pair_universe::PairUniverse;

use clap::Parser;
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;

#[derive(Parser, Debug, Clone)]
pub struct AssocArgs {
    /// assembled output header (from `assemble`)
    #[arg(long, short = 'i', required = true)]
    assembled: Box<str>,

    /// condition to test
    #[arg(long, short = 'c', required = true)]
    condition: Box<str>,

    /// number of permuted replicates on top of the observed run
    #[arg(long, short = 'p', default_value_t = 0)]
    num_permutations: usize,

    /// base random seed for the permuted replicates
    #[arg(long, default_value_t = 42)]
    rseed: u64,

    /// output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

///
/// Score every universe pair on the observed data, then on permuted
/// replicates where the cell-to-guide assignment is shuffled. Each
/// replicate lands in its own file, tagged by index.
///
pub fn run_assoc(args: AssocArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = env_logger::try_init();

    let bundle = MatrixBundle::from_parquet(
        &format!("{}.{}", args.assembled, args.condition),
        &args.condition,
    )?;
    let universe = PairUniverse::from_parquet(&format!("{}.pairs.parquet", args.assembled))?;

    mkdir(&args.out)?;

    let runner = MarginalOlsRunner { rseed: args.rseed };
    let input = AssociationIn {
        bundle: &bundle,
        universe: &universe,
    };

    info!(
        "{}: {} pairs over {} cells of condition '{}'",
        runner.name(),
        universe.len(),
        bundle.num_cells(),
        args.condition
    );

    let observed = runner.run(&input, TestMode::Observed)?;
    validate_results(&observed, &universe)?;
    write_results(
        &observed,
        &format!("{}.{}.result.parquet", args.out, args.condition),
    )?;

    if args.num_permutations > 0 {
        info!("running {} permuted replicates", args.num_permutations);

        let mut permuted: Vec<(usize, Vec<AssociationResult>)> = (0..args.num_permutations)
            .into_par_iter()
            .progress_count(args.num_permutations as u64)
            .map(|replicate| {
                runner
                    .run(&input, TestMode::Permuted { replicate })
                    .map(|results| (replicate, results))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        permuted.sort_by_key(|&(replicate, _)| replicate);

        for (replicate, results) in permuted.iter() {
            validate_results(results, &universe)?;
            write_results(
                results,
                &format!("{}.{}.null.{}.parquet", args.out, args.condition, replicate),
            )?;
        }
    }

    info!("done");
    Ok(())
}
