use crate::association::read_results;
use crate::calibrate::NullPool;
use crate::common::*;

use anyhow::anyhow;
use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct CalibrateArgs {
    /// association output header (from `assoc`)
    #[arg(long, short = 'i', required = true)]
    assoc: Box<str>,

    /// condition name
    #[arg(long, short = 'c', required = true)]
    condition: Box<str>,

    /// number of permuted replicates expected in the pool
    #[arg(long, short = 'p', required = true)]
    num_permutations: usize,

    /// flag pools whose KS distance from uniform exceeds this
    #[arg(long, default_value_t = 0.1)]
    ks_warn: f64,

    /// output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

///
/// Pool candidate p-values across permuted replicates and summarize
/// how uniform the pooled null looks. Pooling refuses to run until
/// every expected replicate file exists.
///
pub fn run_calibrate(args: CalibrateArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = env_logger::try_init();

    if args.num_permutations < 1 {
        return Err(anyhow!("need at least one permuted replicate"));
    }

    let replicate_file = |r: usize| -> String {
        format!("{}.{}.null.{}.parquet", args.assoc, args.condition, r)
    };

    let missing: Vec<usize> = (0..args.num_permutations)
        .filter(|&r| !std::path::Path::new(&replicate_file(r)).exists())
        .collect();
    if !missing.is_empty() {
        return Err(anyhow!(
            "incomplete permutation pool for condition '{}': missing replicates {:?}",
            args.condition,
            missing
        ));
    }

    let mut replicates = Vec::with_capacity(args.num_permutations);
    for r in 0..args.num_permutations {
        replicates.push(read_results(&replicate_file(r))?);
    }

    let pool = NullPool::pool(&replicates);
    info!(
        "pooled {} null draws from {} replicates",
        pool.len(),
        pool.num_replicates()
    );

    mkdir(&args.out)?;
    pool.to_parquet(&format!("{}.{}.null_pool.parquet", args.out, args.condition))?;

    let summary = pool.uniformity();
    summary.to_tsv(&format!("{}.{}.calibration.tsv", args.out, args.condition))?;

    info!(
        "null calibration: mean {:.4} (z = {:.2}), ks {:.4}",
        summary.mean, summary.mean_z, summary.ks_statistic
    );
    if summary.ks_statistic > args.ks_warn {
        warn!(
            "permutation null deviates from uniform (ks {:.4} > {:.4})",
            summary.ks_statistic, args.ks_warn
        );
    }

    Ok(())
}
