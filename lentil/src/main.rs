use lentil::run_aggregate::{run_aggregate, AggregateArgs};
use lentil::run_assemble::{run_assemble, AssembleArgs};
use lentil::run_assoc::{run_assoc, AssocArgs};
use lentil::run_calibrate::{run_calibrate, CalibrateArgs};
use lentil::run_discover::{run_discover, DiscoverArgs};
use lentil::run_enrich::{run_enrich, EnrichArgs};
use lentil::run_simulate::{run_simulate, SimArgs};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about, term_width = 80)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Simulate a pooled screen with known causal gene-target pairs
    Simulate(SimArgs),
    /// Assemble per-condition expression, perturbation, and covariate
    /// matrices from count and annotation files
    Assemble(AssembleArgs),
    /// Test gene-target associations, optionally with permuted
    /// perturbation labels
    Assoc(AssocArgs),
    /// Pool permutation nulls and check p-value calibration
    Calibrate(CalibrateArgs),
    /// Adjust candidate p-values and call discoveries
    Discover(DiscoverArgs),
    /// Compare per-target discovery counts across methods
    Aggregate(AggregateArgs),
    /// Gene set over-representation analysis of discovered genes
    Enrich(EnrichArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.commands {
        Commands::Simulate(args) => {
            run_simulate(args)?;
        }
        Commands::Assemble(args) => {
            run_assemble(args)?;
        }
        Commands::Assoc(args) => {
            run_assoc(args)?;
        }
        Commands::Calibrate(args) => {
            run_calibrate(args)?;
        }
        Commands::Discover(args) => {
            run_discover(args)?;
        }
        Commands::Aggregate(args) => {
            run_aggregate(args)?;
        }
        Commands::Enrich(args) => {
            run_enrich(args)?;
        }
    }
    Ok(())
}
