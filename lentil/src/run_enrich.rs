use crate::common::*;
use crate::discovery::DiscoverySet;
use crate::enrichment::{
    summarize_enrichment, CachedEnrichment, EnrichmentHit, EnrichmentService, GeneSetDb,
    HypergeomOra,
};
use crate::input::read_gene_list;

use clap::Parser;
use serde_json::json;

#[derive(Parser, Debug, Clone)]
pub struct EnrichArgs {
    /// discovery snapshot (from `discover`)
    #[arg(long, short = 'i', required = true)]
    discovery_file: Box<str>,

    /// gene-set databases in GMT format
    #[arg(long, short = 'g', value_delimiter(','), required = true)]
    gmt_files: Vec<Box<str>>,

    /// background gene list (default: every tested gene)
    #[arg(long, short = 'b')]
    background_file: Option<Box<str>>,

    /// keep terms with adjusted p at or below this
    #[arg(long, default_value_t = 0.05)]
    max_fdr: f64,

    /// keep terms with enrichment ratio at or above this (0 = off)
    #[arg(long, default_value_t = 0.0)]
    min_ratio: f64,

    /// drop sets overlapping fewer foreground genes
    #[arg(long, default_value_t = 1)]
    min_overlap: usize,

    /// cache directory for raw enrichment results
    #[arg(long)]
    cache_dir: Option<Box<str>>,

    /// output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

///
/// Test discovered genes per target for gene-set over-representation
/// and pivot the surviving terms into a term x target ratio matrix,
/// one pair of files per database.
///
pub fn run_enrich(args: EnrichArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = env_logger::try_init();

    let discovery = DiscoverySet::from_parquet(&args.discovery_file)?;

    let background = match &args.background_file {
        Some(file) => read_gene_list(file)?,
        None => discovery.genes(),
    };

    let per_target = discovery.discovered_genes_by_target();
    if per_target.is_empty() {
        warn!("no discoveries in {}; nothing to enrich", args.discovery_file);
        return Ok(());
    }
    info!(
        "{} targets with discoveries, background of {} genes",
        per_target.len(),
        background.len()
    );

    let service: Box<dyn EnrichmentService> = match &args.cache_dir {
        Some(dir) => Box::new(CachedEnrichment::new(
            HypergeomOra {
                min_overlap: args.min_overlap,
            },
            dir,
        )),
        None => Box::new(HypergeomOra {
            min_overlap: args.min_overlap,
        }),
    };

    mkdir(&args.out)?;

    for gmt_file in args.gmt_files.iter() {
        let db = GeneSetDb::from_gmt(gmt_file)?;

        let mut per_target_hits: Vec<(Box<str>, Vec<EnrichmentHit>)> = vec![];
        for (target, foreground) in per_target.iter() {
            let hits = service.enrich(foreground, &background, &db)?;
            info!(
                "{} / {}: {} of {} sets tested",
                db.name,
                target,
                hits.len(),
                db.sets.len()
            );
            per_target_hits.push((target.clone(), hits));
        }

        let matrix = summarize_enrichment(&per_target_hits, args.max_fdr, args.min_ratio);
        info!(
            "{}: {} terms pass fdr {} and ratio {}",
            db.name,
            matrix.num_terms(),
            args.max_fdr,
            args.min_ratio
        );

        matrix.to_parquet(
            &format!("{}.{}.enrichment.parquet", args.out, db.name),
            &format!("{}.{}.terms.parquet", args.out, db.name),
        )?;
    }

    write_parameters(
        &format!("{}.enrich.json", args.out),
        &json!({
            "discovery_file": args.discovery_file,
            "gmt_files": args.gmt_files,
            "max_fdr": args.max_fdr,
            "min_ratio": args.min_ratio,
            "min_overlap": args.min_overlap,
        }),
    )?;

    Ok(())
}
