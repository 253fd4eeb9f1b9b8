use crate::common::*;
use crate::layout::AnnotationLayout;

use anyhow::anyhow;
use clap::Parser;
use fnv::FnvHashSet;
use indicatif::ParallelProgressIterator;
use matrix_util::mtx_io::write_mtx_triplets;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Poisson, Uniform};
use rayon::prelude::*;
use serde_json::json;

#[derive(Parser, Debug, Clone)]
pub struct SimArgs {
    /// number of genes
    #[arg(long, short = 'g', default_value_t = 100)]
    n_genes: usize,

    /// number of perturbation targets, control excluded
    #[arg(long, short = 't', default_value_t = 5)]
    n_targets: usize,

    /// number of cells across all conditions
    #[arg(long, short = 'c', default_value_t = 1000)]
    n_cells: usize,

    /// number of causal (gene, target) pairs
    #[arg(long, short = 'a', default_value_t = 10)]
    n_causal: usize,

    /// average reads per cell
    #[arg(long, short = 'd', default_value_t = 2000.0)]
    depth: f32,

    /// causal effect magnitude on the log scale, sign drawn at random
    #[arg(long, default_value_t = 1.5)]
    effect_size: f32,

    /// fraction of cells assigned to the control guide
    #[arg(long, default_value_t = 0.15)]
    frac_control: f64,

    /// fraction of cells left without any guide call
    #[arg(long, default_value_t = 0.0)]
    frac_unassigned: f64,

    /// condition names, encoded as sample suffixes
    #[arg(long, value_delimiter(','), default_value = "stim,ctrl")]
    conditions: Vec<Box<str>>,

    /// batches per condition
    #[arg(long, default_value_t = 2)]
    n_batches: usize,

    /// name of the control target
    #[arg(long, default_value = "NTC")]
    control_label: Box<str>,

    /// random seed
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
/// Simulate a pooled screen: one guide per cell, Poisson counts with
/// multiplicative causal effects, cells spread over batches and
/// conditions. Writes the count triplets, an annotation table with QC
/// covariates, the matching layout file, a gene selection list, and
/// the causal truth.
///
pub fn run_simulate(args: SimArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = env_logger::try_init();

    if args.n_genes < 1 || args.n_targets < 1 || args.n_cells < 1 {
        return Err(anyhow!("need at least one gene, target, and cell"));
    }
    if args.conditions.is_empty() || args.n_batches < 1 {
        return Err(anyhow!("need at least one condition and one batch"));
    }
    if args.n_causal > args.n_genes * args.n_targets {
        return Err(anyhow!(
            "{} causal pairs exceed {} x {} candidates",
            args.n_causal,
            args.n_genes,
            args.n_targets
        ));
    }
    if args.frac_control + args.frac_unassigned >= 1.0 {
        return Err(anyhow!("control and unassigned fractions leave no carriers"));
    }

    mkdir(&args.out)?;

    let mut rng = rand::rngs::StdRng::seed_from_u64(args.rseed);

    let genes: Vec<Box<str>> = (0..args.n_genes)
        .map(|i| format!("gene_{}", i).into())
        .collect();

    let mut targets: Vec<Box<str>> = (1..=args.n_targets)
        .map(|k| format!("T{}", k).into())
        .collect();
    targets.push(args.control_label.clone());
    let control_idx = targets.len() - 1;

    ////////////////////////////////////////
    // causal pairs with random signs     //
    ////////////////////////////////////////

    let runif_gene = Uniform::new(0, args.n_genes)?;
    let runif_target = Uniform::new(0, args.n_targets)?;

    let mut causal: Vec<(usize, usize, f32)> = vec![];
    let mut causal_seen = FnvHashSet::default();
    while causal.len() < args.n_causal {
        let g = runif_gene.sample(&mut rng);
        let t = runif_target.sample(&mut rng);
        if causal_seen.insert((g, t)) {
            let sign = if rng.random::<f32>() < 0.5 { -1.0 } else { 1.0 };
            causal.push((g, t, sign * args.effect_size));
        }
    }

    let mut tau = Mat::zeros(args.n_genes, targets.len());
    for &(g, t, effect) in causal.iter() {
        tau[(g, t)] = effect;
    }

    ////////////////////////////////////////
    // cells: condition, batch, guide     //
    ////////////////////////////////////////

    let rnorm = Normal::new(0.0f32, 1.0f32)?;
    let runif_batch = Uniform::new(0, args.n_batches)?;

    let cells: Vec<Box<str>> = (0..args.n_cells)
        .map(|j| format!("cell_{}", j).into())
        .collect();

    let mut samples = Vec::with_capacity(args.n_cells);
    let mut assigned: Vec<Option<usize>> = Vec::with_capacity(args.n_cells);
    let mut depth_per_cell = Vec::with_capacity(args.n_cells);

    for j in 0..args.n_cells {
        let condition = &args.conditions[j % args.conditions.len()];
        let batch = runif_batch.sample(&mut rng);
        samples.push(format!("b{}_{}", batch, condition).into_boxed_str());

        let u: f64 = rng.random();
        if u < args.frac_unassigned {
            assigned.push(None);
        } else if u < args.frac_unassigned + args.frac_control {
            assigned.push(Some(control_idx));
        } else {
            assigned.push(Some(runif_target.sample(&mut rng)));
        }

        depth_per_cell.push(args.depth * (0.3 * rnorm.sample(&mut rng)).exp());
    }

    ////////////////////////////////////////
    // Poisson counts                     //
    ////////////////////////////////////////

    let base = DVec::from_fn(args.n_genes, |_, _| rnorm.sample(&mut rng).exp());

    info!(
        "sampling counts for {} cells x {} genes",
        args.n_cells, args.n_genes
    );

    let per_cell: Vec<Vec<(u64, u64, f32)>> = (0..args.n_cells)
        .into_par_iter()
        .progress_count(args.n_cells as u64)
        .map(|j| -> anyhow::Result<Vec<(u64, u64, f32)>> {
            let mut rng_j = rand::rngs::StdRng::seed_from_u64(args.rseed + 1 + j as u64);

            let lambda = match assigned[j] {
                Some(t) => base.component_mul(&tau.column(t).map(|x| x.exp())),
                None => base.clone(),
            };
            let scale = depth_per_cell[j] / lambda.sum();

            let mut column = vec![];
            for (i, &l) in lambda.iter().enumerate() {
                let y: f32 = Poisson::new((l * scale).max(1e-8))?.sample(&mut rng_j);
                if y > 0.5 {
                    column.push((i as u64, j as u64, y));
                }
            }
            Ok(column)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut triplets: Vec<(u64, u64, f32)> = per_cell.into_iter().flatten().collect();
    triplets.par_sort_by_key(|&(i, j, _)| (j, i));

    ////////////////////////////////////////
    // QC covariates from realized counts //
    ////////////////////////////////////////

    let mut total = vec![0.0f32; args.n_cells];
    let mut detected = vec![0usize; args.n_cells];
    for &(_, j, y) in triplets.iter() {
        total[j as usize] += y;
        detected[j as usize] += 1;
    }

    ////////////////////////////////////////
    // write artifacts                    //
    ////////////////////////////////////////

    write_mtx_triplets(
        &triplets,
        args.n_genes,
        args.n_cells,
        &format!("{}.mtx.gz", args.out),
    )?;
    write_lines(&genes, &format!("{}.rows.gz", args.out))?;
    write_lines(&cells, &format!("{}.cols.gz", args.out))?;
    write_lines(&genes, &format!("{}.genes.gz", args.out))?;

    let mut annot_lines: Vec<Box<str>> = Vec::with_capacity(args.n_cells + 1);
    {
        let mut header = vec!["barcode".to_string(), "sample".to_string()];
        header.extend(targets.iter().map(|t| t.to_string()));
        header.push("log1p_total".to_string());
        header.push("detected".to_string());
        annot_lines.push(header.join("\t").into());
    }
    for j in 0..args.n_cells {
        let mut fields = vec![cells[j].to_string(), samples[j].to_string()];
        for k in 0..targets.len() {
            fields.push(if assigned[j] == Some(k) { "1" } else { "0" }.to_string());
        }
        fields.push(format!("{:.4}", total[j].ln_1p()));
        fields.push(format!("{}", detected[j]));
        annot_lines.push(fields.join("\t").into());
    }
    write_lines(&annot_lines, &format!("{}.annotations.tsv.gz", args.out))?;

    let layout = AnnotationLayout {
        barcode_column: "barcode".into(),
        sample_column: "sample".into(),
        guide_start_column: targets[0].clone(),
        guide_end_column: targets[targets.len() - 1].clone(),
        control_label: args.control_label.clone(),
        covariate_columns: vec!["log1p_total".into(), "detected".into()],
        expected_num_targets: Some(targets.len()),
    };
    layout.to_json_file(&format!("{}.layout.json", args.out))?;

    let truth: Vec<Box<str>> = causal
        .iter()
        .map(|&(g, t, effect)| format!("{}\t{}\t{}", genes[g], targets[t], effect).into())
        .collect();
    write_lines(&truth, &format!("{}.causal.gz", args.out))?;

    write_parameters(
        &format!("{}.sim.json", args.out),
        &json!({
            "n_genes": args.n_genes,
            "n_targets": args.n_targets,
            "n_cells": args.n_cells,
            "n_causal": args.n_causal,
            "depth": args.depth,
            "effect_size": args.effect_size,
            "conditions": args.conditions,
            "control_label": args.control_label,
            "rseed": args.rseed,
        }),
    )?;

    info!(
        "simulated {} cells, {} non-zero counts, {} causal pairs",
        args.n_cells,
        triplets.len(),
        causal.len()
    );
    Ok(())
}
