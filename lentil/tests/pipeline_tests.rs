use lentil::assemble::MatrixBundle;
use lentil::association::read_results;
use lentil::calibrate::NullPool;
use lentil::common::Mat;
use lentil::discovery::DiscoverySet;
use lentil::pair_universe::{PairType, PairUniverse};
use lentil::run_aggregate::{run_aggregate, AggregateArgs};
use lentil::run_assemble::{run_assemble, AssembleArgs};
use lentil::run_assoc::{run_assoc, AssocArgs};
use lentil::run_calibrate::{run_calibrate, CalibrateArgs};
use lentil::run_discover::{run_discover, DiscoverArgs};
use lentil::run_enrich::{run_enrich, EnrichArgs};
use lentil::run_simulate::{run_simulate, SimArgs};

use clap::Parser;
use fnv::FnvHashSet;
use matrix_util::common_io::read_lines;
use matrix_util::traits::IoOps;
use std::io::Write;

#[test]
fn simulated_screen_end_to_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sim = dir.path().join("sim");
    let sim = sim.to_str().unwrap();

    let cmd: Vec<String> = vec![
        "simulate".into(),
        "--n-genes".into(),
        "30".into(),
        "--n-targets".into(),
        "3".into(),
        "--n-cells".into(),
        "400".into(),
        "--n-causal".into(),
        "5".into(),
        "--depth".into(),
        "1000".into(),
        "--effect-size".into(),
        "2.0".into(),
        "--frac-unassigned".into(),
        "0.05".into(),
        "--out".into(),
        sim.into(),
    ];
    run_simulate(SimArgs::parse_from(cmd))?;

    ////////////////////////////////////////
    // assemble both conditions           //
    ////////////////////////////////////////

    let assembled = dir.path().join("assembled");
    let assembled = assembled.to_str().unwrap();

    let cmd: Vec<String> = vec![
        "assemble".into(),
        "-d".into(),
        format!("{}.mtx.gz", sim),
        "-a".into(),
        format!("{}.annotations.tsv.gz", sim),
        "-l".into(),
        format!("{}.layout.json", sim),
        "-g".into(),
        format!("{}.genes.gz", sim),
        "-c".into(),
        "stim,ctrl".into(),
        "-o".into(),
        assembled.into(),
    ];
    run_assemble(AssembleArgs::parse_from(cmd))?;

    let universe = PairUniverse::from_parquet(&format!("{}.pairs.parquet", assembled))?;
    assert_eq!(universe.len(), 30 * 4);
    assert_eq!(universe.num_candidates(), 30 * 3);
    assert_eq!(universe.num_negative_controls(), 30);

    // conditions alternate over cells, so each gets half
    let bundle = MatrixBundle::from_parquet(&format!("{}.stim", assembled), "stim")?;
    assert_eq!(bundle.genes.len(), 30);
    assert_eq!(bundle.targets.len(), 4);
    assert_eq!(bundle.targets[3].as_ref(), "NTC");
    assert_eq!(bundle.cells.len(), 200);
    assert_eq!(bundle.expression.ncols(), 200);
    assert_eq!(bundle.covariates.nrows(), 200);

    // unassigned cells fold into the control column, so every cell
    // carries exactly one guide
    for j in 0..bundle.perturbation.ncols() {
        assert_eq!(bundle.perturbation.column(j).sum(), 1.0);
    }

    ////////////////////////////////////////
    // observed and permuted association  //
    ////////////////////////////////////////

    let assoc = dir.path().join("assoc");
    let assoc = assoc.to_str().unwrap();

    let cmd: Vec<String> = vec![
        "assoc".into(),
        "-i".into(),
        assembled.into(),
        "-c".into(),
        "stim".into(),
        "-p".into(),
        "3".into(),
        "-o".into(),
        assoc.into(),
    ];
    run_assoc(AssocArgs::parse_from(cmd))?;

    let observed = read_results(&format!("{}.stim.result.parquet", assoc))?;
    assert_eq!(observed.len(), universe.len());
    for r in 0..3 {
        let file = format!("{}.stim.null.{}.parquet", assoc, r);
        assert!(std::path::Path::new(&file).exists());
    }

    ////////////////////////////////////////
    // calibrate against the pooled null  //
    ////////////////////////////////////////

    let cal = dir.path().join("cal");
    let cal = cal.to_str().unwrap();

    let cmd: Vec<String> = vec![
        "calibrate".into(),
        "-i".into(),
        assoc.into(),
        "-c".into(),
        "stim".into(),
        "-p".into(),
        "3".into(),
        "-o".into(),
        cal.into(),
    ];
    run_calibrate(CalibrateArgs::parse_from(cmd))?;

    let pool = NullPool::from_parquet(&format!("{}.stim.null_pool.parquet", cal))?;
    assert_eq!(pool.len(), 3 * universe.num_candidates());
    assert_eq!(pool.num_replicates(), 3);
    for r in 0..3 {
        let per_replicate = pool.draws().iter().filter(|d| d.replicate == r).count();
        assert_eq!(per_replicate, universe.num_candidates());
    }

    let lines = read_lines(&format!("{}.stim.calibration.tsv", cal))?;
    assert_eq!(lines[0].as_ref(), "statistic\tvalue");

    ////////////////////////////////////////
    // discoveries recover planted pairs  //
    ////////////////////////////////////////

    let disc = dir.path().join("disc");
    let disc = disc.to_str().unwrap();

    let cmd: Vec<String> = vec![
        "discover".into(),
        "-i".into(),
        format!("{}.stim.result.parquet", assoc),
        "-o".into(),
        disc.into(),
    ];
    run_discover(DiscoverArgs::parse_from(cmd))?;

    let discovery = DiscoverySet::from_parquet(&format!("{}.discovery.parquet", disc))?;
    assert_eq!(discovery.records().len(), universe.len());
    assert!(discovery.num_discovered() >= 1);
    for r in discovery.discovered() {
        assert_eq!(r.pair_type, PairType::Candidate);
    }

    let causal: FnvHashSet<(Box<str>, Box<str>)> = read_lines(&format!("{}.causal.gz", sim))?
        .iter()
        .map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            (fields[0].into(), fields[1].into())
        })
        .collect();
    assert_eq!(causal.len(), 5);

    let recovered = discovery
        .discovered()
        .filter(|r| causal.contains(&(r.gene.clone(), r.target.clone())))
        .count();
    assert!(recovered >= 1);

    let count_lines = read_lines(&format!("{}.discovery_counts.tsv", disc))?;
    assert_eq!(count_lines[0].as_ref(), "target\tnum_discovered");

    ////////////////////////////////////////
    // enrichment over a covering panel   //
    ////////////////////////////////////////

    let gmt = dir.path().join("panels.gmt");
    {
        let mut f = std::fs::File::create(&gmt)?;
        for s in 0..3 {
            let members: Vec<String> = (s * 10..(s + 1) * 10)
                .map(|i| format!("gene_{}", i))
                .collect();
            writeln!(f, "SET_{}\tblock {}\t{}", s, s, members.join("\t"))?;
        }
        f.flush()?;
    }

    let enr = dir.path().join("enr");
    let enr = enr.to_str().unwrap();

    let cmd: Vec<String> = vec![
        "enrich".into(),
        "-i".into(),
        format!("{}.discovery.parquet", disc),
        "-g".into(),
        gmt.to_str().unwrap().into(),
        "--max-fdr".into(),
        "1.0".into(),
        "-o".into(),
        enr.into(),
    ];
    run_enrich(EnrichArgs::parse_from(cmd))?;

    // the panels cover every simulated gene, so each target with a
    // discovery yields at least one tested term
    let per_target = discovery.discovered_genes_by_target();
    let matrix = Mat::from_parquet(&format!("{}.panels.enrichment.parquet", enr))?;
    assert_eq!(matrix.cols.len(), per_target.len());
    assert!(!matrix.rows.is_empty());
    assert!(std::path::Path::new(&format!("{}.enrich.json", enr)).exists());
    Ok(())
}

#[test]
fn method_comparison_end_to_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let primary_file = dir.path().join("primary.parquet");
    let primary_file = primary_file.to_str().unwrap();

    let lfsr = Mat::from_row_slice(3, 2, &[0.01, 0.5, 0.2, 0.001, 0.03, 0.9]);
    let genes: Vec<Box<str>> = vec!["g0".into(), "g1".into(), "g2".into()];
    let targets: Vec<Box<str>> = vec!["T1".into(), "T2".into()];
    lfsr.to_parquet(primary_file, Some(&genes), Some(&targets))?;

    let other_file = dir.path().join("other.tsv");
    {
        let mut f = std::fs::File::create(&other_file)?;
        writeln!(f, "target\tgene\tlfsr")?;
        writeln!(f, "t1\tg0\t0.01")?;
        writeln!(f, "T1\tg1\t0.2")?;
        writeln!(f, "T2\tg2\t0.3")?;
        f.flush()?;
    }

    let out = dir.path().join("cmp");
    let out = out.to_str().unwrap();

    // the unreadable method spec is skipped, not fatal
    let cmd: Vec<String> = vec![
        "aggregate".into(),
        "-m".into(),
        primary_file.into(),
        "--method".into(),
        format!("other:{}:lfsr<=0.05", other_file.to_str().unwrap()),
        "--method".into(),
        "bad:missing.tsv:x<=1".into(),
        "-o".into(),
        out.into(),
    ];
    run_aggregate(AggregateArgs::parse_from(cmd))?;

    let lines = read_lines(&format!("{}.comparison.tsv.gz", out))?;
    assert_eq!(lines[0].as_ref(), "target\tprimary\tother");
    assert_eq!(lines[1].as_ref(), "T1\t2\t1");
    assert_eq!(lines[2].as_ref(), "T2\t1\t0");

    let table = matrix_util::parquet::read_columns(&format!("{}.comparison.parquet", out))?;
    assert_eq!(table.str_column("target")?[0].as_ref(), "T1");
    assert_eq!(table.i64_column("primary")?, &[2, 1]);
    assert_eq!(table.i64_column("other")?, &[1, 0]);
    Ok(())
}
