use lentil::enrichment::{
    summarize_enrichment, CachedEnrichment, EnrichmentHit, EnrichmentService, GeneSetDb,
    HypergeomOra,
};
use lentil::common::Mat;

use matrix_util::traits::IoOps;
use std::io::Write;

fn gene_names(nn: usize) -> Vec<Box<str>> {
    (0..nn).map(|i| format!("g{}", i).into()).collect()
}

fn write_gmt(path: &str, lines: &[&str]) -> anyhow::Result<()> {
    let mut f = std::fs::File::create(path)?;
    for line in lines {
        writeln!(f, "{}", line)?;
    }
    f.flush()?;
    Ok(())
}

#[test]
fn gmt_parsing_skips_malformed_lines() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("panels.gmt");
    let path = path.to_str().unwrap();

    write_gmt(
        path,
        &[
            "SET_A\tfirst five\tg0\tg1\tg2\tg3\tg4",
            "TOO_SHORT\tno genes at all",
            "SET_B\tthe rest\tg5\tg6",
        ],
    )?;

    let db = GeneSetDb::from_gmt(path)?;
    assert_eq!(db.name.as_ref(), "panels");
    assert_eq!(db.sets.len(), 2);
    assert_eq!(db.sets[0].id.as_ref(), "SET_A");
    assert_eq!(db.sets[0].description.as_ref(), "first five");
    assert_eq!(db.sets[0].genes.len(), 5);
    Ok(())
}

#[test]
fn hypergeometric_matches_a_known_value() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("one_set.gmt");
    let path = path.to_str().unwrap();
    write_gmt(path, &["SET_A\tdesc\tg0\tg1\tg2\tg3\tg4"])?;
    let db = GeneSetDb::from_gmt(path)?;

    let background = gene_names(10);
    let foreground: Vec<Box<str>> = vec!["g0".into(), "g1".into(), "g2".into(), "g5".into()];

    let service = HypergeomOra::default();
    let hits = service.enrich(&foreground, &background, &db)?;

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].size, 5);
    assert_eq!(hits[0].overlap, 3);
    // P(X >= 3) for Hypergeom(N = 10, K = 5, n = 4)
    approx::assert_abs_diff_eq!(hits[0].p_value, 55.0 / 210.0, epsilon = 1e-9);
    // observed 3 against an expectation of 2
    approx::assert_abs_diff_eq!(hits[0].ratio, 1.5, epsilon = 1e-9);
    // a single set is its own adjustment
    approx::assert_abs_diff_eq!(hits[0].adjusted_p, hits[0].p_value, epsilon = 1e-12);

    // genes outside the background change nothing
    let mut padded = foreground.clone();
    padded.push("nowhere".into());
    let hits2 = service.enrich(&padded, &background, &db)?;
    assert_eq!(hits2[0].overlap, 3);
    assert_eq!(hits2[0].p_value, hits[0].p_value);
    Ok(())
}

#[test]
fn overlap_thresholds_filter_sets() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("disjoint.gmt");
    let path = path.to_str().unwrap();
    write_gmt(path, &["SET_FAR\tdesc\tg7\tg8\tg9"])?;
    let db = GeneSetDb::from_gmt(path)?;

    let background = gene_names(10);
    let foreground: Vec<Box<str>> = vec!["g0".into(), "g1".into()];

    // the default threshold drops zero-overlap sets
    let hits = HypergeomOra::default().enrich(&foreground, &background, &db)?;
    assert!(hits.is_empty());

    // lowering it reports them with a p-value of one
    let hits = HypergeomOra { min_overlap: 0 }.enrich(&foreground, &background, &db)?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].overlap, 0);
    assert_eq!(hits[0].p_value, 1.0);
    assert_eq!(hits[0].ratio, 0.0);
    Ok(())
}

#[test]
fn empty_queries_are_handled() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("one_set.gmt");
    let path = path.to_str().unwrap();
    write_gmt(path, &["SET_A\tdesc\tg0\tg1"])?;
    let db = GeneSetDb::from_gmt(path)?;

    let service = HypergeomOra::default();

    // foreground disjoint from the background tests nothing
    let stray: Vec<Box<str>> = vec!["zz".into()];
    assert!(service.enrich(&stray, &gene_names(5), &db)?.is_empty());

    // an empty background is an error
    assert!(service.enrich(&stray, &[], &db).is_err());
    Ok(())
}

#[test]
fn adjustment_is_stepped_up_within_one_query() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("two_sets.gmt");
    let path = path.to_str().unwrap();
    write_gmt(
        path,
        &[
            "SET_TIGHT\tdesc\tg0\tg1\tg2\tg3",
            "SET_LOOSE\tdesc\tg0\tg10\tg11\tg12",
        ],
    )?;
    let db = GeneSetDb::from_gmt(path)?;

    let background = gene_names(20);
    let foreground: Vec<Box<str>> = gene_names(6);

    let hits = HypergeomOra::default().enrich(&foreground, &background, &db)?;
    assert_eq!(hits.len(), 2);

    // sorted by p-value, then stepped up over two tests
    assert!(hits[0].p_value <= hits[1].p_value);
    approx::assert_abs_diff_eq!(hits[1].adjusted_p, hits[1].p_value, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(
        hits[0].adjusted_p,
        (2.0 * hits[0].p_value).min(hits[1].adjusted_p),
        epsilon = 1e-12
    );
    Ok(())
}

fn hit(id: &str, ratio: f64, p_value: f64, adjusted_p: f64) -> EnrichmentHit {
    EnrichmentHit {
        gene_set: id.into(),
        description: "desc".into(),
        size: 10,
        overlap: 3,
        ratio,
        p_value,
        adjusted_p,
    }
}

#[test]
fn summary_outer_joins_targets_with_zero_fill() {
    let per_target: Vec<(Box<str>, Vec<EnrichmentHit>)> = vec![
        (
            "tgtA".into(),
            vec![
                hit("A", 2.0, 1e-4, 0.001),
                hit("B", 3.0, 1e-3, 0.01),
                hit("C", 1.5, 2e-3, 0.02),
            ],
        ),
        (
            "tgtB".into(),
            vec![hit("A", 4.0, 1e-5, 0.002), hit("C", 2.5, 5e-3, 0.03)],
        ),
    ];

    let matrix = summarize_enrichment(&per_target, 0.05, 0.0);

    let expected_targets: Vec<Box<str>> = vec!["tgtA".into(), "tgtB".into()];
    assert_eq!(matrix.targets, expected_targets);
    assert_eq!(matrix.num_terms(), 3);

    // rows come out by min p-value: A (1e-5), B (1e-3), C (2e-3)
    assert_eq!(matrix.terms[0].gene_set.as_ref(), "A");
    assert_eq!(matrix.terms[1].gene_set.as_ref(), "B");
    assert_eq!(matrix.terms[2].gene_set.as_ref(), "C");
    approx::assert_abs_diff_eq!(matrix.terms[0].min_p, 1e-5, epsilon = 1e-15);

    // B never passed for tgtB, so its cell stays zero
    assert_eq!(matrix.ratios[(1, 0)], 3.0);
    assert_eq!(matrix.ratios[(1, 1)], 0.0);
    assert_eq!(matrix.ratios[(0, 0)], 2.0);
    assert_eq!(matrix.ratios[(0, 1)], 4.0);
}

#[test]
fn fdr_and_ratio_knobs_empty_cells() {
    let per_target: Vec<(Box<str>, Vec<EnrichmentHit>)> = vec![
        ("tgtA".into(), vec![hit("X", 3.0, 1e-4, 0.01)]),
        ("tgtB".into(), vec![hit("X", 2.0, 1e-3, 0.2)]),
    ];

    // the tgtB hit fails the fdr cutoff and leaves a zero
    let matrix = summarize_enrichment(&per_target, 0.05, 0.0);
    assert_eq!(matrix.num_terms(), 1);
    assert_eq!(matrix.ratios[(0, 0)], 3.0);
    assert_eq!(matrix.ratios[(0, 1)], 0.0);
    approx::assert_abs_diff_eq!(matrix.terms[0].min_p, 1e-4, epsilon = 1e-15);

    // a ratio floor removes the weaker hit the same way
    let per_target: Vec<(Box<str>, Vec<EnrichmentHit>)> = vec![
        ("tgtA".into(), vec![hit("X", 3.0, 1e-4, 0.01)]),
        ("tgtB".into(), vec![hit("X", 1.2, 1e-3, 0.01)]),
    ];
    let matrix = summarize_enrichment(&per_target, 0.05, 1.5);
    assert_eq!(matrix.ratios[(0, 1)], 0.0);
}

#[test]
fn terms_differ_when_background_sizes_differ() {
    let mut small = hit("X", 2.0, 1e-3, 0.01);
    small.size = 12;

    let per_target: Vec<(Box<str>, Vec<EnrichmentHit>)> = vec![
        ("tgtA".into(), vec![hit("X", 3.0, 1e-4, 0.01)]),
        ("tgtB".into(), vec![small]),
    ];
    let matrix = summarize_enrichment(&per_target, 0.05, 0.0);
    assert_eq!(matrix.num_terms(), 2);
}

#[test]
fn cached_service_replays_identical_hits() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let gmt = dir.path().join("panels.gmt");
    let gmt = gmt.to_str().unwrap();
    write_gmt(gmt, &["SET_A\tdesc\tg0\tg1\tg2\tg3\tg4"])?;
    let db = GeneSetDb::from_gmt(gmt)?;

    let cache_dir = dir.path().join("cache");
    let cache_dir = cache_dir.to_str().unwrap();

    let service = CachedEnrichment::new(HypergeomOra::default(), cache_dir);
    let background = gene_names(10);
    let foreground: Vec<Box<str>> = vec!["g0".into(), "g1".into(), "g2".into()];

    let first = service.enrich(&foreground, &background, &db)?;
    let entries: Vec<_> = std::fs::read_dir(cache_dir)?.collect();
    assert_eq!(entries.len(), 1);

    let second = service.enrich(&foreground, &background, &db)?;
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.gene_set, b.gene_set);
        assert_eq!(a.overlap, b.overlap);
        assert_eq!(a.p_value, b.p_value);
        assert_eq!(a.ratio, b.ratio);
    }

    // an unreadable entry is recomputed, not trusted
    let cache_file = entries[0].as_ref().unwrap().path();
    std::fs::write(&cache_file, "not json")?;
    let third = service.enrich(&foreground, &background, &db)?;
    assert_eq!(third.len(), first.len());
    assert_eq!(third[0].p_value, first[0].p_value);
    Ok(())
}

#[test]
fn enrichment_matrix_snapshot() -> anyhow::Result<()> {
    let per_target: Vec<(Box<str>, Vec<EnrichmentHit>)> = vec![
        ("tgtA".into(), vec![hit("A", 2.0, 1e-4, 0.001)]),
        ("tgtB".into(), vec![hit("A", 4.0, 1e-5, 0.002)]),
    ];
    let matrix = summarize_enrichment(&per_target, 0.05, 0.0);

    let dir = tempfile::tempdir()?;
    let matrix_file = dir.path().join("enrichment.parquet");
    let term_file = dir.path().join("terms.parquet");
    matrix.to_parquet(matrix_file.to_str().unwrap(), term_file.to_str().unwrap())?;

    let reloaded = Mat::from_parquet(matrix_file.to_str().unwrap())?;
    assert_eq!(reloaded.rows.len(), 1);
    assert_eq!(reloaded.cols.len(), 2);
    assert_eq!(reloaded.mat[(0, 0)], 2.0);
    assert_eq!(reloaded.mat[(0, 1)], 4.0);

    let terms = matrix_util::parquet::read_columns(term_file.to_str().unwrap())?;
    assert_eq!(terms.str_column("gene_set")?[0].as_ref(), "A");
    assert_eq!(terms.i64_column("size")?[0], 10);
    approx::assert_abs_diff_eq!(terms.f64_column("min_p")?[0], 1e-5, epsilon = 1e-15);
    Ok(())
}
