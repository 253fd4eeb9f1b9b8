use crate::common_io::*;
use rayon::prelude::*;
use std::io::Write;

/// Write the triplets into a MatrixMarket file with 1-based indices
/// * `triplets` - `(row, column, value)` with 0-based indices
/// * `nrow` - number of rows
/// * `ncol` - number of columns
/// * `mtx_file` - the output file (e.g., "matrix.mtx.gz")
pub fn write_mtx_triplets(
    triplets: &[(u64, u64, f32)],
    nrow: usize,
    ncol: usize,
    mtx_file: &str,
) -> anyhow::Result<()> {
    mkdir(mtx_file)?;

    let mut buf = open_buf_writer(mtx_file)?;

    writeln!(buf, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(buf, "{}\t{}\t{}", nrow, ncol, triplets.len())?;

    for (row, col, val) in triplets {
        writeln!(buf, "{}\t{}\t{}", row + 1, col + 1, val)?;
    }

    buf.flush()?;
    Ok(())
}

/// Read a MatrixMarket file back into 0-based triplets, sorted
/// column-major
/// * `mtx_file` - path to the matrix market file
pub fn read_mtx_triplets(
    mtx_file: &str,
) -> anyhow::Result<(Vec<(u64, u64, f32)>, (usize, usize, usize))> {
    // the `%` comment lines are stripped, so the shape line is the header
    let parsed = read_lines_of_words(mtx_file, 0)?;

    if parsed.header.len() != 3 {
        return Err(anyhow::anyhow!("failed to parse mtx header: {}", mtx_file));
    }

    let nrow = parsed.header[0].parse::<usize>()?;
    let ncol = parsed.header[1].parse::<usize>()?;
    let nnz = parsed.header[2].parse::<usize>()?;

    fn parse_row_col_val(triplet: &Vec<Box<str>>) -> Option<(u64, u64, f32)> {
        if triplet.len() != 3 {
            return None;
        }

        // 1-based indices on file
        let row = triplet[0].parse::<u64>().ok()?.checked_sub(1)?;
        let col = triplet[1].parse::<u64>().ok()?.checked_sub(1)?;
        let val = triplet[2].parse::<f32>().ok()?;

        Some((row, col, val))
    }

    let mut mtx_triplets = parsed
        .lines
        .iter()
        .par_bridge()
        .filter_map(parse_row_col_val)
        .collect::<Vec<_>>();

    if mtx_triplets.len() != nnz {
        return Err(anyhow::anyhow!(
            "expected {} non-zero entries in {}, found {}",
            nnz,
            mtx_file,
            mtx_triplets.len()
        ));
    }

    mtx_triplets.sort_by_key(|&(row, _, _)| row);
    mtx_triplets.sort_by_key(|&(_, col, _)| col);
    Ok((mtx_triplets, (nrow, ncol, nnz)))
}
