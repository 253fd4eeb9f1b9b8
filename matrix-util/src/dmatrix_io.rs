use crate::common_io::{read_lines_of_types, read_lines_of_words_delim, write_lines, Delimiter};
use crate::parquet::{read_columns, write_columns, ColumnData};
use crate::traits::*;

pub use nalgebra::{DMatrix, DVector};
use num_traits::{FromPrimitive, ToPrimitive};

use std::fmt::{Debug, Display};
use std::str::FromStr;

impl<T> IoOps for DMatrix<T>
where
    T: PartialOrd
        + FromPrimitive
        + ToPrimitive
        + nalgebra::Scalar
        + Send
        + Sync
        + FromStr
        + Display
        + Copy,
    <T as FromStr>::Err: Debug,
{
    type Scalar = T;
    type Mat = Self;

    fn read_file_delim(
        file: &str,
        delim: impl Into<Delimiter>,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat> {
        let hdr_line = match skip {
            Some(skip) => skip as i64,
            None => -1,
        };

        let data = read_lines_of_types::<T>(file, delim, hdr_line)?.lines;

        if data.is_empty() {
            return Err(anyhow::anyhow!("no data in file: {}", file));
        }

        let nrows = data.len();
        let ncols = data[0].len();
        let data = data.into_iter().flatten().collect::<Vec<_>>();

        if data.len() != nrows * ncols {
            return Err(anyhow::anyhow!("ragged rows in file: {}", file));
        }

        Ok(DMatrix::<T>::from_row_iterator(nrows, ncols, data))
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()> {
        let lines = self
            .row_iter()
            .map(|row| {
                row.iter()
                    .map(|x| format!("{}", *x))
                    .collect::<Vec<String>>()
                    .join(delim)
                    .into_boxed_str()
            })
            .collect::<Vec<_>>();

        write_lines(&lines, file)?;
        Ok(())
    }

    fn read_named_delim(
        file: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>> {
        let parsed = read_lines_of_words_delim(file, delim, 0)?;

        if parsed.header.is_empty() {
            return Err(anyhow::anyhow!("no header line in file: {}", file));
        }

        // header: row-label column name, then column names
        let cols: Vec<Box<str>> = parsed.header[1..].to_vec();
        let ncols = cols.len();
        let nrows = parsed.lines.len();

        let mut rows = Vec::with_capacity(nrows);
        let mut data = Vec::with_capacity(nrows * ncols);

        for (i, words) in parsed.lines.iter().enumerate() {
            if words.len() != ncols + 1 {
                return Err(anyhow::anyhow!(
                    "line {} of {}: expected {} fields, found {}",
                    i + 1,
                    file,
                    ncols + 1,
                    words.len()
                ));
            }
            rows.push(words[0].clone());
            for x in &words[1..] {
                let x = x.parse::<T>().map_err(|err| {
                    anyhow::anyhow!("failed to parse '{}' in {}: {:?}", x, file, err)
                })?;
                data.push(x);
            }
        }

        Ok(MatWithNames {
            rows,
            cols,
            mat: DMatrix::<T>::from_row_iterator(nrows, ncols, data),
        })
    }

    fn write_named_delim(
        &self,
        file: &str,
        delim: &str,
        row_label: &str,
        rows: &[Box<str>],
        cols: &[Box<str>],
    ) -> anyhow::Result<()> {
        if rows.len() != self.nrows() || cols.len() != self.ncols() {
            return Err(anyhow::anyhow!(
                "names ({} x {}) do not match the matrix ({} x {})",
                rows.len(),
                cols.len(),
                self.nrows(),
                self.ncols()
            ));
        }

        let mut lines = Vec::with_capacity(self.nrows() + 1);

        let mut header = vec![row_label.to_string()];
        header.extend(cols.iter().map(|x| x.to_string()));
        lines.push(header.join(delim).into_boxed_str());

        for (name, row) in rows.iter().zip(self.row_iter()) {
            let mut fields = vec![name.to_string()];
            fields.extend(row.iter().map(|x| format!("{}", *x)));
            lines.push(fields.join(delim).into_boxed_str());
        }

        write_lines(&lines, file)?;
        Ok(())
    }

    fn to_parquet(
        &self,
        file_path: &str,
        row_names: Option<&[Box<str>]>,
        column_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<()> {
        let (nrows, ncols) = (self.nrows(), self.ncols());

        let rows: Vec<Box<str>> = match row_names {
            Some(rows) => {
                if rows.len() != nrows {
                    return Err(anyhow::anyhow!(
                        "{} row names for {} rows",
                        rows.len(),
                        nrows
                    ));
                }
                rows.to_vec()
            }
            None => (0..nrows).map(|i| i.to_string().into_boxed_str()).collect(),
        };

        let cols: Vec<Box<str>> = match column_names {
            Some(cols) => {
                if cols.len() != ncols {
                    return Err(anyhow::anyhow!(
                        "{} column names for {} columns",
                        cols.len(),
                        ncols
                    ));
                }
                cols.to_vec()
            }
            None => (0..ncols).map(|j| j.to_string().into_boxed_str()).collect(),
        };

        let mut columns: Vec<(&str, ColumnData)> = Vec::with_capacity(ncols + 1);
        columns.push(("row", ColumnData::Str(rows)));

        for (j, name) in cols.iter().enumerate() {
            let x_j = self
                .column(j)
                .iter()
                .map(|x| {
                    x.to_f64()
                        .ok_or_else(|| anyhow::anyhow!("unsupported scalar in column {}", j))
                })
                .collect::<anyhow::Result<Vec<f64>>>()?;
            columns.push((name.as_ref(), ColumnData::F64(x_j)));
        }

        write_columns(file_path, &columns)
    }

    fn from_parquet(file_path: &str) -> anyhow::Result<MatWithNames<Self::Mat>> {
        let table = read_columns(file_path)?;

        // the first name column holds row names; every numeric column
        // becomes a matrix column in file order
        let mut rows: Option<Vec<Box<str>>> = None;
        let mut cols: Vec<Box<str>> = vec![];
        let mut data_cols: Vec<Vec<f64>> = vec![];

        for (name, column) in table.names.iter().zip(table.columns.iter()) {
            match column {
                ColumnData::Str(xs) => {
                    if rows.is_none() {
                        rows = Some(xs.clone());
                    }
                }
                ColumnData::F64(xs) => {
                    cols.push(name.clone());
                    data_cols.push(xs.clone());
                }
                ColumnData::I64(xs) => {
                    cols.push(name.clone());
                    data_cols.push(xs.iter().map(|&x| x as f64).collect());
                }
            }
        }

        // a file with row names only holds a zero-width matrix
        if data_cols.is_empty() {
            let rows = rows.ok_or_else(|| anyhow::anyhow!("no columns in {}", file_path))?;
            let nrows = rows.len();
            return Ok(MatWithNames {
                rows,
                cols,
                mat: DMatrix::<T>::from_vec(nrows, 0, vec![]),
            });
        }

        let nrows = data_cols[0].len();
        let ncols = cols.len();

        let rows =
            rows.unwrap_or_else(|| (0..nrows).map(|i| i.to_string().into_boxed_str()).collect());

        let data = data_cols
            .into_iter()
            .flatten()
            .map(|x| {
                T::from_f64(x).ok_or_else(|| anyhow::anyhow!("unsupported scalar in {}", file_path))
            })
            .collect::<anyhow::Result<Vec<T>>>()?;

        // data_cols were column vectors, so fill column by column
        Ok(MatWithNames {
            rows,
            cols,
            mat: DMatrix::<T>::from_vec(nrows, ncols, data),
        })
    }
}
