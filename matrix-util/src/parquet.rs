use parquet::basic::Type as ParquetType;
use parquet::basic::{Compression, ConvertedType, Repetition, ZstdLevel};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::RowAccessor;
use parquet::schema::types::Type;
use std::fs::File;
use std::sync::Arc;

/// One column of a table snapshot
pub enum ColumnData {
    Str(Vec<Box<str>>),
    F64(Vec<f64>),
    I64(Vec<i64>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Str(xs) => xs.len(),
            ColumnData::F64(xs) => xs.len(),
            ColumnData::I64(xs) => xs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A table read back from a parquet snapshot, columns in file order
pub struct TableColumns {
    pub names: Vec<Box<str>>,
    pub columns: Vec<ColumnData>,
}

impl TableColumns {
    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|x| x.len()).unwrap_or(0)
    }

    fn position(&self, name: &str) -> anyhow::Result<usize> {
        self.names
            .iter()
            .position(|x| x.as_ref() == name)
            .ok_or_else(|| anyhow::anyhow!("column '{}' not found", name))
    }

    pub fn str_column(&self, name: &str) -> anyhow::Result<&[Box<str>]> {
        match &self.columns[self.position(name)?] {
            ColumnData::Str(xs) => Ok(xs),
            _ => Err(anyhow::anyhow!("column '{}' is not a name column", name)),
        }
    }

    pub fn f64_column(&self, name: &str) -> anyhow::Result<&[f64]> {
        match &self.columns[self.position(name)?] {
            ColumnData::F64(xs) => Ok(xs),
            _ => Err(anyhow::anyhow!("column '{}' is not a float column", name)),
        }
    }

    pub fn i64_column(&self, name: &str) -> anyhow::Result<&[i64]> {
        match &self.columns[self.position(name)?] {
            ColumnData::I64(xs) => Ok(xs),
            _ => Err(anyhow::anyhow!("column '{}' is not an integer column", name)),
        }
    }
}

///
/// Write named columns into one parquet file (one row group,
/// ZSTD-compressed); every column must have the same length
///
/// * `file_path` - output file
/// * `columns` - `(name, data)` pairs in output order
///
pub fn write_columns(file_path: &str, columns: &[(&str, ColumnData)]) -> anyhow::Result<()> {
    if columns.is_empty() {
        return Err(anyhow::anyhow!("no columns to write: {}", file_path));
    }

    let nrows = columns[0].1.len();
    for (name, column) in columns {
        if column.len() != nrows {
            return Err(anyhow::anyhow!(
                "column '{}' has {} rows, expected {}",
                name,
                column.len(),
                nrows
            ));
        }
    }

    let fields = columns
        .iter()
        .map(|(name, column)| {
            let builder = match column {
                ColumnData::Str(_) => {
                    Type::primitive_type_builder(name, ParquetType::BYTE_ARRAY)
                        .with_converted_type(ConvertedType::UTF8)
                }
                ColumnData::F64(_) => Type::primitive_type_builder(name, ParquetType::DOUBLE),
                ColumnData::I64(_) => Type::primitive_type_builder(name, ParquetType::INT64),
            };
            let field = builder.with_repetition(Repetition::REQUIRED).build()?;
            Ok(Arc::new(field))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let schema = Arc::new(Type::group_type_builder("table").with_fields(fields).build()?);

    let file = File::create(file_path)?;
    let zstd_level = ZstdLevel::try_new(5)?;
    let writer_properties = Arc::new(
        WriterProperties::builder()
            .set_compression(Compression::ZSTD(zstd_level))
            .build(),
    );

    let mut writer = SerializedFileWriter::new(file, schema, writer_properties)?;
    let mut row_group_writer = writer.next_row_group()?;

    for (_, column) in columns {
        if let Some(mut column_writer) = row_group_writer.next_column()? {
            match column {
                ColumnData::Str(xs) => {
                    let data: Vec<ByteArray> =
                        xs.iter().map(|x| ByteArray::from(x.as_ref())).collect();
                    column_writer
                        .typed::<ByteArrayType>()
                        .write_batch(&data, None, None)?;
                }
                ColumnData::F64(xs) => {
                    column_writer
                        .typed::<DoubleType>()
                        .write_batch(xs, None, None)?;
                }
                ColumnData::I64(xs) => {
                    column_writer
                        .typed::<Int64Type>()
                        .write_batch(xs, None, None)?;
                }
            }
            column_writer.close()?;
        }
    }

    row_group_writer.close()?;
    writer.close()?;
    Ok(())
}

///
/// Read every column of a parquet file written by `write_columns`
///
/// * `file_path` - input file
///
pub fn read_columns(file_path: &str) -> anyhow::Result<TableColumns> {
    let file = File::open(file_path)?;
    let reader = SerializedFileReader::new(file)?;
    let metadata = reader.metadata();
    let nrows = metadata.file_metadata().num_rows() as usize;
    let fields = metadata.file_metadata().schema().get_fields();

    let names: Vec<Box<str>> = fields
        .iter()
        .map(|f| f.name().to_string().into_boxed_str())
        .collect();

    let types: Vec<ParquetType> = fields.iter().map(|f| f.get_physical_type()).collect();

    let mut columns: Vec<ColumnData> = types
        .iter()
        .map(|tt| match tt {
            ParquetType::BYTE_ARRAY => Ok(ColumnData::Str(Vec::with_capacity(nrows))),
            ParquetType::INT32 | ParquetType::INT64 => {
                Ok(ColumnData::I64(Vec::with_capacity(nrows)))
            }
            ParquetType::FLOAT | ParquetType::DOUBLE => {
                Ok(ColumnData::F64(Vec::with_capacity(nrows)))
            }
            _ => Err(anyhow::anyhow!(
                "unsupported parquet type in {}",
                file_path
            )),
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    for record in reader.get_row_iter(None)? {
        let row = record?;
        for (j, (tt, column)) in types.iter().zip(columns.iter_mut()).enumerate() {
            match column {
                ColumnData::Str(xs) => {
                    xs.push(row.get_string(j)?.clone().into_boxed_str());
                }
                ColumnData::I64(xs) => {
                    let x = match tt {
                        ParquetType::INT32 => row.get_int(j)? as i64,
                        _ => row.get_long(j)?,
                    };
                    xs.push(x);
                }
                ColumnData::F64(xs) => {
                    let x = match tt {
                        ParquetType::FLOAT => row.get_float(j)? as f64,
                        _ => row.get_double(j)?,
                    };
                    xs.push(x);
                }
            }
        }
    }

    Ok(TableColumns { names, columns })
}
