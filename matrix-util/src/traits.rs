use crate::common_io::Delimiter;

/// A matrix bundled with its row and column names
pub struct MatWithNames<M> {
    pub rows: Vec<Box<str>>,
    pub cols: Vec<Box<str>>,
    pub mat: M,
}

/// Centre or scale columns
pub trait MatOps {
    type Mat;
    type Scalar;

    fn centre_columns_inplace(&mut self);
    fn centre_columns(&self) -> Self::Mat;

    /// zero mean and unit sample variance for each column; a
    /// zero-variance column stays centred
    fn scale_columns_inplace(&mut self);
    fn scale_columns(&self) -> Self::Mat;
}

/// Operations to sample random matrices
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// Sample a matrix from a uniform distribution `U(0,1)`
    fn runif(dd: usize, nn: usize) -> Self::Mat;

    /// Sample a matrix from a normal distribution `N(0,1)`
    fn rnorm(dd: usize, nn: usize) -> Self::Mat;
}

/// Read and write matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    fn read_file_delim(
        file: &str,
        delim: impl Into<Delimiter>,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat>;

    fn from_tsv(tsv_file: &str, skip: Option<usize>) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(tsv_file, "\t", skip)
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }

    /// Read a named matrix: the header line carries a row-label
    /// column name followed by the column names; every data line
    /// starts with the row name
    fn read_named_delim(
        file: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>>;

    fn write_named_delim(
        &self,
        file: &str,
        delim: &str,
        row_label: &str,
        rows: &[Box<str>],
        cols: &[Box<str>],
    ) -> anyhow::Result<()>;

    /// Write a matrix with a leading `row` name column; `None` names
    /// default to `[0, n)` numbers
    fn to_parquet(
        &self,
        file_path: &str,
        row_names: Option<&[Box<str>]>,
        column_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<()>;

    fn from_parquet(file_path: &str) -> anyhow::Result<MatWithNames<Self::Mat>>;
}
