pub mod common_io;
pub mod dmatrix_io;
pub mod dmatrix_util;
pub mod mtx_io;
pub mod parquet;
pub mod traits;
