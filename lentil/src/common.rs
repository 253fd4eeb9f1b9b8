#![allow(dead_code)]

pub use log::{info, warn};
pub use matrix_util::common_io::*;
pub use matrix_util::traits::*;

pub type Mat = nalgebra::DMatrix<f32>;
pub type DVec = nalgebra::DVector<f32>;
pub type CscMat = nalgebra_sparse::CscMatrix<f32>;

/// Echo run parameters next to the artifacts they produced
pub fn write_parameters(param_file: &str, params: &serde_json::Value) -> anyhow::Result<()> {
    mkdir(param_file)?;
    std::fs::write(param_file, serde_json::to_string_pretty(params)?)?;
    info!("wrote {}", param_file);
    Ok(())
}
