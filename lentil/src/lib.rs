//! Perturbation-effect discovery and calibration for pooled
//! single-cell screens: assemble aligned matrices, test gene-target
//! pairs, calibrate against permutation nulls, and summarize
//! discoveries across methods and gene sets.

pub mod common;

pub mod aggregate;
pub mod assemble;
pub mod association;
pub mod calibrate;
pub mod discovery;
pub mod enrichment;
pub mod error;
pub mod input;
pub mod layout;
pub mod pair_universe;

pub mod run_aggregate;
pub mod run_assemble;
pub mod run_assoc;
pub mod run_calibrate;
pub mod run_discover;
pub mod run_enrich;
pub mod run_simulate;
