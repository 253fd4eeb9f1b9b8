use thiserror::Error;

/// Fatal data errors shared across the pipeline stages; recoverable
/// data-quality issues are logged instead of raised
#[derive(Error, Debug)]
pub enum ScreenError {
    /// a required column is absent from an input table
    #[error("missing column '{column}' in {file}")]
    MissingColumn { column: Box<str>, file: Box<str> },

    /// aligned inputs disagree on dimensions, ordering, or coding
    #[error("alignment violated: {reason}")]
    InvariantViolation { reason: String },

    /// an association runner broke its output contract
    #[error("result contract violated at row {index}: expected {expected}, found {found}")]
    ContractViolation {
        index: usize,
        expected: String,
        found: String,
    },

    /// a reference label cannot be mapped onto the canonical targets
    #[error("method '{method}': label '{label}' not in the canonical target set")]
    LabelMismatch { method: Box<str>, label: Box<str> },
}
