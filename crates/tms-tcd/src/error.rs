//! Error types for tms-tcd.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TcdError {
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown element type tag: {0}")]
    UnknownElementType(u32),

    #[error("Unknown deformation type: {0}")]
    UnknownDeformationType(String),

    #[error("Malformed CCD file at line {line}: {reason}")]
    MalformedCcd { line: usize, reason: String },

    #[error("Model error: {0}")]
    ModelError(#[from] tms_model::ModelError),
}

pub type Result<T> = std::result::Result<T, TcdError>;
