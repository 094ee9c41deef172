//! Error types for tms-model.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("position and value arrays differ in length: {positions} vs {values}")]
    ShapeMismatch { positions: usize, values: usize },

    #[error("deformation parameter {value} outside allowed range [{min}, {max}]")]
    ParameterOutOfRange { value: f64, min: f64, max: f64 },

    #[error("invalid {kind} reference: index {index}, {len} available")]
    InvalidReference {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    #[error("grid data length {len} does not match shape {shape:?} with 3 components per cell")]
    GridShape { len: usize, shape: [usize; 3] },

    #[error("affine is singular and cannot be inverted")]
    SingularAffine,

    #[error("element has no stimulator; dA/dt is undefined")]
    MissingStimulator,

    #[error("coil has no {0}; cannot derive a sampling grid")]
    MissingMetadata(&'static str),
}

pub type Result<T> = std::result::Result<T, ModelError>;
