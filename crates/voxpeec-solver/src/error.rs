//! Error types for voxpeec-solver.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] voxpeec_core::Error),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("singular matrix at elimination step {step}")]
    SingularMatrix { step: usize },

    #[error("invalid dimensions: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("invalid sweep definition: {0}")]
    InvalidSweep(String),
}

pub type Result<T> = std::result::Result<T, Error>;
