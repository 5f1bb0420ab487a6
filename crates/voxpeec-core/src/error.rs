//! Error types for voxpeec-core.
//!
//! Every variant is a validation failure: it is raised while building the
//! grid or resolving conductors and sources, before any numeric work starts.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("invalid voxel grid: {0}")]
    InvalidGrid(String),

    #[error("voxel index {index} out of bounds for {nv} voxels (domain '{domain}')")]
    IndexOutOfBounds {
        domain: String,
        index: usize,
        nv: usize,
    },

    #[error("unknown domain '{domain}' referenced by '{owner}'")]
    UnknownDomain { owner: String, domain: String },

    #[error("voxel {index} is assigned to both '{first}' and '{second}'")]
    DuplicateVoxel {
        index: usize,
        first: String,
        second: String,
    },

    #[error("conductor '{tag}' has an invalid resistivity {value}")]
    InvalidResistivity { tag: String, value: f64 },

    #[error("source '{tag}' uses voxel {index} which belongs to no conductor")]
    SourceOutsideConductor { tag: String, index: usize },

    #[error("sources '{first}' and '{second}' share voxel {index}")]
    OverlappingSources {
        index: usize,
        first: String,
        second: String,
    },

    #[error("invalid source '{tag}': {reason}")]
    InvalidSource { tag: String, reason: String },

    #[error("no conductor voxels defined")]
    EmptyConductors,

    #[error("duplicate tag '{0}'")]
    DuplicateTag(String),
}

pub type Result<T> = std::result::Result<T, Error>;
