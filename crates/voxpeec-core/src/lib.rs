//! Voxel geometry and problem definition for voxpeec.
//!
//! This crate holds everything that is independent of frequency and of the
//! numerics: the structured voxel lattice, the voxel/face incidence,
//! conductor and source definitions, and their validation into a
//! [`VoxelModel`].

pub mod constants;
pub mod domain;
pub mod error;
pub mod grid;
pub mod incidence;
pub mod sparse;

pub use domain::{
    ConductorDef, DomainIndexSet, Excitation, ResolvedSource, SourceDef, SourceKind, VoxelModel,
};
pub use error::{Error, Result};
pub use grid::{Direction, VoxelGrid};
pub use incidence::{incidence_matrix, IncidenceMatrix, InternalFace, ReducedIncidence};
