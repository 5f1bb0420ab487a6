//! # voxpeec
//!
//! Frequency-domain solver for the resistive-inductive response of
//! conductors described on a uniform voxel grid (partial element
//! equivalent circuit method).
//!
//! voxpeec provides:
//! - Voxel grids, conductor and source definitions with validation
//! - FFT-accelerated inductive coupling between face currents
//! - A Schur-complement preconditioned GMRES solve per frequency
//! - Terminal currents, voltages and powers, current density and magnetic field
//! - Dependent frequency sweeps with warm starts
//!
//! ## Quick Start
//!
//! ```rust
//! use voxpeec::prelude::*;
//!
//! // A 4-voxel copper bar driven by 1 mV between its ends.
//! let grid = VoxelGrid::with_size([4, 1, 1], [1e-3, 1e-3, 1e-3]).unwrap();
//! let domains = DomainIndexSet::new()
//!     .with("bar", vec![0, 1, 2, 3]).unwrap()
//!     .with("in", vec![0]).unwrap()
//!     .with("out", vec![3]).unwrap();
//! let model = VoxelModel::new(
//!     grid,
//!     &domains,
//!     &[ConductorDef::new("copper", &["bar"], 1.7e-8)],
//!     &[
//!         SourceDef::voltage("in", &["in"], Excitation::ideal(1e-3)),
//!         SourceDef::voltage("out", &["out"], Excitation::ideal(0.0)),
//!     ],
//! )
//! .unwrap();
//!
//! let solver = PeecSolver::new(model, SolveContext::labeled("bar")).unwrap();
//! let result = solver.solve(1e3).unwrap();
//! assert!(result.has_converged);
//! let z = Complex64::new(1e-3, 0.0) / result.solution.terminal("in").unwrap().current;
//! assert!(z.re > 0.0);
//! ```

// Re-export the member crates
pub use voxpeec_core as core;
pub use voxpeec_solver as solver;

// ============================================================================
// Convenient re-exports from voxpeec_core
// ============================================================================

pub use voxpeec_core::{
    ConductorDef,
    Direction,
    DomainIndexSet,
    // Errors
    Error as CoreError,
    Excitation,
    SourceDef,
    SourceKind,
    VoxelGrid,
    VoxelModel,
};

// ============================================================================
// Convenient re-exports from voxpeec_solver
// ============================================================================

pub use voxpeec_solver::{
    ConditionOptions,
    CouplingOptions,
    // Errors
    Error as SolverError,
    // Solve
    PeecSolver,
    Solution,
    SolveContext,
    SolveResult,
    SolverOptions,
    SourceTerminal,
    // Sweeps
    SweepDef,
    SweepOutcome,
    run_sweeps,
};

/// Re-export of num_complex's double-precision complex type.
pub use num_complex::Complex64;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module containing commonly used types.
///
/// ```rust
/// use voxpeec::prelude::*;
/// ```
pub mod prelude {
    // Geometry
    pub use crate::{ConductorDef, Direction, DomainIndexSet, Excitation, SourceDef, VoxelGrid, VoxelModel};

    // Solve
    pub use crate::{PeecSolver, SolveContext, SolveResult};

    // Sweeps
    pub use crate::{SweepDef, SweepOutcome, run_sweeps};

    // Common external types
    pub use crate::Complex64;
}
