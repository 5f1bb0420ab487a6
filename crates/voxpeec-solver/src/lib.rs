//! Frequency-domain PEEC solver for voxelized conductors.
//!
//! This crate provides:
//! - Green and cross-product coupling tensors of a uniform voxel grid
//! - FFT-accelerated circulant operators for the dense inductance block
//! - Assembly of the face/node/source equation system
//! - A Schur-complement preconditioner with a sparse LU factorization
//! - Restarted GMRES with warm starts and a condition-number check
//! - Extraction of currents, potentials, terminals and magnetic field
//! - Dependent frequency sweeps scheduled level by level in parallel

pub mod assembly;
pub mod circulant;
pub mod condition;
pub mod error;
pub mod extract;
pub mod gmres;
pub mod green;
pub mod lu;
pub mod operator;
pub mod options;
pub mod precond;
pub mod solve;
pub mod spectral;
pub mod sweep;

pub use assembly::{EquationSystem, InductanceOperator, StructureTensors, SystemOperator};
pub use circulant::{CirculantOperator, DenseToeplitz, Symmetry};
pub use condition::{estimate_condition, ConditionReport};
pub use error::{Error, Result};
pub use extract::{extract_solution, Solution, SourceTerminal};
pub use gmres::{solve_gmres, GmresConfig, GmresResult, IterationMonitor, NoMonitor, ResidualHistory};
pub use green::{green_tensor, CouplingKind, GreenTensor};
pub use lu::SparseLu;
pub use operator::{AdjointOperator, IdentityOperator, LinearOperator};
pub use options::{ConditionOptions, CouplingOptions, SolveContext, SolverOptions};
pub use precond::{DiagonalPreconditioner, Preconditioner};
pub use solve::{PeecSolver, SolveResult, SolverDiagnostics};
pub use spectral::Fft3;
pub use sweep::{plan_sweeps, run_sweeps, SweepDef, SweepOutcome, SweepPlan};
