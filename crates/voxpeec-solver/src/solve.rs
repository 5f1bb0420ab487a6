//! Single-frequency solve: assembly, condition check, preconditioner,
//! GMRES and extraction.

use indexmap::IndexMap;
use num_complex::Complex64 as C64;
use voxpeec_core::{Excitation, VoxelModel};

use crate::assembly::{EquationSystem, StructureTensors};
use crate::condition::{estimate_condition, ConditionReport};
use crate::error::Result;
use crate::extract::{extract_solution, Solution};
use crate::gmres::{solve_gmres, ResidualHistory};
use crate::precond::Preconditioner;
use crate::options::SolveContext;

/// Iteration statistics of a solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverDiagnostics {
    /// Inner GMRES iterations.
    pub iterations: usize,
    /// Restart cycles started.
    pub cycles: usize,
    /// Final true residual norm.
    pub residual: f64,
    /// Residual threshold the solve aimed for.
    pub threshold: f64,
    /// Residual estimate after every inner iteration.
    pub residual_history: Vec<f64>,
}

/// Outcome of one frequency point.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub solution: Solution,
    pub has_converged: bool,
    pub diagnostics: SolverDiagnostics,
    pub condition: ConditionReport,
    /// The Schur-complement factorization failed and the identity was used.
    pub preconditioner_fallback: bool,
    pub frequency: f64,
}

/// A prepared geometry with its solve options.
///
/// Preparation computes the coupling tensors once; every frequency point and
/// excitation set reuses them. `PeecSolver` is `Sync` and can be shared by
/// parallel sweeps.
#[derive(Debug)]
pub struct PeecSolver {
    tensors: StructureTensors,
    context: SolveContext,
}

impl PeecSolver {
    /// Validate `context` and prepare the geometry.
    pub fn new(model: VoxelModel, context: SolveContext) -> Result<Self> {
        context.validate()?;
        log::info!(
            "{}: preparing {} voxels, {} faces, {} source currents on {:?} grid",
            context.label,
            model.num_voxels(),
            model.num_faces(),
            model.num_voltage_voxels(),
            model.grid().dims()
        );
        let tensors = StructureTensors::prepare(model, &context.coupling)?;
        Ok(Self { tensors, context })
    }

    pub fn tensors(&self) -> &StructureTensors {
        &self.tensors
    }

    pub fn context(&self) -> &SolveContext {
        &self.context
    }

    /// Solve with the model's own excitations and a zero initial guess.
    pub fn solve(&self, frequency: f64) -> Result<SolveResult> {
        self.solve_with(&IndexMap::new(), frequency, None)
    }

    /// Solve with excitation overrides and an optional initial guess.
    pub fn solve_with(
        &self,
        overrides: &IndexMap<String, Excitation>,
        frequency: f64,
        initial: Option<&[C64]>,
    ) -> Result<SolveResult> {
        let label = &self.context.label;
        let system = EquationSystem::assemble(&self.tensors, overrides, frequency)?;
        log::info!(
            "{label}: solving {} unknowns at {frequency} Hz",
            system.num_unknowns()
        );

        let condition = estimate_condition(&system, &self.context.condition)?;
        if !condition.condition_ok {
            log::warn!(
                "{label}: ill-conditioned system at {frequency} Hz (estimate {:e})",
                condition.estimate.unwrap_or(f64::INFINITY)
            );
        }

        let precond = Preconditioner::build(&system, label);
        let preconditioner_fallback = precond.is_fallback();

        let mut history = ResidualHistory::new();
        let gmres = solve_gmres(
            &system.operator(),
            &precond,
            system.rhs(),
            initial,
            &self.context.solver.gmres_config(),
            &mut history,
        )?;
        if gmres.converged {
            log::info!(
                "{label}: converged in {} iterations (residual {:e})",
                gmres.iterations,
                gmres.residual
            );
        } else {
            log::warn!(
                "{label}: no convergence after {} iterations (residual {:e}, threshold {:e})",
                gmres.iterations,
                gmres.residual,
                gmres.threshold
            );
        }

        let solution = extract_solution(&system, &gmres.x)?;
        Ok(SolveResult {
            solution,
            has_converged: gmres.converged,
            diagnostics: SolverDiagnostics {
                iterations: gmres.iterations,
                cycles: gmres.cycles,
                residual: gmres.residual,
                threshold: gmres.threshold,
                residual_history: history.residuals,
            },
            condition,
            preconditioner_fallback,
            frequency,
        })
    }
}
