//! Solve configuration.
//!
//! All option structs deserialize from partial input (missing fields take
//! their defaults) and are checked once by [`SolveContext::validate`] before
//! any numeric work starts.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::gmres::GmresConfig;

/// Iterative solver tolerances and iteration caps.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Relative residual tolerance.
    pub rel_tol: f64,
    /// Absolute residual tolerance.
    pub abs_tol: f64,
    /// Inner iterations per restart cycle.
    pub restart: usize,
    /// Maximum number of restart cycles.
    pub max_restarts: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rel_tol: 1e-6,
            abs_tol: 1e-12,
            restart: 20,
            max_restarts: 20,
        }
    }
}

impl SolverOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.rel_tol.is_finite() && self.rel_tol >= 0.0) {
            return Err(Error::InvalidOptions(format!(
                "rel_tol must be finite and >= 0, got {}",
                self.rel_tol
            )));
        }
        if !(self.abs_tol.is_finite() && self.abs_tol >= 0.0) {
            return Err(Error::InvalidOptions(format!(
                "abs_tol must be finite and >= 0, got {}",
                self.abs_tol
            )));
        }
        if self.rel_tol == 0.0 && self.abs_tol == 0.0 {
            return Err(Error::InvalidOptions(
                "rel_tol and abs_tol cannot both be zero".into(),
            ));
        }
        if self.restart == 0 || self.max_restarts == 0 {
            return Err(Error::InvalidOptions(
                "restart and max_restarts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// GMRES configuration for these options.
    pub fn gmres_config(&self) -> GmresConfig {
        GmresConfig {
            rel_tol: self.rel_tol,
            abs_tol: self.abs_tol,
            restart: self.restart,
            max_restarts: self.max_restarts,
        }
    }
}

/// Condition-number check of the preconditioner's Schur complement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConditionOptions {
    /// Run the estimate at all.
    pub check: bool,
    /// Estimates at or above this value flag the problem as ill-conditioned.
    pub tolerance: f64,
    /// Number of probe vectors of the 1-norm estimator.
    pub accuracy: usize,
    /// Iterations per probe.
    pub max_iterations: usize,
}

impl Default for ConditionOptions {
    fn default() -> Self {
        Self {
            check: true,
            tolerance: 1e15,
            accuracy: 2,
            max_iterations: 5,
        }
    }
}

impl ConditionOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0) {
            return Err(Error::InvalidOptions(format!(
                "condition tolerance must be > 0, got {}",
                self.tolerance
            )));
        }
        if self.accuracy == 0 || self.max_iterations == 0 {
            return Err(Error::InvalidOptions(
                "condition accuracy and max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Coupling kernel evaluation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CouplingOptions {
    /// Offsets (in voxel units) beyond which the far-field kernel is used.
    pub green_simplify: f64,
    /// Prepare the cross operator and compute the magnetic flux density.
    pub magnetic_field: bool,
}

impl Default for CouplingOptions {
    fn default() -> Self {
        Self {
            green_simplify: 20.0,
            magnetic_field: false,
        }
    }
}

impl CouplingOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.green_simplify > 0.0) {
            return Err(Error::InvalidOptions(format!(
                "green_simplify must be > 0, got {}",
                self.green_simplify
            )));
        }
        Ok(())
    }
}

/// Everything a solve needs besides the geometry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SolveContext {
    /// Prefix of every log message.
    pub label: String,
    pub solver: SolverOptions,
    pub condition: ConditionOptions,
    pub coupling: CouplingOptions,
}

impl Default for SolveContext {
    fn default() -> Self {
        Self {
            label: "voxpeec".to_string(),
            solver: SolverOptions::default(),
            condition: ConditionOptions::default(),
            coupling: CouplingOptions::default(),
        }
    }
}

impl SolveContext {
    /// Context with a log label and default options.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Validate all option groups.
    pub fn validate(&self) -> Result<()> {
        self.solver.validate()?;
        self.condition.validate()?;
        self.coupling.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let ctx = SolveContext::default();
        assert!(ctx.validate().is_ok());
        assert_eq!(ctx.solver.restart, 20);
        assert!((ctx.condition.tolerance - 1e15).abs() < 1.0);
        assert!(!ctx.coupling.magnetic_field);
    }

    #[test]
    fn rejects_invalid_values() {
        let mut ctx = SolveContext::default();
        ctx.solver.rel_tol = -1.0;
        assert!(matches!(ctx.validate(), Err(Error::InvalidOptions(_))));

        let mut ctx = SolveContext::default();
        ctx.solver.restart = 0;
        assert!(ctx.validate().is_err());

        let mut ctx = SolveContext::default();
        ctx.condition.accuracy = 0;
        assert!(ctx.validate().is_err());

        let mut ctx = SolveContext::default();
        ctx.coupling.green_simplify = f64::NAN;
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn gmres_config_mirrors_options() {
        let opts = SolverOptions {
            rel_tol: 1e-8,
            restart: 5,
            ..Default::default()
        };
        let cfg = opts.gmres_config();
        assert_eq!(cfg.restart, 5);
        assert_eq!(cfg.max_restarts, 20);
        assert!((cfg.rel_tol - 1e-8).abs() < 1e-20);
    }
}
