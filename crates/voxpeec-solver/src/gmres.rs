//! Restarted GMRES for complex linear systems.
//!
//! Solves `A x = b` with right preconditioning: the Krylov space is built
//! for `A M⁻¹`, so the minimized residual is the true residual of `A x = b`.
//! Orthogonalization uses modified Gram-Schmidt, the least-squares problem
//! is kept triangular with complex Givens rotations.

use num_complex::Complex64 as C64;

use crate::error::{Error, Result};
use crate::operator::LinearOperator;

/// GMRES configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GmresConfig {
    /// Relative residual tolerance (against `‖b‖`).
    pub rel_tol: f64,
    /// Absolute residual tolerance.
    pub abs_tol: f64,
    /// Krylov subspace dimension before restart.
    pub restart: usize,
    /// Maximum number of restart cycles.
    pub max_restarts: usize,
}

impl Default for GmresConfig {
    fn default() -> Self {
        Self {
            rel_tol: 1e-6,
            abs_tol: 1e-12,
            restart: 20,
            max_restarts: 20,
        }
    }
}

/// Result of a GMRES solve.
#[derive(Debug, Clone)]
pub struct GmresResult {
    /// Solution vector.
    pub x: Vec<C64>,
    /// Number of inner iterations performed.
    pub iterations: usize,
    /// Number of restart cycles started.
    pub cycles: usize,
    /// Final true residual norm `‖b - A x‖`.
    pub residual: f64,
    /// Residual threshold `max(rel_tol ‖b‖, abs_tol)`.
    pub threshold: f64,
    /// Whether the residual reached the threshold.
    pub converged: bool,
}

/// Observer of the GMRES iteration.
pub trait IterationMonitor {
    /// Called after every inner iteration with the estimated residual norm.
    fn on_iteration(&mut self, iteration: usize, residual: f64);

    /// Called at the start of every restart cycle with the true residual norm.
    fn on_restart(&mut self, _cycle: usize, _residual: f64) {}
}

/// Monitor that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMonitor;

impl IterationMonitor for NoMonitor {
    fn on_iteration(&mut self, _iteration: usize, _residual: f64) {}
}

/// Records the residual estimate of every inner iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidualHistory {
    pub residuals: Vec<f64>,
    pub restarts: usize,
}

impl ResidualHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iterations(&self) -> usize {
        self.residuals.len()
    }

    pub fn last(&self) -> Option<f64> {
        self.residuals.last().copied()
    }
}

impl IterationMonitor for ResidualHistory {
    fn on_iteration(&mut self, _iteration: usize, residual: f64) {
        self.residuals.push(residual);
    }

    fn on_restart(&mut self, cycle: usize, _residual: f64) {
        if cycle > 0 {
            self.restarts += 1;
        }
    }
}

/// Solve `A x = b` with restarted, right-preconditioned GMRES.
///
/// `precond` applies `M⁻¹`. `x0` is the initial guess (zero if `None`).
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] if `b`, `x0` or the preconditioner do
/// not match the operator dimension. Non-convergence is not an error; it is
/// reported through [`GmresResult::converged`].
pub fn solve_gmres(
    op: &dyn LinearOperator,
    precond: &dyn LinearOperator,
    b: &[C64],
    x0: Option<&[C64]>,
    config: &GmresConfig,
    monitor: &mut dyn IterationMonitor,
) -> Result<GmresResult> {
    let n = op.dim();
    check_len(n, b.len())?;
    check_len(n, precond.dim())?;
    let mut x = match x0 {
        Some(x0) => {
            check_len(n, x0.len())?;
            x0.to_vec()
        }
        None => vec![C64::new(0.0, 0.0); n],
    };

    let b_norm = vec_norm(b);
    let threshold = (config.rel_tol * b_norm).max(config.abs_tol);
    let zero = C64::new(0.0, 0.0);
    let mut total_iter = 0;
    let mut cycles = 0;
    let mut r_norm = residual(op, b, &x).1;

    for cycle in 0..config.max_restarts {
        // r = b - A x
        let (mut r, norm) = residual(op, b, &x);
        r_norm = norm;
        monitor.on_restart(cycle, r_norm);
        log::debug!("gmres cycle {cycle}: residual {r_norm:e} (threshold {threshold:e})");
        if r_norm <= threshold || !r_norm.is_finite() {
            break;
        }
        cycles += 1;

        let m = config.restart.min(n);
        let mut v: Vec<Vec<C64>> = Vec::with_capacity(m + 1);
        let mut h = vec![vec![zero; m + 1]; m];

        let inv_r_norm = 1.0 / r_norm;
        r.iter_mut().for_each(|ri| *ri *= inv_r_norm);
        v.push(r);

        // g = ‖r‖ e_1
        let mut g = vec![zero; m + 1];
        g[0] = C64::new(r_norm, 0.0);

        let mut cs = vec![zero; m];
        let mut sn = vec![zero; m];
        let mut z = vec![zero; n];
        let mut w = vec![zero; n];

        let mut k = 0;
        while k < m {
            total_iter += 1;

            // w = A M⁻¹ v_k
            precond.apply(&v[k], &mut z);
            op.apply(&z, &mut w);
            let w_norm0 = vec_norm(&w);

            for j in 0..=k {
                let hjk = dot(&v[j], &w);
                h[k][j] = hjk;
                for (wi, vji) in w.iter_mut().zip(&v[j]) {
                    *wi -= hjk * vji;
                }
            }

            let w_norm = vec_norm(&w);
            h[k][k + 1] = C64::new(w_norm, 0.0);
            let breakdown = w_norm <= f64::EPSILON * w_norm0 || w_norm == 0.0;
            if !breakdown {
                let inv_w = 1.0 / w_norm;
                v.push(w.iter().map(|&wi| wi * inv_w).collect());
            }

            // Apply previous rotations to the new column.
            for j in 0..k {
                let temp = cs[j].conj() * h[k][j] + sn[j].conj() * h[k][j + 1];
                h[k][j + 1] = -sn[j] * h[k][j] + cs[j] * h[k][j + 1];
                h[k][j] = temp;
            }

            let (c, s) = givens_rotation(h[k][k], h[k][k + 1]);
            cs[k] = c;
            sn[k] = s;
            h[k][k] = c.conj() * h[k][k] + s.conj() * h[k][k + 1];
            h[k][k + 1] = zero;

            let temp_g = c.conj() * g[k] + s.conj() * g[k + 1];
            g[k + 1] = -s * g[k] + c * g[k + 1];
            g[k] = temp_g;

            let estimate = g[k + 1].norm();
            monitor.on_iteration(total_iter, estimate);
            k += 1;
            if breakdown || estimate <= threshold || !estimate.is_finite() {
                break;
            }
        }

        // Back-substitution H y = g.
        let mut y = vec![zero; k];
        for i in (0..k).rev() {
            let mut sum = g[i];
            for j in (i + 1)..k {
                sum -= h[j][i] * y[j];
            }
            if h[i][i].norm() > 0.0 {
                y[i] = sum / h[i][i];
            }
        }

        // x += M⁻¹ V y
        let mut update = vec![zero; n];
        for (vi, yi) in v.iter().zip(&y) {
            for (uj, vij) in update.iter_mut().zip(vi) {
                *uj += vij * yi;
            }
        }
        precond.apply(&update, &mut z);
        for (xj, zj) in x.iter_mut().zip(&z) {
            *xj += zj;
        }
        r_norm = residual(op, b, &x).1;
    }

    let converged = r_norm <= threshold;
    Ok(GmresResult {
        x,
        iterations: total_iter,
        cycles,
        residual: r_norm,
        threshold,
        converged,
    })
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// `(b - A x, ‖b - A x‖)`.
fn residual(op: &dyn LinearOperator, b: &[C64], x: &[C64]) -> (Vec<C64>, f64) {
    let mut ax = vec![C64::new(0.0, 0.0); b.len()];
    op.apply(x, &mut ax);
    let r: Vec<C64> = b.iter().zip(&ax).map(|(&bi, &axi)| bi - axi).collect();
    let norm = vec_norm(&r);
    (r, norm)
}

/// Conjugate dot product `aᴴ b`.
fn dot(a: &[C64], b: &[C64]) -> C64 {
    a.iter().zip(b).map(|(ai, bi)| ai.conj() * bi).sum()
}

fn vec_norm(v: &[C64]) -> f64 {
    v.iter().map(|vi| vi.norm_sqr()).sum::<f64>().sqrt()
}

/// Complex Givens rotation that zeroes `b` against `a`.
fn givens_rotation(a: C64, b: C64) -> (C64, C64) {
    if b.norm() == 0.0 {
        return (C64::new(1.0, 0.0), C64::new(0.0, 0.0));
    }
    let r = (a.norm_sqr() + b.norm_sqr()).sqrt();
    (a / r, b / r)
}
