//! 1-norm condition estimate of the unweighted Schur complement.
//!
//! `S₀ = A_src - A_kcl A_kvl` is the node block of the system with unit face
//! admittances. It is singular exactly when some conductor island is left
//! without a potential reference, so its condition number is a cheap
//! structural check before the iterative solve.

use nalgebra_sparse::CsrMatrix;
use num_complex::Complex64 as C64;

use crate::assembly::{schur_complement, EquationSystem};
use crate::error::Result;
use crate::lu::SparseLu;
use crate::operator::AdjointOperator;
use crate::options::ConditionOptions;

/// Outcome of the condition check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionReport {
    /// Estimated 1-norm condition number, `None` when the check is disabled.
    pub estimate: Option<f64>,
    /// `true` when the check is disabled or the estimate is below tolerance.
    pub condition_ok: bool,
}

impl ConditionReport {
    fn skipped() -> Self {
        Self {
            estimate: None,
            condition_ok: true,
        }
    }
}

/// Estimate the condition number of `S₀` for `system`.
///
/// A factorization failure yields an infinite estimate; it is not an error.
pub fn estimate_condition(system: &EquationSystem<'_>, options: &ConditionOptions) -> Result<ConditionReport> {
    if !options.check {
        return Ok(ConditionReport::skipped());
    }
    let ones = vec![C64::new(1.0, 0.0); system.num_faces()];
    let s0 = schur_complement(system.a_kcl(), &ones, system.a_kvl(), system.a_src())?;

    let estimate = match SparseLu::factor(&s0) {
        Ok(lu) => {
            let inv_norm = estimate_norm1(&lu.inverse(), options.accuracy, options.max_iterations);
            matrix_norm1(&s0) * inv_norm
        }
        Err(err) => {
            log::debug!("condition estimate: {err}");
            f64::INFINITY
        }
    };
    let condition_ok = estimate.is_finite() && estimate < options.tolerance;
    Ok(ConditionReport {
        estimate: Some(estimate),
        condition_ok,
    })
}

/// Exact 1-norm (maximum absolute column sum) of a sparse matrix.
pub fn matrix_norm1(a: &CsrMatrix<C64>) -> f64 {
    let mut sums = vec![0.0; a.ncols()];
    for (_, j, v) in a.triplet_iter() {
        sums[j] += v.norm();
    }
    sums.into_iter().fold(0.0, f64::max)
}

/// Hager-Higham lower bound of `‖A‖₁` for an operator with an adjoint.
///
/// Runs `probes` power-like iterations from different starting vectors, each
/// for at most `max_iterations` steps, and returns the largest estimate.
pub fn estimate_norm1(op: &dyn AdjointOperator, probes: usize, max_iterations: usize) -> f64 {
    let n = op.dim();
    if n == 0 {
        return 0.0;
    }
    let mut best: f64 = 0.0;
    for probe in 0..probes.max(1) {
        let start = starting_vector(n, probe);
        best = best.max(hager_iteration(op, start, max_iterations));
    }
    best.max(alternating_estimate(op))
}

fn starting_vector(n: usize, probe: usize) -> Vec<C64> {
    let scale = 1.0 / n as f64;
    (0..n)
        .map(|i| {
            // probe 0 is the uniform vector, later probes flip signs by a fixed pattern
            let flip = probe > 0 && (i * 7 + probe * 3) % (probe + 2) == 0;
            C64::new(if flip { -scale } else { scale }, 0.0)
        })
        .collect()
}

fn hager_iteration(op: &dyn AdjointOperator, mut x: Vec<C64>, max_iterations: usize) -> f64 {
    let n = x.len();
    let mut y = vec![C64::new(0.0, 0.0); n];
    let mut z = vec![C64::new(0.0, 0.0); n];
    let mut estimate: f64 = 0.0;
    let mut last_j = usize::MAX;

    for iter in 0..max_iterations.max(1) {
        op.apply(&x, &mut y);
        let norm: f64 = y.iter().map(|v| v.norm()).sum();
        if !norm.is_finite() {
            return f64::INFINITY;
        }
        if iter > 0 && norm <= estimate {
            break;
        }
        estimate = norm;

        let xi: Vec<C64> = y
            .iter()
            .map(|v| {
                let m = v.norm();
                if m > 0.0 {
                    v / m
                } else {
                    C64::new(1.0, 0.0)
                }
            })
            .collect();
        op.apply_adjoint(&xi, &mut z);

        let (j, zj) = z
            .iter()
            .map(|v| v.norm())
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, m)| if m > acc.1 { (i, m) } else { acc });
        let ztx: f64 = z.iter().zip(&x).map(|(zi, xi)| (zi.conj() * xi).re).sum();
        if iter > 0 && (zj <= ztx || j == last_j) {
            break;
        }
        last_j = j;
        x.iter_mut().for_each(|v| *v = C64::new(0.0, 0.0));
        x[j] = C64::new(1.0, 0.0);
    }
    estimate
}

/// Higham's extra test vector `x_i = (-1)^i (1 + i/(n-1))`.
fn alternating_estimate(op: &dyn AdjointOperator) -> f64 {
    let n = op.dim();
    let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };
    let x: Vec<C64> = (0..n)
        .map(|i| {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            C64::new(sign * (1.0 + i as f64 / denom), 0.0)
        })
        .collect();
    let mut y = vec![C64::new(0.0, 0.0); n];
    op.apply(&x, &mut y);
    2.0 * y.iter().map(|v| v.norm()).sum::<f64>() / (3.0 * n as f64)
}
