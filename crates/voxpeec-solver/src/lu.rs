//! Sparse LU factorization for complex matrices.
//!
//! Right-looking elimination on a row-map representation. At every step the
//! pivot column is the active column with the fewest entries (Markowitz
//! column choice); within that column, rows whose magnitude is at least
//! [`PIVOT_THRESHOLD`] times the column maximum are candidates, and the
//! sparsest candidate row wins. Ordered maps make the pivot sequence
//! deterministic.
//!
//! # Factor layout
//!
//! With `P` and `Q` the row and column permutations recorded by the pivot
//! sequence, `P A Q = L U`:
//! - `lower[k]` holds `(row, l)` for every row eliminated at step `k`
//! - `upper[k]` holds `(col, u)` for the off-diagonal entries of pivot row `k`
//! - `diag[k]` is the pivot of step `k`

use std::collections::{BTreeMap, BTreeSet};

use nalgebra_sparse::CsrMatrix;
use num_complex::Complex64 as C64;

use crate::error::{Error, Result};
use crate::operator::{AdjointOperator, LinearOperator};

/// Relative magnitude a pivot candidate needs against the column maximum.
pub const PIVOT_THRESHOLD: f64 = 0.1;

/// Pivots below this fraction of the largest matrix entry are singular.
pub const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Complete sparse LU factors.
#[derive(Debug, Clone)]
pub struct SparseLu {
    n: usize,
    pivot_rows: Vec<usize>,
    pivot_cols: Vec<usize>,
    row_step: Vec<usize>,
    col_step: Vec<usize>,
    lower: Vec<Vec<(usize, C64)>>,
    upper: Vec<Vec<(usize, C64)>>,
    diag: Vec<C64>,
}

impl SparseLu {
    /// Factor a square sparse matrix.
    ///
    /// # Errors
    /// [`Error::DimensionMismatch`] for non-square input,
    /// [`Error::SingularMatrix`] when no acceptable pivot remains.
    pub fn factor(matrix: &CsrMatrix<C64>) -> Result<Self> {
        let n = matrix.nrows();
        if matrix.ncols() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                actual: matrix.ncols(),
            });
        }

        let mut rows: Vec<BTreeMap<usize, C64>> = vec![BTreeMap::new(); n];
        let mut cols: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        let mut max_abs: f64 = 0.0;
        for (i, j, &v) in matrix.triplet_iter() {
            *rows[i].entry(j).or_insert(C64::new(0.0, 0.0)) += v;
            cols[j].insert(i);
            max_abs = max_abs.max(v.norm());
        }
        let tiny = SINGULAR_TOLERANCE * max_abs;

        let mut active_cols: BTreeSet<usize> = (0..n).collect();
        let mut lu = Self {
            n,
            pivot_rows: Vec::with_capacity(n),
            pivot_cols: Vec::with_capacity(n),
            row_step: vec![usize::MAX; n],
            col_step: vec![usize::MAX; n],
            lower: Vec::with_capacity(n),
            upper: Vec::with_capacity(n),
            diag: Vec::with_capacity(n),
        };

        for step in 0..n {
            // Markowitz column choice; first minimum wins.
            let mut col = usize::MAX;
            let mut best = usize::MAX;
            for &c in &active_cols {
                let count = cols[c].len();
                if count < best {
                    best = count;
                    col = c;
                }
            }
            if col == usize::MAX || best == 0 {
                return Err(Error::SingularMatrix { step });
            }

            let col_max = cols[col]
                .iter()
                .map(|&r| rows[r].get(&col).map_or(0.0, |v| v.norm()))
                .fold(0.0, f64::max);
            if col_max == 0.0 || col_max < tiny {
                return Err(Error::SingularMatrix { step });
            }

            let mut pivot_row = usize::MAX;
            let mut pivot_len = usize::MAX;
            for &r in &cols[col] {
                let mag = rows[r].get(&col).map_or(0.0, |v| v.norm());
                if mag >= PIVOT_THRESHOLD * col_max && rows[r].len() < pivot_len {
                    pivot_len = rows[r].len();
                    pivot_row = r;
                }
            }

            let pivot_entries = std::mem::take(&mut rows[pivot_row]);
            for &j in pivot_entries.keys() {
                cols[j].remove(&pivot_row);
            }
            let pivot = pivot_entries
                .get(&col)
                .copied()
                .ok_or(Error::SingularMatrix { step })?;
            let upper: Vec<(usize, C64)> = pivot_entries
                .into_iter()
                .filter(|&(j, _)| j != col)
                .collect();

            let eliminated: Vec<usize> = std::mem::take(&mut cols[col]).into_iter().collect();
            let mut lower = Vec::with_capacity(eliminated.len());
            for i in eliminated {
                let Some(a_ic) = rows[i].remove(&col) else {
                    continue;
                };
                let m = a_ic / pivot;
                for &(j, u) in &upper {
                    let entry = rows[i].entry(j).or_insert_with(|| {
                        cols[j].insert(i);
                        C64::new(0.0, 0.0)
                    });
                    *entry -= m * u;
                }
                lower.push((i, m));
            }

            active_cols.remove(&col);
            lu.row_step[pivot_row] = step;
            lu.col_step[col] = step;
            lu.pivot_rows.push(pivot_row);
            lu.pivot_cols.push(col);
            lu.lower.push(lower);
            lu.upper.push(upper);
            lu.diag.push(pivot);
        }

        Ok(lu)
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Number of stored factor entries, diagonal included.
    pub fn nnz(&self) -> usize {
        self.n
            + self.lower.iter().map(Vec::len).sum::<usize>()
            + self.upper.iter().map(Vec::len).sum::<usize>()
    }

    /// Solve `A x = b`.
    pub fn solve(&self, b: &[C64]) -> Result<Vec<C64>> {
        self.check(b.len())?;
        let mut x = vec![C64::new(0.0, 0.0); self.n];
        self.solve_into(b, &mut x);
        Ok(x)
    }

    /// Solve `Aᵀ y = c`.
    pub fn solve_transpose(&self, c: &[C64]) -> Result<Vec<C64>> {
        self.check(c.len())?;
        let mut y = vec![C64::new(0.0, 0.0); self.n];
        self.solve_transpose_into(c, &mut y);
        Ok(y)
    }

    /// Solve `Aᴴ y = c`.
    pub fn solve_adjoint(&self, c: &[C64]) -> Result<Vec<C64>> {
        self.check(c.len())?;
        let mut y = vec![C64::new(0.0, 0.0); self.n];
        self.solve_adjoint_into(c, &mut y);
        Ok(y)
    }

    /// `A⁻¹` as an operator.
    pub fn inverse(&self) -> LuInverse<'_> {
        LuInverse { lu: self }
    }

    fn check(&self, len: usize) -> Result<()> {
        if len != self.n {
            return Err(Error::DimensionMismatch {
                expected: self.n,
                actual: len,
            });
        }
        Ok(())
    }

    fn solve_into(&self, b: &[C64], x: &mut [C64]) {
        let mut work = b.to_vec();
        for (k, lower) in self.lower.iter().enumerate() {
            let pivot_value = work[self.pivot_rows[k]];
            for &(i, m) in lower {
                work[i] -= m * pivot_value;
            }
        }
        for k in (0..self.n).rev() {
            let mut sum = work[self.pivot_rows[k]];
            for &(j, u) in &self.upper[k] {
                sum -= u * x[j];
            }
            x[self.pivot_cols[k]] = sum / self.diag[k];
        }
    }

    fn solve_transpose_into(&self, c: &[C64], y: &mut [C64]) {
        // Uᵀ z = Qᵀ c
        let mut t: Vec<C64> = self.pivot_cols.iter().map(|&q| c[q]).collect();
        for k in 0..self.n {
            let z = t[k] / self.diag[k];
            t[k] = z;
            for &(j, u) in &self.upper[k] {
                t[self.col_step[j]] -= u * z;
            }
        }
        // Lᵀ v = z
        for k in (0..self.n).rev() {
            let mut v = t[k];
            for &(i, m) in &self.lower[k] {
                v -= m * t[self.row_step[i]];
            }
            t[k] = v;
        }
        for (k, &p) in self.pivot_rows.iter().enumerate() {
            y[p] = t[k];
        }
    }

    fn solve_adjoint_into(&self, c: &[C64], y: &mut [C64]) {
        let conj: Vec<C64> = c.iter().map(|v| v.conj()).collect();
        self.solve_transpose_into(&conj, y);
        y.iter_mut().for_each(|v| *v = v.conj());
    }
}

/// The inverse of a factored matrix, applied through its LU factors.
#[derive(Debug, Clone, Copy)]
pub struct LuInverse<'a> {
    lu: &'a SparseLu,
}

impl LinearOperator for LuInverse<'_> {
    fn shape(&self) -> (usize, usize) {
        (self.lu.n, self.lu.n)
    }

    fn apply(&self, x: &[C64], y: &mut [C64]) {
        self.lu.solve_into(x, y);
    }
}

impl AdjointOperator for LuInverse<'_> {
    fn apply_adjoint(&self, x: &[C64], y: &mut [C64]) {
        self.lu.solve_adjoint_into(x, y);
    }
}
