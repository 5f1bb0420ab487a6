//! Operator traits for matrix-vector products.
//!
//! Every linear map used by the solver (the full PEEC system, the circulant
//! inductance operator, the Schur-complement preconditioner, the sparse
//! factors used by the condition estimator) implements [`LinearOperator`].

use num_complex::Complex64 as C64;

/// A linear operator that computes `y = A x` for complex vectors.
pub trait LinearOperator: Send + Sync {
    /// Shape `(rows, cols)`.
    fn shape(&self) -> (usize, usize);

    /// Apply the operator: `y = A x`.
    ///
    /// `x` has length `cols`, `y` has length `rows`.
    fn apply(&self, x: &[C64], y: &mut [C64]);

    /// Dimension of a square operator.
    fn dim(&self) -> usize {
        self.shape().0
    }
}

/// An operator that can also apply its conjugate transpose.
pub trait AdjointOperator: LinearOperator {
    /// Apply the adjoint: `y = Aᴴ x`.
    fn apply_adjoint(&self, x: &[C64], y: &mut [C64]);
}

/// The identity map.
#[derive(Debug, Clone, Copy)]
pub struct IdentityOperator {
    n: usize,
}

impl IdentityOperator {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl LinearOperator for IdentityOperator {
    fn shape(&self) -> (usize, usize) {
        (self.n, self.n)
    }

    fn apply(&self, x: &[C64], y: &mut [C64]) {
        y.copy_from_slice(x);
    }
}

impl AdjointOperator for IdentityOperator {
    fn apply_adjoint(&self, x: &[C64], y: &mut [C64]) {
        y.copy_from_slice(x);
    }
}

/// Dense matrix operator, used for small reference problems.
impl LinearOperator for nalgebra::DMatrix<C64> {
    fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    fn apply(&self, x: &[C64], y: &mut [C64]) {
        for (i, yi) in y.iter_mut().enumerate() {
            *yi = (0..self.ncols()).map(|j| self[(i, j)] * x[j]).sum();
        }
    }
}

impl AdjointOperator for nalgebra::DMatrix<C64> {
    fn apply_adjoint(&self, x: &[C64], y: &mut [C64]) {
        for (j, yj) in y.iter_mut().enumerate() {
            *yj = (0..self.nrows()).map(|i| self[(i, j)].conj() * x[i]).sum();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn dense_operator_and_adjoint() {
        let a = DMatrix::from_row_slice(
            2,
            2,
            &[
                C64::new(1.0, 1.0),
                C64::new(2.0, 0.0),
                C64::new(0.0, 0.0),
                C64::new(0.0, 3.0),
            ],
        );
        assert_eq!(LinearOperator::shape(&a), (2, 2));

        let x = vec![C64::new(1.0, 0.0), C64::new(0.0, 1.0)];
        let mut y = vec![C64::new(0.0, 0.0); 2];
        LinearOperator::apply(&a, &x, &mut y);
        // (1+i)*1 + 2*i = 1+3i
        assert!((y[0] - C64::new(1.0, 3.0)).norm() < 1e-15);
        // 3i * i = -3
        assert!((y[1] - C64::new(-3.0, 0.0)).norm() < 1e-15);

        a.apply_adjoint(&x, &mut y);
        // conj(1+i)*1 = 1-i
        assert!((y[0] - C64::new(1.0, -1.0)).norm() < 1e-15);
        // 2*1 + conj(3i)*i = 2 + 3
        assert!((y[1] - C64::new(5.0, 0.0)).norm() < 1e-15);
    }

    #[test]
    fn identity_copies() {
        let id = IdentityOperator::new(3);
        assert_eq!(id.dim(), 3);
        let x = vec![C64::new(1.0, 2.0); 3];
        let mut y = vec![C64::new(0.0, 0.0); 3];
        id.apply(&x, &mut y);
        assert_eq!(x, y);
    }

    #[test]
    fn operator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<IdentityOperator>();
        assert_send_sync::<DMatrix<C64>>();
    }
}
