//! Sparse helpers shared by the assembly and the preconditioner.

use nalgebra_sparse::CsrMatrix;
use num_complex::Complex64 as C64;

/// `y = A x` for a real CSR matrix and a complex vector.
pub fn spmv_real_complex(a: &CsrMatrix<f64>, x: &[C64], y: &mut [C64]) {
    debug_assert_eq!(a.ncols(), x.len());
    debug_assert_eq!(a.nrows(), y.len());
    for (yi, row) in y.iter_mut().zip(a.row_iter()) {
        *yi = row
            .col_indices()
            .iter()
            .zip(row.values())
            .map(|(&j, &v)| x[j] * v)
            .sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::coo::CooMatrix;

    #[test]
    fn product_matches_dense() {
        let mut coo = CooMatrix::new(2, 3);
        coo.push(0, 0, 1.0);
        coo.push(0, 2, -2.0);
        coo.push(1, 1, 3.0);
        let a = CsrMatrix::from(&coo);

        let x = [C64::new(1.0, 1.0), C64::new(2.0, 0.0), C64::new(0.0, 1.0)];
        let mut y = [C64::new(0.0, 0.0); 2];
        spmv_real_complex(&a, &x, &mut y);
        assert_eq!(y[0], C64::new(1.0, -1.0));
        assert_eq!(y[1], C64::new(6.0, 0.0));
    }
}
