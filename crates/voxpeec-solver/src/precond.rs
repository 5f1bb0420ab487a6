//! Block preconditioner built from the face-impedance diagonal.
//!
//! Replacing the dense inductance block by its diagonal `Z = R + jωL_self`
//! makes the face unknowns eliminable: with `Y = Z⁻¹`,
//!
//! ```text
//! S   = A_src - A_kcl Y A_kvl
//! x_v = S⁻¹ (r_v - A_kcl Y r_f)
//! x_f = Y (r_f - A_kvl x_v)
//! ```
//!
//! `S` is sparse and is factored once per assembled system.

use num_complex::Complex64 as C64;

use crate::assembly::{kcl_product, kvl_product, schur_complement, EquationSystem};
use crate::error::Result;
use crate::lu::SparseLu;
use crate::operator::{IdentityOperator, LinearOperator};

/// Schur-complement preconditioner of an [`EquationSystem`].
#[derive(Debug)]
pub struct DiagonalPreconditioner<'s> {
    system: &'s EquationSystem<'s>,
    y: Vec<C64>,
    lu: SparseLu,
}

impl<'s> DiagonalPreconditioner<'s> {
    /// Form and factor the Schur complement.
    ///
    /// # Errors
    /// Propagates [`crate::Error::SingularMatrix`] from the factorization.
    pub fn new(system: &'s EquationSystem<'s>) -> Result<Self> {
        let y: Vec<C64> = system.z_diag().iter().map(|z| z.inv()).collect();
        let s = schur_complement(system.a_kcl(), &y, system.a_kvl(), system.a_src())?;
        let lu = SparseLu::factor(&s)?;
        Ok(Self { system, y, lu })
    }

    /// Stored entries of the Schur-complement factors.
    pub fn factor_nnz(&self) -> usize {
        self.lu.nnz()
    }
}

impl LinearOperator for DiagonalPreconditioner<'_> {
    fn shape(&self) -> (usize, usize) {
        let n = self.system.num_unknowns();
        (n, n)
    }

    fn apply(&self, r: &[C64], x: &mut [C64]) {
        let n_f = self.system.num_faces();
        let (r_f, r_v) = r.split_at(n_f);
        let (x_f, x_v) = x.split_at_mut(n_f);

        // t = r_v - A_kcl Y r_f
        let yr: Vec<C64> = self.y.iter().zip(r_f).map(|(y, r)| y * r).collect();
        let mut t = vec![C64::new(0.0, 0.0); r_v.len()];
        kcl_product(self.system, &yr, &mut t);
        for (ti, ri) in t.iter_mut().zip(r_v) {
            *ti = ri - *ti;
        }
        self.lu.inverse().apply(&t, x_v);

        // x_f = Y (r_f - A_kvl x_v)
        kvl_product(self.system, x_v, x_f);
        for ((xi, ri), yi) in x_f.iter_mut().zip(r_f).zip(&self.y) {
            *xi = yi * (ri - *xi);
        }
    }
}

/// Preconditioner actually used by a solve.
#[derive(Debug)]
pub enum Preconditioner<'s> {
    Schur(DiagonalPreconditioner<'s>),
    /// Fallback when the Schur complement cannot be factored.
    Identity(IdentityOperator),
}

impl<'s> Preconditioner<'s> {
    /// Build the Schur preconditioner, falling back to the identity.
    pub fn build(system: &'s EquationSystem<'s>, label: &str) -> Self {
        match DiagonalPreconditioner::new(system) {
            Ok(p) => {
                log::debug!("{label}: preconditioner factors hold {} entries", p.factor_nnz());
                Preconditioner::Schur(p)
            }
            Err(err) => {
                log::warn!("{label}: preconditioner factorization failed ({err}), using identity");
                Preconditioner::Identity(IdentityOperator::new(system.num_unknowns()))
            }
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Preconditioner::Identity(_))
    }
}

impl LinearOperator for Preconditioner<'_> {
    fn shape(&self) -> (usize, usize) {
        match self {
            Preconditioner::Schur(p) => p.shape(),
            Preconditioner::Identity(p) => p.shape(),
        }
    }

    fn apply(&self, x: &[C64], y: &mut [C64]) {
        match self {
            Preconditioner::Schur(p) => p.apply(x, y),
            Preconditioner::Identity(p) => p.apply(x, y),
        }
    }
}
