//! Circulant embedding of coupling tensors and FFT-accelerated products.
//!
//! A block-Toeplitz interaction `y_i = Σ_j T(r_i - r_j) x_j` over an
//! nx × ny × nz grid is embedded into a circulant tensor of size
//! 2nx × 2ny × 2nz. Entry `a` along an axis holds offset `a` for `a < n`,
//! zero at `a = n`, and the mirrored offset `2n - a` above. Mirroring an axis
//! in which the kernel is odd flips its sign.

use num_complex::Complex64 as C64;
use rayon::prelude::*;
use voxpeec_core::Direction;

use crate::green::GreenTensor;
use crate::operator::LinearOperator;
use crate::spectral::Fft3;

/// Parity of a kernel component under reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symmetry {
    /// Even in every axis.
    Even,
    /// Odd in the given axis, even in the other two.
    Odd(Direction),
}

impl Symmetry {
    /// Sign of the octant selected by the mirror bits (x, y, z).
    pub fn sign(self, mirrored: [bool; 3]) -> f64 {
        match self {
            Symmetry::Even => 1.0,
            Symmetry::Odd(dir) => {
                if mirrored[dir.axis()] {
                    -1.0
                } else {
                    1.0
                }
            }
        }
    }

    /// The eight octant signs indexed by `mx + 2 my + 4 mz`.
    pub fn sign_table(self) -> [f64; 8] {
        let mut table = [1.0; 8];
        for (k, s) in table.iter_mut().enumerate() {
            *s = self.sign([k & 1 != 0, k & 2 != 0, k & 4 != 0]);
        }
        table
    }
}

/// Source offset along one axis for circulant index `a`, or `None` at `a = n`.
#[inline]
fn fold(a: usize, n: usize) -> Option<(usize, bool)> {
    if a < n {
        Some((a, false))
    } else if a == n {
        None
    } else {
        Some((2 * n - a, true))
    }
}

/// Circulant embedding of one tensor component, size `8·nx·ny·nz`.
pub fn embed_circulant(tensor: &GreenTensor, component: usize, symmetry: Symmetry) -> Vec<C64> {
    let [nx, ny, nz] = tensor.dims();
    let (px, py, pz) = (2 * nx, 2 * ny, 2 * nz);
    let table = symmetry.sign_table();
    let mut out = vec![C64::new(0.0, 0.0); px * py * pz];

    for c in 0..pz {
        let Some((iz, mz)) = fold(c, nz) else { continue };
        for b in 0..py {
            let Some((iy, my)) = fold(b, ny) else { continue };
            for a in 0..px {
                let Some((ix, mx)) = fold(a, nx) else { continue };
                let octant = mx as usize + 2 * my as usize + 4 * mz as usize;
                let value = table[octant] * tensor.get(ix, iy, iz, component);
                out[a + px * (b + py * c)] = C64::new(value, 0.0);
            }
        }
    }
    out
}

/// Fourier-domain circulant operator for every component of a tensor.
#[derive(Debug)]
pub struct CirculantOperator {
    dims: [usize; 3],
    fft: Fft3,
    spectra: Vec<Vec<C64>>,
    symmetries: Vec<Symmetry>,
}

impl CirculantOperator {
    /// Embed and transform every component of `tensor`.
    ///
    /// `symmetries` holds one entry per component.
    pub fn new(tensor: &GreenTensor, symmetries: &[Symmetry]) -> Self {
        assert_eq!(
            symmetries.len(),
            tensor.components(),
            "one symmetry per tensor component"
        );
        let dims = tensor.dims();
        let fft = Fft3::new(dims.map(|n| 2 * n));
        let spectra = symmetries
            .iter()
            .enumerate()
            .map(|(c, &sym)| {
                let mut data = embed_circulant(tensor, c, sym);
                fft.forward(&mut data);
                data
            })
            .collect();
        log::debug!("circulant operator {:?} -> {:?}", dims, fft.dims());
        Self {
            dims,
            fft,
            spectra,
            symmetries: symmetries.to_vec(),
        }
    }

    /// Grid dimensions (unpadded).
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn num_voxels(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn components(&self) -> usize {
        self.spectra.len()
    }

    pub fn symmetry(&self, component: usize) -> Symmetry {
        self.symmetries[component]
    }

    /// Spectrum of one component.
    pub fn spectrum(&self, component: usize) -> &[C64] {
        &self.spectra[component]
    }

    /// Zero-pad a grid vector and transform it.
    pub fn transform_input(&self, x: &[C64]) -> Vec<C64> {
        let [nx, ny, nz] = self.dims;
        assert_eq!(x.len(), nx * ny * nz, "input length does not match grid");
        let [px, py, _] = self.fft.dims();
        let mut padded = vec![C64::new(0.0, 0.0); self.fft.len()];
        for iz in 0..nz {
            for iy in 0..ny {
                let src = nx * (iy + ny * iz);
                let dst = px * (iy + py * iz);
                padded[dst..dst + nx].copy_from_slice(&x[src..src + nx]);
            }
        }
        self.fft.forward(&mut padded);
        padded
    }

    /// Inverse-transform a padded spectrum and extract the leading block.
    pub fn finish(&self, mut spectrum: Vec<C64>) -> Vec<C64> {
        self.fft.inverse(&mut spectrum);
        let [nx, ny, nz] = self.dims;
        let [px, py, _] = self.fft.dims();
        let mut out = vec![C64::new(0.0, 0.0); nx * ny * nz];
        for iz in 0..nz {
            for iy in 0..ny {
                let dst = nx * (iy + ny * iz);
                let src = px * (iy + py * iz);
                out[dst..dst + nx].copy_from_slice(&spectrum[src..src + nx]);
            }
        }
        out
    }

    /// Product of a transformed input with one component's spectrum.
    pub fn multiply(&self, component: usize, transformed: &[C64]) -> Vec<C64> {
        self.spectra[component]
            .par_iter()
            .zip(transformed.par_iter())
            .map(|(k, x)| k * x)
            .collect()
    }

    /// `y = T_c x` for one component.
    pub fn apply(&self, component: usize, x: &[C64]) -> Vec<C64> {
        let transformed = self.transform_input(x);
        self.finish(self.multiply(component, &transformed))
    }
}

/// O(n²) Toeplitz product of one tensor component, for reference checks.
#[derive(Debug, Clone)]
pub struct DenseToeplitz {
    dims: [usize; 3],
    values: Vec<f64>,
    symmetry: Symmetry,
}

impl DenseToeplitz {
    pub fn new(tensor: &GreenTensor, component: usize, symmetry: Symmetry) -> Self {
        Self {
            dims: tensor.dims(),
            values: tensor.component(component).to_vec(),
            symmetry,
        }
    }

    /// Kernel value for the signed offset `target - source`.
    pub fn coefficient(&self, offset: [i64; 3]) -> f64 {
        let [nx, ny, _] = self.dims;
        let mirrored = offset.map(|o| o < 0);
        let [ax, ay, az] = offset.map(|o| o.unsigned_abs() as usize);
        self.symmetry.sign(mirrored) * self.values[ax + nx * (ay + ny * az)]
    }
}

impl LinearOperator for DenseToeplitz {
    fn shape(&self) -> (usize, usize) {
        let n = self.dims.iter().product();
        (n, n)
    }

    fn apply(&self, x: &[C64], y: &mut [C64]) {
        let [nx, ny, _] = self.dims;
        let coords = |idx: usize| -> [i64; 3] {
            [
                (idx % nx) as i64,
                ((idx / nx) % ny) as i64,
                (idx / (nx * ny)) as i64,
            ]
        };
        y.par_iter_mut().enumerate().for_each(|(i, yi)| {
            let ci = coords(i);
            *yi = x
                .iter()
                .enumerate()
                .map(|(j, &xj)| {
                    let cj = coords(j);
                    xj * self.coefficient([ci[0] - cj[0], ci[1] - cj[1], ci[2] - cj[2]])
                })
                .sum();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::green::{green_tensor, CouplingKind};
    use voxpeec_core::VoxelGrid;

    fn sample(n: usize) -> Vec<C64> {
        (0..n)
            .map(|i| C64::new(((i * 7 + 3) % 11) as f64 - 5.0, ((i * 5) % 7) as f64 * 0.25))
            .collect()
    }

    fn assert_close(a: &[C64], b: &[C64], tol: f64) {
        let scale = b.iter().map(|v| v.norm()).fold(0.0, f64::max);
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            assert!((x - y).norm() <= tol * scale, "entry {i}: {x} vs {y}");
        }
    }

    #[test]
    fn sign_table_flips_odd_axis() {
        assert_eq!(Symmetry::Even.sign_table(), [1.0; 8]);
        let t = Symmetry::Odd(Direction::Y).sign_table();
        assert_eq!(t, [1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0]);
    }

    #[test]
    fn embedding_layout() {
        let grid = VoxelGrid::with_size([3, 1, 2], [1.0, 1.0, 1.0]).unwrap();
        let g = green_tensor(&grid, CouplingKind::Cross, 20.0);
        let c = embed_circulant(&g, 0, Symmetry::Odd(Direction::X));
        assert_eq!(c.len(), 8 * 6);
        let (px, py) = (6, 2);
        let at = |a: usize, b: usize, cc: usize| c[a + px * (b + py * cc)];
        // a = n is zero along every axis
        assert_eq!(at(3, 0, 0), C64::new(0.0, 0.0));
        assert_eq!(at(0, 1, 0), C64::new(0.0, 0.0));
        assert_eq!(at(1, 0, 2), C64::new(0.0, 0.0));
        // mirrored x flips the sign
        assert_eq!(at(5, 0, 1).re, -g.get(1, 0, 1, 0));
        assert_eq!(at(1, 0, 3).re, g.get(1, 0, 1, 0));
    }

    #[test]
    fn fft_product_matches_dense_even() {
        let grid = VoxelGrid::with_size([3, 2, 4], [0.5e-2, 1e-2, 1e-2]).unwrap();
        let g = green_tensor(&grid, CouplingKind::Green, 20.0);
        let op = CirculantOperator::new(&g, &[Symmetry::Even]);
        let dense = DenseToeplitz::new(&g, 0, Symmetry::Even);

        let x = sample(24);
        let fast = op.apply(0, &x);
        let mut slow = vec![C64::new(0.0, 0.0); 24];
        dense.apply(&x, &mut slow);
        assert_close(&fast, &slow, 1e-9);
    }

    #[test]
    fn fft_product_matches_dense_odd() {
        let grid = VoxelGrid::with_size([2, 3, 3], [1.0, 0.5, 2.0]).unwrap();
        let k = green_tensor(&grid, CouplingKind::Cross, 20.0);
        let syms = Direction::ALL.map(Symmetry::Odd);
        let op = CirculantOperator::new(&k, &syms);
        let x = sample(18);
        for (c, sym) in syms.iter().enumerate() {
            let dense = DenseToeplitz::new(&k, c, *sym);
            let fast = op.apply(c, &x);
            let mut slow = vec![C64::new(0.0, 0.0); 18];
            dense.apply(&x, &mut slow);
            assert_close(&fast, &slow, 1e-9);
        }
    }

    #[test]
    fn single_voxel_grid() {
        let grid = VoxelGrid::with_size([1, 1, 1], [1.0, 1.0, 1.0]).unwrap();
        let g = green_tensor(&grid, CouplingKind::Green, 20.0);
        let op = CirculantOperator::new(&g, &[Symmetry::Even]);
        let y = op.apply(0, &[C64::new(2.0, -1.0)]);
        let expected = C64::new(2.0, -1.0) * g.get(0, 0, 0, 0);
        assert!((y[0] - expected).norm() < 1e-14);
    }
}
