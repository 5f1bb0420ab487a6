//! Volume-volume coupling kernels between voxels.
//!
//! The integral of `1/|r - r'|` over two equal boxes reduces to a weighted
//! sum of an antiderivative evaluated at the 4×4×4 corner-difference points
//! of the offset. The same stencil applied to the x-derivative of the
//! antiderivative gives the integral of `(r - r')_x / |r - r'|³`.
//!
//! Tensors hold the coefficient between voxel (0,0,0) and every other voxel
//! of the grid. The full interaction follows from translation invariance.

use std::f64::consts::PI;

use rayon::prelude::*;
use voxpeec_core::constants::{EPS0, MU0};
use voxpeec_core::{Direction, VoxelGrid};

const FOUR_PI: f64 = 4.0 * PI;

/// Stencil shifts (in voxel sizes) and weights along one axis.
const STENCIL: [(f64, f64); 4] = [(-1.0, 1.0), (0.0, -1.0), (0.0, -1.0), (1.0, 1.0)];

/// Kernel computed by [`green_tensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouplingKind {
    /// `1/(4π) ∫∫ 1/R`, one component.
    Green,
    /// Partial self and mutual inductance per face direction, three components.
    Inductance,
    /// Potential coefficient between uniform volume charges, one component.
    Potential,
    /// `1/(4π) ∫∫ (r - r')_d / R³` per direction d, three components.
    Cross,
}

impl CouplingKind {
    pub fn components(self) -> usize {
        match self {
            CouplingKind::Green | CouplingKind::Potential => 1,
            CouplingKind::Inductance | CouplingKind::Cross => 3,
        }
    }
}

/// Dense coupling coefficients relative to voxel (0,0,0).
///
/// Layout is column-major with the component axis last:
/// `data[ix + nx * (iy + ny * (iz + nz * c))]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GreenTensor {
    kind: CouplingKind,
    dims: [usize; 3],
    data: Vec<f64>,
}

impl GreenTensor {
    /// Wrap raw coefficients. `data` must hold `components × nx·ny·nz` values.
    pub fn from_raw(kind: CouplingKind, dims: [usize; 3], data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), kind.components() * dims.iter().product::<usize>());
        Self { kind, dims, data }
    }

    pub fn kind(&self) -> CouplingKind {
        self.kind
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn components(&self) -> usize {
        self.kind.components()
    }

    /// Coefficients of one component, column-major over the grid.
    pub fn component(&self, c: usize) -> &[f64] {
        let nv = self.dims.iter().product::<usize>();
        &self.data[c * nv..(c + 1) * nv]
    }

    /// Coefficient for offset `(ix, iy, iz)` and component `c`.
    pub fn get(&self, ix: usize, iy: usize, iz: usize, c: usize) -> f64 {
        let [nx, ny, nz] = self.dims;
        self.data[ix + nx * (iy + ny * (iz + nz * c))]
    }
}

#[inline]
fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// `ln(num / den)`, zero where undefined.
#[inline]
fn safe_log(num: f64, den: f64) -> f64 {
    if num <= 0.0 || den <= 0.0 {
        return 0.0;
    }
    finite_or_zero((num / den).ln())
}

/// `atan(num / den)`, zero where undefined.
#[inline]
fn safe_atan(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        return 0.0;
    }
    finite_or_zero((num / den).atan())
}

/// Antiderivative `F` with `∂²x ∂²y ∂²z F = 1/r`. Even in every argument.
pub fn antiderivative(x: f64, y: f64, z: f64) -> f64 {
    let (x, y, z) = (x.abs(), y.abs(), z.abs());
    let (x2, y2, z2) = (x * x, y * y, z * z);
    let r = (x2 + y2 + z2).sqrt();
    if r == 0.0 {
        return 0.0;
    }

    let mut f = (y2 * z2 / 4.0 - y2 * y2 / 24.0 - z2 * z2 / 24.0)
        * x
        * safe_log(x + r, (y2 + z2).sqrt());
    f += (x2 * z2 / 4.0 - x2 * x2 / 24.0 - z2 * z2 / 24.0) * y * safe_log(y + r, (x2 + z2).sqrt());
    f += (x2 * y2 / 4.0 - x2 * x2 / 24.0 - y2 * y2 / 24.0) * z * safe_log(z + r, (x2 + y2).sqrt());
    f += (x2 * x2 + y2 * y2 + z2 * z2 - 3.0 * (x2 * y2 + y2 * z2 + x2 * z2)) * r / 60.0;
    f -= x * y * z2 * z / 6.0 * safe_atan(x * y, z * r);
    f -= x * y2 * y * z / 6.0 * safe_atan(x * z, y * r);
    f -= x2 * x * y * z / 6.0 * safe_atan(y * z, x * r);
    finite_or_zero(f)
}

/// `∂F/∂x`. Odd in `x`, even in `y` and `z`.
pub fn antiderivative_dx(x: f64, y: f64, z: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let (x, y, z) = (x.abs(), y.abs(), z.abs());
    let (x2, y2, z2) = (x * x, y * y, z * z);
    let r = (x2 + y2 + z2).sqrt();
    if r == 0.0 {
        return 0.0;
    }

    let mut f = (y2 * z2 / 4.0 - y2 * y2 / 24.0 - z2 * z2 / 24.0) * safe_log(x + r, (y2 + z2).sqrt());
    f += (x * z2 / 2.0 - x2 * x / 6.0) * y * safe_log(y + r, (x2 + z2).sqrt());
    f += (x * y2 / 2.0 - x2 * x / 6.0) * z * safe_log(z + r, (x2 + y2).sqrt());
    f -= y * z2 * z / 6.0 * safe_atan(x * y, z * r);
    f -= y2 * y * z / 6.0 * safe_atan(x * z, y * r);
    f -= x2 * y * z / 2.0 * safe_atan(y * z, x * r);
    f += x * r * (2.0 * x2 - 3.0 * y2 - 3.0 * z2) / 24.0;
    sign * finite_or_zero(f)
}

/// Apply the 4×4×4 stencil of `kernel` around the physical offset `c`.
fn stencil_sum(c: [f64; 3], d: [f64; 3], kernel: impl Fn(f64, f64, f64) -> f64) -> f64 {
    let mut sum = 0.0;
    for &(sx, wx) in &STENCIL {
        for &(sy, wy) in &STENCIL {
            for &(sz, wz) in &STENCIL {
                let w = wx * wy * wz;
                sum += w * kernel(c[0] + sx * d[0], c[1] + sy * d[1], c[2] + sz * d[2]);
            }
        }
    }
    sum
}

/// `1/(4π) ∫∫ 1/|r - r'|` for two voxels of size `d` at offset `offset` voxels.
pub fn green_coefficient(offset: [i64; 3], d: [f64; 3], green_simplify: f64) -> f64 {
    let c = physical_offset(offset, d);
    if far_field(offset, green_simplify) {
        let volume = d[0] * d[1] * d[2];
        let r = norm(c);
        return volume * volume / (FOUR_PI * r);
    }
    stencil_sum(c, d, antiderivative) / FOUR_PI
}

/// `1/(4π) ∫∫ (r - r')_dir / |r - r'|³` for two voxels at offset `offset`.
pub fn cross_coefficient(offset: [i64; 3], d: [f64; 3], dir: Direction, green_simplify: f64) -> f64 {
    let c = physical_offset(offset, d);
    let a = dir.axis();
    if far_field(offset, green_simplify) {
        let volume = d[0] * d[1] * d[2];
        let r = norm(c);
        return volume * volume * c[a] / (FOUR_PI * r * r * r);
    }
    // Rotate the axes so that `dir` becomes the first argument of Fx.
    let (b, e) = ((a + 1) % 3, (a + 2) % 3);
    let rc = [c[a], c[b], c[e]];
    let rd = [d[a], d[b], d[e]];
    -stencil_sum(rc, rd, antiderivative_dx) / FOUR_PI
}

fn physical_offset(offset: [i64; 3], d: [f64; 3]) -> [f64; 3] {
    [
        offset[0] as f64 * d[0],
        offset[1] as f64 * d[1],
        offset[2] as f64 * d[2],
    ]
}

fn far_field(offset: [i64; 3], green_simplify: f64) -> bool {
    let n2: i64 = offset.iter().map(|o| o * o).sum();
    (n2 as f64).sqrt() > green_simplify
}

fn norm(c: [f64; 3]) -> f64 {
    (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt()
}

/// Compute the coupling tensor of `kind` over the whole grid.
pub fn green_tensor(grid: &VoxelGrid, kind: CouplingKind, green_simplify: f64) -> GreenTensor {
    let dims = grid.dims();
    let d = grid.size();
    let nv = grid.num_voxels();
    let nc = kind.components();

    let per_voxel: Vec<[f64; 3]> = (0..nv)
        .into_par_iter()
        .map(|idx| {
            let t = grid.tensor_index(idx);
            let offset = [t[0] as i64, t[1] as i64, t[2] as i64];
            let mut out = [0.0; 3];
            match kind {
                CouplingKind::Green => {
                    out[0] = green_coefficient(offset, d, green_simplify);
                }
                CouplingKind::Potential => {
                    let volume = grid.voxel_volume();
                    out[0] = green_coefficient(offset, d, green_simplify) / (EPS0 * volume * volume);
                }
                CouplingKind::Inductance => {
                    let g = green_coefficient(offset, d, green_simplify);
                    for dir in Direction::ALL {
                        let area = grid.face_area(dir);
                        out[dir.axis()] = MU0 * g / (area * area);
                    }
                }
                CouplingKind::Cross => {
                    for dir in Direction::ALL {
                        out[dir.axis()] = cross_coefficient(offset, d, dir, green_simplify);
                    }
                }
            }
            out
        })
        .collect();

    let mut data = vec![0.0; nc * nv];
    for (idx, values) in per_voxel.iter().enumerate() {
        for c in 0..nc {
            data[c * nv + idx] = values[c];
        }
    }

    log::debug!("computed {kind:?} tensor on {dims:?} grid");
    GreenTensor { kind, dims, data }
}
