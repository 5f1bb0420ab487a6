//! Post-processing of a solution vector.

use num_complex::Complex64 as C64;
use voxpeec_core::constants::MU0;
use voxpeec_core::{Direction, SourceKind};

use crate::assembly::EquationSystem;
use crate::circulant::CirculantOperator;
use crate::error::{Error, Result};

const NAN: C64 = C64::new(f64::NAN, f64::NAN);

/// Terminal quantities of one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTerminal {
    pub tag: String,
    pub kind: SourceKind,
    /// Mean potential over the source voxels.
    pub voltage: C64,
    /// Total current injected into the conductor.
    pub current: C64,
    /// Complex power `V · conj(I)`.
    pub power: C64,
}

/// A solved system split into physical quantities.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Raw unknown vector `[I_f; V_v; I_src]`.
    pub vector: Vec<C64>,
    /// Face currents over the full `3 nv` face space, zero for non-internal faces.
    pub face_currents: Vec<C64>,
    /// Voxel potentials over the full grid, NaN outside the conductors.
    pub potentials: Vec<C64>,
    /// Currents of the voltage-source voxels.
    pub source_currents: Vec<C64>,
    /// Current density `[Jx, Jy, Jz]` per voxel, NaN outside the conductors.
    pub current_density: Vec<[C64; 3]>,
    /// Magnetic flux density `[Bx, By, Bz]` per voxel, if requested.
    pub magnetic_field: Option<Vec<[C64; 3]>>,
    pub terminals: Vec<SourceTerminal>,
    /// `Σ R_f |I_f|²` over internal faces.
    pub resistive_loss: f64,
    /// Sum of the terminal powers.
    pub source_power: C64,
}

impl Solution {
    pub fn terminal(&self, tag: &str) -> Option<&SourceTerminal> {
        self.terminals.iter().find(|t| t.tag == tag)
    }
}

/// Split `x` and derive the physical quantities.
///
/// # Errors
/// [`Error::DimensionMismatch`] if `x` does not match the system.
pub fn extract_solution(system: &EquationSystem<'_>, x: &[C64]) -> Result<Solution> {
    let n = system.num_unknowns();
    if x.len() != n {
        return Err(Error::DimensionMismatch {
            expected: n,
            actual: x.len(),
        });
    }
    let tensors = system.tensors();
    let model = tensors.model();
    let grid = model.grid();
    let nv = grid.num_voxels();
    let n_f = system.num_faces();
    let n_v = model.num_voxels();

    let (x_f, rest) = x.split_at(n_f);
    let (x_v, x_src) = rest.split_at(n_v);

    let faces = model.incidence().faces();
    let mut face_currents = vec![C64::new(0.0, 0.0); grid.num_faces()];
    for (face, &i) in faces.iter().zip(x_f) {
        face_currents[face.face] = i;
    }

    let mut potentials = vec![NAN; nv];
    for (&idx, &v) in model.occupied().iter().zip(x_v) {
        potentials[idx] = v;
    }

    let mut current_density = vec![[NAN; 3]; nv];
    for &idx in model.occupied() {
        let mut j = [C64::new(0.0, 0.0); 3];
        for dir in Direction::ALL {
            let plus = face_currents[grid.face_index(idx, dir)];
            let minus = grid
                .negative_neighbor(idx, dir)
                .map_or(C64::new(0.0, 0.0), |nb| face_currents[grid.face_index(nb, dir)]);
            j[dir.axis()] = (plus + minus) / (2.0 * grid.face_area(dir));
        }
        current_density[idx] = j;
    }

    let terminals: Vec<SourceTerminal> = system
        .sources()
        .iter()
        .map(|source| {
            let count = source.positions.len() as f64;
            let voltage = source.positions.iter().map(|&p| x_v[p]).sum::<C64>() / count;
            let current: C64 = match source.kind {
                SourceKind::Current => {
                    let value = source.excitation.value / count;
                    let g = source.excitation.element / count;
                    source.positions.iter().map(|&p| value - x_v[p] * g).sum()
                }
                SourceKind::Voltage => x_src[source.aux_offset..source.aux_offset + source.positions.len()]
                    .iter()
                    .sum(),
            };
            SourceTerminal {
                tag: source.tag.clone(),
                kind: source.kind,
                voltage,
                current,
                power: voltage * current.conj(),
            }
        })
        .collect();

    let resistive_loss: f64 = tensors
        .face_resistance()
        .iter()
        .zip(x_f)
        .map(|(r, i)| r * i.norm_sqr())
        .sum();
    let source_power: C64 = terminals.iter().map(|t| t.power).sum();

    let magnetic_field = tensors
        .cross()
        .map(|cross| magnetic_field(cross, &current_density, grid.voxel_volume(), &potentials));

    Ok(Solution {
        vector: x.to_vec(),
        face_currents,
        potentials,
        source_currents: x_src.to_vec(),
        current_density,
        magnetic_field,
        terminals,
        resistive_loss,
        source_power,
    })
}

/// `B = μ0/V Σ_j J_j × K(r_i - r_j)`, NaN where `mask` is NaN.
fn magnetic_field(
    cross: &CirculantOperator,
    current_density: &[[C64; 3]],
    volume: f64,
    mask: &[C64],
) -> Vec<[C64; 3]> {
    let nv = current_density.len();
    let component = |d: usize| -> Vec<C64> {
        current_density
            .iter()
            .map(|j| if j[d].re.is_nan() { C64::new(0.0, 0.0) } else { j[d] })
            .collect()
    };
    let j_hat: Vec<Vec<C64>> = (0..3).map(|d| cross.transform_input(&component(d))).collect();

    // (J × K)_a = J_b K_c - J_c K_b for cyclic (a, b, c)
    let mut b = vec![[C64::new(0.0, 0.0); 3]; nv];
    for a in 0..3 {
        let (bb, cc) = ((a + 1) % 3, (a + 2) % 3);
        let first = cross.multiply(cc, &j_hat[bb]);
        let second = cross.multiply(bb, &j_hat[cc]);
        let spectrum: Vec<C64> = first.iter().zip(&second).map(|(p, q)| p - q).collect();
        let field = cross.finish(spectrum);
        for (bi, fi) in b.iter_mut().zip(field) {
            bi[a] = fi * (MU0 / volume);
        }
    }
    for (bi, m) in b.iter_mut().zip(mask) {
        if m.re.is_nan() {
            *bi = [NAN; 3];
        }
    }
    b
}
