//! PEEC system assembly.
//!
//! Unknowns are ordered `[face currents; voxel potentials; voltage-source
//! currents]`. The system reads
//!
//! ```text
//! | R + jωL   A_kvl | | I_f |   |  0  |
//! | A_kcl     A_src | | V_v | = | rhs |
//! ```
//!
//! with `A_kcl = [A; 0]` and `A_kvl = [-Aᵀ, 0]`, `A` the reduced incidence.
//! Everything that does not depend on frequency or excitations lives in
//! [`StructureTensors`] and is shared by every solve on the same geometry.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use nalgebra_sparse::{coo::CooMatrix, CsrMatrix};
use num_complex::Complex64 as C64;
use voxpeec_core::sparse::spmv_real_complex;
use voxpeec_core::{Direction, Excitation, ReducedIncidence, ResolvedSource, SourceKind, VoxelGrid, VoxelModel};

use crate::circulant::{CirculantOperator, Symmetry};
use crate::error::{Error, Result};
use crate::green::{green_tensor, CouplingKind};
use crate::operator::LinearOperator;
use crate::options::CouplingOptions;

/// Partial inductance between face currents, applied through the circulant
/// embedding of the inductance tensor.
#[derive(Debug)]
pub struct InductanceOperator {
    circulant: CirculantOperator,
    /// Per direction: (face position, owner voxel linear index).
    faces: [Vec<(usize, usize)>; 3],
    self_inductance: [f64; 3],
    num_faces: usize,
}

impl InductanceOperator {
    pub fn new(grid: &VoxelGrid, incidence: &ReducedIncidence, green_simplify: f64) -> Self {
        let tensor = green_tensor(grid, CouplingKind::Inductance, green_simplify);
        let circulant = CirculantOperator::new(&tensor, &[Symmetry::Even; 3]);

        let mut faces: [Vec<(usize, usize)>; 3] = Default::default();
        for (pos, face) in incidence.faces().iter().enumerate() {
            faces[face.direction.axis()].push((pos, face.voxel));
        }
        let self_inductance = Direction::ALL.map(|d| tensor.get(0, 0, 0, d.axis()));

        Self {
            circulant,
            faces,
            self_inductance,
            num_faces: incidence.num_faces(),
        }
    }

    /// Self inductance of a face along `dir`.
    pub fn self_inductance(&self, dir: Direction) -> f64 {
        self.self_inductance[dir.axis()]
    }
}

impl LinearOperator for InductanceOperator {
    fn shape(&self) -> (usize, usize) {
        (self.num_faces, self.num_faces)
    }

    fn apply(&self, x: &[C64], y: &mut [C64]) {
        let nv = self.circulant.num_voxels();
        for dir in Direction::ALL {
            let faces = &self.faces[dir.axis()];
            if faces.is_empty() {
                continue;
            }
            let mut grid_vec = vec![C64::new(0.0, 0.0); nv];
            for &(pos, voxel) in faces {
                grid_vec[voxel] = x[pos];
            }
            let out = self.circulant.apply(dir.axis(), &grid_vec);
            for &(pos, voxel) in faces {
                y[pos] = out[voxel];
            }
        }
    }
}

/// Frequency-independent data of a geometry.
#[derive(Debug)]
pub struct StructureTensors {
    model: VoxelModel,
    face_resistance: Vec<f64>,
    face_self_inductance: Vec<f64>,
    inductance: InductanceOperator,
    cross: Option<CirculantOperator>,
    a_kcl: CsrMatrix<f64>,
    a_kvl: CsrMatrix<f64>,
}

impl StructureTensors {
    /// Compute resistances, the inductance operator and the incidence blocks.
    pub fn prepare(model: VoxelModel, coupling: &CouplingOptions) -> Result<Self> {
        coupling.validate()?;
        let grid = model.grid();
        let incidence = model.incidence();
        let rho = model.resistivity();

        let face_resistance: Vec<f64> = incidence
            .faces()
            .iter()
            .map(|f| {
                let rho_avg = 0.5 * (rho[f.owner] + rho[f.neighbor]);
                rho_avg * grid.face_length(f.direction) / grid.face_area(f.direction)
            })
            .collect();

        let inductance = InductanceOperator::new(grid, incidence, coupling.green_simplify);
        let face_self_inductance = incidence
            .faces()
            .iter()
            .map(|f| inductance.self_inductance(f.direction))
            .collect();

        let cross = coupling.magnetic_field.then(|| {
            let tensor = green_tensor(grid, CouplingKind::Cross, coupling.green_simplify);
            CirculantOperator::new(&tensor, &Direction::ALL.map(Symmetry::Odd))
        });

        let (a_kcl, a_kvl) = incidence_blocks(incidence, model.num_voltage_voxels());

        Ok(Self {
            face_resistance,
            face_self_inductance,
            inductance,
            cross,
            a_kcl,
            a_kvl,
            model,
        })
    }

    pub fn model(&self) -> &VoxelModel {
        &self.model
    }

    /// Face resistances `(ρ_a + ρ_b)/2 · d/A`, one per internal face.
    pub fn face_resistance(&self) -> &[f64] {
        &self.face_resistance
    }

    /// Face self inductances, one per internal face.
    pub fn face_self_inductance(&self) -> &[f64] {
        &self.face_self_inductance
    }

    pub fn inductance(&self) -> &InductanceOperator {
        &self.inductance
    }

    /// Cross operator for magnetic-field extraction, if prepared.
    pub fn cross(&self) -> Option<&CirculantOperator> {
        self.cross.as_ref()
    }

    pub fn a_kcl(&self) -> &CsrMatrix<f64> {
        &self.a_kcl
    }

    pub fn a_kvl(&self) -> &CsrMatrix<f64> {
        &self.a_kvl
    }
}

/// `A_kcl = [A; 0]` and `A_kvl = [-Aᵀ, 0]`.
fn incidence_blocks(incidence: &ReducedIncidence, n_src: usize) -> (CsrMatrix<f64>, CsrMatrix<f64>) {
    let n_v = incidence.num_voxels();
    let n_f = incidence.num_faces();
    let mut kcl = CooMatrix::new(n_v + n_src, n_f);
    let mut kvl = CooMatrix::new(n_f, n_v + n_src);
    for (i, f, &v) in incidence.matrix().triplet_iter() {
        kcl.push(i, f, v);
        kvl.push(f, i, -v);
    }
    (CsrMatrix::from(&kcl), CsrMatrix::from(&kvl))
}

/// The assembled system for one frequency and one set of excitations.
#[derive(Debug)]
pub struct EquationSystem<'a> {
    tensors: &'a StructureTensors,
    frequency: f64,
    omega: f64,
    sources: Vec<ResolvedSource>,
    a_src: CsrMatrix<f64>,
    rhs: Vec<C64>,
    z_diag: Vec<C64>,
}

impl<'a> EquationSystem<'a> {
    /// Assemble the source block and right-hand side.
    ///
    /// `overrides` replaces the excitation of the named sources.
    ///
    /// # Errors
    /// [`Error::UnknownSource`] for an override without a matching source,
    /// a core validation error for an invalid excitation and
    /// [`Error::InvalidOptions`] for a negative or non-finite frequency.
    pub fn assemble(
        tensors: &'a StructureTensors,
        overrides: &IndexMap<String, Excitation>,
        frequency: f64,
    ) -> Result<Self> {
        if !(frequency.is_finite() && frequency >= 0.0) {
            return Err(Error::InvalidOptions(format!(
                "frequency must be finite and >= 0, got {frequency}"
            )));
        }
        let model = tensors.model();
        let mut sources = model.sources().to_vec();
        for (tag, excitation) in overrides {
            let source = sources
                .iter_mut()
                .find(|s| &s.tag == tag)
                .ok_or_else(|| Error::UnknownSource(tag.clone()))?;
            excitation.validate(tag)?;
            source.excitation = *excitation;
        }

        let n_v = model.num_voxels();
        let n_f = model.num_faces();
        let n_src = model.num_voltage_voxels();
        let mut a_src = CooMatrix::new(n_v + n_src, n_v + n_src);
        let mut rhs = vec![C64::new(0.0, 0.0); n_f + n_v + n_src];

        for source in &sources {
            let n = source.positions.len() as f64;
            let Excitation { value, element } = source.excitation;
            match source.kind {
                SourceKind::Current => {
                    for &pos in &source.positions {
                        if element != 0.0 {
                            a_src.push(pos, pos, element / n);
                        }
                        rhs[n_f + pos] += value / n;
                    }
                }
                SourceKind::Voltage => {
                    for (k, &pos) in source.positions.iter().enumerate() {
                        let aux = n_v + source.aux_offset + k;
                        a_src.push(pos, aux, -1.0);
                        a_src.push(aux, pos, 1.0);
                        if element != 0.0 {
                            a_src.push(aux, aux, element * n);
                        }
                        rhs[n_f + aux] = value;
                    }
                }
            }
        }

        let omega = 2.0 * std::f64::consts::PI * frequency;
        let z_diag = tensors
            .face_resistance()
            .iter()
            .zip(tensors.face_self_inductance())
            .map(|(&r, &l)| C64::new(r, omega * l))
            .collect();

        log::debug!(
            "assembled system at {frequency} Hz: {n_f} faces, {n_v} voxels, {n_src} source currents"
        );

        Ok(Self {
            tensors,
            frequency,
            omega,
            sources,
            a_src: CsrMatrix::from(&a_src),
            rhs,
            z_diag,
        })
    }

    pub fn tensors(&self) -> &'a StructureTensors {
        self.tensors
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Angular frequency `2π f`.
    pub fn omega(&self) -> f64 {
        self.omega
    }

    /// Sources with their effective excitations.
    pub fn sources(&self) -> &[ResolvedSource] {
        &self.sources
    }

    pub fn a_kcl(&self) -> &CsrMatrix<f64> {
        self.tensors.a_kcl()
    }

    pub fn a_kvl(&self) -> &CsrMatrix<f64> {
        self.tensors.a_kvl()
    }

    pub fn a_src(&self) -> &CsrMatrix<f64> {
        &self.a_src
    }

    pub fn rhs(&self) -> &[C64] {
        &self.rhs
    }

    /// Diagonal face impedances `R + jωL_self`.
    pub fn z_diag(&self) -> &[C64] {
        &self.z_diag
    }

    pub fn num_faces(&self) -> usize {
        self.tensors.model().num_faces()
    }

    /// Voxel potentials plus voltage-source currents.
    pub fn num_node_unknowns(&self) -> usize {
        self.a_src.nrows()
    }

    pub fn num_unknowns(&self) -> usize {
        self.num_faces() + self.num_node_unknowns()
    }

    pub fn operator(&self) -> SystemOperator<'_> {
        SystemOperator { system: self }
    }
}

/// Matrix-free product with the full system matrix.
#[derive(Debug, Clone, Copy)]
pub struct SystemOperator<'s> {
    system: &'s EquationSystem<'s>,
}

impl LinearOperator for SystemOperator<'_> {
    fn shape(&self) -> (usize, usize) {
        let n = self.system.num_unknowns();
        (n, n)
    }

    fn apply(&self, x: &[C64], y: &mut [C64]) {
        let sys = self.system;
        let n_f = sys.num_faces();
        let (x_f, x_v) = x.split_at(n_f);
        let (y_f, y_v) = y.split_at_mut(n_f);

        // Face rows: Z I_f + A_kvl x_v
        spmv_real_complex(sys.a_kvl(), x_v, y_f);
        let r = sys.tensors.face_resistance();
        for ((yi, xi), &ri) in y_f.iter_mut().zip(x_f).zip(r) {
            *yi += xi * ri;
        }
        if sys.omega != 0.0 && n_f > 0 {
            let mut lx = vec![C64::new(0.0, 0.0); n_f];
            sys.tensors.inductance().apply(x_f, &mut lx);
            let jw = C64::new(0.0, sys.omega);
            for (yi, li) in y_f.iter_mut().zip(&lx) {
                *yi += jw * li;
            }
        }

        // Node rows: A_kcl I_f + A_src x_v
        spmv_real_complex(sys.a_kcl(), x_f, y_v);
        let mut src = vec![C64::new(0.0, 0.0); x_v.len()];
        spmv_real_complex(sys.a_src(), x_v, &mut src);
        for (yi, si) in y_v.iter_mut().zip(&src) {
            *yi += si;
        }
    }
}

/// `S = A_src - A_kcl · diag(y) · A_kvl`.
///
/// # Errors
/// [`Error::DimensionMismatch`] if the blocks do not chain.
pub fn schur_complement(
    a_kcl: &CsrMatrix<f64>,
    y: &[C64],
    a_kvl: &CsrMatrix<f64>,
    a_src: &CsrMatrix<f64>,
) -> Result<CsrMatrix<C64>> {
    let n = a_src.nrows();
    for (expected, actual) in [
        (a_kcl.ncols(), y.len()),
        (a_kvl.nrows(), y.len()),
        (n, a_kcl.nrows()),
        (n, a_kvl.ncols()),
        (n, a_src.ncols()),
    ] {
        if expected != actual {
            return Err(Error::DimensionMismatch { expected, actual });
        }
    }

    let mut rows: Vec<BTreeMap<usize, C64>> = vec![BTreeMap::new(); n];
    for (i, j, &v) in a_src.triplet_iter() {
        *rows[i].entry(j).or_insert(C64::new(0.0, 0.0)) += v;
    }
    for (i, kcl_row) in a_kcl.row_iter().enumerate() {
        for (&f, &a) in kcl_row.col_indices().iter().zip(kcl_row.values()) {
            let ay = y[f] * a;
            let kvl_row = a_kvl.row(f);
            for (&j, &b) in kvl_row.col_indices().iter().zip(kvl_row.values()) {
                *rows[i].entry(j).or_insert(C64::new(0.0, 0.0)) -= ay * b;
            }
        }
    }

    let mut coo = CooMatrix::new(n, n);
    for (i, row) in rows.into_iter().enumerate() {
        for (j, v) in row {
            coo.push(i, j, v);
        }
    }
    Ok(CsrMatrix::from(&coo))
}

/// `y = A_kcl x` helper used by the preconditioner.
pub(crate) fn kcl_product(system: &EquationSystem<'_>, x_f: &[C64], y: &mut [C64]) {
    spmv_real_complex(system.a_kcl(), x_f, y);
}

/// `y = A_kvl x` helper used by the preconditioner.
pub(crate) fn kvl_product(system: &EquationSystem<'_>, x_v: &[C64], y: &mut [C64]) {
    spmv_real_complex(system.a_kvl(), x_v, y);
}
