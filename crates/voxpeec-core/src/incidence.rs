//! Voxel-to-face incidence.
//!
//! The full incidence matrix has one row per voxel and one column per face
//! (three face blocks: x, then y, then z). Face `dir * nv + i` sits on the
//! positive side of voxel `i`: voxel `i` carries `+1`, its positive
//! neighbour carries `-1`. Faces on the positive grid boundary keep a single
//! `+1` entry.
//!
//! [`ReducedIncidence`] restricts the matrix to the occupied voxels and keeps
//! only internal faces, i.e. faces with both adjoining voxels occupied.

use nalgebra_sparse::{coo::CooMatrix, CsrMatrix};

use crate::grid::{Direction, VoxelGrid};

/// Full-grid incidence matrix of shape (nv, 3 nv).
#[derive(Debug, Clone)]
pub struct IncidenceMatrix {
    matrix: CsrMatrix<i8>,
}

impl IncidenceMatrix {
    /// The underlying sparse matrix.
    pub fn matrix(&self) -> &CsrMatrix<i8> {
        &self.matrix
    }

    pub fn num_voxels(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn num_faces(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Build the incidence matrix of a grid. Independent of occupancy.
pub fn incidence_matrix(grid: &VoxelGrid) -> IncidenceMatrix {
    let nv = grid.num_voxels();
    let mut coo = CooMatrix::new(nv, 3 * nv);

    for dir in Direction::ALL {
        for idx in 0..nv {
            let face = grid.face_index(idx, dir);
            coo.push(idx, face, 1i8);
            if let Some(next) = grid.positive_neighbor(idx, dir) {
                coo.push(next, face, -1i8);
            }
        }
    }

    IncidenceMatrix {
        matrix: CsrMatrix::from(&coo),
    }
}

/// A face with both adjoining voxels occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalFace {
    /// Face direction.
    pub direction: Direction,
    /// Index in the full 3 nv face space.
    pub face: usize,
    /// Linear index of the voxel on the negative side (the face owner).
    pub voxel: usize,
    /// Position of the owner in the occupied voxel list (`+1` entry).
    pub owner: usize,
    /// Position of the positive neighbour in the occupied voxel list (`-1` entry).
    pub neighbor: usize,
}

/// Incidence restricted to occupied voxels and internal faces.
#[derive(Debug, Clone)]
pub struct ReducedIncidence {
    faces: Vec<InternalFace>,
    matrix: CsrMatrix<f64>,
}

impl ReducedIncidence {
    /// Slice the incidence rows to `idx_v` and keep two-entry columns.
    ///
    /// `idx_v` must be sorted, duplicate-free and within bounds; this is
    /// guaranteed by [`crate::domain::VoxelModel`].
    pub fn new(incidence: &IncidenceMatrix, idx_v: &[usize]) -> Self {
        let nv = incidence.num_voxels();
        let mut position = vec![usize::MAX; nv];
        for (pos, &idx) in idx_v.iter().enumerate() {
            position[idx] = pos;
        }

        // Columns of the incidence matrix are the rows of its transpose.
        let by_face = incidence.matrix.transpose();
        let mut faces = Vec::new();
        for (face, column) in by_face.row_iter().enumerate() {
            let mut owner = None;
            let mut neighbor = None;
            let mut kept = 0;
            for (&voxel, &sign) in column.col_indices().iter().zip(column.values()) {
                let pos = position[voxel];
                if pos == usize::MAX {
                    continue;
                }
                kept += 1;
                if sign > 0 {
                    owner = Some((voxel, pos));
                } else {
                    neighbor = Some(pos);
                }
            }
            if kept != 2 {
                continue;
            }
            if let (Some((voxel, owner)), Some(neighbor)) = (owner, neighbor) {
                let direction = Direction::from_axis(face / nv).unwrap_or(Direction::Z);
                faces.push(InternalFace {
                    direction,
                    face,
                    voxel,
                    owner,
                    neighbor,
                });
            }
        }

        let mut coo = CooMatrix::new(idx_v.len(), faces.len());
        for (f, face) in faces.iter().enumerate() {
            coo.push(face.owner, f, 1.0);
            coo.push(face.neighbor, f, -1.0);
        }

        Self {
            faces,
            matrix: CsrMatrix::from(&coo),
        }
    }

    /// Internal faces, ordered by full face index.
    pub fn faces(&self) -> &[InternalFace] {
        &self.faces
    }

    /// Reduced incidence matrix of shape (n_v, n_f).
    pub fn matrix(&self) -> &CsrMatrix<f64> {
        &self.matrix
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn num_voxels(&self) -> usize {
        self.matrix.nrows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_213() -> VoxelGrid {
        VoxelGrid::with_size([2, 1, 3], [0.5e-2, 1e-2, 1e-2]).unwrap()
    }

    #[test]
    fn incidence_column_structure() {
        let grid = grid_213();
        let inc = incidence_matrix(&grid);
        assert_eq!(inc.num_voxels(), 6);
        assert_eq!(inc.num_faces(), 18);

        let by_face = inc.matrix().transpose();
        for (face, column) in by_face.row_iter().enumerate() {
            let plus = column.values().iter().filter(|&&v| v == 1).count();
            let minus = column.values().iter().filter(|&&v| v == -1).count();
            assert_eq!(plus, 1, "face {face} must have exactly one +1");
            assert!(minus <= 1, "face {face} has {minus} -1 entries");
            let sum: i32 = column.values().iter().map(|&v| v as i32).sum();
            let (dir, voxel) = grid.face_owner(face);
            let expected = if grid.positive_neighbor(voxel, dir).is_some() { 0 } else { 1 };
            assert_eq!(sum, expected, "face {face}");
        }
    }

    #[test]
    fn incidence_row_structure() {
        let grid = grid_213();
        let inc = incidence_matrix(&grid);
        for (idx, row) in inc.matrix().row_iter().enumerate() {
            let plus = row.values().iter().filter(|&&v| v == 1).count();
            let minus = row.values().iter().filter(|&&v| v == -1).count();
            assert_eq!(plus, 3, "voxel {idx} owns three faces");
            let expected_minus = Direction::ALL
                .iter()
                .filter(|&&d| grid.negative_neighbor(idx, d).is_some())
                .count();
            assert_eq!(minus, expected_minus, "voxel {idx}");
            assert!(row.nnz() <= 6);
        }
    }

    #[test]
    fn full_occupancy_keeps_internal_faces() {
        let grid = grid_213();
        let inc = incidence_matrix(&grid);
        let idx_v: Vec<usize> = (0..6).collect();
        let reduced = ReducedIncidence::new(&inc, &idx_v);

        // three x-faces (one per layer) and four z-faces (two per column pair)
        assert_eq!(reduced.num_faces(), 7);
        let x_faces = reduced
            .faces()
            .iter()
            .filter(|f| f.direction == Direction::X)
            .count();
        let z_faces = reduced
            .faces()
            .iter()
            .filter(|f| f.direction == Direction::Z)
            .count();
        assert_eq!((x_faces, z_faces), (3, 4));

        for (col, face) in reduced.faces().iter().enumerate() {
            assert_eq!(grid.positive_neighbor(face.voxel, face.direction), Some(idx_v[face.neighbor]));
            let sum: f64 = reduced
                .matrix()
                .triplet_iter()
                .filter(|&(_, c, _)| c == col)
                .map(|(_, _, &v)| v)
                .sum();
            assert_eq!(sum, 0.0);
        }
    }

    #[test]
    fn boundary_faces_are_dropped() {
        let grid = grid_213();
        let inc = incidence_matrix(&grid);
        // Voxels 0 and 1 share an x-face; voxel 5 is isolated from them.
        let reduced = ReducedIncidence::new(&inc, &[0, 1, 5]);
        assert_eq!(reduced.num_faces(), 1);
        let face = reduced.faces()[0];
        assert_eq!(face.direction, Direction::X);
        assert_eq!((face.owner, face.neighbor), (0, 1));
        assert_eq!(reduced.matrix().nrows(), 3);
        assert_eq!(reduced.matrix().row(2).nnz(), 0);
    }
}
