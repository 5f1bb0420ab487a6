//! Structured voxel lattice.
//!
//! All linear indices use column-major order: `idx = ix + nx * (iy + ny * iz)`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lattice axis, also used as the face direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    X,
    Y,
    Z,
}

impl Direction {
    /// All directions in face-block order.
    pub const ALL: [Direction; 3] = [Direction::X, Direction::Y, Direction::Z];

    /// Axis number (0, 1, 2).
    pub fn axis(self) -> usize {
        match self {
            Direction::X => 0,
            Direction::Y => 1,
            Direction::Z => 2,
        }
    }

    /// Direction for an axis number.
    pub fn from_axis(axis: usize) -> Option<Self> {
        match axis {
            0 => Some(Direction::X),
            1 => Some(Direction::Y),
            2 => Some(Direction::Z),
            _ => None,
        }
    }
}

/// Immutable description of an nx × ny × nz voxel lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelGrid {
    dims: [usize; 3],
    size: [f64; 3],
    origin: [f64; 3],
}

impl VoxelGrid {
    /// Create a grid.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGrid`] if any dimension is zero or any voxel
    /// size is not a finite positive number.
    pub fn new(dims: [usize; 3], size: [f64; 3], origin: [f64; 3]) -> Result<Self> {
        if dims.iter().any(|&n| n == 0) {
            return Err(Error::InvalidGrid(format!(
                "dimensions must be at least 1, got {dims:?}"
            )));
        }
        if size.iter().any(|&d| !(d.is_finite() && d > 0.0)) {
            return Err(Error::InvalidGrid(format!(
                "voxel size must be finite and positive, got {size:?}"
            )));
        }
        if origin.iter().any(|o| !o.is_finite()) {
            return Err(Error::InvalidGrid(format!(
                "origin must be finite, got {origin:?}"
            )));
        }
        dims.iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .and_then(|nv| nv.checked_mul(8))
            .ok_or_else(|| Error::InvalidGrid(format!("grid {dims:?} is too large")))?;

        Ok(Self { dims, size, origin })
    }

    /// Grid at the coordinate origin.
    pub fn with_size(dims: [usize; 3], size: [f64; 3]) -> Result<Self> {
        Self::new(dims, size, [0.0; 3])
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn size(&self) -> [f64; 3] {
        self.size
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// Number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Number of faces in the full face index space (three per voxel).
    pub fn num_faces(&self) -> usize {
        3 * self.num_voxels()
    }

    /// Volume of a single voxel.
    pub fn voxel_volume(&self) -> f64 {
        self.size[0] * self.size[1] * self.size[2]
    }

    /// Length of a face bar along `dir` (distance between adjacent voxel centers).
    pub fn face_length(&self, dir: Direction) -> f64 {
        self.size[dir.axis()]
    }

    /// Cross-section of a face normal to `dir`.
    pub fn face_area(&self, dir: Direction) -> f64 {
        let [dx, dy, dz] = self.size;
        match dir {
            Direction::X => dy * dz,
            Direction::Y => dx * dz,
            Direction::Z => dx * dy,
        }
    }

    /// Linear index of a tensor index.
    #[inline]
    pub fn linear_index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        debug_assert!(ix < self.dims[0] && iy < self.dims[1] && iz < self.dims[2]);
        ix + self.dims[0] * (iy + self.dims[1] * iz)
    }

    /// Tensor index of a linear index.
    #[inline]
    pub fn tensor_index(&self, idx: usize) -> [usize; 3] {
        let [nx, ny, _] = self.dims;
        [idx % nx, (idx / nx) % ny, idx / (nx * ny)]
    }

    /// Linear index of the neighbour on the positive side along `dir`, if any.
    pub fn positive_neighbor(&self, idx: usize, dir: Direction) -> Option<usize> {
        let mut t = self.tensor_index(idx);
        let axis = dir.axis();
        if t[axis] + 1 >= self.dims[axis] {
            return None;
        }
        t[axis] += 1;
        Some(self.linear_index(t[0], t[1], t[2]))
    }

    /// Linear index of the neighbour on the negative side along `dir`, if any.
    pub fn negative_neighbor(&self, idx: usize, dir: Direction) -> Option<usize> {
        let mut t = self.tensor_index(idx);
        let axis = dir.axis();
        if t[axis] == 0 {
            return None;
        }
        t[axis] -= 1;
        Some(self.linear_index(t[0], t[1], t[2]))
    }

    /// Index of the face on the positive side of voxel `idx` along `dir`.
    #[inline]
    pub fn face_index(&self, idx: usize, dir: Direction) -> usize {
        dir.axis() * self.num_voxels() + idx
    }

    /// Direction and owner voxel of a face index.
    pub fn face_owner(&self, face: usize) -> (Direction, usize) {
        let nv = self.num_voxels();
        let dir = Direction::from_axis(face / nv).unwrap_or(Direction::Z);
        (dir, face % nv)
    }

    /// Center of a voxel in world coordinates.
    pub fn voxel_center(&self, idx: usize) -> [f64; 3] {
        let t = self.tensor_index(idx);
        let mut c = [0.0; 3];
        for a in 0..3 {
            c[a] = self.origin[a] + (t[a] as f64 + 0.5) * self.size[a];
        }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_major_round_trip() {
        let grid = VoxelGrid::with_size([2, 3, 4], [1.0, 1.0, 1.0]).unwrap();
        assert_eq!(grid.linear_index(1, 0, 0), 1);
        assert_eq!(grid.linear_index(0, 1, 0), 2);
        assert_eq!(grid.linear_index(0, 0, 1), 6);
        for idx in 0..grid.num_voxels() {
            let [ix, iy, iz] = grid.tensor_index(idx);
            assert_eq!(grid.linear_index(ix, iy, iz), idx);
        }
    }

    #[test]
    fn neighbors_respect_boundaries() {
        let grid = VoxelGrid::with_size([2, 1, 3], [0.5e-2, 1e-2, 1e-2]).unwrap();
        assert_eq!(grid.positive_neighbor(0, Direction::X), Some(1));
        assert_eq!(grid.positive_neighbor(1, Direction::X), None);
        assert_eq!(grid.positive_neighbor(0, Direction::Y), None);
        assert_eq!(grid.positive_neighbor(1, Direction::Z), Some(3));
        assert_eq!(grid.negative_neighbor(5, Direction::Z), Some(3));
        assert_eq!(grid.negative_neighbor(0, Direction::Z), None);
    }

    #[test]
    fn face_geometry() {
        let grid = VoxelGrid::with_size([2, 1, 3], [0.5e-2, 1e-2, 1e-2]).unwrap();
        assert!((grid.face_area(Direction::X) - 1e-4).abs() < 1e-18);
        assert!((grid.face_area(Direction::Z) - 0.5e-4).abs() < 1e-18);
        assert!((grid.face_length(Direction::X) - 0.5e-2).abs() < 1e-18);
        assert_eq!(grid.face_index(4, Direction::Y), 10);
        assert_eq!(grid.face_owner(10), (Direction::Y, 4));
    }

    #[test]
    fn voxel_center_uses_origin() {
        let grid = VoxelGrid::new([2, 2, 2], [1.0, 2.0, 3.0], [-1.0, 0.0, 1.0]).unwrap();
        let c = grid.voxel_center(grid.linear_index(1, 1, 1));
        assert_eq!(c, [0.5, 3.0, 5.5]);
    }

    #[test]
    fn rejects_invalid_grids() {
        assert!(matches!(
            VoxelGrid::with_size([0, 1, 1], [1.0, 1.0, 1.0]),
            Err(Error::InvalidGrid(_))
        ));
        assert!(matches!(
            VoxelGrid::with_size([1, 1, 1], [1.0, -1.0, 1.0]),
            Err(Error::InvalidGrid(_))
        ));
        assert!(matches!(
            VoxelGrid::with_size([1, 1, 1], [1.0, f64::NAN, 1.0]),
            Err(Error::InvalidGrid(_))
        ));
    }
}
