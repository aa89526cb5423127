//! Structured grid topology and geometry.
//!
//! Points of a structured grid are numbered `x + y·nx + z·nx·ny`. An axis
//! with a single point is inactive, so a `(nx, ny, 1)` grid is a 2D grid of
//! quads and a `(nx, ny, nz)` grid with all dimensions above one is a 3D
//! grid of hexahedra.
//!
//! Corners of a cell are listed in VTK order:
//!
//! ```text
//! quad:        3 --- 2        hexahedron: bottom face 0 1 2 3 (z),
//!              |     |                    top face    4 5 6 7 (z+1),
//!              0 --- 1                    each face ordered like the quad
//! ```
//!
//! This ordering is the contract between the statistics arrays and the
//! cell estimators: corner `j` of a cell always means the same lattice
//! offset.

use crate::error::{Error, Result};

/// Maximum number of corners a cell can have (hexahedron).
pub const MAX_CORNERS: usize = 8;

/// Lattice offsets of hexahedron corners in VTK order. The first two
/// entries are the line corners, the first four the quad corners.
const CORNER_OFFSETS: [[usize; 3]; MAX_CORNERS] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Point indices of the corners of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellCorners {
    ids: [usize; MAX_CORNERS],
    len: usize,
}

impl CellCorners {
    pub fn as_slice(&self) -> &[usize] {
        &self.ids[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Maps cells to the point indices of their corners.
///
/// Implemented by [`StructuredGrid`]; callers holding their own structured
/// topology can implement it to feed the cell estimators directly.
pub trait CellTopology: Sync {
    /// Number of points the corner indices refer to.
    fn num_points(&self) -> usize;

    /// Number of cells.
    fn num_cells(&self) -> usize;

    /// Corners per cell; always `2^dimension`.
    fn corners_per_cell(&self) -> usize;

    /// Corner point indices of `cell`, in the fixed corner order.
    fn cell_corners(&self, cell: usize) -> CellCorners;
}

/// A structured lattice of points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuredGrid {
    point_dims: [usize; 3],
    active: [usize; 3],
    dimension: usize,
}

impl StructuredGrid {
    /// Creates a grid with the given number of points per axis.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if any dimension is zero.
    pub fn new(point_dims: [usize; 3]) -> Result<Self> {
        if point_dims.contains(&0) {
            return Err(Error::InvalidInput(format!(
                "grid dimensions must be positive, got {point_dims:?}"
            )));
        }
        let mut active = [0; 3];
        let mut dimension = 0;
        for (axis, &d) in point_dims.iter().enumerate() {
            if d > 1 {
                active[dimension] = axis;
                dimension += 1;
            }
        }
        Ok(Self {
            point_dims,
            active,
            dimension,
        })
    }

    pub fn point_dims(&self) -> [usize; 3] {
        self.point_dims
    }

    /// Number of axes with more than one point.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn num_points(&self) -> usize {
        self.point_dims.iter().product()
    }

    /// Cells per axis; inactive axes count as one.
    pub fn cell_dims(&self) -> [usize; 3] {
        self.point_dims.map(|d| if d > 1 { d - 1 } else { 1 })
    }

    /// Flat index of the point at `coords`.
    #[inline]
    pub fn point_index(&self, coords: [usize; 3]) -> usize {
        let [nx, ny, _] = self.point_dims;
        coords[0] + coords[1] * nx + coords[2] * nx * ny
    }

    /// Lattice coordinates of point `id`.
    #[inline]
    pub fn point_coords(&self, id: usize) -> [usize; 3] {
        let [nx, ny, _] = self.point_dims;
        [id % nx, (id / nx) % ny, id / (nx * ny)]
    }
}

impl CellTopology for StructuredGrid {
    fn num_points(&self) -> usize {
        StructuredGrid::num_points(self)
    }

    fn num_cells(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.cell_dims().iter().product()
        }
    }

    fn corners_per_cell(&self) -> usize {
        1 << self.dimension
    }

    fn cell_corners(&self, cell: usize) -> CellCorners {
        let [cx, cy, _] = self.cell_dims();
        let base = [cell % cx, (cell / cx) % cy, cell / (cx * cy)];
        let len = self.corners_per_cell();
        let mut ids = [0; MAX_CORNERS];
        for (slot, offset) in ids.iter_mut().zip(CORNER_OFFSETS.iter()).take(len) {
            let mut coords = base;
            for (d, &axis) in self.active[..self.dimension].iter().enumerate() {
                coords[axis] += offset[d];
            }
            *slot = self.point_index(coords);
        }
        CellCorners { ids, len }
    }
}

/// Origin and spacing of a uniform grid.
///
/// Carried through the pipeline so output arrays can be attached to a grid
/// with the right placement; never used in the probability math.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformGeometry {
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
}

impl Default for UniformGeometry {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            spacing: [1.0; 3],
        }
    }
}

impl UniformGeometry {
    /// `(min corner, max corner)` of a grid with `point_dims` points.
    pub fn bounds(&self, point_dims: [usize; 3]) -> ([f64; 3], [f64; 3]) {
        let mut max = self.origin;
        for axis in 0..3 {
            max[axis] += point_dims[axis].saturating_sub(1) as f64 * self.spacing[axis];
        }
        (self.origin, max)
    }
}
