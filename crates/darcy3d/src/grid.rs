//! Regular 3D lattice with a one-cell ghost halo.
//!
//! Cell-centered values live at integer coordinates `x in [-1, nx]` (and the
//! same for y and z), where `-1` and `nx` are ghost layers. The staggered
//! variant stores face values with congruent padding: faces `x in [-1, nx+1]`,
//! face `(x, y, z)` being the lowest corner face of cell `(x, y, z)`.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{FluidError, FluidResult};

/// Storage layout of a padded field.
///
/// Both layouts share the index formula `(x+1) + sy*(y+1) + sz*(z+1)`; the
/// face layout has one extra layer on the positive side of every axis.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Layout {
    /// Interior cell counts
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// 0 for cell centers, 1 for congruently padded faces
    extra: usize,
}

impl Layout {
    /// Padded extent along x.
    #[inline]
    pub fn padded_x(&self) -> usize {
        self.nx + 2 + self.extra
    }

    /// Padded extent along y.
    #[inline]
    pub fn padded_y(&self) -> usize {
        self.ny + 2 + self.extra
    }

    /// Padded extent along z.
    #[inline]
    pub fn padded_z(&self) -> usize {
        self.nz + 2 + self.extra
    }

    /// Total number of stored values, ghosts included.
    #[inline]
    pub fn len(&self) -> usize {
        self.padded_x() * self.padded_y() * self.padded_z()
    }

    /// True when the layout stores nothing (never the case for a valid grid).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is the staggered face layout.
    #[inline]
    pub fn is_staggered(&self) -> bool {
        self.extra == 1
    }

    /// 3D coordinate (ghosts included) to 1D offset.
    #[inline]
    pub fn index(&self, x: i32, y: i32, z: i32) -> usize {
        debug_assert!(self.contains(x, y, z), "({x},{y},{z}) outside {self:?}");
        let sy = self.padded_x();
        let sz = sy * self.padded_y();
        (x + 1) as usize + sy * (y + 1) as usize + sz * (z + 1) as usize
    }

    /// Inverse of [`Layout::index`].
    #[inline]
    pub fn coords(&self, idx: usize) -> (i32, i32, i32) {
        let sy = self.padded_x();
        let sz = sy * self.padded_y();
        let z = idx / sz;
        let rem = idx % sz;
        let y = rem / sy;
        let x = rem % sy;
        (x as i32 - 1, y as i32 - 1, z as i32 - 1)
    }

    /// Check that a coordinate addresses stored memory.
    #[inline]
    pub fn contains(&self, x: i32, y: i32, z: i32) -> bool {
        let hi = |n: usize| n as i32 + self.extra as i32;
        x >= -1 && x <= hi(self.nx) && y >= -1 && y <= hi(self.ny) && z >= -1 && z <= hi(self.nz)
    }

    /// Check that a cell-centered coordinate is a physical (non-ghost) cell.
    #[inline]
    pub fn is_interior(&self, x: i32, y: i32, z: i32) -> bool {
        x >= 0
            && x < self.nx as i32
            && y >= 0
            && y < self.ny as i32
            && z >= 0
            && z < self.nz as i32
    }
}

/// Regular axis-aligned fluid grid. Immutable for the duration of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid3D {
    /// Number of cells in X direction
    pub nx: usize,
    /// Number of cells in Y direction
    pub ny: usize,
    /// Number of cells in Z direction
    pub nz: usize,
    /// Physical extent along X (m)
    pub lx: f64,
    /// Physical extent along Y (m)
    pub ly: f64,
    /// Physical extent along Z (m)
    pub lz: f64,
    /// Cell size along X (m)
    pub dx: f64,
    /// Cell size along Y (m)
    pub dy: f64,
    /// Cell size along Z (m)
    pub dz: f64,
}

impl Grid3D {
    /// Create a grid of `cells` cells spanning `extent` metres.
    pub fn new(cells: [usize; 3], extent: [f64; 3]) -> FluidResult<Self> {
        if cells.iter().any(|&n| n == 0) {
            return Err(FluidError::invalid_grid(format!(
                "every axis needs at least one cell, got {:?}",
                cells
            )));
        }
        if extent.iter().any(|&l| !(l.is_finite() && l > 0.0)) {
            return Err(FluidError::invalid_grid(format!(
                "extents must be finite and positive, got {:?}",
                extent
            )));
        }
        if i32::try_from(cells[0] + 3).is_err()
            || i32::try_from(cells[1] + 3).is_err()
            || i32::try_from(cells[2] + 3).is_err()
        {
            return Err(FluidError::invalid_grid("too many cells along one axis"));
        }

        let [nx, ny, nz] = cells;
        let [lx, ly, lz] = extent;
        Ok(Self {
            nx,
            ny,
            nz,
            lx,
            ly,
            lz,
            dx: lx / nx as f64,
            dy: ly / ny as f64,
            dz: lz / nz as f64,
        })
    }

    /// Grid with `n` cubic cells of edge `cell_size` along every axis.
    pub fn cubic(n: usize, cell_size: f64) -> FluidResult<Self> {
        let l = n as f64 * cell_size;
        Self::new([n, n, n], [l, l, l])
    }

    /// Layout of cell-centered fields.
    #[inline]
    pub fn cell_layout(&self) -> Layout {
        Layout {
            nx: self.nx,
            ny: self.ny,
            nz: self.nz,
            extra: 0,
        }
    }

    /// Layout of staggered face fields (congruent padding).
    #[inline]
    pub fn face_layout(&self) -> Layout {
        Layout {
            nx: self.nx,
            ny: self.ny,
            nz: self.nz,
            extra: 1,
        }
    }

    // ========== Counts ==========

    /// Number of cell-centered values including ghosts: (nx+2)(ny+2)(nz+2).
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cell_layout().len()
    }

    /// Number of face values per axis including ghosts: (nx+3)(ny+3)(nz+3).
    #[inline]
    pub fn face_count(&self) -> usize {
        self.face_layout().len()
    }

    /// Number of physical cells.
    #[inline]
    pub fn interior_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    // ========== Index functions ==========

    /// Cell-centered index; ghost nodes sit at -1 and n.
    #[inline]
    pub fn index(&self, x: i32, y: i32, z: i32) -> usize {
        self.cell_layout().index(x, y, z)
    }

    /// Inverse of [`Grid3D::index`].
    #[inline]
    pub fn coords(&self, idx: usize) -> (i32, i32, i32) {
        self.cell_layout().coords(idx)
    }

    /// Face index; faces run over [-1, n+1].
    #[inline]
    pub fn face_index(&self, x: i32, y: i32, z: i32) -> usize {
        self.face_layout().index(x, y, z)
    }

    /// Inverse of [`Grid3D::face_index`].
    #[inline]
    pub fn face_coords(&self, idx: usize) -> (i32, i32, i32) {
        self.face_layout().coords(idx)
    }

    /// Ghost-free index used by the neighbor-search start/end tables.
    #[inline]
    pub fn sorted_cell_index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.nx * y + self.nx * self.ny * z
    }

    /// Whether `(x, y, z)` is a physical cell.
    #[inline]
    pub fn is_interior(&self, x: i32, y: i32, z: i32) -> bool {
        self.cell_layout().is_interior(x, y, z)
    }

    // ========== Geometry ==========

    /// Cell sizes as a vector.
    #[inline]
    pub fn spacing(&self) -> DVec3 {
        DVec3::new(self.dx, self.dy, self.dz)
    }

    /// Physical extents as a vector.
    #[inline]
    pub fn extent(&self) -> DVec3 {
        DVec3::new(self.lx, self.ly, self.lz)
    }

    /// Smallest cell edge.
    #[inline]
    pub fn dmin(&self) -> f64 {
        self.dx.min(self.dy.min(self.dz))
    }

    /// Cell volume.
    #[inline]
    pub fn cell_volume(&self) -> f64 {
        self.dx * self.dy * self.dz
    }

    /// World position of the centroid of cell `(x, y, z)`.
    #[inline]
    pub fn cell_center(&self, x: i32, y: i32, z: i32) -> DVec3 {
        DVec3::new(
            (x as f64 + 0.5) * self.dx,
            (y as f64 + 0.5) * self.dy,
            (z as f64 + 0.5) * self.dz,
        )
    }

    /// Convert world position to cell indices (floored, unclamped).
    #[inline]
    pub fn world_to_cell(&self, pos: DVec3) -> (i32, i32, i32) {
        let cell = pos / self.spacing();
        (
            cell.x.floor() as i32,
            cell.y.floor() as i32,
            cell.z.floor() as i32,
        )
    }

    /// Like [`Grid3D::world_to_cell`] but clamped into the interior.
    #[inline]
    pub fn world_to_interior_cell(&self, pos: DVec3) -> (i32, i32, i32) {
        let (x, y, z) = self.world_to_cell(pos);
        (
            x.clamp(0, self.nx as i32 - 1),
            y.clamp(0, self.ny as i32 - 1),
            z.clamp(0, self.nz as i32 - 1),
        )
    }

    /// Iterate over all interior coordinates, x fastest.
    pub fn interior_cells(&self) -> impl Iterator<Item = (i32, i32, i32)> + '_ {
        (0..self.nz as i32).flat_map(move |z| {
            (0..self.ny as i32).flat_map(move |y| (0..self.nx as i32).map(move |x| (x, y, z)))
        })
    }
}
