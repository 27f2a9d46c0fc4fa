//! Particle data handed over by the DEM neighbor search.
//!
//! The fluid solver never owns particles. It borrows the cell-sorted arrays
//! produced by the spatial hash and writes forces back through the mapping to
//! the original particle identity.

use glam::{DVec3, DVec4};

use crate::constants::EMPTY_CELL;
use crate::error::{FluidError, FluidResult};
use crate::grid::Grid3D;

/// Read-only view of cell-sorted particles.
///
/// `cell_start[c]..cell_end[c]` is the range of sorted particles in the
/// interior cell with [`Grid3D::sorted_cell_index`] `c`; `cell_start[c] ==
/// EMPTY_CELL` marks an empty cell.
#[derive(Clone, Copy, Debug)]
pub struct SortedParticles<'a> {
    /// Position (xyz) and radius (w), sorted by cell
    pub pos_radius: &'a [DVec4],
    /// Velocity, same order as `pos_radius`
    pub velocity: &'a [DVec3],
    /// First sorted index per cell
    pub cell_start: &'a [u32],
    /// One past the last sorted index per cell
    pub cell_end: &'a [u32],
    /// Sorted index to original particle index
    pub original_index: &'a [u32],
}

impl<'a> SortedParticles<'a> {
    /// Wrap the arrays after checking their lengths against the grid.
    pub fn new(
        grid: &Grid3D,
        pos_radius: &'a [DVec4],
        velocity: &'a [DVec3],
        cell_start: &'a [u32],
        cell_end: &'a [u32],
        original_index: &'a [u32],
    ) -> FluidResult<Self> {
        let view = Self {
            pos_radius,
            velocity,
            cell_start,
            cell_end,
            original_index,
        };
        view.validate(grid)?;
        Ok(view)
    }

    /// Check array lengths against the grid, every non-empty cell range
    /// against the particle count and every original index against it too.
    ///
    /// Empty cell tables are accepted: no particle is then visible to the
    /// porosity estimate.
    pub fn validate(&self, grid: &Grid3D) -> FluidResult<()> {
        let np = self.pos_radius.len();
        let check = |array: &'static str, expected: usize, actual: usize| {
            if expected == actual {
                Ok(())
            } else {
                Err(FluidError::ParticleArrays {
                    array,
                    expected,
                    actual,
                })
            }
        };
        check("velocity", np, self.velocity.len())?;
        check("original_index", np, self.original_index.len())?;
        if self.cell_start.is_empty() && self.cell_end.is_empty() {
            return Ok(());
        }
        check("cell_start", grid.interior_count(), self.cell_start.len())?;
        check("cell_end", grid.interior_count(), self.cell_end.len())?;

        let out_of_range = |array, index, value: u32, limit| FluidError::ParticleIndex {
            array,
            index,
            value: value as usize,
            limit,
        };
        for (c, (&start, &end)) in self.cell_start.iter().zip(self.cell_end).enumerate() {
            if start == EMPTY_CELL {
                continue;
            }
            if end as usize > np {
                return Err(out_of_range("cell_end", c, end, np));
            }
            if start > end {
                return Err(out_of_range("cell_start", c, start, end as usize));
            }
        }
        if let Some(j) = self.original_index.iter().position(|&id| id as usize >= np) {
            return Err(out_of_range("original_index", j, self.original_index[j], np));
        }
        Ok(())
    }

    /// A view with no particles.
    pub fn empty() -> Self {
        Self {
            pos_radius: &[],
            velocity: &[],
            cell_start: &[],
            cell_end: &[],
            original_index: &[],
        }
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.pos_radius.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.pos_radius.is_empty()
    }

    /// Sorted index range of the particles in interior cell `(x, y, z)`.
    #[inline]
    pub fn cell_range(&self, grid: &Grid3D, x: usize, y: usize, z: usize) -> std::ops::Range<usize> {
        if self.cell_start.is_empty() {
            return 0..0;
        }
        let c = grid.sorted_cell_index(x, y, z);
        let start = self.cell_start[c];
        if start == EMPTY_CELL {
            return 0..0;
        }
        start as usize..self.cell_end[c] as usize
    }

    /// Position of sorted particle `i`.
    #[inline]
    pub fn position(&self, i: usize) -> DVec3 {
        self.pos_radius[i].truncate()
    }

    /// Radius of sorted particle `i`.
    #[inline]
    pub fn radius(&self, i: usize) -> f64 {
        self.pos_radius[i].w
    }
}

/// Owned cell-sorted particle arrays.
///
/// Stands in for the neighbor search in tests and demos: counting sort by
/// cell, the way the DEM side builds its tables.
#[derive(Clone, Debug, Default)]
pub struct ParticleSort {
    pub pos_radius: Vec<DVec4>,
    pub velocity: Vec<DVec3>,
    pub cell_start: Vec<u32>,
    pub cell_end: Vec<u32>,
    pub original_index: Vec<u32>,
}

impl ParticleSort {
    /// Sort particles into grid cells. Positions outside the grid are clamped
    /// into the nearest boundary cell.
    pub fn build(grid: &Grid3D, pos_radius: &[DVec4], velocity: &[DVec3]) -> Self {
        let cells = grid.interior_count();
        let cell_of = |p: &DVec4| {
            let (x, y, z) = grid.world_to_interior_cell(p.truncate());
            grid.sorted_cell_index(x as usize, y as usize, z as usize)
        };

        let mut counts = vec![0u32; cells];
        for p in pos_radius {
            counts[cell_of(p)] += 1;
        }

        let mut cell_start = vec![EMPTY_CELL; cells];
        let mut cell_end = vec![EMPTY_CELL; cells];
        let mut offset = 0u32;
        for (c, &n) in counts.iter().enumerate() {
            if n > 0 {
                cell_start[c] = offset;
                cell_end[c] = offset + n;
            }
            offset += n;
        }

        let mut cursor: Vec<u32> = cell_start.clone();
        let mut sorted_pos = vec![DVec4::ZERO; pos_radius.len()];
        let mut sorted_vel = vec![DVec3::ZERO; pos_radius.len()];
        let mut original_index = vec![0u32; pos_radius.len()];
        for (i, p) in pos_radius.iter().enumerate() {
            let c = cell_of(p);
            let slot = cursor[c] as usize;
            cursor[c] += 1;
            sorted_pos[slot] = *p;
            sorted_vel[slot] = velocity.get(i).copied().unwrap_or(DVec3::ZERO);
            original_index[slot] = i as u32;
        }

        Self {
            pos_radius: sorted_pos,
            velocity: sorted_vel,
            cell_start,
            cell_end,
            original_index,
        }
    }

    /// Borrow as the view the solver consumes.
    pub fn view(&self) -> SortedParticles<'_> {
        SortedParticles {
            pos_radius: &self.pos_radius,
            velocity: &self.velocity,
            cell_start: &self.cell_start,
            cell_end: &self.cell_end,
            original_index: &self.original_index,
        }
    }
}
