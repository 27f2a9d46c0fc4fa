//! Staggered (MAC) face velocities.
//!
//! Face fields use the congruently padded layout: face `(x, y, z)` of the u
//! array sits on the low-x side of cell `(x, y, z)`, and likewise for v (low
//! y) and w (low z).

use crate::error::FluidResult;
use crate::field::{ScalarField, VectorField};
use crate::grid::Grid3D;

/// Normal velocity on every cell face.
#[derive(Clone, Debug)]
pub struct FaceVelocity {
    /// X-velocity on x-faces
    pub u: ScalarField,
    /// Y-velocity on y-faces
    pub v: ScalarField,
    /// Z-velocity on z-faces
    pub w: ScalarField,
}

impl FaceVelocity {
    pub fn new(grid: &Grid3D) -> FluidResult<Self> {
        Ok(Self {
            u: ScalarField::face_centered("u", grid, 0.0)?,
            v: ScalarField::face_centered("v", grid, 0.0)?,
            w: ScalarField::face_centered("w", grid, 0.0)?,
        })
    }

    /// Interpolate a cell-centered velocity onto faces by averaging the two
    /// cells sharing each face. Velocity ghosts must be current.
    pub fn from_cell_centered(grid: &Grid3D, vel: &VectorField) -> FluidResult<Self> {
        let mut faces = Self::new(grid)?;
        faces.interpolate(grid, vel);
        Ok(faces)
    }

    /// Refill from a cell-centered velocity.
    pub fn interpolate(&mut self, grid: &Grid3D, vel: &VectorField) {
        let (nx, ny, nz) = (grid.nx as i32, grid.ny as i32, grid.nz as i32);

        for z in 0..nz {
            for y in 0..ny {
                for x in 0..=nx {
                    let u = 0.5 * (vel.at(x - 1, y, z).x + vel.at(x, y, z).x);
                    self.u.set(x, y, z, u);
                }
            }
        }

        for z in 0..nz {
            for y in 0..=ny {
                for x in 0..nx {
                    let v = 0.5 * (vel.at(x, y - 1, z).y + vel.at(x, y, z).y);
                    self.v.set(x, y, z, v);
                }
            }
        }

        for z in 0..=nz {
            for y in 0..ny {
                for x in 0..nx {
                    let w = 0.5 * (vel.at(x, y, z - 1).z + vel.at(x, y, z).z);
                    self.w.set(x, y, z, w);
                }
            }
        }
    }

    /// Net outflow per unit volume of cell `(x, y, z)`.
    #[inline]
    pub fn divergence(&self, grid: &Grid3D, x: i32, y: i32, z: i32) -> f64 {
        (self.u.at(x + 1, y, z) - self.u.at(x, y, z)) / grid.dx
            + (self.v.at(x, y + 1, z) - self.v.at(x, y, z)) / grid.dy
            + (self.w.at(x, y, z + 1) - self.w.at(x, y, z)) / grid.dz
    }

    /// Largest absolute face divergence over the interior.
    pub fn max_divergence(&self, grid: &Grid3D) -> f64 {
        grid.interior_cells()
            .map(|(x, y, z)| self.divergence(grid, x, y, z).abs())
            .fold(0.0, f64::max)
    }
}
