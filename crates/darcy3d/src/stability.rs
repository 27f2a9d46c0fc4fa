//! Explicit-scheme stability checks run before every fluid step.

use rayon::prelude::*;

use crate::constants::{MAX_COURANT_NUMBER, MAX_DIFFUSION_NUMBER};
use crate::error::{FluidError, FluidResult};
use crate::field::VectorField;
use crate::grid::Grid3D;
use crate::params::FluidParams;

/// Von Neumann number `nu dt / dmin^2` of the diffusion term.
///
/// Uses the kinematic viscosity `nu = mu / rho`, the coefficient the
/// predictor actually diffuses momentum with, not the dynamic viscosity.
pub fn diffusion_number(grid: &Grid3D, params: &FluidParams) -> f64 {
    let dmin = grid.dmin();
    params.kinematic_viscosity() * params.dt_eff() / (dmin * dmin)
}

/// Largest Courant number `|vx| dt/dx + |vy| dt/dy + |vz| dt/dz` and the cell
/// where it occurs.
pub fn max_courant_number(grid: &Grid3D, v: &VectorField, dt: f64) -> (f64, (i32, i32, i32)) {
    let inv = grid.spacing().recip() * dt;
    let layout = grid.cell_layout();
    v.as_slice()
        .par_iter()
        .enumerate()
        .filter_map(|(idx, vel)| {
            let (x, y, z) = layout.coords(idx);
            layout
                .is_interior(x, y, z)
                .then(|| (vel.abs().dot(inv), (x, y, z)))
        })
        .reduce(
            || (0.0, (0, 0, 0)),
            |a, b| {
                // Ties resolve to the lower cell so the report is deterministic
                if b.0 > a.0 || (b.0 == a.0 && (b.1 .2, b.1 .1, b.1 .0) < (a.1 .2, a.1 .1, a.1 .0)) {
                    b
                } else {
                    a
                }
            },
        )
}

/// Reject a step whose explicit terms would be unstable.
pub fn check_stability(grid: &Grid3D, params: &FluidParams, v: &VectorField) -> FluidResult<()> {
    let dt = params.dt_eff();
    let number = diffusion_number(grid, params);
    if number > MAX_DIFFUSION_NUMBER {
        return Err(FluidError::DiffusionUnstable {
            dt,
            kinematic_viscosity: params.kinematic_viscosity(),
            dmin: grid.dmin(),
            number,
        });
    }

    let (courant, (x, y, z)) = max_courant_number(grid, v, dt);
    if courant > MAX_COURANT_NUMBER {
        let vel = v.at(x, y, z);
        return Err(FluidError::CflViolation {
            x,
            y,
            z,
            vx: vel.x,
            vy: vel.y,
            vz: vel.z,
            dt,
            courant,
        });
    }
    Ok(())
}
