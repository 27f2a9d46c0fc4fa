//! Porosity-weighted momentum flux divergence.
//!
//! Component i of the result is `div(phi v_i v) = sum_j d(phi v_i v_j)/dx_j`,
//! evaluated with central differences on the cell-centered velocity.

use glam::DVec3;

use crate::field::{ScalarField, VectorField};
use crate::grid::Grid3D;

/// `div(phi v_i v)` at an interior cell.
#[inline]
pub fn div_phi_vi_v_at(
    grid: &Grid3D,
    phi: &ScalarField,
    v: &VectorField,
    x: i32,
    y: i32,
    z: i32,
) -> DVec3 {
    // phi * v_j * v, the flux of momentum through faces normal to axis j
    let flux = |j: usize, x: i32, y: i32, z: i32| {
        let vel = v.at(x, y, z);
        vel * (phi.at(x, y, z) * vel[j])
    };
    (flux(0, x + 1, y, z) - flux(0, x - 1, y, z)) / (2.0 * grid.dx)
        + (flux(1, x, y + 1, z) - flux(1, x, y - 1, z)) / (2.0 * grid.dy)
        + (flux(2, x, y, z + 1) - flux(2, x, y, z - 1)) / (2.0 * grid.dz)
}

/// Fill `out` with `div(phi v_i v)`. Ghosts of `phi` and `v` must be current.
pub fn compute_div_phi_vi_v(
    grid: &Grid3D,
    phi: &ScalarField,
    v: &VectorField,
    out: &mut VectorField,
) {
    out.par_update_interior(|x, y, z| div_phi_vi_v_at(grid, phi, v, x, y, z));
}
