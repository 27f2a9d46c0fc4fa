//! Viscous stress and its porosity-weighted divergence.

use glam::DVec3;

use crate::field::{ScalarField, SymTensor, TensorField, VectorField};
use crate::grid::Grid3D;

/// Newtonian viscous stress at an interior cell from central differences.
///
/// `tau_ii = 2 mu dv_i/dx_i`, `tau_ij = mu (dv_i/dx_j + dv_j/dx_i)`.
#[inline]
pub fn stress_at(grid: &Grid3D, v: &VectorField, mu: f64, x: i32, y: i32, z: i32) -> SymTensor {
    let ddx = (v.at(x + 1, y, z) - v.at(x - 1, y, z)) / (2.0 * grid.dx);
    let ddy = (v.at(x, y + 1, z) - v.at(x, y - 1, z)) / (2.0 * grid.dy);
    let ddz = (v.at(x, y, z + 1) - v.at(x, y, z - 1)) / (2.0 * grid.dz);

    SymTensor {
        xx: 2.0 * mu * ddx.x,
        xy: mu * (ddy.x + ddx.y),
        xz: mu * (ddz.x + ddx.z),
        yy: 2.0 * mu * ddy.y,
        yz: mu * (ddz.y + ddy.z),
        zz: 2.0 * mu * ddz.z,
    }
}

/// Fill `tau` in every interior cell. Velocity ghosts must be current.
pub fn compute_stress(grid: &Grid3D, v: &VectorField, mu: f64, tau: &mut TensorField) {
    tau.par_update_interior(|x, y, z| stress_at(grid, v, mu, x, y, z));
}

/// `div(phi tau)` at an interior cell; component i is `sum_j d(phi tau_ij)/dx_j`.
#[inline]
pub fn div_phi_tau_at(
    grid: &Grid3D,
    phi: &ScalarField,
    tau: &TensorField,
    x: i32,
    y: i32,
    z: i32,
) -> DVec3 {
    let row = |i: usize, x: i32, y: i32, z: i32| tau.at(x, y, z).row(i) * phi.at(x, y, z);
    (row(0, x + 1, y, z) - row(0, x - 1, y, z)) / (2.0 * grid.dx)
        + (row(1, x, y + 1, z) - row(1, x, y - 1, z)) / (2.0 * grid.dy)
        + (row(2, x, y, z + 1) - row(2, x, y, z - 1)) / (2.0 * grid.dz)
}

/// Fill `out` with `div(phi tau)`. Ghosts of `phi` and `tau` must be current.
pub fn compute_div_phi_tau(
    grid: &Grid3D,
    phi: &ScalarField,
    tau: &TensorField,
    out: &mut VectorField,
) {
    out.par_update_interior(|x, y, z| div_phi_tau_at(grid, phi, tau, x, y, z));
}
