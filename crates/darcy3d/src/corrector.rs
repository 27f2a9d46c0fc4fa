//! Final velocity and pressure from the converged correction.

use rayon::prelude::*;

use crate::constants::MIN_POROSITY;
use crate::field::{ScalarField, VectorField};
use crate::grid::Grid3D;
use crate::params::FluidParams;

/// `p = beta p + eps` and `v = v_p - dt grad(eps) / (rho phi)` in every
/// interior cell. Ghosts of `eps` must be current; ghosts of `p` and `v` are
/// left for the caller to refresh.
pub fn correct(
    grid: &Grid3D,
    params: &FluidParams,
    eps: &ScalarField,
    phi: &ScalarField,
    v_p: &VectorField,
    p: &mut ScalarField,
    v: &mut VectorField,
) {
    let dt = params.dt_eff();
    let rho = params.density;
    let beta = params.beta;
    let layout = grid.cell_layout();

    (p.as_mut_slice(), v.as_mut_slice())
        .into_par_iter()
        .enumerate()
        .for_each(|(idx, (p, v))| {
            let (x, y, z) = layout.coords(idx);
            if !layout.is_interior(x, y, z) {
                return;
            }
            let phi_c = phi.at(x, y, z).max(MIN_POROSITY);
            *p = beta * *p + eps.at(x, y, z);
            *v = v_p.at(x, y, z) - eps.gradient(grid, x, y, z) * dt / (rho * phi_c);
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    #[test]
    fn test_linear_correction() {
        let grid = Grid3D::cubic(4, 0.5).unwrap();
        let params = FluidParams {
            density: 2.0,
            dt: 0.1,
            beta: 0.5,
            ..FluidParams::default()
        };
        let mut eps = ScalarField::cell_centered("eps", &grid, 0.0).unwrap();
        for idx in 0..eps.len() {
            let (x, y, z) = grid.coords(idx);
            eps.as_mut_slice()[idx] = 4.0 * grid.cell_center(x, y, z).z;
        }
        let phi = ScalarField::cell_centered("phi", &grid, 0.5).unwrap();
        let v_p = VectorField::cell_centered("v_p", &grid, DVec3::new(1.0, 0.0, 0.0)).unwrap();
        let mut p = ScalarField::cell_centered("p", &grid, 2.0).unwrap();
        let mut v = VectorField::cell_centered("v", &grid, DVec3::ZERO).unwrap();

        correct(&grid, &params, &eps, &phi, &v_p, &mut p, &mut v);

        let (x, y, z) = (1, 2, 2);
        assert!((p.at(x, y, z) - (1.0 + eps.at(x, y, z))).abs() < 1e-12);
        // dv_z = -0.1 * 4 / (2 * 0.5)
        let got = v.at(x, y, z);
        assert!((got - DVec3::new(1.0, 0.0, -0.4)).length() < 1e-12, "got {got}");
        // Ghosts untouched
        assert_eq!(p.at(-1, 0, 0), 2.0);
        assert_eq!(v.at(0, 0, 4), DVec3::ZERO);
    }
}
