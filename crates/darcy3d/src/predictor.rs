//! Provisional velocity from the explicit momentum terms.

use glam::DVec3;

use crate::boundary::BoundaryCondition;
use crate::constants::MIN_POROSITY;
use crate::field::{ScalarField, VectorField};
use crate::grid::Grid3D;
use crate::params::FluidParams;

/// Fields read by the predictor. All ghosts must be current.
pub struct PredictorInputs<'a> {
    pub v: &'a VectorField,
    pub p: &'a ScalarField,
    pub phi: &'a ScalarField,
    pub dphi: &'a ScalarField,
    /// Interaction force density from the previous step
    pub fi: &'a VectorField,
    pub div_phi_tau: &'a VectorField,
    pub div_phi_vi_v: &'a VectorField,
}

/// Predicted velocity at one interior cell.
#[inline]
pub fn predict_at(
    grid: &Grid3D,
    params: &FluidParams,
    inputs: &PredictorInputs<'_>,
    x: i32,
    y: i32,
    z: i32,
) -> DVec3 {
    let dt = params.dt_eff();
    let rho = params.density;
    let phi = inputs.phi.at(x, y, z).max(MIN_POROSITY);
    let v = inputs.v.at(x, y, z);

    let pressure_term = if params.beta > 0.0 {
        -params.beta * inputs.p.gradient(grid, x, y, z) * dt / (rho * phi)
    } else {
        DVec3::ZERO
    };
    let diffusion_term = inputs.div_phi_tau.at(x, y, z) * dt / (rho * phi);
    let gravity_term = params.gravity * dt;
    let drag_term = inputs.fi.at(x, y, z) * dt / (rho * phi);
    let porosity_rate_term = v * inputs.dphi.at(x, y, z) / phi;
    let advection_term = inputs.div_phi_vi_v.at(x, y, z) * dt / phi;

    v + pressure_term + diffusion_term + gravity_term
        - drag_term
        - porosity_rate_term
        - advection_term
}

/// Fill `v_p` in every interior cell.
///
/// On a Neumann z face the normal component of the adjacent interior layer
/// keeps its old value.
pub fn predict_velocity(
    grid: &Grid3D,
    params: &FluidParams,
    inputs: &PredictorInputs<'_>,
    v_p: &mut VectorField,
) {
    v_p.par_update_interior(|x, y, z| predict_at(grid, params, inputs, x, y, z));

    let top = grid.nz as i32 - 1;
    let mut hold_normal = |z: i32| {
        for y in 0..grid.ny as i32 {
            for x in 0..grid.nx as i32 {
                let mut value = v_p.at(x, y, z);
                value.z = inputs.v.at(x, y, z).z;
                v_p.set(x, y, z, value);
            }
        }
    };
    if params.bc_bottom == BoundaryCondition::Neumann {
        hold_normal(0);
    }
    if params.bc_top == BoundaryCondition::Neumann {
        hold_normal(top);
    }
}
