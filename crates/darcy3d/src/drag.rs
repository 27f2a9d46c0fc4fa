//! Fluid-particle interaction force.
//!
//! The momentum exchange coefficient `beta` comes from the Ergun correlation
//! in packed regions and the Wen-Yu correlation in dilute ones. The cell
//! force density `fi = beta (v_fluid - vp_avg)` slows the fluid in the next
//! predictor step, and each particle receives its share plus the pressure
//! gradient force.

use std::f64::consts::PI;

use glam::DVec3;
use rayon::prelude::*;

use crate::constants::{
    DRAG_BLEND_STEEPNESS, EMPTY_CELL_POROSITY, ERGUN_POROSITY_LIMIT, MIN_POROSITY,
    NEWTON_DRAG_COEFFICIENT, NEWTON_REGIME_REYNOLDS, WEN_YU_EXPONENT,
};
use crate::error::{FluidError, FluidResult};
use crate::field::{ScalarField, VectorField};
use crate::grid::Grid3D;
use crate::params::{DragModel, FluidParams};
use crate::particle::SortedParticles;
use crate::porosity::sphere_volume;

/// Fluid properties and local state entering the drag correlations.
#[derive(Clone, Copy, Debug)]
pub struct DragState {
    /// Porosity
    pub phi: f64,
    /// Fluid density (kg/m³)
    pub rho: f64,
    /// Dynamic viscosity (Pa·s)
    pub mu: f64,
    /// Mean particle diameter (m)
    pub diameter: f64,
    /// Magnitude of the fluid velocity relative to the particles (m/s)
    pub speed: f64,
}

impl DragState {
    /// Particle Reynolds number `phi rho |v_rel| d / mu`.
    #[inline]
    pub fn reynolds(&self) -> f64 {
        self.phi.max(MIN_POROSITY) * self.rho * self.speed * self.diameter / self.mu
    }
}

/// Single-sphere drag coefficient (Schiller-Naumann, constant above Re = 1000).
#[inline]
pub fn drag_coefficient(re: f64) -> f64 {
    if re >= NEWTON_REGIME_REYNOLDS {
        NEWTON_DRAG_COEFFICIENT
    } else {
        24.0 / re * (1.0 + 0.15 * re.powf(0.687))
    }
}

/// Ergun momentum exchange coefficient for packed beds.
#[inline]
pub fn ergun(s: &DragState) -> f64 {
    let phi = s.phi.max(MIN_POROSITY);
    let solid = 1.0 - s.phi;
    150.0 * s.mu * solid * solid / (phi * s.diameter * s.diameter)
        + 1.75 * s.rho * solid * s.speed / s.diameter
}

/// Wen-Yu momentum exchange coefficient for dilute suspensions.
#[inline]
pub fn wen_yu(s: &DragState) -> f64 {
    if s.speed <= 0.0 {
        return 0.0;
    }
    let phi = s.phi.max(MIN_POROSITY);
    let cd = drag_coefficient(s.reynolds());
    0.75 * cd * s.rho * phi * (1.0 - s.phi) * s.speed / s.diameter * phi.powf(WEN_YU_EXPONENT)
}

/// Weight of the Ergun branch in the blended model.
///
/// `0.5 + atan(262.5 (phi_s - 0.2)) / pi` with solid fraction `phi_s = 1 - phi`:
/// one half at `phi = 0.8`, tending to one in packed beds.
#[inline]
pub fn ergun_weight(phi: f64) -> f64 {
    0.5 + (DRAG_BLEND_STEEPNESS * ((1.0 - phi) - (1.0 - ERGUN_POROSITY_LIMIT))).atan() / PI
}

/// Momentum exchange coefficient `beta` (kg/m³/s).
///
/// Zero in particle-free cells, for zero relative speed and for
/// degenerate diameters.
pub fn exchange_coefficient(model: DragModel, s: &DragState) -> f64 {
    if s.phi >= EMPTY_CELL_POROSITY || s.speed <= 0.0 || s.diameter <= 0.0 {
        return 0.0;
    }
    match model {
        DragModel::Switched => {
            if s.phi <= ERGUN_POROSITY_LIMIT {
                ergun(s)
            } else {
                wen_yu(s)
            }
        }
        DragModel::Blended => {
            let w = ergun_weight(s.phi);
            w * ergun(s) + (1.0 - w) * wen_yu(s)
        }
    }
}

/// Interaction force density `beta v_rel` at one cell.
#[inline]
pub fn interaction_force_density(
    params: &FluidParams,
    phi: f64,
    v_fluid: DVec3,
    vp_avg: DVec3,
    d_avg: f64,
) -> DVec3 {
    // Particle-free cells carry no meaningful particle velocity
    let vp = if phi >= EMPTY_CELL_POROSITY { v_fluid } else { vp_avg };
    let v_rel = v_fluid - vp;
    let state = DragState {
        phi,
        rho: params.density,
        mu: params.viscosity,
        diameter: d_avg,
        speed: v_rel.length(),
    };
    v_rel * exchange_coefficient(params.drag, &state)
}

/// Fill `fi` with the interaction force density of every interior cell.
pub fn compute_interaction_force(
    params: &FluidParams,
    phi: &ScalarField,
    v: &VectorField,
    vp_avg: &VectorField,
    d_avg: &ScalarField,
    fi: &mut VectorField,
) {
    fi.par_update_interior(|x, y, z| {
        interaction_force_density(
            params,
            phi.at(x, y, z),
            v.at(x, y, z),
            vp_avg.at(x, y, z),
            d_avg.at(x, y, z),
        )
    });
}

/// Force on sorted particle `j`: `V_j (fi / (1 - phi) - grad p)` in its cell.
#[inline]
pub fn particle_force(
    grid: &Grid3D,
    particles: &SortedParticles<'_>,
    phi: &ScalarField,
    fi: &VectorField,
    p: &ScalarField,
    j: usize,
) -> DVec3 {
    let (x, y, z) = grid.world_to_interior_cell(particles.position(j));
    let volume = sphere_volume(particles.radius(j));
    let solid = (1.0 - phi.at(x, y, z)).max(MIN_POROSITY);
    volume * (fi.at(x, y, z) / solid - p.gradient(grid, x, y, z))
}

/// Add the fluid force on every particle to `external_force`, indexed by the
/// particle's original identity. Pressure ghosts must be current.
pub fn apply_particle_forces(
    grid: &Grid3D,
    particles: &SortedParticles<'_>,
    phi: &ScalarField,
    fi: &VectorField,
    p: &ScalarField,
    external_force: &mut [DVec3],
) -> FluidResult<()> {
    let forces: Vec<DVec3> = (0..particles.len())
        .into_par_iter()
        .map(|j| particle_force(grid, particles, phi, fi, p, j))
        .collect();

    let available = external_force.len();
    for (j, force) in forces.into_iter().enumerate() {
        let id = particles.original_index[j] as usize;
        let slot = external_force
            .get_mut(id)
            .ok_or(FluidError::ParticleArrays {
                array: "external_force",
                expected: id + 1,
                actual: available,
            })?;
        *slot += force;
    }
    Ok(())
}
