//! Porosity and particle-coupling estimate per fluid cell.
//!
//! Two estimators exist and a run uses exactly one of them, chosen by
//! [`PorosityModel`]:
//!
//! - **Spherical**: every cell gets a spherical support region around its
//!   centroid and the solid volume inside it is measured geometrically,
//!   using the analytic lens volume for partially overlapping particles.
//! - **Kernel strain rate**: porosity is initialized geometrically and then
//!   advanced by the divergence of the solid flux, estimated with a smooth
//!   B-spline kernel over the neighboring particle velocities.

use std::f64::consts::PI;

use glam::DVec3;
use rayon::prelude::*;

use crate::error::FluidResult;
use crate::field::{ScalarField, VectorField};
use crate::grid::Grid3D;
use crate::kernels::{kernel_3d, kernel_3d_gradient};
use crate::params::PorosityModel;
use crate::particle::SortedParticles;

/// Volume of a sphere.
#[inline]
pub fn sphere_volume(r: f64) -> f64 {
    4.0 / 3.0 * PI * r * r * r
}

/// Volume shared by two spheres of radii `r1` and `r2` whose centers are `d`
/// apart.
pub fn sphere_overlap_volume(r1: f64, r2: f64, d: f64) -> f64 {
    if d >= r1 + r2 {
        0.0
    } else if d <= (r1 - r2).abs() {
        sphere_volume(r1.min(r2))
    } else {
        let s = r1 + r2 - d;
        PI * s * s * (d * d + 2.0 * d * (r1 + r2) - 3.0 * (r1 * r1 + r2 * r2) + 6.0 * r1 * r2)
            / (12.0 * d)
    }
}

/// Output buffers of one porosity estimate.
pub struct CouplingFields<'a> {
    /// Void fraction, in [0, 1]
    pub phi: &'a mut ScalarField,
    /// Porosity change over the fluid step
    pub dphi: &'a mut ScalarField,
    /// Mean velocity of the particles near the cell
    pub vp_avg: &'a mut VectorField,
    /// Mean diameter of the particles near the cell
    pub d_avg: &'a mut ScalarField,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct CellCoupling {
    phi: f64,
    dphi: f64,
    vp_avg: DVec3,
    d_avg: f64,
}

impl CellCoupling {
    /// Pure fluid: no particle reaches the cell.
    const VOID: Self = Self {
        phi: 1.0,
        dphi: 0.0,
        vp_avg: DVec3::ZERO,
        d_avg: 0.0,
    };
}

/// Visit every particle image in the `(2*half+1)^3` block of cells around
/// `(x, y, z)`, wrapping periodically in x and y (and z when `periodic_z`).
/// `f` receives the sorted index and the image position.
fn for_each_neighbor<F>(
    grid: &Grid3D,
    particles: &SortedParticles<'_>,
    periodic_z: bool,
    (x, y, z): (i32, i32, i32),
    half: i32,
    mut f: F,
) where
    F: FnMut(usize, DVec3),
{
    let (nx, ny, nz) = (grid.nx as i32, grid.ny as i32, grid.nz as i32);
    for oz in -half..=half {
        let cz = z + oz;
        if !periodic_z && (cz < 0 || cz >= nz) {
            continue;
        }
        let (wz, shift_z) = (cz.rem_euclid(nz), cz.div_euclid(nz) as f64 * grid.lz);
        for oy in -half..=half {
            let cy = y + oy;
            let (wy, shift_y) = (cy.rem_euclid(ny), cy.div_euclid(ny) as f64 * grid.ly);
            for ox in -half..=half {
                let cx = x + ox;
                let (wx, shift_x) = (cx.rem_euclid(nx), cx.div_euclid(nx) as f64 * grid.lx);
                let shift = DVec3::new(shift_x, shift_y, shift_z);
                for i in particles.cell_range(grid, wx as usize, wy as usize, wz as usize) {
                    f(i, particles.position(i) + shift);
                }
            }
        }
    }
}

/// Geometric estimate in one cell. `phi_prev` is `None` on the first step.
fn spherical_cell(
    grid: &Grid3D,
    particles: &SortedParticles<'_>,
    periodic_z: bool,
    radius_factor: f64,
    cell: (i32, i32, i32),
    phi_prev: Option<f64>,
) -> CellCoupling {
    let support = radius_factor * grid.dmin();
    let support_volume = sphere_volume(support);
    let center = grid.cell_center(cell.0, cell.1, cell.2);
    let half = if radius_factor > 1.0 { 2 } else { 1 };

    let mut solid = 0.0;
    let mut v_sum = DVec3::ZERO;
    let mut d_sum = 0.0;
    let mut count = 0usize;

    for_each_neighbor(grid, particles, periodic_z, cell, half, |i, pos| {
        let r = particles.radius(i);
        let d = center.distance(pos);
        let overlap = sphere_overlap_volume(support, r, d);
        if overlap > 0.0 {
            solid += overlap;
            v_sum += particles.velocity[i];
            d_sum += 2.0 * r;
            count += 1;
        }
    });

    if count == 0 {
        return CellCoupling::VOID;
    }

    let phi = (1.0 - solid / support_volume).clamp(0.0, 1.0);
    CellCoupling {
        phi,
        dphi: phi_prev.map_or(0.0, |prev| phi - prev),
        vp_avg: v_sum / count as f64,
        d_avg: d_sum / count as f64,
    }
}

/// Incremental kernel estimate in one cell.
fn kernel_cell(
    grid: &Grid3D,
    particles: &SortedParticles<'_>,
    periodic_z: bool,
    dt: f64,
    cell: (i32, i32, i32),
    phi_prev: f64,
) -> CellCoupling {
    let h = grid.spacing();
    let center = grid.cell_center(cell.0, cell.1, cell.2);

    let mut weight = 0.0;
    let mut v_sum = DVec3::ZERO;
    let mut d_sum = 0.0;
    let mut flux_divergence = 0.0;
    let mut count = 0usize;

    for_each_neighbor(grid, particles, periodic_z, cell, 1, |i, pos| {
        let r = particles.radius(i);
        let volume = sphere_volume(r);
        let delta = center - pos;
        let w = volume * kernel_3d(delta, h);
        let v = particles.velocity[i];
        weight += w;
        v_sum += w * v;
        d_sum += w * 2.0 * r;
        flux_divergence += volume * v.dot(kernel_3d_gradient(delta, h));
        count += 1;
    });

    if count == 0 {
        return CellCoupling::VOID;
    }

    let phi = (phi_prev + dt * flux_divergence).clamp(0.0, 1.0);
    let (vp_avg, d_avg) = if weight > 0.0 {
        (v_sum / weight, d_sum / weight)
    } else {
        (DVec3::ZERO, 0.0)
    };
    CellCoupling {
        phi,
        dphi: phi - phi_prev,
        vp_avg,
        d_avg,
    }
}

/// Porosity estimator bound to one model for the whole run.
#[derive(Debug)]
pub struct PorosityEstimator {
    model: PorosityModel,
    /// Porosity of the previous step
    phi_prev: ScalarField,
    /// False until the first estimate
    initialized: bool,
}

impl PorosityEstimator {
    pub fn new(model: PorosityModel, grid: &Grid3D) -> FluidResult<Self> {
        Ok(Self {
            model,
            phi_prev: ScalarField::cell_centered("phi_prev", grid, 1.0)?,
            initialized: false,
        })
    }

    /// The model selected at construction.
    pub fn model(&self) -> PorosityModel {
        self.model
    }

    /// Whether no estimate has been made yet (the next one forces dphi = 0).
    pub fn is_first_step(&self) -> bool {
        !self.initialized
    }

    /// Estimate porosity, porosity change, mean particle velocity and mean
    /// particle diameter in every interior cell. Ghosts are left untouched.
    pub fn estimate(
        &mut self,
        grid: &Grid3D,
        particles: &SortedParticles<'_>,
        periodic_z: bool,
        dt: f64,
        out: CouplingFields<'_>,
    ) {
        self.phi_prev.copy_from(out.phi);
        let first = !self.initialized;
        let model = self.model;
        let layout = grid.cell_layout();
        let phi_prev = &self.phi_prev;

        (
            out.phi.as_mut_slice(),
            out.dphi.as_mut_slice(),
            out.vp_avg.as_mut_slice(),
            out.d_avg.as_mut_slice(),
        )
            .into_par_iter()
            .enumerate()
            .for_each(|(idx, (phi, dphi, vp_avg, d_avg))| {
                let (x, y, z) = layout.coords(idx);
                if !layout.is_interior(x, y, z) {
                    return;
                }
                let cell = (x, y, z);
                let prev = phi_prev.at(x, y, z);
                let sample = match (model, first) {
                    (PorosityModel::Spherical { radius_factor }, _) => spherical_cell(
                        grid,
                        particles,
                        periodic_z,
                        radius_factor,
                        cell,
                        (!first).then_some(prev),
                    ),
                    (PorosityModel::KernelStrainRate, true) => {
                        spherical_cell(grid, particles, periodic_z, 1.0, cell, None)
                    }
                    (PorosityModel::KernelStrainRate, false) => {
                        kernel_cell(grid, particles, periodic_z, dt, cell, prev)
                    }
                };
                *phi = sample.phi;
                *dphi = sample.dphi;
                *vp_avg = sample.vp_avg;
                *d_avg = sample.d_avg;
            });

        self.initialized = true;
    }
}
