//! Volume-averaged Navier-Stokes solver for fluid flow through particle beds.
//!
//! The fluid lives on a regular ghost-padded grid and sees the particles only
//! through a porosity field and a drag force. Each step predicts a velocity
//! from the explicit momentum terms, projects it with a Jacobi-relaxed
//! pressure correction and hands the resulting fluid force back to the
//! particles.
//!
//! # Example
//!
//! ```
//! use darcy3d::{FluidParams, FluidSolver3D, SortedParticles};
//! use glam::DVec3;
//!
//! let params = FluidParams {
//!     cells: [8, 8, 8],
//!     extent: [0.08, 0.08, 0.08],
//!     gravity: DVec3::ZERO,
//!     ..FluidParams::default()
//! };
//! let mut solver = FluidSolver3D::new(params).unwrap();
//!
//! // No particles: forces are only accumulated for particles that exist
//! let mut forces: Vec<DVec3> = Vec::new();
//! let report = solver.step(&SortedParticles::empty(), &mut forces).unwrap();
//! assert!(report.solver.is_converged());
//! ```

pub mod advection;
pub mod boundary;
pub mod constants;
pub mod corrector;
pub mod diagnostics;
pub mod drag;
pub mod error;
pub mod field;
pub mod grid;
pub mod kernels;
pub mod params;
pub mod particle;
pub mod porosity;
pub mod predictor;
pub mod pressure;
pub mod serde_utils;
pub mod stability;
pub mod staggered;
pub mod stress;

pub use boundary::{refresh_ghosts, BoundaryCondition, GhostRule, ZFaces};
pub use error::{FluidError, FluidResult};
pub use field::{Field, FieldValue, ScalarField, SymTensor, TensorField, VectorField};
pub use glam::{DVec3, DVec4};
pub use grid::{Grid3D, Layout};
pub use params::{ConvergenceNorm, DragModel, FluidParams, PorosityModel};
pub use particle::{ParticleSort, SortedParticles};
pub use porosity::PorosityEstimator;
pub use pressure::{PoissonSolver, SolverResult, SolverStatus};
pub use staggered::FaceVelocity;

use porosity::CouplingFields;
use predictor::PredictorInputs;
use pressure::ForcingInputs;

fn pressure_faces(params: &FluidParams) -> ZFaces<f64> {
    ZFaces::new(
        GhostRule::from_condition(params.bc_bottom, params.p_bottom),
        GhostRule::from_condition(params.bc_top, params.p_top),
    )
}

fn velocity_faces(params: &FluidParams) -> ZFaces<DVec3> {
    ZFaces::new(
        GhostRule::from_condition(params.bc_bottom, params.v_bottom),
        GhostRule::from_condition(params.bc_top, params.v_top),
    )
}

/// Mirrored rules for fields without boundary values of their own.
fn auxiliary_faces<T: Copy>(params: &FluidParams) -> ZFaces<T> {
    ZFaces::mirrored(params.bc_bottom, params.bc_top)
}

/// What one fluid step did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Simulation time at the end of the step (s)
    pub time: f64,
    /// Outcome of the pressure-correction solve
    pub solver: SolverResult,
    /// Largest interior velocity magnitude after correction (m/s)
    pub max_velocity: f64,
}

/// Fluid solver. Owns every field for the lifetime of the run.
pub struct FluidSolver3D {
    grid: Grid3D,
    params: FluidParams,

    /// Pressure (Pa)
    p: ScalarField,
    /// Velocity (m/s)
    v: VectorField,
    /// Predicted velocity before projection
    v_p: VectorField,

    /// Porosity
    phi: ScalarField,
    /// Porosity change over the last step
    dphi: ScalarField,
    /// Mean particle velocity per cell
    vp_avg: VectorField,
    /// Mean particle diameter per cell
    d_avg: ScalarField,
    /// Fluid-particle interaction force density
    fi: VectorField,

    tau: TensorField,
    div_phi_tau: VectorField,
    div_phi_vi_v: VectorField,

    porosity: PorosityEstimator,
    poisson: PoissonSolver,

    time: f64,
    steps: u64,
}

impl FluidSolver3D {
    /// Validate `params` and allocate every field.
    pub fn new(params: FluidParams) -> FluidResult<Self> {
        params.validate()?;
        let grid = Grid3D::new(params.cells, params.extent)?;

        log::info!(
            "fluid grid: {} x {} x {} cells ({} values per scalar field with ghosts)",
            grid.nx,
            grid.ny,
            grid.nz,
            grid.cell_count()
        );
        log::info!(
            "fluid cell size: dx = {:e} m, dy = {:e} m, dz = {:e} m",
            grid.dx,
            grid.dy,
            grid.dz
        );

        Ok(Self {
            p: ScalarField::cell_centered("pressure", &grid, 0.0)?,
            v: VectorField::cell_centered("velocity", &grid, DVec3::ZERO)?,
            v_p: VectorField::cell_centered("predicted_velocity", &grid, DVec3::ZERO)?,
            phi: ScalarField::cell_centered("porosity", &grid, 1.0)?,
            dphi: ScalarField::cell_centered("porosity_change", &grid, 0.0)?,
            vp_avg: VectorField::cell_centered("particle_velocity", &grid, DVec3::ZERO)?,
            d_avg: ScalarField::cell_centered("particle_diameter", &grid, 0.0)?,
            fi: VectorField::cell_centered("interaction_force", &grid, DVec3::ZERO)?,
            tau: TensorField::cell_centered("stress", &grid, SymTensor::ZERO)?,
            div_phi_tau: VectorField::cell_centered("div_phi_tau", &grid, DVec3::ZERO)?,
            div_phi_vi_v: VectorField::cell_centered("div_phi_vi_v", &grid, DVec3::ZERO)?,
            porosity: PorosityEstimator::new(params.porosity, &grid)?,
            poisson: PoissonSolver::new(&grid)?,
            grid,
            params,
            time: 0.0,
            steps: 0,
        })
    }

    // ========== Accessors ==========

    pub fn grid(&self) -> &Grid3D {
        &self.grid
    }

    pub fn params(&self) -> &FluidParams {
        &self.params
    }

    /// Simulation time (s).
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Completed fluid steps.
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    pub fn pressure(&self) -> &ScalarField {
        &self.p
    }

    /// Pressure, for setting initial conditions.
    pub fn pressure_mut(&mut self) -> &mut ScalarField {
        &mut self.p
    }

    pub fn velocity(&self) -> &VectorField {
        &self.v
    }

    /// Velocity, for setting initial conditions. Ghosts are refreshed at the
    /// start of every step.
    pub fn velocity_mut(&mut self) -> &mut VectorField {
        &mut self.v
    }

    pub fn predicted_velocity(&self) -> &VectorField {
        &self.v_p
    }

    pub fn porosity(&self) -> &ScalarField {
        &self.phi
    }

    pub fn porosity_change(&self) -> &ScalarField {
        &self.dphi
    }

    pub fn particle_velocity(&self) -> &VectorField {
        &self.vp_avg
    }

    pub fn particle_diameter(&self) -> &ScalarField {
        &self.d_avg
    }

    pub fn interaction_force(&self) -> &VectorField {
        &self.fi
    }

    pub fn stress(&self) -> &TensorField {
        &self.tau
    }

    /// Pressure correction of the last step.
    pub fn epsilon(&self) -> &ScalarField {
        self.poisson.epsilon()
    }

    /// Normalized Jacobi residual of the last sweep.
    pub fn residual(&self) -> &ScalarField {
        self.poisson.residual()
    }

    /// Face velocities interpolated from the current cell-centered velocity.
    pub fn face_velocity(&self) -> FluidResult<FaceVelocity> {
        FaceVelocity::from_cell_centered(&self.grid, &self.v)
    }

    /// Von Neumann and CFL checks against the current velocity.
    pub fn check_stability(&self) -> FluidResult<()> {
        stability::check_stability(&self.grid, &self.params, &self.v)
    }

    fn periodic_z(&self) -> bool {
        self.params.bc_bottom == BoundaryCondition::Periodic
    }

    fn check_phase<T: FieldValue>(&self, field: &Field<T>) -> FluidResult<()> {
        if cfg!(feature = "check-finite") {
            field.ensure_finite(self.time)?;
        }
        Ok(())
    }

    // ========== Time stepping ==========

    /// Advance the fluid by `dt * substeps`.
    ///
    /// The fluid force on each particle is added to
    /// `external_force[original_index[j]]`; existing contents are kept.
    pub fn step(
        &mut self,
        particles: &SortedParticles<'_>,
        external_force: &mut [DVec3],
    ) -> FluidResult<StepReport> {
        // Nothing is touched until the particle tables are known to be usable
        particles.validate(&self.grid)?;
        if let Some(&max_id) = particles.original_index.iter().max() {
            if max_id as usize >= external_force.len() {
                return Err(FluidError::ParticleArrays {
                    array: "external_force",
                    expected: max_id as usize + 1,
                    actual: external_force.len(),
                });
            }
        }

        // 1. Explicit-scheme limits
        self.check_stability()?;

        // 2. Boundary values
        refresh_ghosts(&mut self.p, pressure_faces(&self.params));
        refresh_ghosts(&mut self.v, velocity_faces(&self.params));

        // 3. Porosity and particle averages
        let dt = self.params.dt_eff();
        let periodic_z = self.periodic_z();
        self.porosity.estimate(
            &self.grid,
            particles,
            periodic_z,
            dt,
            CouplingFields {
                phi: &mut self.phi,
                dphi: &mut self.dphi,
                vp_avg: &mut self.vp_avg,
                d_avg: &mut self.d_avg,
            },
        );
        refresh_ghosts(&mut self.phi, auxiliary_faces(&self.params));
        refresh_ghosts(&mut self.dphi, auxiliary_faces(&self.params));
        self.check_phase(&self.phi)?;
        self.check_phase(&self.dphi)?;

        // 4. Stress and momentum flux
        stress::compute_stress(&self.grid, &self.v, self.params.viscosity, &mut self.tau);
        refresh_ghosts(&mut self.tau, auxiliary_faces(&self.params));
        stress::compute_div_phi_tau(&self.grid, &self.phi, &self.tau, &mut self.div_phi_tau);
        advection::compute_div_phi_vi_v(&self.grid, &self.phi, &self.v, &mut self.div_phi_vi_v);
        self.check_phase(&self.tau)?;
        self.check_phase(&self.div_phi_vi_v)?;

        // 5. Prediction
        predictor::predict_velocity(
            &self.grid,
            &self.params,
            &PredictorInputs {
                v: &self.v,
                p: &self.p,
                phi: &self.phi,
                dphi: &self.dphi,
                fi: &self.fi,
                div_phi_tau: &self.div_phi_tau,
                div_phi_vi_v: &self.div_phi_vi_v,
            },
            &mut self.v_p,
        );
        refresh_ghosts(&mut self.v_p, velocity_faces(&self.params));
        self.check_phase(&self.v_p)?;

        // 6-7. Pressure correction
        let solver = self.poisson.solve(
            &self.grid,
            &self.params,
            ForcingInputs {
                phi: &self.phi,
                dphi: &self.dphi,
                v_p: &self.v_p,
                p_old: &self.p,
            },
            self.time,
        )?;
        self.check_phase(self.poisson.epsilon())?;

        // 8. Correction
        corrector::correct(
            &self.grid,
            &self.params,
            self.poisson.epsilon(),
            &self.phi,
            &self.v_p,
            &mut self.p,
            &mut self.v,
        );
        refresh_ghosts(&mut self.p, pressure_faces(&self.params));
        refresh_ghosts(&mut self.v, velocity_faces(&self.params));

        // 9. Fluid-particle coupling
        drag::compute_interaction_force(
            &self.params,
            &self.phi,
            &self.v,
            &self.vp_avg,
            &self.d_avg,
            &mut self.fi,
        );
        self.check_phase(&self.fi)?;
        drag::apply_particle_forces(
            &self.grid,
            particles,
            &self.phi,
            &self.fi,
            &self.p,
            external_force,
        )?;

        self.v.ensure_finite(self.time)?;
        self.p.ensure_finite(self.time)?;

        self.time += dt;
        self.steps += 1;
        let max_velocity = self.v.interior_max_length(&self.grid);
        log::debug!(
            "fluid step {} t = {:.6e} s: {} Jacobi iterations, residual {:.3e}, |v|max = {:.3e} m/s",
            self.steps,
            self.time,
            solver.iterations,
            solver.residual,
            max_velocity
        );

        Ok(StepReport {
            time: self.time,
            solver,
            max_velocity,
        })
    }
}
