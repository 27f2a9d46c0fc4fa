//! Error types for the fluid solver.
//!
//! Every fatal condition the solver can detect is a variant here. None of them
//! is retried; the driver is expected to flush its diagnostics and stop.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type FluidResult<T> = Result<T, FluidError>;

/// Fluid solver error.
#[derive(Error, Debug)]
pub enum FluidError {
    /// Grid dimensions or extents are unusable.
    #[error("invalid grid: {reason}")]
    InvalidGrid { reason: String },

    /// A configuration value is out of range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Unknown boundary-condition code.
    #[error("unknown boundary condition code {0} (expected 0=Dirichlet, 1=Neumann, 2=Periodic)")]
    BoundaryCode(u8),

    /// Particle arrays handed in by the neighbor search are inconsistent.
    #[error("particle arrays inconsistent: {array} has length {actual}, expected {expected}")]
    ParticleArrays {
        array: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A cell range or particle index in the sorted tables points past its array.
    #[error("particle table entry {array}[{index}] = {value} out of range (limit {limit})")]
    ParticleIndex {
        array: &'static str,
        index: usize,
        value: usize,
        limit: usize,
    },

    /// Explicit diffusion term violates the von Neumann criterion.
    #[error(
        "time step {dt:e} s too large for the diffusive term: nu*dt/dmin^2 = {number:.3} > 0.5 \
         (nu = {kinematic_viscosity:e} m^2/s, dmin = {dmin:e} m); decrease the viscosity or \
         the time step, or increase the fluid cell size"
    )]
    DiffusionUnstable {
        dt: f64,
        kinematic_viscosity: f64,
        dmin: f64,
        number: f64,
    },

    /// Explicit advection term violates the CFL criterion.
    #[error(
        "time step {dt:e} s too large for the advective term: Courant number {courant:.3} in \
         cell ({x},{y},{z}), v = [{vx},{vy},{vz}] m/s"
    )]
    CflViolation {
        x: i32,
        y: i32,
        z: i32,
        vx: f64,
        vy: f64,
        vz: f64,
        dt: f64,
        courant: f64,
    },

    /// A field picked up a NaN or infinity.
    #[error("non-finite value in field `{field}` at cell ({x},{y},{z}), t = {time} s")]
    NonFinite {
        field: &'static str,
        x: i32,
        y: i32,
        z: i32,
        time: f64,
    },

    /// The normalized residual of the pressure correction is not finite.
    #[error(
        "normalized residual is {value} in cell ({x},{y},{z}) at t = {time} s, Jacobi iteration \
         {iteration}; the system has most likely become unstable"
    )]
    NonFiniteResidual {
        value: f64,
        x: i32,
        y: i32,
        z: i32,
        time: f64,
        iteration: usize,
    },

    /// Working memory for a field could not be reserved.
    #[error("could not allocate {cells} cells for field `{field}`")]
    Allocation { field: &'static str, cells: usize },

    /// Configuration file could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// File system error while reading configuration or writing diagnostics.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl FluidError {
    pub fn invalid_grid(reason: impl Into<String>) -> Self {
        Self::InvalidGrid {
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub fn non_finite(field: &'static str, (x, y, z): (i32, i32, i32), time: f64) -> Self {
        Self::NonFinite {
            field,
            x,
            y,
            z,
            time,
        }
    }

    /// True for the conditions that mean the simulation state is no longer usable.
    pub fn is_instability(&self) -> bool {
        matches!(
            self,
            Self::DiffusionUnstable { .. }
                | Self::CflViolation { .. }
                | Self::NonFinite { .. }
                | Self::NonFiniteResidual { .. }
        )
    }
}
