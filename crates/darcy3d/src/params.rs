//! Solver configuration.
//!
//! Everything the fluid solver needs from the outside world is in
//! [`FluidParams`]. The struct is read-only once a solver has been built and
//! is passed by reference into every phase.

use std::path::Path;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::boundary::BoundaryCondition;
use crate::constants::{GRAVITY, MAX_SMOOTHING, WATER_DENSITY, WATER_VISCOSITY};
use crate::error::{FluidError, FluidResult};
use crate::serde_utils::{deserialize_dvec3, serialize_dvec3};

/// Porosity estimator, fixed for a run.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PorosityModel {
    /// Geometric sphere/sphere overlap within a spherical support region of
    /// radius `radius_factor * min(dx, dy, dz)`.
    Spherical { radius_factor: f64 },
    /// Incremental update from the kernel-weighted divergence of particle
    /// velocities. Initialized geometrically on the first step.
    KernelStrainRate,
}

impl Default for PorosityModel {
    fn default() -> Self {
        Self::Spherical { radius_factor: 1.0 }
    }
}

/// How the Ergun and Wen-Yu correlations are combined.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragModel {
    /// Hard switch at phi = 0.8
    Switched,
    /// Arctangent blend centered at phi = 0.8, continuous across it
    #[default]
    Blended,
}

/// Statistic of the per-cell normalized residual tested against the tolerance.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceNorm {
    Mean,
    #[default]
    Max,
}

/// Fluid solver parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidParams {
    /// Number of cells (nx, ny, nz)
    pub cells: [usize; 3],
    /// Physical extent (Lx, Ly, Lz) in metres
    pub extent: [f64; 3],

    /// Dynamic viscosity mu (Pa·s)
    pub viscosity: f64,
    /// Fluid density rho (kg/m³)
    pub density: f64,
    /// Body acceleration (m/s²)
    #[serde(serialize_with = "serialize_dvec3", deserialize_with = "deserialize_dvec3")]
    pub gravity: DVec3,

    /// Particle (DEM) time step (s)
    pub dt: f64,
    /// DEM sub-steps per fluid step; the fluid advances `dt * substeps`
    pub substeps: u32,

    /// Bottom (z = 0) boundary
    pub bc_bottom: BoundaryCondition,
    /// Top (z = Lz) boundary
    pub bc_top: BoundaryCondition,
    /// Dirichlet pressure on the bottom face (Pa)
    pub p_bottom: f64,
    /// Dirichlet pressure on the top face (Pa)
    pub p_top: f64,
    /// Dirichlet velocity on the bottom face (m/s)
    #[serde(serialize_with = "serialize_dvec3", deserialize_with = "deserialize_dvec3")]
    pub v_bottom: DVec3,
    /// Dirichlet velocity on the top face (m/s)
    #[serde(serialize_with = "serialize_dvec3", deserialize_with = "deserialize_dvec3")]
    pub v_top: DVec3,

    /// Jacobi under-relaxation factor theta in (0, 1]
    pub theta: f64,
    /// Convergence tolerance on the normalized residual
    pub tolerance: f64,
    /// Jacobi iteration cap
    pub max_iterations: usize,
    /// Which residual statistic is tested
    pub convergence: ConvergenceNorm,
    /// Smoothing factor gamma in [0, 0.5] for the Jacobi update; 0 disables smoothing
    pub gamma: f64,
    /// Pressure projection weight beta in [0, 1]
    pub beta: f64,

    pub porosity: PorosityModel,
    pub drag: DragModel,
}

impl Default for FluidParams {
    fn default() -> Self {
        Self {
            cells: [8, 8, 8],
            extent: [1.0, 1.0, 1.0],
            viscosity: WATER_VISCOSITY,
            density: WATER_DENSITY,
            gravity: DVec3::new(0.0, 0.0, GRAVITY),
            dt: 1.0e-4,
            substeps: 1,
            bc_bottom: BoundaryCondition::Neumann,
            bc_top: BoundaryCondition::Dirichlet,
            p_bottom: 0.0,
            p_top: 0.0,
            v_bottom: DVec3::ZERO,
            v_top: DVec3::ZERO,
            theta: 1.0,
            tolerance: 1.0e-8,
            max_iterations: 10_000,
            convergence: ConvergenceNorm::Max,
            gamma: 0.0,
            beta: 0.0,
            porosity: PorosityModel::default(),
            drag: DragModel::default(),
        }
    }
}

impl FluidParams {
    /// Parse parameters from a JSON document. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> FluidResult<Self> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> FluidResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> FluidResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Time step of one fluid step: DEM step times sub-step count.
    #[inline]
    pub fn dt_eff(&self) -> f64 {
        self.dt * self.substeps as f64
    }

    /// Kinematic viscosity nu = mu / rho.
    #[inline]
    pub fn kinematic_viscosity(&self) -> f64 {
        self.viscosity / self.density
    }

    /// Check ranges; called by the solver constructor.
    pub fn validate(&self) -> FluidResult<()> {
        fn positive(name: &'static str, v: f64) -> FluidResult<()> {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(FluidError::invalid_parameter(name, format!("must be positive, got {v}")))
            }
        }
        fn unit_interval(name: &'static str, v: f64, open_low: bool) -> FluidResult<()> {
            let low_ok = if open_low { v > 0.0 } else { v >= 0.0 };
            if v.is_finite() && low_ok && v <= 1.0 {
                Ok(())
            } else {
                let range = if open_low { "(0, 1]" } else { "[0, 1]" };
                Err(FluidError::invalid_parameter(name, format!("must be in {range}, got {v}")))
            }
        }

        positive("viscosity", self.viscosity)?;
        positive("density", self.density)?;
        positive("dt", self.dt)?;
        positive("tolerance", self.tolerance)?;
        unit_interval("theta", self.theta, true)?;
        unit_interval("gamma", self.gamma, false)?;
        if self.gamma > MAX_SMOOTHING {
            return Err(FluidError::invalid_parameter(
                "gamma",
                format!("must not exceed {MAX_SMOOTHING}, got {}", self.gamma),
            ));
        }
        unit_interval("beta", self.beta, false)?;

        if self.substeps == 0 {
            return Err(FluidError::invalid_parameter("substeps", "must be at least 1"));
        }
        if self.max_iterations == 0 {
            return Err(FluidError::invalid_parameter("max_iterations", "must be at least 1"));
        }
        if !self.gravity.is_finite() {
            return Err(FluidError::invalid_parameter("gravity", "must be finite"));
        }
        let periodic_bottom = self.bc_bottom == BoundaryCondition::Periodic;
        let periodic_top = self.bc_top == BoundaryCondition::Periodic;
        if periodic_bottom != periodic_top {
            return Err(FluidError::invalid_parameter(
                "bc_top",
                "periodic z boundaries must be set on both faces",
            ));
        }
        if let PorosityModel::Spherical { radius_factor } = self.porosity {
            if radius_factor != 1.0 && radius_factor != 2.0 {
                return Err(FluidError::invalid_parameter(
                    "porosity.radius_factor",
                    format!("must be 1 or 2, got {radius_factor}"),
                ));
            }
        }
        Ok(())
    }
}
