//! Physical and numerical constants for the porous-flow solver.
//!
//! ## Porosity thresholds
//!
//! Three porosity values split the drag model into regimes:
//!
//! 1. `phi <= ERGUN_POROSITY_LIMIT` - dense packing, Ergun correlation
//! 2. `ERGUN_POROSITY_LIMIT < phi < EMPTY_CELL_POROSITY` - dilute, Wen-Yu
//! 3. `phi >= EMPTY_CELL_POROSITY` - no particles, no drag

/// Gravity acceleration (m/s^2) - negative Z direction
pub const GRAVITY: f64 = -9.81;

/// Density of water (kg/m³)
pub const WATER_DENSITY: f64 = 1000.0;

/// Dynamic viscosity of water at 20 °C (Pa·s)
pub const WATER_VISCOSITY: f64 = 1.002e-3;

// =============================================================================
// COUPLING
// =============================================================================

/// Sentinel in the neighbor-search start/end tables marking an empty cell.
pub const EMPTY_CELL: u32 = u32::MAX;

/// Porosity at or above which a cell is treated as particle free.
pub const EMPTY_CELL_POROSITY: f64 = 0.999;

/// Porosity at or below which the Ergun (packed bed) correlation applies.
pub const ERGUN_POROSITY_LIMIT: f64 = 0.8;

/// Wen-Yu voidage exponent.
pub const WEN_YU_EXPONENT: f64 = -2.65;

/// Reynolds number above which the drag coefficient is constant.
pub const NEWTON_REGIME_REYNOLDS: f64 = 1000.0;

/// Drag coefficient in the Newton regime.
pub const NEWTON_DRAG_COEFFICIENT: f64 = 0.44;

/// Steepness of the Huilin-Gidaspow arctangent blend between Ergun and Wen-Yu.
pub const DRAG_BLEND_STEEPNESS: f64 = 262.5;

/// Lower bound on porosity wherever it appears in a denominator.
pub const MIN_POROSITY: f64 = 1.0e-3;

// =============================================================================
// PRESSURE SOLVE
// =============================================================================

/// Additive floor in the normalized residual denominator.
pub const RESIDUAL_FLOOR: f64 = 1.0e-16;

/// Largest smoothing factor for the Jacobi update. Above it the blend
/// amplifies the checkerboard mode.
pub const MAX_SMOOTHING: f64 = 0.5;

/// Largest von Neumann number for which the explicit diffusion term is stable.
pub const MAX_DIFFUSION_NUMBER: f64 = 0.5;

/// Largest Courant number for which the explicit advection term is stable.
pub const MAX_COURANT_NUMBER: f64 = 1.0;

/// Support radius of the quadratic B-spline in grid units.
pub const BSPLINE_SUPPORT_RADIUS: f64 = 1.5;
