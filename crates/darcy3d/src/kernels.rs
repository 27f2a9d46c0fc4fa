//! Quadratic B-spline smoothing kernel for the incremental porosity estimate.

use glam::DVec3;

use crate::constants::BSPLINE_SUPPORT_RADIUS;

/// 1D Quadratic B-spline weight.
/// Support: [-1.5, 1.5] (covers 3 grid nodes), integrates to 1.
#[inline]
pub fn quadratic_bspline_1d(r: f64) -> f64 {
    let r_abs = r.abs();
    if r_abs < 0.5 {
        0.75 - r_abs * r_abs
    } else if r_abs < BSPLINE_SUPPORT_RADIUS {
        let t = BSPLINE_SUPPORT_RADIUS - r_abs;
        0.5 * t * t
    } else {
        0.0
    }
}

/// Derivative of [`quadratic_bspline_1d`] with respect to r.
#[inline]
pub fn quadratic_bspline_1d_derivative(r: f64) -> f64 {
    let r_abs = r.abs();
    if r_abs < 0.5 {
        -2.0 * r
    } else if r_abs < BSPLINE_SUPPORT_RADIUS {
        -(BSPLINE_SUPPORT_RADIUS - r_abs) * r.signum()
    } else {
        0.0
    }
}

/// Normalized 3D kernel W(delta) with per-axis width `h`.
///
/// Integrates to 1 over space, so `sum V_j W(x - x_j)` estimates a volume
/// fraction.
#[inline]
pub fn kernel_3d(delta: DVec3, h: DVec3) -> f64 {
    let q = delta / h;
    quadratic_bspline_1d(q.x) * quadratic_bspline_1d(q.y) * quadratic_bspline_1d(q.z)
        / (h.x * h.y * h.z)
}

/// Spatial gradient of [`kernel_3d`] with respect to `delta`.
#[inline]
pub fn kernel_3d_gradient(delta: DVec3, h: DVec3) -> DVec3 {
    let q = delta / h;
    let (wx, wy, wz) = (
        quadratic_bspline_1d(q.x),
        quadratic_bspline_1d(q.y),
        quadratic_bspline_1d(q.z),
    );
    let (gx, gy, gz) = (
        quadratic_bspline_1d_derivative(q.x) / h.x,
        quadratic_bspline_1d_derivative(q.y) / h.y,
        quadratic_bspline_1d_derivative(q.z) / h.z,
    );
    DVec3::new(gx * wy * wz, wx * gy * wz, wx * wy * gz) / (h.x * h.y * h.z)
}
