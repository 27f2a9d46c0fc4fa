//! Pressure-correction Poisson solver.
//!
//! Solves `laplace(eps) = f1 - f2 . grad(eps)` for the pressure correction
//! with under-relaxed Jacobi iteration on the 7-point stencil. `eps` and
//! `eps_new` are double buffered and swapped after every sweep.

use rayon::prelude::*;

use crate::boundary::{refresh_ghosts, BoundaryCondition, ZFaces};
use crate::constants::{MIN_POROSITY, RESIDUAL_FLOOR};
use crate::error::{FluidError, FluidResult};
use crate::field::{ScalarField, VectorField};
use crate::grid::Grid3D;
use crate::params::{ConvergenceNorm, FluidParams};

/// Outcome of one Poisson solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// Residual fell below the tolerance
    Converged,
    /// Iteration cap hit; the last iterate is kept
    MaxIterationsReached,
}

/// Result of one Poisson solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverResult {
    pub status: SolverStatus,
    /// Jacobi sweeps performed
    pub iterations: usize,
    /// Final value of the tested residual statistic
    pub residual: f64,
}

impl SolverResult {
    pub fn is_converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }
}

/// Interior z layers held at their Dirichlet value during relaxation.
#[derive(Clone, Copy, Debug)]
struct PinnedLayers {
    bottom: bool,
    top: bool,
    nz: i32,
}

impl PinnedLayers {
    fn new(params: &FluidParams, grid: &Grid3D) -> Self {
        Self {
            bottom: params.bc_bottom == BoundaryCondition::Dirichlet,
            top: params.bc_top == BoundaryCondition::Dirichlet,
            nz: grid.nz as i32,
        }
    }

    #[inline]
    fn contains(&self, z: i32) -> bool {
        (self.bottom && z == 0) || (self.top && z == self.nz - 1)
    }
}

/// Jacobi solver state. Owns every buffer of the pressure-correction stage.
#[derive(Debug)]
pub struct PoissonSolver {
    eps: ScalarField,
    eps_new: ScalarField,
    /// Normalized per-cell residual of the last sweep
    norm: ScalarField,
    /// Full forcing of the last sweep
    f: ScalarField,
    /// Source part of the forcing, fixed during one solve
    f1: ScalarField,
    /// Porosity-gradient part of the forcing
    f2: VectorField,
    /// Update of the current sweep, smoothed when gamma > 0
    delta: ScalarField,
}

impl PoissonSolver {
    pub fn new(grid: &Grid3D) -> FluidResult<Self> {
        Ok(Self {
            eps: ScalarField::cell_centered("epsilon", grid, 0.0)?,
            eps_new: ScalarField::cell_centered("epsilon_new", grid, 0.0)?,
            norm: ScalarField::cell_centered("norm", grid, 0.0)?,
            f: ScalarField::cell_centered("f", grid, 0.0)?,
            f1: ScalarField::cell_centered("f1", grid, 0.0)?,
            f2: VectorField::cell_centered("f2", grid, glam::DVec3::ZERO)?,
            delta: ScalarField::cell_centered("delta", grid, 0.0)?,
        })
    }

    /// Current pressure correction.
    pub fn epsilon(&self) -> &ScalarField {
        &self.eps
    }

    /// Normalized residual of the last sweep.
    pub fn residual(&self) -> &ScalarField {
        &self.norm
    }

    /// Forcing `f` used in the last sweep.
    pub fn forcing(&self) -> &ScalarField {
        &self.f
    }

    /// Source and porosity-gradient forcing, for callers that assemble their
    /// own right-hand side before [`PoissonSolver::relax`].
    pub fn forcing_mut(&mut self) -> (&mut ScalarField, &mut VectorField) {
        (&mut self.f1, &mut self.f2)
    }

    /// Assemble `f1 = rho (phi div(v_p)/dt + grad(phi).v_p/dt + dphi/dt^2)`
    /// and `f2 = grad(phi)/phi`. Ghosts of `phi` and `v_p` must be current.
    pub fn assemble_forcing(
        &mut self,
        grid: &Grid3D,
        params: &FluidParams,
        phi: &ScalarField,
        dphi: &ScalarField,
        v_p: &VectorField,
    ) {
        let dt = params.dt_eff();
        let rho = params.density;
        let layout = grid.cell_layout();

        (self.f1.as_mut_slice(), self.f2.as_mut_slice())
            .into_par_iter()
            .enumerate()
            .for_each(|(idx, (f1, f2))| {
                let (x, y, z) = layout.coords(idx);
                if !layout.is_interior(x, y, z) {
                    return;
                }
                let phi_c = phi.at(x, y, z);
                let grad_phi = phi.gradient(grid, x, y, z);
                let v = v_p.at(x, y, z);
                *f1 = rho
                    * (phi_c * v_p.divergence(grid, x, y, z) / dt
                        + grad_phi.dot(v) / dt
                        + dphi.at(x, y, z) / (dt * dt));
                *f2 = grad_phi / phi_c.max(MIN_POROSITY);
            });
    }

    /// Assemble the forcing and relax.
    pub fn solve(
        &mut self,
        grid: &Grid3D,
        params: &FluidParams,
        fields: ForcingInputs<'_>,
        time: f64,
    ) -> FluidResult<SolverResult> {
        self.assemble_forcing(grid, params, fields.phi, fields.dphi, fields.v_p);
        self.relax(grid, params, fields.p_old, time)
    }

    /// Relax `eps` against the forcing currently held in `f1` and `f2`.
    ///
    /// The previous correction is the starting guess. Dirichlet boundary
    /// layers are pinned to `p_bc - beta * p_old` before the first sweep.
    pub fn relax(
        &mut self,
        grid: &Grid3D,
        params: &FluidParams,
        p_old: &ScalarField,
        time: f64,
    ) -> FluidResult<SolverResult> {
        let pinned = PinnedLayers::new(params, grid);
        let faces = ZFaces::mirrored(params.bc_bottom, params.bc_top);
        self.pin_dirichlet_layers(grid, params, p_old, pinned);

        let mut residual = f64::INFINITY;
        let mut iterations = 0;
        let mut status = SolverStatus::MaxIterationsReached;

        for iter in 1..=params.max_iterations {
            refresh_ghosts(&mut self.eps, faces);
            self.sweep(grid, params.theta, pinned);
            if params.gamma > 0.0 {
                self.smooth_update(params.gamma, faces, pinned);
            }
            std::mem::swap(&mut self.eps, &mut self.eps_new);

            residual = match params.convergence {
                ConvergenceNorm::Mean => self.avg_norm(grid, time, iter)?,
                ConvergenceNorm::Max => self.max_norm(grid, time, iter)?,
            };
            iterations = iter;
            log::trace!("Jacobi iter {}: residual = {:.6e}", iter, residual);

            if residual < params.tolerance {
                status = SolverStatus::Converged;
                break;
            }
        }

        refresh_ghosts(&mut self.eps, faces);

        if status == SolverStatus::MaxIterationsReached {
            log::warn!(
                "pressure correction did not converge in {} iterations at t = {} s \
                 (residual {:.3e}, tolerance {:.3e}); the system may be unstable",
                iterations,
                time,
                residual,
                params.tolerance
            );
        }

        Ok(SolverResult {
            status,
            iterations,
            residual,
        })
    }

    /// Mean interior normalized residual.
    pub fn avg_norm(&self, grid: &Grid3D, time: f64, iteration: usize) -> FluidResult<f64> {
        self.check_residual(time, iteration)?;
        Ok(self.norm.interior_mean(grid))
    }

    /// Largest interior normalized residual.
    pub fn max_norm(&self, grid: &Grid3D, time: f64, iteration: usize) -> FluidResult<f64> {
        self.check_residual(time, iteration)?;
        Ok(grid
            .interior_cells()
            .map(|(x, y, z)| self.norm.at(x, y, z))
            .fold(0.0, f64::max))
    }

    fn check_residual(&self, time: f64, iteration: usize) -> FluidResult<()> {
        match self.norm.find_non_finite() {
            Some((x, y, z)) => Err(FluidError::NonFiniteResidual {
                value: self.norm.at(x, y, z),
                x,
                y,
                z,
                time,
                iteration,
            }),
            None => Ok(()),
        }
    }

    fn pin_dirichlet_layers(
        &mut self,
        grid: &Grid3D,
        params: &FluidParams,
        p_old: &ScalarField,
        pinned: PinnedLayers,
    ) {
        let mut pin = |z: i32, p_bc: f64| {
            for y in 0..grid.ny as i32 {
                for x in 0..grid.nx as i32 {
                    let value = p_bc - params.beta * p_old.at(x, y, z);
                    self.eps.set(x, y, z, value);
                    self.eps_new.set(x, y, z, value);
                }
            }
        };
        if pinned.bottom {
            pin(0, params.p_bottom);
        }
        if pinned.top {
            pin(grid.nz as i32 - 1, params.p_top);
        }
    }

    /// One Jacobi sweep from `eps` into `eps_new`, recording `f` and `norm`.
    fn sweep(&mut self, grid: &Grid3D, theta: f64, pinned: PinnedLayers) {
        let (dx2, dy2, dz2) = (grid.dx * grid.dx, grid.dy * grid.dy, grid.dz * grid.dz);
        let wx = dy2 * dz2;
        let wy = dx2 * dz2;
        let wz = dx2 * dy2;
        let wf = dx2 * dy2 * dz2;
        let denom = 2.0 * (wx + wy + wz);

        let layout = grid.cell_layout();
        let eps = &self.eps;
        let f1 = &self.f1;
        let f2 = &self.f2;

        (
            self.eps_new.as_mut_slice(),
            self.norm.as_mut_slice(),
            self.f.as_mut_slice(),
        )
            .into_par_iter()
            .enumerate()
            .for_each(|(idx, (new, norm, f))| {
                let (x, y, z) = layout.coords(idx);
                if !layout.is_interior(x, y, z) {
                    return;
                }
                let e = eps.at(x, y, z);
                *f = f1.at(x, y, z) - f2.at(x, y, z).dot(eps.gradient(grid, x, y, z));
                if pinned.contains(z) {
                    *new = e;
                    *norm = 0.0;
                    return;
                }

                let raw = (wx * (eps.at(x - 1, y, z) + eps.at(x + 1, y, z))
                    + wy * (eps.at(x, y - 1, z) + eps.at(x, y + 1, z))
                    + wz * (eps.at(x, y, z - 1) + eps.at(x, y, z + 1))
                    - wf * *f)
                    / denom;
                *new = (1.0 - theta) * e + theta * raw;
                let diff = raw - e;
                *norm = diff * diff / (raw * raw + RESIDUAL_FLOOR);
            });
    }

    /// Blend the sweep's update `eps_new - eps` with its 6-neighbor mean.
    ///
    /// Only the update is smoothed, so a converged `eps` stays converged.
    fn smooth_update(&mut self, gamma: f64, faces: ZFaces<f64>, pinned: PinnedLayers) {
        let eps = &self.eps;
        let eps_new = &self.eps_new;
        self.delta
            .par_update_interior(|x, y, z| eps_new.at(x, y, z) - eps.at(x, y, z));
        refresh_ghosts(&mut self.delta, faces);

        let delta = &self.delta;
        self.eps_new.par_update_interior(|x, y, z| {
            let d = delta.at(x, y, z);
            let e = eps.at(x, y, z);
            if pinned.contains(z) {
                return e + d;
            }
            let mean = (delta.at(x - 1, y, z)
                + delta.at(x + 1, y, z)
                + delta.at(x, y - 1, z)
                + delta.at(x, y + 1, z)
                + delta.at(x, y, z - 1)
                + delta.at(x, y, z + 1))
                / 6.0;
            e + (1.0 - gamma) * d + gamma * mean
        });
    }
}

/// Fields the forcing is assembled from.
pub struct ForcingInputs<'a> {
    pub phi: &'a ScalarField,
    pub dphi: &'a ScalarField,
    pub v_p: &'a VectorField,
    /// Pressure of the previous step
    pub p_old: &'a ScalarField,
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use std::f64::consts::PI;

    fn periodic_params() -> FluidParams {
        FluidParams {
            bc_bottom: BoundaryCondition::Periodic,
            bc_top: BoundaryCondition::Periodic,
            theta: 0.8,
            tolerance: 1e-20,
            max_iterations: 5000,
            ..FluidParams::default()
        }
    }

    #[test]
    fn test_zero_forcing_converges_immediately() {
        let grid = Grid3D::cubic(4, 0.25).unwrap();
        let params = periodic_params();
        let mut solver = PoissonSolver::new(&grid).unwrap();
        let p_old = ScalarField::cell_centered("p", &grid, 0.0).unwrap();
        let result = solver.relax(&grid, &params, &p_old, 0.0).unwrap();
        assert!(result.is_converged());
        assert_eq!(result.iterations, 1);
        assert_eq!(result.residual, 0.0);
        for (x, y, z) in grid.interior_cells() {
            assert_eq!(solver.epsilon().at(x, y, z), 0.0);
        }
    }

    #[test]
    fn test_periodic_manufactured_solution() {
        let grid = Grid3D::new([8, 8, 8], [1.0, 2.0, 1.0]).unwrap();
        let params = periodic_params();
        let mut solver = PoissonSolver::new(&grid).unwrap();
        let exact = manufactured(&grid, &mut solver);
        let p_old = ScalarField::cell_centered("p", &grid, 0.0).unwrap();
        let result = solver.relax(&grid, &params, &p_old, 0.0).unwrap();

        assert!(result.is_converged(), "{result:?}");
        for (x, y, z) in grid.interior_cells() {
            let e = exact(x, y, z);
            let got = solver.epsilon().at(x, y, z);
            assert!((got - e).abs() < 1e-7 * e.abs().max(1.0), "({x},{y},{z}): {got} vs {e}");
        }
    }

    #[test]
    fn test_dirichlet_top_neumann_bottom() {
        // Uniform forcing c in a column; the exact discrete solution follows
        // e[k+1] = 2 e[k] - e[k-1] + c dz^2 with e[-1] = e[0] and e[nz-1] = 0
        let nz = 8;
        let grid = Grid3D::new([2, 2, nz], [0.25, 0.25, 1.0]).unwrap();
        let params = FluidParams {
            bc_bottom: BoundaryCondition::Neumann,
            bc_top: BoundaryCondition::Dirichlet,
            p_top: 0.0,
            theta: 1.0,
            tolerance: 1e-22,
            max_iterations: 50_000,
            ..FluidParams::default()
        };
        let c = 3.0;
        let dz2 = grid.dz * grid.dz;
        let mut column = vec![0.0; nz];
        column[1] = c * dz2;
        for k in 1..nz - 1 {
            column[k + 1] = 2.0 * column[k] - column[k - 1] + c * dz2;
        }
        let shift = column[nz - 1];
        for e in &mut column {
            *e -= shift;
        }

        let mut solver = PoissonSolver::new(&grid).unwrap();
        solver.forcing_mut().0.par_update_interior(|_, _, _| c);
        let p_old = ScalarField::cell_centered("p", &grid, 0.0).unwrap();
        let result = solver.relax(&grid, &params, &p_old, 0.0).unwrap();

        assert!(result.is_converged(), "{result:?}");
        for (x, y, z) in grid.interior_cells() {
            let e = column[z as usize];
            let got = solver.epsilon().at(x, y, z);
            assert!((got - e).abs() < 1e-6 * e.abs().max(1e-3), "z={z}: {got} vs {e}");
        }
        // Pinned layer reports no residual
        assert_eq!(solver.residual().at(0, 0, nz as i32 - 1), 0.0);
    }

    #[test]
    fn test_pinned_layer_uses_projection_weight() {
        let grid = Grid3D::new([2, 2, 4], [1.0, 1.0, 2.0]).unwrap();
        let params = FluidParams {
            bc_bottom: BoundaryCondition::Dirichlet,
            bc_top: BoundaryCondition::Dirichlet,
            p_bottom: 1.0,
            p_top: 3.0,
            beta: 0.5,
            max_iterations: 2,
            ..FluidParams::default()
        };
        let p_old = ScalarField::cell_centered("p", &grid, 10.0).unwrap();
        let mut solver = PoissonSolver::new(&grid).unwrap();
        solver.relax(&grid, &params, &p_old, 0.0).unwrap();
        assert_eq!(solver.epsilon().at(1, 0, 0), 1.0 - 5.0);
        assert_eq!(solver.epsilon().at(1, 0, 3), 3.0 - 5.0);
    }

    #[test]
    fn test_iteration_cap_is_reported() {
        let grid = Grid3D::cubic(4, 0.25).unwrap();
        let mut params = periodic_params();
        params.max_iterations = 3;
        let mut solver = PoissonSolver::new(&grid).unwrap();
        solver
            .forcing_mut()
            .0
            .par_update_interior(|x, _, _| if x == 0 { 1.0 } else { -1.0 / 3.0 });
        let p_old = ScalarField::cell_centered("p", &grid, 0.0).unwrap();
        let result = solver.relax(&grid, &params, &p_old, 0.0).unwrap();
        assert_eq!(result.status, SolverStatus::MaxIterationsReached);
        assert_eq!(result.iterations, 3);
        assert!(result.residual > params.tolerance);
    }

    #[test]
    fn test_nan_forcing_names_cell_and_iteration() {
        let grid = Grid3D::cubic(4, 0.25).unwrap();
        let params = periodic_params();
        let mut solver = PoissonSolver::new(&grid).unwrap();
        solver.forcing_mut().0.set(2, 1, 3, f64::NAN);
        let p_old = ScalarField::cell_centered("p", &grid, 0.0).unwrap();
        let err = solver.relax(&grid, &params, &p_old, 0.25).unwrap_err();
        match err {
            FluidError::NonFiniteResidual {
                x,
                y,
                z,
                iteration,
                time,
                ..
            } => {
                assert_eq!((x, y, z), (2, 1, 3));
                assert_eq!(iteration, 1);
                assert_eq!(time, 0.25);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    fn unpinned() -> PinnedLayers {
        PinnedLayers {
            bottom: false,
            top: false,
            nz: 4,
        }
    }

    #[test]
    fn test_smoothing_flattens_checkerboard_update() {
        let grid = Grid3D::cubic(4, 1.0).unwrap();
        let mut solver = PoissonSolver::new(&grid).unwrap();
        solver.eps.fill(2.0);
        solver
            .eps_new
            .par_update_interior(|x, y, z| if (x + y + z) % 2 == 0 { 3.0 } else { 1.0 });
        solver.smooth_update(0.5, ZFaces::periodic(), unpinned());
        for (x, y, z) in grid.interior_cells() {
            assert!((solver.eps_new.at(x, y, z) - 2.0).abs() < 1e-15);
        }
    }

    #[test]
    fn test_smoothing_keeps_a_converged_iterate() {
        let grid = Grid3D::cubic(4, 1.0).unwrap();
        let mut solver = PoissonSolver::new(&grid).unwrap();
        solver.eps.par_update_interior(|x, y, z| (x * x - 2 * y + 3 * z) as f64);
        solver.eps_new.copy_from(&solver.eps);
        solver.smooth_update(0.3, ZFaces::periodic(), unpinned());
        for (x, y, z) in grid.interior_cells() {
            assert_eq!(solver.eps_new.at(x, y, z), solver.eps.at(x, y, z));
        }
    }

    /// Forcing whose exact discrete solution is `sin(2 pi x) sin(2 pi z)`.
    fn manufactured(grid: &Grid3D, solver: &mut PoissonSolver) -> impl Fn(i32, i32, i32) -> f64 {
        let k = 2.0 * PI;
        let g = grid.clone();
        let exact = move |x: i32, y: i32, z: i32| {
            let c = g.cell_center(x, y, z);
            (k * c.x).sin() * (k * c.z).sin()
        };
        let eigen = 2.0 * ((k * grid.dx).cos() - 1.0) / (grid.dx * grid.dx)
            + 2.0 * ((k * grid.dz).cos() - 1.0) / (grid.dz * grid.dz);
        solver
            .forcing_mut()
            .0
            .par_update_interior(|x, y, z| eigen * exact(x, y, z));
        exact
    }

    #[test]
    fn test_smoothed_relaxation_converges_to_the_solution() {
        let grid = Grid3D::new([8, 8, 8], [1.0, 2.0, 1.0]).unwrap();
        let params = FluidParams {
            gamma: 0.2,
            convergence: ConvergenceNorm::Mean,
            ..periodic_params()
        };
        let mut solver = PoissonSolver::new(&grid).unwrap();
        let exact = manufactured(&grid, &mut solver);
        let p_old = ScalarField::cell_centered("p", &grid, 0.0).unwrap();
        let result = solver.relax(&grid, &params, &p_old, 0.0).unwrap();

        assert!(result.is_converged(), "{result:?}");
        assert!(result.iterations < params.max_iterations / 10);
        for (x, y, z) in grid.interior_cells() {
            let e = exact(x, y, z);
            let got = solver.epsilon().at(x, y, z);
            assert!((got - e).abs() < 1e-7 * e.abs().max(1.0), "({x},{y},{z}): {got} vs {e}");
        }
    }

    #[test]
    fn test_mean_residual_never_increases() {
        let grid = Grid3D::new([8, 8, 8], [1.0, 2.0, 1.0]).unwrap();
        let p_old = ScalarField::cell_centered("p", &grid, 0.0).unwrap();
        for gamma in [0.0, 0.2] {
            let mut history = Vec::new();
            for n in 1..=30 {
                let params = FluidParams {
                    gamma,
                    convergence: ConvergenceNorm::Mean,
                    tolerance: 1e-30,
                    max_iterations: n,
                    ..periodic_params()
                };
                let mut solver = PoissonSolver::new(&grid).unwrap();
                manufactured(&grid, &mut solver);
                let result = solver.relax(&grid, &params, &p_old, 0.0).unwrap();
                assert_eq!(result.iterations, n);
                let mean = solver.avg_norm(&grid, 0.0, n).unwrap();
                assert_eq!(mean, result.residual);
                history.push(mean);
            }
            for pair in history.windows(2) {
                assert!(
                    pair[1] <= pair[0] * (1.0 + 1e-9),
                    "gamma {gamma}: residual rose {} -> {}",
                    pair[0],
                    pair[1]
                );
            }
            assert!(history[29] < 1e-3 * history[0], "gamma {gamma}: {history:?}");
        }
    }

    #[test]
    fn test_forcing_from_uniform_state_is_zero() {
        let grid = Grid3D::cubic(4, 0.25).unwrap();
        let params = FluidParams::default();
        let phi = ScalarField::cell_centered("phi", &grid, 1.0).unwrap();
        let dphi = ScalarField::cell_centered("dphi", &grid, 0.0).unwrap();
        let v_p = VectorField::cell_centered("v_p", &grid, DVec3::new(0.1, 0.2, 0.3)).unwrap();
        let mut solver = PoissonSolver::new(&grid).unwrap();
        solver.assemble_forcing(&grid, &params, &phi, &dphi, &v_p);
        for (x, y, z) in grid.interior_cells() {
            assert_eq!(solver.f1.at(x, y, z), 0.0);
            assert_eq!(solver.f2.at(x, y, z), DVec3::ZERO);
        }
    }

    #[test]
    fn test_forcing_includes_porosity_rate() {
        let grid = Grid3D::cubic(4, 0.25).unwrap();
        let params = FluidParams {
            density: 1000.0,
            dt: 1e-3,
            ..FluidParams::default()
        };
        let phi = ScalarField::cell_centered("phi", &grid, 0.6).unwrap();
        let dphi = ScalarField::cell_centered("dphi", &grid, 1e-4).unwrap();
        let v_p = VectorField::cell_centered("v_p", &grid, DVec3::ZERO).unwrap();
        let mut solver = PoissonSolver::new(&grid).unwrap();
        solver.assemble_forcing(&grid, &params, &phi, &dphi, &v_p);
        // rho dphi / dt^2 = 1000 * 1e-4 / 1e-6
        assert!((solver.f1.at(1, 1, 1) - 1e5).abs() < 1e-6);
    }
}
