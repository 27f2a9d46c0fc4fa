//! Projection tests on the full solver
//!
//! Checks that the pressure correction removes divergence and leaves
//! divergence-free flows alone, on fully periodic and on wall-bounded grids.

use darcy3d::{
    BoundaryCondition, DVec3, FluidParams, FluidSolver3D, SortedParticles, VectorField,
};
use std::f64::consts::PI;

fn periodic_params(cells: [usize; 3], extent: [f64; 3]) -> FluidParams {
    FluidParams {
        cells,
        extent,
        viscosity: 1e-3,
        density: 1.0,
        gravity: DVec3::ZERO,
        dt: 1e-3,
        bc_bottom: BoundaryCondition::Periodic,
        bc_top: BoundaryCondition::Periodic,
        tolerance: 1e-16,
        max_iterations: 20_000,
        ..FluidParams::default()
    }
}

fn max_divergence(solver: &FluidSolver3D, v: &VectorField) -> f64 {
    let grid = solver.grid();
    grid.interior_cells()
        .map(|(x, y, z)| v.divergence(grid, x, y, z).abs())
        .fold(0.0, f64::max)
}

/// Test that one projection strongly reduces a smooth divergent mode
#[test]
fn test_projection_reduces_divergence() {
    let mut solver = FluidSolver3D::new(periodic_params([16, 16, 16], [1.0, 1.0, 1.0])).unwrap();
    let grid = solver.grid().clone();
    let k = 2.0 * PI;
    solver.velocity_mut().par_update_interior(|x, y, z| {
        let c = grid.cell_center(x, y, z);
        DVec3::new(0.01 * (k * c.x).sin(), 0.0, 0.0)
    });

    let report = solver.step(&SortedParticles::empty(), &mut []).unwrap();
    assert!(report.solver.is_converged(), "{:?}", report.solver);

    let before = max_divergence(&solver, solver.predicted_velocity());
    let after = max_divergence(&solver, solver.velocity());
    assert!(before > 0.0);
    // Collocated projection leaves a factor sin^2(k dx / 2) ~ 0.04 of this mode
    assert!(
        after < 0.1 * before,
        "divergence {} -> {}, expected a strong reduction",
        before,
        after
    );
}

/// Test that a divergence-free shear flow passes the projection untouched
#[test]
fn test_shear_flow_needs_no_correction() {
    let mut solver = FluidSolver3D::new(periodic_params([4, 4, 16], [0.25, 0.25, 1.0])).unwrap();
    let grid = solver.grid().clone();
    solver.velocity_mut().par_update_interior(|x, y, z| {
        let c = grid.cell_center(x, y, z);
        DVec3::new((2.0 * PI * c.z).sin(), 0.0, 0.0)
    });

    let report = solver.step(&SortedParticles::empty(), &mut []).unwrap();
    assert_eq!(report.solver.iterations, 1);
    for (x, y, z) in grid.interior_cells() {
        assert_eq!(solver.epsilon().at(x, y, z), 0.0);
        assert_eq!(solver.velocity().at(x, y, z).z, 0.0);
    }
}

/// Test the zero-source wall-bounded case: Dirichlet top, Neumann bottom
#[test]
fn test_zero_source_keeps_fluid_divergence_free() {
    let params = FluidParams {
        cells: [8, 8, 8],
        extent: [8.0, 8.0, 8.0],
        viscosity: 0.01,
        density: 1000.0,
        gravity: DVec3::ZERO,
        bc_bottom: BoundaryCondition::Neumann,
        bc_top: BoundaryCondition::Dirichlet,
        p_top: 0.0,
        ..FluidParams::default()
    };
    let mut solver = FluidSolver3D::new(params).unwrap();
    for _ in 0..3 {
        let report = solver.step(&SortedParticles::empty(), &mut []).unwrap();
        assert!(report.solver.is_converged());
        assert_eq!(report.max_velocity, 0.0);
    }
    assert_eq!(max_divergence(&solver, solver.velocity()), 0.0);
    let faces = solver.face_velocity().unwrap();
    assert_eq!(faces.max_divergence(solver.grid()), 0.0);
    assert_eq!(solver.step_count(), 3);
}

/// Test that a top pressure is carried into the boundary layer of the pressure
#[test]
fn test_dirichlet_pressure_reaches_top_layer() {
    let params = FluidParams {
        cells: [4, 4, 8],
        extent: [1.0, 1.0, 2.0],
        gravity: DVec3::ZERO,
        bc_bottom: BoundaryCondition::Neumann,
        bc_top: BoundaryCondition::Dirichlet,
        p_top: 250.0,
        tolerance: 1e-26,
        max_iterations: 50_000,
        ..FluidParams::default()
    };
    let mut solver = FluidSolver3D::new(params).unwrap();
    let report = solver.step(&SortedParticles::empty(), &mut []).unwrap();
    assert!(report.solver.is_converged());

    let grid = solver.grid().clone();
    for (x, y, z) in grid.interior_cells() {
        // Uniform pressure: no gradient, no flow
        let p = solver.pressure().at(x, y, z);
        assert!((p - 250.0).abs() < 1e-6, "({x},{y},{z}): p = {p}");
    }
    assert!(report.max_velocity < 1e-9);
}
