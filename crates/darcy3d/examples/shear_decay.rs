//! Viscous decay of a periodic shear wave.
//!
//! Prints the amplitude of `v_x = A sin(2 pi z)` against the analytic decay
//! `exp(-nu k^2 t)`. Run with `RUST_LOG=debug` to see per-step solver output.

use darcy3d::{BoundaryCondition, DVec3, FluidParams, FluidSolver3D, SortedParticles};
use std::f64::consts::PI;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== SHEAR WAVE DECAY ===\n");

    let params = FluidParams {
        cells: [4, 4, 32],
        extent: [0.125, 0.125, 1.0],
        viscosity: 0.01,
        density: 1.0,
        gravity: DVec3::ZERO,
        dt: 0.01,
        bc_bottom: BoundaryCondition::Periodic,
        bc_top: BoundaryCondition::Periodic,
        ..FluidParams::default()
    };
    let nu = params.kinematic_viscosity();
    let mut solver = FluidSolver3D::new(params)?;
    let grid = solver.grid().clone();
    let k = 2.0 * PI;
    let amplitude = 0.1;
    solver.velocity_mut().par_update_interior(|x, y, z| {
        let c = grid.cell_center(x, y, z);
        DVec3::new(amplitude * (k * c.z).sin(), 0.0, 0.0)
    });

    let layer = 7;
    let initial = solver.velocity().at(0, 0, layer).x;
    for step in 0..=200 {
        if step % 20 == 0 {
            let ratio = solver.velocity().at(0, 0, layer).x / initial;
            let exact = (-nu * k * k * solver.time()).exp();
            println!(
                "t = {:5.2} s: amplitude {:.5}, analytic {:.5}, error {:+.2}%",
                solver.time(),
                ratio,
                exact,
                100.0 * (ratio - exact) / exact
            );
        }
        solver.step(&SortedParticles::empty(), &mut [])?;
    }
    Ok(())
}
