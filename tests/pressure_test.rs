//! The projection keeps the velocity field discretely divergence free.

use smoke2d::FluidSolver;

const DT: f64 = 0.0025;

fn max_divergence(solver: &FluidSolver) -> f64 {
    let hx = solver.cell_size();
    let (w, h) = (solver.width(), solver.height());
    let u = solver.u();
    let v = solver.v();

    let mut max = 0.0f64;
    for y in 0..h {
        for x in 0..w {
            let div = (u.at(x + 1, y) - u.at(x, y) + v.at(x, y + 1) - v.at(x, y)) / hx;
            max = max.max(div.abs());
        }
    }
    max
}

/// Without bodies every cell is fluid, so after a step the discrete
/// divergence everywhere stays within an order of magnitude of the CG
/// tolerance.
#[test]
fn test_divergence_vanishes_after_step() {
    let mut solver = FluidSolver::new(16, 16, 0.1, 0.25, 0.01, Vec::new()).unwrap();
    for _ in 0..3 {
        solver.add_inflow(0.25, 0.25, 0.25, 0.25, 1.0, 394.0, 0.0, 0.0);
        solver.step(DT).unwrap();
    }

    let div = max_divergence(&solver);
    assert!(div < 1e-4, "divergence {} after projection", div);
}

/// The plume gets faster over time, yet the projection keeps cancelling the
/// divergence it creates.
#[test]
fn test_divergence_stays_small_over_many_steps() {
    let mut solver = FluidSolver::new(16, 16, 0.1, 0.25, 0.01, Vec::new()).unwrap();
    for _ in 0..30 {
        solver.add_inflow(0.4, 0.6, 0.2, 0.1, 1.0, 394.0, 0.0, 0.0);
        solver.step(DT).unwrap();
    }

    let div = max_divergence(&solver);
    assert!(div < 1e-4, "divergence {} after 30 steps", div);

    let speed = solver
        .v()
        .src()
        .iter()
        .fold(0.0f64, |m, v| m.max(v.abs()));
    assert!(speed > 1e-4, "plume never got moving, max |v| = {}", speed);
}
