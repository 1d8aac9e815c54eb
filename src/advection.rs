//! Particle advection through the staggered velocity fields.

use glam::DVec2;

use crate::body::SolidBody;
use crate::particles::ParticleSet;
use crate::quantity::FluidQuantity;

/// One Ralston third-order Runge-Kutta step forward in time, in grid units.
/// All three velocity samples are converted from world to grid units.
fn runge_kutta_3(p: DVec2, dt: f64, hx: f64, u: &FluidQuantity, v: &FluidQuantity) -> DVec2 {
    let sample = |q: DVec2| DVec2::new(u.lerp(q.x, q.y), v.lerp(q.x, q.y)) / hx;

    let k1 = sample(p);
    let k2 = sample(p + 0.5 * dt * k1);
    let k3 = sample(p + 0.75 * dt * k2);

    p + dt * (2.0 * k1 + 3.0 * k2 + 4.0 * k3) / 9.0
}

/// Push a particle that drifted into a solid back into the fluid: project it
/// to the closest surface point of the nearest body, then one cell outward
/// along the body normal.
fn back_project(p: DVec2, hx: f64, bodies: &[SolidBody]) -> DVec2 {
    let mut closest = usize::MAX;
    let mut d = f64::MAX;
    for (i, body) in bodies.iter().enumerate() {
        let id = body.distance(p * hx);
        if id < d {
            d = id;
            closest = i;
        }
    }

    if d < 0.0 {
        let body = &bodies[closest];
        let surface = body.closest_surface_point(p * hx);
        let normal = body.normal(surface);
        (surface + normal * hx) / hx
    } else {
        p
    }
}

/// Advect all particles through (u, v), eject any that ended up inside a
/// body, and clamp the results to the domain.
pub fn advect_particles(
    particles: &mut ParticleSet,
    dt: f64,
    u: &FluidQuantity,
    v: &FluidQuantity,
    bodies: &[SolidBody],
) {
    let hx = particles.hx;
    let max_x = particles.width as f64 - 0.001;
    let max_y = particles.height as f64 - 0.001;

    for i in 0..particles.count {
        let mut p = DVec2::new(particles.pos_x[i], particles.pos_y[i]);
        p = runge_kutta_3(p, dt, hx, u, v);
        p = back_project(p, hx, bodies);

        particles.pos_x[i] = p.x.clamp(0.0, max_x);
        particles.pos_y[i] = p.y.clamp(0.0, max_y);

        debug_assert!(particles.pos_x[i] >= 0.0 && particles.pos_x[i] < particles.width as f64);
        debug_assert!(particles.pos_y[i] >= 0.0 && particles.pos_y[i] < particles.height as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_flow_translates_particles() {
        let hx = 1.0 / 8.0;
        let mut u = FluidQuantity::new(9, 8, 0.0, 0.5, hx);
        let mut v = FluidQuantity::new(8, 9, 0.5, 0.0, hx);
        u.src_mut().fill(0.5);
        v.src_mut().fill(-0.25);

        let mut particles = ParticleSet::new(8, 8, hx, 0, 0xBA5E_BA11, &[]);
        let before: Vec<DVec2> = (0..particles.len()).map(|i| particles.position(i)).collect();

        let dt = 0.01;
        advect_particles(&mut particles, dt, &u, &v, &[]);

        // In a constant field all RK3 stages agree: dx = dt * vel / hx.
        for (i, b) in before.iter().enumerate() {
            let p = particles.position(i);
            let moved = p - *b;
            if p.x > 0.0 && p.x < 7.9 && p.y > 0.0 && p.y < 7.9 {
                assert!((moved.x - dt * 0.5 / hx).abs() < 1e-9, "dx {}", moved.x);
                assert!((moved.y + dt * 0.25 / hx).abs() < 1e-9, "dy {}", moved.y);
            }
        }
    }

    #[test]
    fn test_particles_stay_in_domain() {
        let hx = 1.0 / 8.0;
        let mut u = FluidQuantity::new(9, 8, 0.0, 0.5, hx);
        let v = FluidQuantity::new(8, 9, 0.5, 0.0, hx);
        u.src_mut().fill(100.0);

        let mut particles = ParticleSet::new(8, 8, hx, 0, 0xBA5E_BA11, &[]);
        advect_particles(&mut particles, 0.1, &u, &v, &[]);

        for i in 0..particles.len() {
            let p = particles.position(i);
            assert!(p.x >= 0.0 && p.x < 8.0 - 0.0009, "x escaped: {}", p.x);
            assert!(p.y >= 0.0 && p.y < 8.0, "y escaped: {}", p.y);
        }
    }

    #[test]
    fn test_back_projection_ejects_particles_from_bodies() {
        let hx = 1.0 / 8.0;
        let u = FluidQuantity::new(9, 8, 0.0, 0.5, hx);
        let v = FluidQuantity::new(8, 9, 0.5, 0.0, hx);
        let bodies = vec![SolidBody::new_sphere(
            DVec2::new(0.5, 0.5),
            0.5,
            0.0,
            DVec2::ZERO,
            0.0,
        )];

        let mut particles = ParticleSet::new(8, 8, hx, 0, 0xBA5E_BA11, &bodies);
        // Force one particle deep inside the sphere.
        particles.pos_x[0] = 0.5 / hx;
        particles.pos_y[0] = 0.45 / hx;

        advect_particles(&mut particles, 0.001, &u, &v, &bodies);

        for i in 0..particles.len() {
            let p = particles.position(i) * hx;
            assert!(
                bodies[0].distance(p) >= -1e-9,
                "particle {} still inside the body: {:?}",
                i,
                p
            );
        }
    }
}
