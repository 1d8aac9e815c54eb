//! Particle-grid transfers for the FLIP/PIC hybrid.
//!
//! P2G: scatter every property onto its grid with the hat filter, extrapolate
//! into solid and starved cells, then rebalance the particle population.
//! G2P: gather grid values back onto particles with a PIC blend factor.

use crate::body::SolidBody;
use crate::particles::ParticleSet;
use crate::quantity::FluidQuantity;

/// Transfer particle properties to their grids, extrapolate each field, and
/// prune/seed the particle population back into its per-cell band.
///
/// `quantities` must line up with the property channels registered at pool
/// construction.
pub fn particles_to_grid(
    particles: &mut ParticleSet,
    quantities: &mut [&mut FluidQuantity],
    bodies: &[SolidBody],
) {
    debug_assert_eq!(quantities.len(), particles.properties.len());

    let count = particles.count;
    for (q, property) in quantities.iter_mut().zip(&particles.properties) {
        q.from_particles(
            &mut particles.weight,
            count,
            &particles.pos_x,
            &particles.pos_y,
            property,
        );
        q.extrapolate();
    }

    particles.count_particles();
    particles.prune();

    let samplers: Vec<&FluidQuantity> = quantities.iter().map(|q| &**q).collect();
    particles.seed(&samplers, bodies);

    log::trace!("{} particles after seeding", particles.len());
}

/// Blend grid values back onto the particles.
///
/// With `alpha` = 1 this is a pure PIC resample. During a step the solver
/// first transforms each grid with `diff(alpha)`, so the interpolated value
/// already packs `(1 - alpha) * delta + alpha * new` and the blend
/// `new_prop = alpha * q_new + (1 - alpha) * (prop + q_new - q_old)` costs a
/// single interpolation.
pub fn grid_to_particles(particles: &mut ParticleSet, quantities: &[&FluidQuantity], alpha: f64) {
    debug_assert_eq!(quantities.len(), particles.properties.len());

    let count = particles.count;
    for (property, q) in particles.properties.iter_mut().zip(quantities) {
        for i in 0..count {
            property[i] =
                (1.0 - alpha) * property[i] + q.lerp(particles.pos_x[i], particles.pos_y[i]);
        }
    }
}
