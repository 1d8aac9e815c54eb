//! Physical and solver constants.

/// Ambient temperature of the air at rest (Kelvin).
pub const AMBIENT_TEMPERATURE: f64 = 294.0;

/// Gravity magnitude (m/s²). The y axis points down the image, so positive
/// buoyancy sinks and negative buoyancy rises.
pub const GRAVITY: f64 = 9.81;

/// FLIP/PIC blend factor: weight of the pure particle-in-cell resample.
/// Kept tiny so the transfer stays essentially FLIP but picks up enough
/// smoothing to suppress particle noise.
pub const FLIP_ALPHA: f64 = 0.001;

/// Convergence threshold on the residual infinity norm of the PCG solves.
pub const CG_TOLERANCE: f64 = 1e-5;

/// Iteration budget for one PCG solve. Exceeding it is reported, not fatal.
pub const CG_ITERATION_LIMIT: usize = 2000;

/// Modified incomplete Cholesky tuning constant.
pub const MIC_TAU: f64 = 0.97;

/// Safety threshold for the MIC(0) pivot; below it the pivot resets to the
/// plain diagonal.
pub const MIC_SIGMA: f64 = 0.25;

/// Hard cap of particles per cell before pruning kicks in.
pub const MAX_PARTICLES_PER_CELL: usize = 12;

/// Cells below this count get reseeded.
pub const MIN_PARTICLES_PER_CELL: usize = 3;

/// Initial number of particles seeded per cell.
pub const AVG_PARTICLES_PER_CELL: usize = 4;

/// Default seed of the particle jitter generator.
pub const DEFAULT_SEED: u32 = 0xBA5E_BA11;
