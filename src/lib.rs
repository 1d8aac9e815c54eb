//! 2D incompressible smoke-and-heat simulation.
//!
//! A FLIP/PIC hybrid on a MAC staggered grid: soot density, temperature and
//! velocity ride on particles, get splatted onto staggered grids each step,
//! then heat diffusion, buoyancy and a MIC(0)-preconditioned pressure
//! projection run on the grids before the changes flow back to the particles.
//! Solid obstacles are rigid signed-distance bodies that carve fractional
//! cell volumes out of the grid and drive the fluid through their boundary
//! velocities.
//!
//! # Example
//!
//! ```
//! use glam::DVec2;
//! use smoke2d::{FluidSolver, SolidBody};
//!
//! let bodies = vec![SolidBody::new_box(
//!     DVec2::new(0.5, 0.6),
//!     DVec2::new(0.7, 0.1),
//!     std::f64::consts::PI * 0.25,
//!     DVec2::ZERO,
//!     0.0,
//! )];
//! let mut solver = FluidSolver::new(32, 32, 0.1, 0.25, 0.01, bodies).unwrap();
//!
//! // A hot soot inflow near the bottom of the domain.
//! solver.add_inflow(0.35, 0.9, 0.1, 0.05, 1.0, solver.ambient_temperature() + 300.0, 0.0, 0.0);
//! solver.step(0.0025).unwrap();
//!
//! let mut image = vec![0u8; 32 * 32 * 4];
//! solver.to_image(&mut image, false);
//! ```

pub mod advection;
pub mod body;
pub mod constants;
pub mod kernels;
pub mod occupancy;
pub mod particles;
pub mod pressure;
pub mod quantity;
pub mod transfer;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use body::{Shape, SolidBody};
pub use glam::DVec2;
pub use particles::ParticleSet;
pub use pressure::SolveStats;
pub use quantity::{CellType, FluidQuantity};

use constants::{
    AMBIENT_TEMPERATURE, CG_ITERATION_LIMIT, DEFAULT_SEED, FLIP_ALPHA, GRAVITY,
};
use pressure::LinearSolver;

/// Errors reported by solver construction and stepping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolverError {
    /// The grid needs at least two cells along each axis.
    InvalidGridSize { width: usize, height: usize },
    /// Air and soot densities must be positive.
    InvalidDensity { density: f64 },
    /// The heat diffusion coefficient must be non-negative.
    InvalidDiffusion { diffusion: f64 },
    /// The timestep must be positive.
    InvalidTimestep { dt: f64 },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::InvalidGridSize { width, height } => {
                write!(f, "grid must be at least 2x2 cells, got {}x{}", width, height)
            }
            SolverError::InvalidDensity { density } => {
                write!(f, "densities must be positive, got {}", density)
            }
            SolverError::InvalidDiffusion { diffusion } => {
                write!(f, "diffusion coefficient must be non-negative, got {}", diffusion)
            }
            SolverError::InvalidTimestep { dt } => {
                write!(f, "timestep must be positive, got {}", dt)
            }
        }
    }
}

impl std::error::Error for SolverError {}

/// Solver construction parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Grid cells along x.
    pub width: usize,
    /// Grid cells along y.
    pub height: usize,
    /// Density of clear air.
    pub density_air: f64,
    /// Density of fully sooty air.
    pub density_soot: f64,
    /// Heat diffusion coefficient.
    pub diffusion: f64,
    /// Seed of the particle jitter generator.
    pub seed: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            density_air: 0.1,
            density_soot: 0.25,
            diffusion: 0.01,
            seed: DEFAULT_SEED,
        }
    }
}

/// A rectangular inflow queued by the driver, applied right after the
/// snapshot point of the next step so the FLIP delta sees it.
#[derive(Clone, Copy, Debug)]
struct Inflow {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    density: f64,
    temperature: f64,
    u: f64,
    v: f64,
}

/// The solver: four staggered quantities, the particle pool, the linear
/// solver workspace and the solid bodies.
///
/// The domain is [0, width·hx] x [0, height·hx] with hx = 1/min(width,
/// height); the y axis points down the image. `step` is synchronous and
/// owns every buffer for its whole duration; the driver mutates bodies only
/// between steps, through [`FluidSolver::update_bodies`].
pub struct FluidSolver {
    width: usize,
    height: usize,
    hx: f64,

    density_air: f64,
    density_soot: f64,
    diffusion: f64,

    /// Cell-centered soot density.
    d: FluidQuantity,
    /// Cell-centered temperature.
    t: FluidQuantity,
    /// x velocity on vertical faces, (width + 1) x height.
    u: FluidQuantity,
    /// y velocity on horizontal faces, width x (height + 1).
    v: FluidQuantity,

    particles: ParticleSet,
    lin: LinearSolver,

    /// Interpolated air density at u faces.
    u_density: Vec<f64>,
    /// Interpolated air density at v faces.
    v_density: Vec<f64>,

    bodies: Vec<SolidBody>,
    inflows: Vec<Inflow>,
}

impl FluidSolver {
    /// Create a solver with the default jitter seed.
    pub fn new(
        width: usize,
        height: usize,
        density_air: f64,
        density_soot: f64,
        diffusion: f64,
        bodies: Vec<SolidBody>,
    ) -> Result<Self, SolverError> {
        Self::with_seed(width, height, density_air, density_soot, diffusion, bodies, DEFAULT_SEED)
    }

    /// Create a solver from a serializable parameter block.
    pub fn from_config(config: &SolverConfig, bodies: Vec<SolidBody>) -> Result<Self, SolverError> {
        Self::with_seed(
            config.width,
            config.height,
            config.density_air,
            config.density_soot,
            config.diffusion,
            bodies,
            config.seed,
        )
    }

    /// Create a solver with an explicit jitter seed. Runs with the same seed
    /// and inputs are bit-exact.
    pub fn with_seed(
        width: usize,
        height: usize,
        density_air: f64,
        density_soot: f64,
        diffusion: f64,
        bodies: Vec<SolidBody>,
        seed: u32,
    ) -> Result<Self, SolverError> {
        if width < 2 || height < 2 {
            return Err(SolverError::InvalidGridSize { width, height });
        }
        if !(density_air > 0.0) {
            return Err(SolverError::InvalidDensity { density: density_air });
        }
        if !(density_soot > 0.0) {
            return Err(SolverError::InvalidDensity { density: density_soot });
        }
        if !(diffusion >= 0.0) {
            return Err(SolverError::InvalidDiffusion { diffusion });
        }

        let hx = 1.0 / width.min(height) as f64;

        let d = FluidQuantity::new(width, height, 0.5, 0.5, hx);
        let mut t = FluidQuantity::new(width, height, 0.5, 0.5, hx);
        let u = FluidQuantity::new(width + 1, height, 0.0, 0.5, hx);
        let v = FluidQuantity::new(width, height + 1, 0.5, 0.0, hx);

        t.src_mut().fill(AMBIENT_TEMPERATURE);

        let particles = ParticleSet::new(width, height, hx, 4, seed, &bodies);

        let mut solver = Self {
            width,
            height,
            hx,
            density_air,
            density_soot,
            diffusion,
            d,
            t,
            u,
            v,
            particles,
            lin: LinearSolver::new(width, height),
            u_density: vec![0.0; (width + 1) * height],
            v_density: vec![0.0; width * (height + 1)],
            bodies,
            inflows: Vec::new(),
        };

        // Load the initial grid state onto the particles (pure PIC).
        {
            let Self { particles, d, t, u, v, .. } = &mut solver;
            let quantities: [&FluidQuantity; 4] = [d, t, u, v];
            transfer::grid_to_particles(particles, &quantities, 1.0);
        }

        Ok(solver)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Grid cell size in world units.
    pub fn cell_size(&self) -> f64 {
        self.hx
    }

    /// Temperature of the air at rest.
    pub fn ambient_temperature(&self) -> f64 {
        AMBIENT_TEMPERATURE
    }

    /// Cell-centered soot density field.
    pub fn density(&self) -> &FluidQuantity {
        &self.d
    }

    /// Cell-centered temperature field.
    pub fn temperature(&self) -> &FluidQuantity {
        &self.t
    }

    /// x velocity on vertical faces.
    pub fn u(&self) -> &FluidQuantity {
        &self.u
    }

    /// y velocity on horizontal faces.
    pub fn v(&self) -> &FluidQuantity {
        &self.v
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    pub fn bodies(&self) -> &[SolidBody] {
        &self.bodies
    }

    /// Euler-advance all solid bodies. The driver calls this between steps.
    pub fn update_bodies(&mut self, dt: f64) {
        for body in &mut self.bodies {
            body.update(dt);
        }
    }

    /// Queue a rectangular inflow in world coordinates: soot density `d`,
    /// temperature `t` and velocity (`u`, `v`) stamped over
    /// [x, x + w] x [y, y + h] at the start of the next step. Regions
    /// outside the domain are clipped.
    #[allow(clippy::too_many_arguments)]
    pub fn add_inflow(&mut self, x: f64, y: f64, w: f64, h: f64, d: f64, t: f64, u: f64, v: f64) {
        self.inflows.push(Inflow {
            x0: x,
            y0: y,
            x1: x + w,
            y1: y + h,
            density: d,
            temperature: t,
            u,
            v,
        });
    }

    /// Advance the simulation by one timestep.
    pub fn step(&mut self, dt: f64) -> Result<(), SolverError> {
        if !(dt > 0.0) {
            return Err(SolverError::InvalidTimestep { dt });
        }

        self.d.fill_solid_fields(&self.bodies);
        self.t.fill_solid_fields(&self.bodies);
        self.u.fill_solid_fields(&self.bodies);
        self.v.fill_solid_fields(&self.bodies);

        // Particle state becomes the new grid state.
        {
            let Self { particles, d, t, u, v, bodies, .. } = self;
            let mut quantities: [&mut FluidQuantity; 4] = [d, t, u, v];
            transfer::particles_to_grid(particles, &mut quantities, bodies);
        }

        // Snapshot for the FLIP delta; everything between here and diff()
        // counts as this step's change.
        self.d.copy();
        self.t.copy();
        self.u.copy();
        self.v.copy();

        self.apply_inflows();

        self.solve_heat(dt);
        self.t.extrapolate();

        self.add_buoyancy(dt);
        self.set_boundary_condition();

        self.compute_face_densities();
        self.build_rhs();
        self.lin.build_pressure_matrix(
            dt,
            self.hx,
            self.d.cells(),
            &self.u,
            &self.v,
            &self.u_density,
            &self.v_density,
        );
        self.lin.build_preconditioner(self.d.cells());
        let stats = self.lin.project(CG_ITERATION_LIMIT, self.d.cells());
        log_projection("pressure", stats);
        self.apply_pressure(dt);

        self.d.extrapolate();
        self.u.extrapolate();
        self.v.extrapolate();

        self.set_boundary_condition();

        // Hand the blended change back to the particles, then restore the
        // post-step grids for advection and rendering.
        self.d.diff(FLIP_ALPHA);
        self.t.diff(FLIP_ALPHA);
        self.u.diff(FLIP_ALPHA);
        self.v.diff(FLIP_ALPHA);
        {
            let Self { particles, d, t, u, v, .. } = self;
            let quantities: [&FluidQuantity; 4] = [d, t, u, v];
            transfer::grid_to_particles(particles, &quantities, FLIP_ALPHA);
        }
        self.d.undiff(FLIP_ALPHA);
        self.t.undiff(FLIP_ALPHA);
        self.u.undiff(FLIP_ALPHA);
        self.v.undiff(FLIP_ALPHA);

        {
            let Self { particles, u, v, bodies, .. } = self;
            advection::advect_particles(particles, dt, u, v, bodies);
        }

        Ok(())
    }

    /// Write the visible state as RGBA rows, top row first.
    ///
    /// With `render_heat` false the output is width x height grayscale
    /// smoke; with it true the output is (2·width) x height, heat on the
    /// left half and smoke on the right. Cells that received no particles
    /// render pure red.
    pub fn to_image(&self, rgba: &mut [u8], render_heat: bool) {
        let w = self.width;
        debug_assert!(rgba.len() >= 4 * w * self.height * if render_heat { 2 } else { 1 });

        for y in 0..self.height {
            for x in 0..w {
                let (idx_heat, idx_smoke) = if render_heat {
                    (4 * (x + y * w * 2), 4 * (x + y * w * 2 + w))
                } else {
                    (0, 4 * (x + y * w))
                };

                let volume = self.d.volume(x, y);

                let shade = ((1.0 - self.d.at(x, y)) * volume).clamp(0.0, 1.0);
                let gray = (shade * 255.0) as u8;
                rgba[idx_smoke] = gray;
                rgba[idx_smoke + 1] = gray;
                rgba[idx_smoke + 2] = gray;
                rgba[idx_smoke + 3] = 0xFF;

                if self.d.cells()[x + y * w] == CellType::Empty {
                    rgba[idx_smoke] = 0xFF;
                    rgba[idx_smoke + 1] = 0;
                    rgba[idx_smoke + 2] = 0;
                }

                if render_heat {
                    let t = ((self.t.at(x, y) - AMBIENT_TEMPERATURE).abs() / 70.0).clamp(0.0, 1.0);

                    let r = 1.0 + volume * ((t * 4.0).min(1.0) - 1.0);
                    let g = 1.0 + volume * ((t * 2.0).min(1.0) - 1.0);
                    let b = 1.0 + volume * ((t * 4.0 - 3.0).clamp(0.0, 1.0) - 1.0);

                    rgba[idx_heat] = (r * 255.0) as u8;
                    rgba[idx_heat + 1] = (g * 255.0) as u8;
                    rgba[idx_heat + 2] = (b * 255.0) as u8;
                    rgba[idx_heat + 3] = 0xFF;
                }
            }
        }
    }

    /// Stamp every queued inflow onto the four grids and clear the queue.
    fn apply_inflows(&mut self) {
        let Self { d, t, u, v, inflows, .. } = self;
        for f in inflows.drain(..) {
            d.add_inflow(f.x0, f.y0, f.x1, f.y1, f.density);
            t.add_inflow(f.x0, f.y0, f.x1, f.y1, f.temperature);
            u.add_inflow(f.x0, f.y0, f.x1, f.y1, f.u);
            v.add_inflow(f.x0, f.y0, f.x1, f.y1, f.v);
        }
    }

    /// Solve (I - κ dt ∇²) t_new = t_old implicitly and overwrite the
    /// temperature field with the result.
    fn solve_heat(&mut self, dt: f64) {
        self.lin.r.copy_from_slice(self.t.src());
        self.lin.build_heat_matrix(dt, self.hx, self.diffusion, self.d.cells());
        self.lin.build_preconditioner(self.d.cells());
        let stats = self.lin.project(CG_ITERATION_LIMIT, self.d.cells());
        log_projection("heat", stats);
        self.t.src_mut().copy_from_slice(&self.lin.p);
    }

    /// Buoyancy from soot load and temperature deviation, split evenly onto
    /// the two v faces of every cell. Heavy soot sinks (+y is down), hot air
    /// rises.
    fn add_buoyancy(&mut self, dt: f64) {
        let alpha = (self.density_soot - self.density_air) / self.density_air;

        for y in 0..self.height {
            for x in 0..self.width {
                let buoyancy = dt
                    * GRAVITY
                    * (alpha * self.d.at(x, y)
                        - (self.t.at(x, y) - AMBIENT_TEMPERATURE) / AMBIENT_TEMPERATURE);

                *self.v.at_mut(x, y) += 0.5 * buoyancy;
                *self.v.at_mut(x, y + 1) += 0.5 * buoyancy;
            }
        }
    }

    /// Interpolate the gas density onto the velocity faces: each cell hands
    /// half its density to the four incident face samples. The density floor
    /// keeps very hot cells from collapsing the pressure weights.
    fn compute_face_densities(&mut self) {
        let alpha = (self.density_soot - self.density_air) / self.density_air;
        let w = self.width;

        self.u_density.fill(0.0);
        self.v_density.fill(0.0);

        for y in 0..self.height {
            for x in 0..w {
                let density = (self.density_air * AMBIENT_TEMPERATURE / self.t.at(x, y)
                    * (1.0 + alpha * self.d.at(x, y)))
                .max(0.05 * self.density_air);

                self.u_density[x + y * (w + 1)] += 0.5 * density;
                self.v_density[x + y * w] += 0.5 * density;
                self.u_density[x + 1 + y * (w + 1)] += 0.5 * density;
                self.v_density[x + (y + 1) * w] += 0.5 * density;
            }
        }
    }

    /// Negative divergence of the velocity field, weighted by fractional
    /// face volumes, plus the motion of bordering solids: a moving body
    /// pushes fluid through the partial faces it overlaps.
    fn build_rhs(&mut self) {
        let w = self.width;
        let h = self.height;
        let hx = self.hx;
        let scale = 1.0 / hx;

        let Self { lin, d, u, v, bodies, .. } = self;
        let cells = d.cells();
        let nearest = d.body_indices();

        let mut idx = 0;
        for y in 0..h {
            for x in 0..w {
                if cells[idx] != CellType::Fluid {
                    lin.r[idx] = 0.0;
                    idx += 1;
                    continue;
                }

                lin.r[idx] = -scale
                    * (u.volume(x + 1, y) * u.at(x + 1, y) - u.volume(x, y) * u.at(x, y)
                        + v.volume(x, y + 1) * v.at(x, y + 1)
                        - v.volume(x, y) * v.at(x, y));

                if !bodies.is_empty() {
                    let vol = d.volume(x, y);

                    if x > 0 {
                        let b = &bodies[nearest[idx - 1] as usize];
                        let p = DVec2::new(x as f64 * hx, (y as f64 + 0.5) * hx);
                        lin.r[idx] -= (u.volume(x, y) - vol) * b.velocity_at(p).x;
                    }
                    if y > 0 {
                        let b = &bodies[nearest[idx - w] as usize];
                        let p = DVec2::new((x as f64 + 0.5) * hx, y as f64 * hx);
                        lin.r[idx] -= (v.volume(x, y) - vol) * b.velocity_at(p).y;
                    }
                    if x < w - 1 {
                        let b = &bodies[nearest[idx + 1] as usize];
                        let p = DVec2::new((x as f64 + 1.0) * hx, (y as f64 + 0.5) * hx);
                        lin.r[idx] += (u.volume(x + 1, y) - vol) * b.velocity_at(p).x;
                    }
                    if y < h - 1 {
                        let b = &bodies[nearest[idx + w] as usize];
                        let p = DVec2::new((x as f64 + 0.5) * hx, (y as f64 + 1.0) * hx);
                        lin.r[idx] += (v.volume(x, y + 1) - vol) * b.velocity_at(p).y;
                    }
                }
                idx += 1;
            }
        }
    }

    /// Subtract the pressure gradient from the face velocities of every
    /// fluid cell.
    fn apply_pressure(&mut self, dt: f64) {
        let w = self.width;
        let h = self.height;
        let scale = dt / self.hx;

        let Self { lin, d, u, v, u_density, v_density, .. } = self;
        let cells = d.cells();

        let mut idx = 0;
        for y in 0..h {
            for x in 0..w {
                if cells[idx] != CellType::Fluid {
                    idx += 1;
                    continue;
                }

                *u.at_mut(x, y) -= scale * lin.p[idx] / u_density[x + y * (w + 1)];
                *v.at_mut(x, y) -= scale * lin.p[idx] / v_density[x + y * w];
                *u.at_mut(x + 1, y) += scale * lin.p[idx] / u_density[x + 1 + y * (w + 1)];
                *v.at_mut(x, y + 1) += scale * lin.p[idx] / v_density[x + (y + 1) * w];
                idx += 1;
            }
        }
    }

    /// Stamp the rigid-body velocity onto the faces of every solid cell and
    /// zero the normal velocity on the domain ring.
    fn set_boundary_condition(&mut self) {
        let w = self.width;
        let h = self.height;
        let hx = self.hx;

        let Self { d, u, v, bodies, .. } = self;
        let cells = d.cells();
        let nearest = d.body_indices();

        let mut idx = 0;
        for y in 0..h {
            for x in 0..w {
                if cells[idx] == CellType::Solid {
                    let b = &bodies[nearest[idx] as usize];

                    *u.at_mut(x, y) =
                        b.velocity_at(DVec2::new(x as f64 * hx, (y as f64 + 0.5) * hx)).x;
                    *v.at_mut(x, y) =
                        b.velocity_at(DVec2::new((x as f64 + 0.5) * hx, y as f64 * hx)).y;
                    *u.at_mut(x + 1, y) =
                        b.velocity_at(DVec2::new((x as f64 + 1.0) * hx, (y as f64 + 0.5) * hx)).x;
                    *v.at_mut(x, y + 1) =
                        b.velocity_at(DVec2::new((x as f64 + 0.5) * hx, (y as f64 + 1.0) * hx)).y;
                }
                idx += 1;
            }
        }

        for y in 0..h {
            *u.at_mut(0, y) = 0.0;
            *u.at_mut(w, y) = 0.0;
        }
        for x in 0..w {
            *v.at_mut(x, 0) = 0.0;
            *v.at_mut(x, h) = 0.0;
        }
    }
}

fn log_projection(label: &str, stats: SolveStats) {
    if stats.converged {
        log::debug!(
            "{} solve converged after {} iterations, residual {:.3e}",
            label,
            stats.iterations,
            stats.residual
        );
    } else {
        log::warn!(
            "{} solve exceeded {} iterations, residual {:.3e}",
            label,
            stats.iterations,
            stats.residual
        );
    }
}
