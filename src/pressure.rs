//! Sparse linear solver for the pressure and heat systems.
//!
//! Both systems share one 5-point symmetric positive-definite layout:
//! `a_diag` holds the diagonal, `a_plus_x`/`a_plus_y` the couplings to the
//! +x/+y neighbors (the matrix is symmetric, so these double as the -x/-y
//! couplings of the neighbor rows). The solve is conjugate gradient with a
//! modified incomplete Cholesky MIC(0) preconditioner; reductions run in
//! fixed row-major order so results are bit-exact across runs.

use crate::constants::{CG_TOLERANCE, MIC_SIGMA, MIC_TAU};
use crate::quantity::{CellType, FluidQuantity};

/// Outcome of one PCG solve.
#[derive(Clone, Copy, Debug)]
pub struct SolveStats {
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
}

/// Workspace and matrix coefficients for the grid-sized linear solves.
///
/// All buffers are allocated once at construction; the pressure and heat
/// solves reuse the same storage within a step.
pub struct LinearSolver {
    width: usize,
    height: usize,

    /// Right-hand side; the residual during iteration.
    pub(crate) r: Vec<f64>,
    /// Solution vector.
    pub(crate) p: Vec<f64>,
    /// Preconditioned residual, also the matrix-vector scratch.
    z: Vec<f64>,
    /// Search direction.
    s: Vec<f64>,

    a_diag: Vec<f64>,
    a_plus_x: Vec<f64>,
    a_plus_y: Vec<f64>,
    /// Reciprocal square roots of the MIC(0) pivots.
    precon: Vec<f64>,
}

impl LinearSolver {
    pub fn new(width: usize, height: usize) -> Self {
        let n = width * height;
        Self {
            width,
            height,
            r: vec![0.0; n],
            p: vec![0.0; n],
            z: vec![0.0; n],
            s: vec![0.0; n],
            a_diag: vec![0.0; n],
            a_plus_x: vec![0.0; n],
            a_plus_y: vec![0.0; n],
            precon: vec![0.0; n],
        }
    }

    /// Assemble the pressure Poisson matrix. Each face between two fluid
    /// cells contributes `dt * face_volume / (face_density * hx²)` to both
    /// diagonals and the negated value to the coupling.
    pub fn build_pressure_matrix(
        &mut self,
        dt: f64,
        hx: f64,
        cells: &[CellType],
        u: &FluidQuantity,
        v: &FluidQuantity,
        u_density: &[f64],
        v_density: &[f64],
    ) {
        let w = self.width;
        let h = self.height;
        let scale = dt / (hx * hx);

        self.a_diag.fill(0.0);
        self.a_plus_x.fill(0.0);
        self.a_plus_y.fill(0.0);

        let mut idx = 0;
        for y in 0..h {
            for x in 0..w {
                if cells[idx] != CellType::Fluid {
                    idx += 1;
                    continue;
                }

                if x < w - 1 && cells[idx + 1] == CellType::Fluid {
                    let factor = scale * u.volume(x + 1, y) / u_density[x + 1 + y * (w + 1)];
                    self.a_diag[idx] += factor;
                    self.a_diag[idx + 1] += factor;
                    self.a_plus_x[idx] = -factor;
                }
                if y < h - 1 && cells[idx + w] == CellType::Fluid {
                    let factor = scale * v.volume(x, y + 1) / v_density[x + (y + 1) * w];
                    self.a_diag[idx] += factor;
                    self.a_diag[idx + w] += factor;
                    self.a_plus_y[idx] = -factor;
                }
                idx += 1;
            }
        }
    }

    /// Assemble the implicit heat diffusion matrix (I - κ dt ∇²) on the
    /// fluid cells; everything else keeps a unit diagonal.
    pub fn build_heat_matrix(&mut self, dt: f64, hx: f64, diffusion: f64, cells: &[CellType]) {
        let w = self.width;
        let h = self.height;
        let scale = diffusion * dt / (hx * hx);

        self.a_diag.fill(1.0);
        self.a_plus_x.fill(0.0);
        self.a_plus_y.fill(0.0);

        let mut idx = 0;
        for y in 0..h {
            for x in 0..w {
                if cells[idx] != CellType::Fluid {
                    idx += 1;
                    continue;
                }

                if x < w - 1 && cells[idx + 1] == CellType::Fluid {
                    self.a_diag[idx] += scale;
                    self.a_diag[idx + 1] += scale;
                    self.a_plus_x[idx] = -scale;
                }
                if y < h - 1 && cells[idx + w] == CellType::Fluid {
                    self.a_diag[idx] += scale;
                    self.a_diag[idx + w] += scale;
                    self.a_plus_y[idx] = -scale;
                }
                idx += 1;
            }
        }
    }

    /// Build the MIC(0) pivots for the current matrix. The sweep order is
    /// row-major and must match the substitution sweeps.
    pub fn build_preconditioner(&mut self, cells: &[CellType]) {
        let w = self.width;
        let h = self.height;

        let mut idx = 0;
        for y in 0..h {
            for x in 0..w {
                if cells[idx] != CellType::Fluid {
                    idx += 1;
                    continue;
                }

                let mut e = self.a_diag[idx];

                if x > 0 && cells[idx - 1] == CellType::Fluid {
                    let px = self.a_plus_x[idx - 1] * self.precon[idx - 1];
                    let py = self.a_plus_y[idx - 1] * self.precon[idx - 1];
                    e -= px * px + MIC_TAU * px * py;
                }
                if y > 0 && cells[idx - w] == CellType::Fluid {
                    let px = self.a_plus_x[idx - w] * self.precon[idx - w];
                    let py = self.a_plus_y[idx - w] * self.precon[idx - w];
                    e -= py * py + MIC_TAU * px * py;
                }

                // Guard against a collapsed pivot.
                if e < MIC_SIGMA * self.a_diag[idx] {
                    e = self.a_diag[idx];
                }

                self.precon[idx] = 1.0 / e.sqrt();
                idx += 1;
            }
        }
    }

    /// Solve A p = r with preconditioned conjugate gradient. Returns the
    /// iteration count and final residual; on a blown budget the best
    /// solution found stays in place and `converged` is false.
    pub fn project(&mut self, limit: usize, cells: &[CellType]) -> SolveStats {
        let w = self.width;
        let h = self.height;

        self.p.fill(0.0);
        apply_preconditioner(
            w,
            h,
            cells,
            &self.a_plus_x,
            &self.a_plus_y,
            &self.precon,
            &mut self.z,
            &self.r,
        );
        self.s.copy_from_slice(&self.z);

        let mut max_error = infinity_norm(cells, &self.r);
        if max_error < CG_TOLERANCE {
            return SolveStats {
                iterations: 0,
                residual: max_error,
                converged: true,
            };
        }

        let mut sigma = dot(cells, &self.z, &self.r);

        for iter in 0..limit {
            matrix_vector_product(
                w,
                h,
                &self.a_diag,
                &self.a_plus_x,
                &self.a_plus_y,
                &mut self.z,
                &self.s,
            );
            let alpha = sigma / dot(cells, &self.z, &self.s);
            scaled_add(cells, &mut self.p, &self.s, alpha);
            scaled_add(cells, &mut self.r, &self.z, -alpha);

            max_error = infinity_norm(cells, &self.r);
            if max_error < CG_TOLERANCE {
                return SolveStats {
                    iterations: iter + 1,
                    residual: max_error,
                    converged: true,
                };
            }

            apply_preconditioner(
                w,
                h,
                cells,
                &self.a_plus_x,
                &self.a_plus_y,
                &self.precon,
                &mut self.z,
                &self.r,
            );

            let sigma_new = dot(cells, &self.z, &self.r);
            scaled_update(cells, &mut self.s, &self.z, sigma_new / sigma);
            sigma = sigma_new;
        }

        SolveStats {
            iterations: limit,
            residual: max_error,
            converged: false,
        }
    }
}

/// dst = (L Lᵀ)⁻¹ a restricted to fluid cells: forward substitution in
/// row-major order, then backward substitution in reverse.
#[allow(clippy::too_many_arguments)]
fn apply_preconditioner(
    width: usize,
    height: usize,
    cells: &[CellType],
    a_plus_x: &[f64],
    a_plus_y: &[f64],
    precon: &[f64],
    dst: &mut [f64],
    a: &[f64],
) {
    let mut idx = 0;
    for y in 0..height {
        for x in 0..width {
            if cells[idx] != CellType::Fluid {
                idx += 1;
                continue;
            }

            let mut t = a[idx];

            if x > 0 && cells[idx - 1] == CellType::Fluid {
                t -= a_plus_x[idx - 1] * precon[idx - 1] * dst[idx - 1];
            }
            if y > 0 && cells[idx - width] == CellType::Fluid {
                t -= a_plus_y[idx - width] * precon[idx - width] * dst[idx - width];
            }

            dst[idx] = t * precon[idx];
            idx += 1;
        }
    }

    for y in (0..height).rev() {
        for x in (0..width).rev() {
            let idx = x + y * width;
            if cells[idx] != CellType::Fluid {
                continue;
            }

            let mut t = dst[idx];

            if x < width - 1 && cells[idx + 1] == CellType::Fluid {
                t -= a_plus_x[idx] * precon[idx] * dst[idx + 1];
            }
            if y < height - 1 && cells[idx + width] == CellType::Fluid {
                t -= a_plus_y[idx] * precon[idx] * dst[idx + width];
            }

            dst[idx] = t * precon[idx];
        }
    }
}

/// dst = A b with the full 5-point stencil; non-fluid couplings are zero by
/// construction, so no cell test is needed here.
fn matrix_vector_product(
    width: usize,
    height: usize,
    a_diag: &[f64],
    a_plus_x: &[f64],
    a_plus_y: &[f64],
    dst: &mut [f64],
    b: &[f64],
) {
    let mut idx = 0;
    for y in 0..height {
        for x in 0..width {
            let mut t = a_diag[idx] * b[idx];

            if x > 0 {
                t += a_plus_x[idx - 1] * b[idx - 1];
            }
            if y > 0 {
                t += a_plus_y[idx - width] * b[idx - width];
            }
            if x < width - 1 {
                t += a_plus_x[idx] * b[idx + 1];
            }
            if y < height - 1 {
                t += a_plus_y[idx] * b[idx + width];
            }

            dst[idx] = t;
            idx += 1;
        }
    }
}

fn dot(cells: &[CellType], a: &[f64], b: &[f64]) -> f64 {
    let mut result = 0.0;
    for i in 0..cells.len() {
        if cells[i] == CellType::Fluid {
            result += a[i] * b[i];
        }
    }
    result
}

fn infinity_norm(cells: &[CellType], a: &[f64]) -> f64 {
    let mut max = 0.0f64;
    for i in 0..cells.len() {
        if cells[i] == CellType::Fluid {
            max = max.max(a[i].abs());
        }
    }
    max
}

/// dst += b * s on fluid cells.
fn scaled_add(cells: &[CellType], dst: &mut [f64], b: &[f64], s: f64) {
    for i in 0..cells.len() {
        if cells[i] == CellType::Fluid {
            dst[i] += b[i] * s;
        }
    }
}

/// dst = a + dst * beta on fluid cells (the CG direction update).
fn scaled_update(cells: &[CellType], dst: &mut [f64], a: &[f64], beta: f64) {
    for i in 0..cells.len() {
        if cells[i] == CellType::Fluid {
            dst[i] = a[i] + dst[i] * beta;
        }
    }
}
