//! Damped Newton solver with numerically estimated Jacobian.

use crate::error::{SolverError, SolverResult};
use crate::jacobian::finite_difference_jacobian;
use nalgebra::DVector;
use tracing::debug;

/// Newton solver configuration.
///
/// The defaults (100 iterations, 1e-6 tolerances, 0.7 damping) are the ones
/// shared by every voltage-model call site; they are exposed here rather than
/// hard-coded so a caller can tune them per model.
#[derive(Clone, Copy, Debug)]
pub struct NewtonConfig {
    /// Maximum iterations
    pub max_iterations: usize,
    /// Absolute tolerance for residual norm
    pub abs_tol: f64,
    /// Relative tolerance for residual norm
    pub rel_tol: f64,
    /// Fraction of the full Newton step applied each iteration
    pub damping: f64,
    /// Relative perturbation for the finite-difference Jacobian
    pub fd_epsilon: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            abs_tol: 1e-6,
            rel_tol: 1e-6,
            damping: 0.7,
            fd_epsilon: 1e-7,
        }
    }
}

/// Newton iteration result.
#[derive(Clone, Debug)]
pub struct NewtonResult {
    /// Final iterate
    pub x: DVector<f64>,
    /// Final residual norm
    pub residual_norm: f64,
    /// Number of iterations
    pub iterations: usize,
    /// False when `x` is a best-effort iterate rather than a root
    pub converged: bool,
}

/// Newton-Raphson with a forward finite-difference Jacobian and step damping.
///
/// Exhausting the iteration budget, hitting a singular Jacobian, or stepping
/// into a non-finite residual all return `Ok` with `converged: false` and the
/// last usable iterate; only a malformed problem is an `Err`. Deterministic
/// for identical inputs.
pub fn damped_newton<F>(
    x0: DVector<f64>,
    residual_fn: F,
    config: &NewtonConfig,
) -> SolverResult<NewtonResult>
where
    F: Fn(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    if x0.is_empty() {
        return Err(SolverError::ProblemSetup {
            what: "empty initial guess".to_string(),
        });
    }

    let mut x = x0;
    let mut r = residual_fn(&x)?;
    if r.len() != x.len() {
        return Err(SolverError::ProblemSetup {
            what: format!(
                "residual dimension {} does not match unknowns {}",
                r.len(),
                x.len()
            ),
        });
    }
    let mut r_norm = r.norm();
    if !r_norm.is_finite() {
        return Err(SolverError::Numeric {
            what: format!("non-finite residual at initial guess, norm = {}", r_norm),
        });
    }
    let r0_norm = r_norm;

    for iter in 0..config.max_iterations {
        if r_norm < config.abs_tol || r_norm < config.rel_tol * r0_norm {
            return Ok(NewtonResult {
                x,
                residual_norm: r_norm,
                iterations: iter,
                converged: true,
            });
        }

        let jac = finite_difference_jacobian(&x, &residual_fn, config.fd_epsilon)?;

        // Solve J * dx = -r
        let neg_r = -r.clone();
        let dx = match jac.lu().solve(&neg_r) {
            Some(dx) => dx,
            None => {
                debug!(iteration = iter, residual = r_norm, "singular Jacobian, keeping last iterate");
                return Ok(NewtonResult {
                    x,
                    residual_norm: r_norm,
                    iterations: iter,
                    converged: false,
                });
            }
        };

        let x_new = &x + &dx * config.damping;
        let r_new = residual_fn(&x_new)?;
        let r_new_norm = r_new.norm();
        if !r_new_norm.is_finite() {
            debug!(iteration = iter, residual = r_norm, "non-finite trial residual, keeping last iterate");
            return Ok(NewtonResult {
                x,
                residual_norm: r_norm,
                iterations: iter,
                converged: false,
            });
        }

        x = x_new;
        r = r_new;
        r_norm = r_new_norm;
    }

    debug!(
        residual = r_norm,
        max_iterations = config.max_iterations,
        "iteration budget exhausted, returning last iterate"
    );
    Ok(NewtonResult {
        x,
        residual_norm: r_norm,
        iterations: config.max_iterations,
        converged: false,
    })
}
