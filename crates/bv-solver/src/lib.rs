//! Damped Newton root finding for battery voltage models.
//!
//! Power-to-current inversion for the electrochemical voltage variants has no
//! closed form, so they hand a residual closure to [`damped_newton`] and read
//! the root back out of [`NewtonResult`]. Running out of iterations is not an
//! error here: callers accept the last iterate as a best-effort answer, so the
//! solver reports convergence through a flag instead of failing.

pub mod error;
pub mod jacobian;
pub mod newton;

pub use error::{SolverError, SolverResult};
pub use jacobian::finite_difference_jacobian;
pub use newton::{damped_newton, NewtonConfig, NewtonResult};
