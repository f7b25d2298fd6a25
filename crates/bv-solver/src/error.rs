//! Error types for solver operations.
//!
//! Non-convergence is deliberately not represented here; see
//! [`crate::newton::NewtonResult::converged`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Problem setup error: {what}")]
    ProblemSetup { what: String },

    #[error("Numeric error: {what}")]
    Numeric { what: String },
}

pub type SolverResult<T> = Result<T, SolverError>;
