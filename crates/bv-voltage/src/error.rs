//! Error types for voltage-model construction.
//!
//! All variants are fatal at construction time: a model either validates its
//! configuration or is unusable. Solver non-convergence never appears here
//! because callers accept the best-effort iterate.

use bv_core::BvError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoltageError {
    #[error("Invalid configuration: {what}")]
    InvalidConfig { what: String },

    #[error("Core error: {0}")]
    Core(#[from] BvError),
}

pub type VoltageResult<T> = Result<T, VoltageError>;
