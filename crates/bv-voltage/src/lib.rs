//! bv-voltage: terminal-voltage models for electrochemical cell stacks.
//!
//! Three variants share the [`VoltageModel`] contract:
//! - [`TableVoltage`]: piecewise-linear empirical discharge curve with linear
//!   extrapolation past the tabulated range
//! - [`DynamicVoltage`]: Tremblay-Dube electrochemical discharge equation,
//!   power inverted to current through the Newton solver
//! - [`VanadiumRedoxVoltage`]: logarithmic open-circuit model for all-vanadium
//!   flow cells, also solver-backed
//!
//! Voltage is tracked per cell. Charge, current and power cross the API at
//! stack level (cells in series x strings in parallel) and are converted to
//! per-string or per-cell quantities inside each method. Discharge is
//! positive, charge negative.

pub mod config;
pub mod dynamic;
pub mod error;
pub mod model;
pub mod table;
pub mod vanadium;

pub use config::VoltageModelConfig;
pub use dynamic::{DynamicParams, DynamicVoltage};
pub use error::{VoltageError, VoltageResult};
pub use model::{PowerCurrent, StackConfig, VoltageModel, VoltageState};
pub use table::TableVoltage;
pub use vanadium::VanadiumRedoxVoltage;

/// Guard band shared by the SOC clamps and the discharge scans
/// (fraction of capacity or Ah depending on context).
pub(crate) const TOLERANCE: f64 = 1e-3;
