//! bv-core: stable foundation for the battery voltage stack.
//!
//! Contains:
//! - units (uom temperature types + constructors for the API boundary)
//! - numeric (tolerances + float comparison/validation helpers)
//! - error (shared error types)

pub mod error;
pub mod numeric;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use error::{BvError, BvResult};
pub use numeric::*;
pub use units::*;
