//! Float comparison and validation helpers.

use crate::BvError;

/// Absolute/relative agreement band for voltage and power comparisons.
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    /// Absolute band, dominant near zero
    pub abs: f64,
    /// Relative band, scaled by the larger magnitude
    pub rel: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-9,
            rel: 1e-6,
        }
    }
}

/// True when `a` and `b` agree within `tol`.
pub fn nearly_equal(a: f64, b: f64, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    diff <= tol.abs || diff <= tol.rel * a.abs().max(b.abs())
}

/// Pass a value through, or name the configuration field that went
/// non-finite.
pub fn ensure_finite(v: f64, what: &'static str) -> Result<f64, BvError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(BvError::NonFinite { what, value: v })
    }
}
