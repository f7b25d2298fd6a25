//! Shared parameter/state contract and stack-topology arithmetic.

use crate::error::{VoltageError, VoltageResult};
use bv_core::numeric::ensure_finite;
use bv_core::units::Temperature;
use serde::{Deserialize, Serialize};

/// Stack topology and per-cell electrical parameters shared by all variants.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StackConfig {
    /// Cells wired in series (voltage multiplier)
    pub cells_in_series: u32,
    /// Strings wired in parallel (current/capacity multiplier)
    pub strings_in_parallel: u32,
    /// Per-cell nominal voltage (V)
    pub nominal_voltage: f64,
    /// Per-cell internal resistance (Ohm)
    pub internal_resistance: f64,
    /// Simulation step size (hours)
    pub dt_hour: f64,
}

impl StackConfig {
    pub fn validate(&self) -> VoltageResult<()> {
        ensure_finite(self.nominal_voltage, "nominal_voltage")?;
        ensure_finite(self.internal_resistance, "internal_resistance")?;
        ensure_finite(self.dt_hour, "dt_hour")?;

        if self.cells_in_series == 0 {
            return Err(VoltageError::InvalidConfig {
                what: "cells_in_series must be positive".to_string(),
            });
        }
        if self.strings_in_parallel == 0 {
            return Err(VoltageError::InvalidConfig {
                what: "strings_in_parallel must be positive".to_string(),
            });
        }
        if self.nominal_voltage <= 0.0 {
            return Err(VoltageError::InvalidConfig {
                what: "nominal_voltage must be positive".to_string(),
            });
        }
        if self.internal_resistance < 0.0 {
            return Err(VoltageError::InvalidConfig {
                what: "internal_resistance cannot be negative".to_string(),
            });
        }
        if self.dt_hour <= 0.0 {
            return Err(VoltageError::InvalidConfig {
                what: "dt_hour must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn cells(&self) -> f64 {
        self.cells_in_series as f64
    }

    pub(crate) fn strings(&self) -> f64 {
        self.strings_in_parallel as f64
    }
}

/// Per-step electrical state of one cell.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VoltageState {
    /// Present per-cell terminal voltage (V)
    pub cell_voltage: f64,
    /// Capacity adjusted for cutoff-voltage effects (Ah)
    pub full_capacity_modifier: f64,
}

// State equality is defined on the published voltage only; the capacity
// modifier is a derived quantity.
impl PartialEq for VoltageState {
    fn eq(&self, other: &Self) -> bool {
        self.cell_voltage == other.cell_voltage
    }
}

/// A power extremum and the stack current that produces it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowerCurrent {
    /// Stack power (W); negative when charging
    pub power_w: f64,
    /// Stack current (A); negative when charging
    pub current_a: f64,
}

/// Contract shared by the three voltage variants.
///
/// `q`/`qmax` arguments are stack-level amp-hours, currents and powers are
/// stack-level as well. The per-step transition is [`update_voltage`]; every
/// other method is a pure function of the arguments and present state.
///
/// [`update_voltage`]: VoltageModel::update_voltage
pub trait VoltageModel: Send {
    fn stack(&self) -> &StackConfig;

    fn state(&self) -> &VoltageState;

    /// Present per-cell terminal voltage (V).
    fn cell_voltage(&self) -> f64 {
        self.state().cell_voltage
    }

    /// Stack terminal voltage (V).
    fn battery_voltage(&self) -> f64 {
        self.stack().cells() * self.state().cell_voltage
    }

    /// Stack nominal voltage (V).
    fn battery_voltage_nominal(&self) -> f64 {
        self.stack().cells() * self.stack().nominal_voltage
    }

    /// Seed the state from an initial state of charge in percent.
    fn set_initial_soc(&mut self, soc_percent: f64);

    /// Stack voltage at the given current, without mutating state.
    fn voltage_for_current(&self, current_a: f64, q_ah: f64, qmax_ah: f64, temp: Temperature)
        -> f64;

    /// Advance `cell_voltage` to reflect the new charge state. The step
    /// length always comes from [`StackConfig::dt_hour`].
    fn update_voltage(&mut self, q_ah: f64, qmax_ah: f64, current_a: f64, temp: Temperature);

    /// Maximum charge power/current achievable from the present charge state
    /// (both non-positive).
    fn max_charge_power(&self, q_ah: f64, qmax_ah: f64, temp: Temperature) -> PowerCurrent;

    /// Maximum discharge power/current achievable from the present charge
    /// state (both non-negative).
    fn max_discharge_power(&self, q_ah: f64, qmax_ah: f64, temp: Temperature) -> PowerCurrent;

    /// Invert a requested stack power (W) to a stack current (A).
    ///
    /// The sign of `p_watts` selects the direction: positive discharges,
    /// negative charges. Zero returns exactly zero.
    fn current_for_power(&self, p_watts: f64, q_ah: f64, qmax_ah: f64, temp: Temperature) -> f64;

    /// Deep copy for independent what-if simulations.
    fn clone_box(&self) -> Box<dyn VoltageModel>;
}

impl Clone for Box<dyn VoltageModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
