//! Vanadium-redox flow-cell variant.

use crate::error::VoltageResult;
use crate::model::{PowerCurrent, StackConfig, VoltageModel, VoltageState};
use crate::TOLERANCE;
use bv_core::units::{celsius, kelvin_of, Temperature};
use bv_solver::{damped_newton, NewtonConfig, SolverResult};
use nalgebra::DVector;

/// Nernst-style open-circuit model for an all-vanadium flow cell.
///
/// The open-circuit term follows `ln(SOC^2 / (1 - SOC)^2)` scaled by absolute
/// temperature; the resistive term uses |I| so both terms move in the same
/// direction on discharge. SOC is clamped away from 0 and 1 where the
/// logarithm is singular. Both the discharge-power maximum and the
/// power-to-current inversion go through the damped Newton solver.
#[derive(Clone, Debug)]
pub struct VanadiumRedoxVoltage {
    stack: StackConfig,
    state: VoltageState,
    /// Nernst coefficient (V/K): gas constant scaled to cell units
    rcf: f64,
    solver: NewtonConfig,
}

impl VanadiumRedoxVoltage {
    pub fn new(stack: StackConfig) -> VoltageResult<Self> {
        stack.validate()?;
        Ok(Self {
            state: VoltageState {
                cell_voltage: stack.nominal_voltage,
                full_capacity_modifier: 0.0,
            },
            stack,
            rcf: 8.314 * 1.38 / (26.801 * 3600.0),
            solver: NewtonConfig::default(),
        })
    }

    /// Per-cell voltage from string charge, capacity, current and temperature
    /// in Kelvin. SOC is clamped to [1e-3, 1 - TOLERANCE] so the result is
    /// finite at both ends of the charge range.
    pub fn cell_voltage_model(&self, q0: f64, qmax: f64, i_string: f64, t_k: f64) -> f64 {
        let soc = (q0 / qmax).clamp(1e-3, 1.0 - TOLERANCE);
        let nernst = (soc.powi(2) / (1.0 - soc).powi(2)).ln();
        self.stack.nominal_voltage
            + self.rcf * t_k * nernst
            + i_string.abs() * self.stack.internal_resistance
    }
}

impl VoltageModel for VanadiumRedoxVoltage {
    fn stack(&self) -> &StackConfig {
        &self.stack
    }

    fn state(&self) -> &VoltageState {
        &self.state
    }

    fn set_initial_soc(&mut self, soc_percent: f64) {
        self.update_voltage(soc_percent, 100.0, 0.0, celsius(25.0));
    }

    fn voltage_for_current(
        &self,
        current_a: f64,
        q_ah: f64,
        qmax_ah: f64,
        temp: Temperature,
    ) -> f64 {
        let strings = self.stack.strings();
        self.cell_voltage_model(
            q_ah / strings,
            qmax_ah / strings,
            current_a / strings,
            kelvin_of(temp),
        ) * self.stack.cells()
    }

    fn update_voltage(&mut self, q_ah: f64, qmax_ah: f64, current_a: f64, temp: Temperature) {
        let strings = self.stack.strings();
        self.state.cell_voltage = self.cell_voltage_model(
            q_ah / strings,
            qmax_ah / strings,
            current_a / strings,
            kelvin_of(temp),
        );
    }

    fn max_charge_power(&self, q_ah: f64, qmax_ah: f64, temp: Temperature) -> PowerCurrent {
        let strings = self.stack.strings();
        let q = q_ah / strings;
        let qmax = qmax_ah / strings;
        let max_i = (q - qmax) / self.stack.dt_hour;
        PowerCurrent {
            power_w: self.cell_voltage_model(qmax, qmax, max_i, kelvin_of(temp))
                * max_i
                * strings
                * self.stack.cells(),
            current_a: max_i * strings,
        }
    }

    fn max_discharge_power(&self, q_ah: f64, qmax_ah: f64, temp: Temperature) -> PowerCurrent {
        let strings = self.stack.strings();
        let q = q_ah / strings;
        let qmax = qmax_ah / strings;
        let t_k = kelvin_of(temp);
        let dt = self.stack.dt_hour;
        let vnom = self.stack.nominal_voltage;
        let r = self.stack.internal_resistance;
        let rcf = self.rcf;

        // Zero of d(I*V)/dI: the discharge power curve's stationary point.
        let residual = move |x: &DVector<f64>| -> SolverResult<DVector<f64>> {
            let i = x[0].abs();
            let soc = (q - i * dt) / qmax;
            let f = vnom
                + 2.0 * i * r
                + rcf
                    * t_k
                    * ((soc * soc / (1.0 - soc).powi(2)).ln()
                        - 2.0 * i * (1.0 / soc - 1.0 / (1.0 - soc)));
            Ok(DVector::from_element(1, f))
        };

        let guess = (q - TOLERANCE) / dt;
        let current = damped_newton(DVector::from_element(1, guess), residual, &self.solver)
            .map(|result| result.x[0])
            .unwrap_or(0.0);

        let power = current
            * self.cell_voltage_model(q - current * dt, qmax, current, t_k)
            * strings
            * self.stack.cells();

        if power < 0.0 {
            PowerCurrent {
                power_w: 0.0,
                current_a: 0.0,
            }
        } else {
            PowerCurrent {
                power_w: power,
                current_a: current * strings,
            }
        }
    }

    fn current_for_power(&self, p_watts: f64, q_ah: f64, qmax_ah: f64, temp: Temperature) -> f64 {
        if p_watts == 0.0 {
            return 0.0;
        }

        let strings = self.stack.strings();
        let power = p_watts / (self.stack.cells() * strings);
        let q = q_ah / strings;
        let qmax = qmax_ah / strings;
        let t_k = kelvin_of(temp);
        let dt = self.stack.dt_hour;
        let vnom = self.stack.nominal_voltage;
        let r = self.stack.internal_resistance;
        let rcf = self.rcf;

        let residual = move |x: &DVector<f64>| -> SolverResult<DVector<f64>> {
            let i = x[0];
            let soc = (q - i * dt) / qmax;
            let v = vnom
                + rcf * t_k * (soc * soc / (1.0 - soc).powi(2)).ln()
                + i.abs() * r;
            Ok(DVector::from_element(1, i * v - power))
        };

        let guess = if self.state.cell_voltage != 0.0 {
            power / self.state.cell_voltage * dt
        } else {
            power / self.stack.nominal_voltage * dt
        };

        damped_newton(DVector::from_element(1, guess), residual, &self.solver)
            .map(|result| result.x[0] * strings)
            .unwrap_or(0.0)
    }

    fn clone_box(&self) -> Box<dyn VoltageModel> {
        Box::new(self.clone())
    }
}
