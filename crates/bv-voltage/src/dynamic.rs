//! Tremblay-Dube dynamic electrochemical variant.

use crate::error::{VoltageError, VoltageResult};
use crate::model::{PowerCurrent, StackConfig, VoltageModel, VoltageState};
use crate::TOLERANCE;
use bv_core::units::{celsius, Temperature};
use bv_solver::{damped_newton, NewtonConfig, SolverResult};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Electrochemical inputs for the Tremblay discharge equation.
///
/// The voltages must satisfy `vfull > vexp > vnom > vcut`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DynamicParams {
    /// Fully charged voltage (V)
    pub vfull: f64,
    /// Voltage at the end of the exponential zone (V)
    pub vexp: f64,
    /// Nominal-zone voltage (V)
    pub vnom: f64,
    /// Cutoff voltage (V); 0 disables the capacity adjustment
    pub vcut: f64,
    /// Full cell capacity (Ah)
    pub qfull: f64,
    /// Capacity at the end of the exponential zone (Ah)
    pub qexp: f64,
    /// Capacity at the end of the nominal zone (Ah)
    pub qnom: f64,
    /// Discharge C-rate anchoring the constant-voltage term
    pub c_rate: f64,
}

/// Closed-form electrochemical discharge model.
///
/// Derived constants follow page 2 of Tremblay 2009, "A Generic Battery
/// Model for the Dynamic Simulation of Hybrid Electric Vehicles". They are
/// computed once at construction and must be recomputed if the parameters
/// change. Power-to-current inversion has no closed form and goes through
/// the damped Newton solver; the charge and discharge residuals differ in
/// the sign of the resistive term.
#[derive(Clone, Debug)]
pub struct DynamicVoltage {
    stack: StackConfig,
    params: DynamicParams,
    state: VoltageState,
    /// Exponential-zone amplitude (V)
    a: f64,
    /// Exponential-zone inverse time constant (1/Ah)
    b0: f64,
    /// Polarization voltage (V)
    k: f64,
    /// Constant voltage term (V)
    e0: f64,
    solver: NewtonConfig,
}

impl DynamicVoltage {
    pub fn new(stack: StackConfig, params: DynamicParams) -> VoltageResult<Self> {
        stack.validate()?;
        if params.vfull < params.vexp || params.vexp < params.vnom || params.vnom < params.vcut {
            return Err(VoltageError::InvalidConfig {
                what: "electrochemical voltage inputs must satisfy Vfull > Vexp > Vnom > Vcut"
                    .to_string(),
            });
        }

        let i_rate = params.qfull * params.c_rate;
        let a = params.vfull - params.vexp;
        let b0 = 3.0 / params.qexp;
        let k = ((params.vfull - params.vnom + a * ((-b0 * params.qnom).exp() - 1.0))
            * (params.qfull - params.qnom))
            / params.qnom;
        let e0 = params.vfull + k + stack.internal_resistance * i_rate - a;

        if a < 0.0 || b0 < 0.0 || k < 0.0 || e0 < 0.0 {
            return Err(VoltageError::InvalidConfig {
                what: format!(
                    "negative derived voltage-model constants: A={a}, B={b0}, K={k}, E0={e0}"
                ),
            });
        }

        Ok(Self {
            state: VoltageState {
                // fully charged, not the nominal value
                cell_voltage: params.vfull,
                full_capacity_modifier: params.qfull,
            },
            stack,
            params,
            a,
            b0,
            k,
            e0,
            solver: NewtonConfig::default(),
        })
    }

    /// Derived constants (A, B0, K, E0) for inspection.
    pub fn derived_constants(&self) -> (f64, f64, f64, f64) {
        (self.a, self.b0, self.k, self.e0)
    }

    /// Capacity at which the closed form would hit the cutoff voltage.
    ///
    /// With `vcut == 0` the nameplate capacity is used unchanged.
    fn cutoff_adjusted_capacity(&self, qmax_cell: f64) -> f64 {
        if self.params.vcut != 0.0 {
            let c = (-self.params.vcut + self.e0
                - self.stack.internal_resistance * qmax_cell * self.params.c_rate
                + self.a * (-self.b0 * qmax_cell).exp())
                / self.k;
            qmax_cell + qmax_cell / (c - 1.0)
        } else {
            qmax_cell
        }
    }

    /// Per-cell Tremblay discharge voltage.
    ///
    /// `q_cell` is the cell capacity (Ah), `q0_cell` the present cell charge
    /// (Ah), `current` the cell current (A).
    fn tremblay_voltage(&self, q_cell: f64, current: f64, q0_cell: f64) -> f64 {
        let q_mod = self.cutoff_adjusted_capacity(q_cell);
        let it = q_cell - q0_cell;
        let e = self.e0 - self.k * (q_mod / (q_mod - it)) + self.a * (-self.b0 * it).exp();
        e - self.stack.internal_resistance * current
    }
}

impl VoltageModel for DynamicVoltage {
    fn stack(&self) -> &StackConfig {
        &self.stack
    }

    fn state(&self) -> &VoltageState {
        &self.state
    }

    fn set_initial_soc(&mut self, soc_percent: f64) {
        let qfull_stack = self.params.qfull * self.stack.strings();
        self.update_voltage(
            soc_percent * 0.01 * qfull_stack,
            qfull_stack,
            0.0,
            celsius(25.0),
        );
    }

    fn voltage_for_current(
        &self,
        current_a: f64,
        q_ah: f64,
        qmax_ah: f64,
        _temp: Temperature,
    ) -> f64 {
        let strings = self.stack.strings();
        self.stack.cells()
            * self
                .tremblay_voltage(qmax_ah / strings, current_a / strings, q_ah / strings)
                .max(0.0)
    }

    fn update_voltage(&mut self, q_ah: f64, qmax_ah: f64, current_a: f64, _temp: Temperature) {
        let strings = self.stack.strings();
        self.state.cell_voltage = self
            .tremblay_voltage(qmax_ah / strings, current_a / strings, q_ah / strings)
            .max(0.0);
    }

    fn max_charge_power(&self, q_ah: f64, qmax_ah: f64, _temp: Temperature) -> PowerCurrent {
        let strings = self.stack.strings();
        let q = q_ah / strings;
        let qmax = qmax_ah / strings;
        let current = (q - qmax) / self.stack.dt_hour;
        PowerCurrent {
            power_w: current
                * self.tremblay_voltage(qmax, current, qmax)
                * strings
                * self.stack.cells(),
            current_a: current * strings,
        }
    }

    fn max_discharge_power(&self, q_ah: f64, qmax_ah: f64, _temp: Temperature) -> PowerCurrent {
        let strings = self.stack.strings();
        let q = q_ah / strings;
        let qmax = qmax_ah / strings;

        // No closed form here: scan currents upward until the cell would be
        // drained within the step or the voltage falls below cutoff.
        let mut current = q * 0.5;
        let incr = q / 10.0;
        let mut vol = self.params.vcut;
        let mut max_p = 0.0;
        let mut max_i = 0.0;
        while current * self.stack.dt_hour < q - TOLERANCE && vol >= self.params.vcut {
            vol = self.tremblay_voltage(qmax, current, q - current * self.stack.dt_hour);
            let p = current * vol;
            if p > max_p && vol >= self.params.vcut {
                max_p = p;
                max_i = current;
            }
            current += incr;
        }

        PowerCurrent {
            power_w: max_p * strings * self.stack.cells(),
            current_a: max_i * strings,
        }
    }

    fn current_for_power(&self, p_watts: f64, q_ah: f64, qmax_ah: f64, _temp: Temperature) -> f64 {
        if p_watts == 0.0 {
            return 0.0;
        }

        let strings = self.stack.strings();
        let power = p_watts.abs() / (self.stack.cells() * strings);
        let q = q_ah / strings;
        let qmax = qmax_ah / strings;
        let q_mod = self.cutoff_adjusted_capacity(qmax);
        let dt = self.stack.dt_hour;
        let r = self.stack.internal_resistance;
        let (a, b0, k, e0) = (self.a, self.b0, self.k, self.e0);

        let discharging = p_watts > 0.0;
        let residual = move |x: &DVector<f64>| -> SolverResult<DVector<f64>> {
            let i = x[0];
            let it = if discharging {
                qmax - (q - i * dt)
            } else {
                qmax - (q + i * dt)
            };
            let resistive = if discharging { -r * i } else { r * i };
            let v = e0 - k * q_mod / (q_mod - it) + a * (-b0 * it).exp() + resistive;
            Ok(DVector::from_element(1, i * v - power))
        };

        let guess = if self.state.cell_voltage != 0.0 {
            power / self.state.cell_voltage * dt
        } else {
            power / self.params.vnom * dt
        };
        let direction = if discharging { 1.0 } else { -1.0 };

        damped_newton(DVector::from_element(1, guess), residual, &self.solver)
            .map(|result| result.x[0] * strings * direction)
            .unwrap_or(0.0)
    }

    fn clone_box(&self) -> Box<dyn VoltageModel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> StackConfig {
        StackConfig {
            cells_in_series: 1,
            strings_in_parallel: 1,
            nominal_voltage: 3.6,
            internal_resistance: 0.05,
            dt_hour: 1.0,
        }
    }

    fn params() -> DynamicParams {
        DynamicParams {
            vfull: 4.1,
            vexp: 4.05,
            vnom: 3.6,
            vcut: 2.75,
            qfull: 2.25,
            qexp: 0.2,
            qnom: 1.8,
            c_rate: 1.0,
        }
    }

    #[test]
    fn rejects_voltage_ordering_violation() {
        let mut p = params();
        p.vexp = 4.2; // above vfull
        let err = DynamicVoltage::new(stack(), p).unwrap_err();
        assert!(err.to_string().contains("Vfull > Vexp > Vnom > Vcut"));

        let mut p = params();
        p.vcut = 3.7; // above vnom
        assert!(DynamicVoltage::new(stack(), p).is_err());
    }

    #[test]
    fn accepts_strictly_decreasing_voltages() {
        assert!(DynamicVoltage::new(stack(), params()).is_ok());
    }

    #[test]
    fn derived_constants_are_positive() {
        let model = DynamicVoltage::new(stack(), params()).unwrap();
        let (a, b0, k, e0) = model.derived_constants();
        assert!(a > 0.0);
        assert!(b0 > 0.0);
        assert!(k > 0.0);
        assert!(e0 > 0.0);
    }

    #[test]
    fn constructed_fully_charged() {
        let model = DynamicVoltage::new(stack(), params()).unwrap();
        assert_eq!(model.cell_voltage(), params().vfull);
        assert_eq!(model.state().full_capacity_modifier, params().qfull);
    }

    #[test]
    fn full_charge_zero_current_voltage() {
        // At it = 0 and I = 0 the closed form reduces to
        // E0 - K + A = Vfull + R * Qfull * C_rate.
        let p = params();
        let mut model = DynamicVoltage::new(stack(), p).unwrap();
        model.update_voltage(p.qfull, p.qfull, 0.0, celsius(25.0));
        let expected = p.vfull + stack().internal_resistance * p.qfull * p.c_rate;
        assert!((model.cell_voltage() - expected).abs() < 1e-9);
    }

    #[test]
    fn set_initial_soc_tracks_full_charge() {
        let p = params();
        let mut model = DynamicVoltage::new(stack(), p).unwrap();
        model.set_initial_soc(100.0);
        let expected = p.vfull + stack().internal_resistance * p.qfull * p.c_rate;
        assert!((model.cell_voltage() - expected).abs() < 1e-9);
        // within a resistive-offset band of the fully charged voltage
        assert!((model.cell_voltage() - p.vfull).abs() / p.vfull < 0.03);
    }

    #[test]
    fn voltage_decreases_as_charge_is_removed() {
        let p = params();
        let mut model = DynamicVoltage::new(stack(), p).unwrap();
        model.update_voltage(p.qfull, p.qfull, 0.0, celsius(25.0));
        let v_full = model.cell_voltage();
        model.update_voltage(p.qfull * 0.5, p.qfull, 0.0, celsius(25.0));
        let v_half = model.cell_voltage();
        assert!(v_half < v_full);
        assert!(v_half > p.vcut);
    }

    #[test]
    fn zero_power_request_returns_zero_current() {
        let model = DynamicVoltage::new(stack(), params()).unwrap();
        assert_eq!(
            model.current_for_power(0.0, 2.0, 2.25, celsius(25.0)),
            0.0
        );
    }

    #[test]
    fn max_discharge_power_is_positive_and_bounded() {
        let p = params();
        let model = DynamicVoltage::new(stack(), p).unwrap();
        let pc = model.max_discharge_power(p.qfull, p.qfull, celsius(25.0));
        assert!(pc.power_w > 0.0);
        assert!(pc.current_a > 0.0);
        // cannot draw more charge than the cell holds in one step
        assert!(pc.current_a * stack().dt_hour < p.qfull);
    }

    #[test]
    fn discharge_current_balances_requested_power() {
        let p = params();
        let mut model = DynamicVoltage::new(stack(), p).unwrap();
        model.set_initial_soc(100.0);

        let pc = model.max_discharge_power(p.qfull, p.qfull, celsius(25.0));
        let target = pc.power_w * 0.5;
        let current = model.current_for_power(target, p.qfull, p.qfull, celsius(25.0));
        assert!(current > 0.0);

        // verify against the discharge form of the voltage equation
        let v = model.voltage_for_current(
            current,
            p.qfull - current * stack().dt_hour,
            p.qfull,
            celsius(25.0),
        );
        assert!((current * v - target).abs() < 1e-3);
    }

    #[test]
    fn charge_request_returns_negative_current() {
        let p = params();
        let model = DynamicVoltage::new(stack(), p).unwrap();
        let current = model.current_for_power(-5.0, 1.0, p.qfull, celsius(25.0));
        assert!(current < 0.0);
    }
}
