//! Piecewise-linear empirical discharge-curve variant.

use crate::error::{VoltageError, VoltageResult};
use crate::model::{PowerCurrent, StackConfig, VoltageModel, VoltageState};
use bv_core::units::Temperature;

/// Depth of discharge in percent from a charge/capacity pair.
#[inline]
fn dod_percent(q: f64, qmax: f64) -> f64 {
    (1.0 - q / qmax) * 100.0
}

/// Voltage from a tabulated discharge curve.
///
/// Rows are (depth-of-discharge %, per-cell voltage) pairs. Construction
/// sorts them by descending voltage and fits a line through each adjacent
/// pair; lookups clamp the query to [0, 100] and the last segment is reused
/// for extrapolation past the table. Because voltage is piecewise-linear in
/// DOD, the power extremes and the power-to-current inversion are closed-form
/// per-segment quadratics rather than solver calls.
#[derive(Clone, Debug)]
pub struct TableVoltage {
    stack: StackConfig,
    /// (DOD %, V) breakpoints, sorted by descending voltage
    table: Vec<(f64, f64)>,
    /// One segment per breakpoint plus the duplicated extrapolation segment
    slopes: Vec<f64>,
    intercepts: Vec<f64>,
    state: VoltageState,
}

impl TableVoltage {
    /// Build the table variant, fitting the interpolation segments.
    ///
    /// `rows` must have exactly two columns and at least two rows, no two
    /// rows may share a voltage, and the table must bracket the nominal
    /// voltage from both sides.
    pub fn new(stack: StackConfig, rows: &[Vec<f64>]) -> VoltageResult<Self> {
        stack.validate()?;

        if rows.is_empty() {
            return Err(VoltageError::InvalidConfig {
                what: "empty voltage table".to_string(),
            });
        }
        if rows.len() < 2 || rows.iter().any(|r| r.len() != 2) {
            return Err(VoltageError::InvalidConfig {
                what: "voltage table must have 2 columns and at least 2 rows".to_string(),
            });
        }

        let mut table: Vec<(f64, f64)> = rows.iter().map(|r| (r[0], r[1])).collect();
        table.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut slopes = Vec::with_capacity(table.len() + 1);
        let mut intercepts = Vec::with_capacity(table.len() + 1);
        for (i, &(dod, v)) in table.iter().enumerate() {
            let mut slope = 0.0;
            let mut intercept = v;
            if i > 0 {
                let (dod0, v0) = table[i - 1];
                slope = (v - v0) / (dod - dod0);
                intercept = v0 - slope * dod0;

                if slope.abs() < 1e-7 {
                    return Err(VoltageError::InvalidConfig {
                        what: "voltage table cannot contain two identical voltages".to_string(),
                    });
                }
            }
            slopes.push(slope);
            intercepts.push(intercept);
        }

        if !table.iter().any(|&(_, v)| v < stack.nominal_voltage) {
            return Err(VoltageError::InvalidConfig {
                what: "voltage table contains no voltages below the nominal voltage; change the \
                       table values or the nominal voltage"
                    .to_string(),
            });
        }
        if !table.iter().any(|&(_, v)| v > stack.nominal_voltage) {
            return Err(VoltageError::InvalidConfig {
                what: "voltage table contains no voltages above the nominal voltage; change the \
                       table values or the nominal voltage"
                    .to_string(),
            });
        }

        // duplicate the last segment for extrapolation past 100% DOD
        let last_slope = slopes[slopes.len() - 1];
        let last_intercept = intercepts[intercepts.len() - 1];
        slopes.push(last_slope);
        intercepts.push(last_intercept);

        Ok(Self {
            state: VoltageState {
                cell_voltage: stack.nominal_voltage,
                full_capacity_modifier: 0.0,
            },
            stack,
            table,
            slopes,
            intercepts,
        })
    }

    /// Index of the first segment whose breakpoint DOD is at or past `dod`.
    fn segment_for(&self, dod: f64) -> usize {
        let mut row = 0;
        while row < self.table.len() && dod > self.table[row].0 {
            row += 1;
        }
        row
    }

    /// Per-cell voltage at a depth of discharge in percent, floored at 0.
    pub fn voltage_at_dod(&self, dod: f64) -> f64 {
        let dod = dod.clamp(0.0, 100.0);
        let row = self.segment_for(dod);
        (self.slopes[row] * dod + self.intercepts[row]).max(0.0)
    }
}

impl VoltageModel for TableVoltage {
    fn stack(&self) -> &StackConfig {
        &self.stack
    }

    fn state(&self) -> &VoltageState {
        &self.state
    }

    fn set_initial_soc(&mut self, soc_percent: f64) {
        self.state.cell_voltage = self.voltage_at_dod(100.0 - soc_percent);
    }

    fn voltage_for_current(
        &self,
        current_a: f64,
        q_ah: f64,
        qmax_ah: f64,
        _temp: Temperature,
    ) -> f64 {
        let dod = (q_ah - current_a * self.stack.dt_hour) / qmax_ah * 100.0;
        self.voltage_at_dod(dod) * self.stack.cells()
    }

    fn update_voltage(&mut self, q_ah: f64, qmax_ah: f64, _current_a: f64, _temp: Temperature) {
        let dod = 100.0 * (1.0 - q_ah / qmax_ah);
        self.state.cell_voltage = self.voltage_at_dod(dod);
    }

    fn max_charge_power(&self, q_ah: f64, qmax_ah: f64, _temp: Temperature) -> PowerCurrent {
        let current = (q_ah - qmax_ah) / self.stack.dt_hour;
        PowerCurrent {
            power_w: self.voltage_at_dod(0.0) * current * self.stack.cells(),
            current_a: current,
        }
    }

    fn max_discharge_power(&self, q_ah: f64, qmax_ah: f64, _temp: Temperature) -> PowerCurrent {
        let dod0 = dod_percent(q_ah, qmax_ah);
        let a = q_ah - qmax_ah;
        let b = qmax_ah / 100.0;

        // Each segment's power balance is quadratic in DOD; its extremum is
        // at the zero of the derivative. Scan every segment and keep the best.
        let mut max_p = 0.0;
        let mut max_i = 0.0;
        for (slope, intercept) in self.slopes.iter().zip(self.intercepts.iter()) {
            let dod = (-(a * slope + b * intercept) / (2.0 * b * slope)).clamp(0.0, 100.0);
            let current = qmax_ah * ((1.0 - dod0 / 100.0) - (1.0 - dod / 100.0)) / self.stack.dt_hour;
            let p = self.voltage_at_dod(dod) * current;
            if p > max_p {
                max_p = p;
                max_i = current;
            }
        }

        PowerCurrent {
            power_w: max_p * self.stack.cells(),
            current_a: max_i.max(0.0),
        }
    }

    fn current_for_power(&self, p_watts: f64, q_ah: f64, qmax_ah: f64, temp: Temperature) -> f64 {
        if p_watts == 0.0 {
            return 0.0;
        }

        let limit = if p_watts < 0.0 {
            self.max_charge_power(q_ah, qmax_ah, temp)
        } else {
            self.max_discharge_power(q_ah, qmax_ah, temp)
        };
        if limit.power_w.abs() <= p_watts.abs() {
            return limit.current_a;
        }

        // per-cell energy over one step (Wh)
        let p_scaled = p_watts / self.stack.cells() * self.stack.dt_hour;
        let direction: isize = if p_scaled < 0.0 { -1 } else { 1 };

        let dod0 = dod_percent(q_ah, qmax_ah);
        let start = self.segment_for(dod0);

        let a_coef = q_ah - qmax_ah;
        let b_coef = qmax_ah / 100.0;

        let mut dod_best = if direction == -1 { 0.0 } else { 100.0 };
        let mut p_best = 0.0_f64;

        // Walk segments away from the present DOD in the requested direction,
        // solving the per-segment quadratic a*DOD^2 + b*DOD + c = 0 and
        // keeping roots that fall inside the segment's DOD bracket.
        let mut idx = start as isize;
        while idx >= 0 && (idx as usize) < self.slopes.len() {
            let i = idx as usize;
            idx += direction;

            let a = b_coef * self.slopes[i];
            let b = a_coef * self.slopes[i] + b_coef * self.intercepts[i];
            let c = a_coef * self.intercepts[i] - p_scaled;

            if a == 0.0 {
                continue;
            }

            // A negative discriminant yields NaN, which fails the bracket
            // test below.
            let dod_new = ((-b + (b * b - 4.0 * a * c).sqrt()) / (2.0 * a)).abs();

            let upper = i.min(self.table.len() - 1);
            let lower = i.saturating_sub(1);
            let dod_upper = self.table[upper].0;
            let dod_lower = self.table[lower].0;
            if dod_new <= dod_upper && dod_new >= dod_lower {
                let p = (q_ah - (100.0 - dod_new) * qmax_ah / 100.0) * (a * dod_new + b);
                if p.abs() > p_best.abs() {
                    p_best = p;
                    dod_best = dod_new;
                }
            }
        }

        qmax_ah * ((1.0 - dod0 / 100.0) - (1.0 - dod_best / 100.0)) / self.stack.dt_hour
    }

    fn clone_box(&self) -> Box<dyn VoltageModel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bv_core::units::celsius;

    fn stack(cells: u32, strings: u32, vnom: f64) -> StackConfig {
        StackConfig {
            cells_in_series: cells,
            strings_in_parallel: strings,
            nominal_voltage: vnom,
            internal_resistance: 0.004,
            dt_hour: 1.0,
        }
    }

    fn two_point_rows() -> Vec<Vec<f64>> {
        vec![vec![0.0, 4.1], vec![100.0, 3.4]]
    }

    fn four_point_rows() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 4.1],
            vec![20.0, 3.9],
            vec![80.0, 3.6],
            vec![100.0, 3.4],
        ]
    }

    #[test]
    fn rejects_empty_table() {
        let err = TableVoltage::new(stack(1, 1, 3.8), &[]).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn rejects_single_row_and_wrong_columns() {
        assert!(TableVoltage::new(stack(1, 1, 3.8), &[vec![0.0, 4.1]]).is_err());
        assert!(
            TableVoltage::new(stack(1, 1, 3.8), &[vec![0.0, 4.1, 9.9], vec![100.0, 3.4]]).is_err()
        );
    }

    #[test]
    fn rejects_duplicate_voltages() {
        let rows = vec![vec![0.0, 4.1], vec![50.0, 4.1], vec![100.0, 3.4]];
        let err = TableVoltage::new(stack(1, 1, 3.8), &rows).unwrap_err();
        assert!(err.to_string().contains("identical voltages"));
    }

    #[test]
    fn rejects_table_not_bracketing_nominal() {
        // all voltages above nominal
        assert!(TableVoltage::new(stack(1, 1, 3.0), &two_point_rows()).is_err());
        // all voltages below nominal
        assert!(TableVoltage::new(stack(1, 1, 4.5), &two_point_rows()).is_err());
    }

    #[test]
    fn midpoint_interpolates_linearly() {
        let model = TableVoltage::new(stack(1, 1, 3.8), &two_point_rows()).unwrap();
        assert!((model.voltage_at_dod(50.0) - 3.75).abs() < 1e-9);
    }

    #[test]
    fn lookup_clamps_and_floors() {
        let model = TableVoltage::new(stack(1, 1, 3.8), &two_point_rows()).unwrap();
        assert_eq!(model.voltage_at_dod(-20.0), model.voltage_at_dod(0.0));
        assert_eq!(model.voltage_at_dod(250.0), model.voltage_at_dod(100.0));
        assert!(model.voltage_at_dod(100.0) >= 0.0);
    }

    #[test]
    fn set_initial_soc_reads_the_curve() {
        let mut model = TableVoltage::new(stack(1, 1, 3.8), &two_point_rows()).unwrap();
        model.set_initial_soc(100.0);
        assert!((model.cell_voltage() - 4.1).abs() < 1e-9);
        model.set_initial_soc(50.0);
        assert!((model.cell_voltage() - 3.75).abs() < 1e-9);
    }

    #[test]
    fn update_voltage_tracks_charge_ratio() {
        let mut model = TableVoltage::new(stack(2, 1, 3.8), &two_point_rows()).unwrap();
        model.update_voltage(5.0, 10.0, 0.0, celsius(25.0));
        assert!((model.cell_voltage() - 3.75).abs() < 1e-9);
        assert!((model.battery_voltage() - 7.5).abs() < 1e-9);
    }

    #[test]
    fn max_charge_power_is_negative() {
        let model = TableVoltage::new(stack(1, 1, 3.8), &four_point_rows()).unwrap();
        let pc = model.max_charge_power(5.0, 10.0, celsius(25.0));
        assert!(pc.power_w < 0.0);
        assert!(pc.current_a < 0.0);
    }

    #[test]
    fn max_discharge_power_is_positive() {
        let model = TableVoltage::new(stack(1, 1, 3.8), &four_point_rows()).unwrap();
        let pc = model.max_discharge_power(5.0, 10.0, celsius(25.0));
        assert!(pc.power_w > 0.0);
        assert!(pc.current_a >= 0.0);
    }

    #[test]
    fn zero_power_request_returns_zero_current() {
        let model = TableVoltage::new(stack(1, 1, 3.8), &four_point_rows()).unwrap();
        assert_eq!(model.current_for_power(0.0, 5.0, 10.0, celsius(25.0)), 0.0);
    }

    #[test]
    fn power_request_at_the_limit_returns_the_limit_current() {
        let model = TableVoltage::new(stack(1, 1, 3.8), &four_point_rows()).unwrap();
        let pc = model.max_discharge_power(5.0, 10.0, celsius(25.0));
        let current = model.current_for_power(pc.power_w, 5.0, 10.0, celsius(25.0));
        assert!((current - pc.current_a).abs() < 1e-9);
    }

    #[test]
    fn modest_discharge_request_balances_power() {
        let model = TableVoltage::new(stack(1, 1, 3.8), &four_point_rows()).unwrap();
        let q = 8.0;
        let qmax = 10.0;
        let pc = model.max_discharge_power(q, qmax, celsius(25.0));
        let target = pc.power_w * 0.5;

        let current = model.current_for_power(target, q, qmax, celsius(25.0));
        assert!(current > 0.0);

        // the closed-form root balances power exactly at the post-step DOD
        let q_new = q - current * model.stack().dt_hour;
        let v = model.voltage_at_dod(dod_percent(q_new, qmax));
        assert!((current * v - target).abs() < 1e-6);
    }

    #[test]
    fn modest_charge_request_balances_power() {
        let model = TableVoltage::new(stack(1, 1, 3.8), &four_point_rows()).unwrap();
        let q = 5.0;
        let qmax = 10.0;
        let target = -5.0;
        let limit = model.max_charge_power(q, qmax, celsius(25.0));
        assert!(target > limit.power_w);

        let current = model.current_for_power(target, q, qmax, celsius(25.0));
        assert!(current < 0.0);

        // the accepted root balances power exactly at the post-step DOD
        let q_new = q - current * model.stack().dt_hour;
        let v = model.voltage_at_dod(dod_percent(q_new, qmax));
        assert!((current * v - target).abs() < 1e-6);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn voltage_non_increasing_in_dod(d1 in 0.0_f64..=100.0, d2 in 0.0_f64..=100.0) {
                let model = TableVoltage::new(stack(1, 1, 3.8), &four_point_rows()).unwrap();
                let (lo, hi) = if d1 <= d2 { (d1, d2) } else { (d2, d1) };
                prop_assert!(model.voltage_at_dod(lo) >= model.voltage_at_dod(hi));
            }
        }
    }
}
