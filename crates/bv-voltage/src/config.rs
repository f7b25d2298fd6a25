//! Serde-tagged configuration for building voltage models.
//!
//! Hosts describe one model per entry; the `model` tag selects the variant
//! and [`VoltageModelConfig::build`] runs the variant's validation.

use crate::dynamic::{DynamicParams, DynamicVoltage};
use crate::error::VoltageResult;
use crate::model::{StackConfig, VoltageModel};
use crate::table::TableVoltage;
use crate::vanadium::VanadiumRedoxVoltage;
use serde::{Deserialize, Serialize};

/// Host-facing configuration for one voltage model.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum VoltageModelConfig {
    /// Empirical discharge-curve interpolation
    Table {
        #[serde(flatten)]
        stack: StackConfig,
        /// (DOD %, V) rows
        voltage_table: Vec<Vec<f64>>,
    },
    /// Tremblay-Dube electrochemical model
    Dynamic {
        #[serde(flatten)]
        stack: StackConfig,
        #[serde(flatten)]
        params: DynamicParams,
    },
    /// Vanadium-redox flow cell
    VanadiumRedox {
        #[serde(flatten)]
        stack: StackConfig,
    },
}

impl VoltageModelConfig {
    /// Validate the configuration and build the selected variant.
    pub fn build(&self) -> VoltageResult<Box<dyn VoltageModel>> {
        match self {
            Self::Table {
                stack,
                voltage_table,
            } => Ok(Box::new(TableVoltage::new(*stack, voltage_table)?)),
            Self::Dynamic { stack, params } => {
                Ok(Box::new(DynamicVoltage::new(*stack, *params)?))
            }
            Self::VanadiumRedox { stack } => Ok(Box::new(VanadiumRedoxVoltage::new(*stack)?)),
        }
    }
}
