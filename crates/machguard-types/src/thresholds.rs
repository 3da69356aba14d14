//! Static safety ceiling table.

use serde::{Deserialize, Serialize};

/// Numeric ceilings consulted read-only by the predictor and the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyThresholds {
    pub max_speed_rpm: f64,
    /// Above this the predictor reports risk `1.0`.
    pub max_temperature_c: f64,
    /// Above this the predictor reports risk `0.75`.
    pub warning_temperature_c: f64,
    pub max_torque_nm: f64,
    pub max_power_kw: f64,
    pub max_pressure_bar: f64,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            max_speed_rpm: 4000.0,
            max_temperature_c: 95.0,
            warning_temperature_c: 80.0,
            max_torque_nm: 600.0,
            max_power_kw: 250.0,
            max_pressure_bar: 7.5,
        }
    }
}
