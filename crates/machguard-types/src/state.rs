//! Live machine telemetry.
//!
//! A [`TelemetryState`] is a flat, copyable record of every sensor and
//! actuator reading the pipeline reasons about.  Readers only ever see whole
//! snapshots: the pipeline folds commands into its own working copy and the
//! store swaps the full record on success.

use serde::{Deserialize, Serialize};
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Advisory classifications
// ─────────────────────────────────────────────────────────────────────────────

/// Current hazard classification reported by the plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HazardKind {
    #[default]
    None,
    Fire,
    Overheat,
    GasLeak,
}

impl HazardKind {
    /// Parse a hazard label such as `"FIRE"`, `"gas leak"` or `"gas_leak"`.
    pub fn parse(label: &str) -> Option<Self> {
        let norm: String = label
            .trim()
            .to_ascii_uppercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match norm.as_str() {
            "NONE" | "" | "CLEAR" => Some(HazardKind::None),
            "FIRE" => Some(HazardKind::Fire),
            "OVERHEAT" => Some(HazardKind::Overheat),
            "GAS_LEAK" | "GAS" => Some(HazardKind::GasLeak),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HazardKind::None => "NONE",
            HazardKind::Fire => "FIRE",
            HazardKind::Overheat => "OVERHEAT",
            HazardKind::GasLeak => "GAS_LEAK",
        }
    }
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall machine health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    #[default]
    Nominal,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "NOMINAL" | "OK" | "HEALTHY" => Some(HealthStatus::Nominal),
            "DEGRADED" | "WARNING" => Some(HealthStatus::Degraded),
            "CRITICAL" => Some(HealthStatus::Critical),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Nominal => "NOMINAL",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StateField
// ─────────────────────────────────────────────────────────────────────────────

/// Every addressable field of a [`TelemetryState`].
///
/// Switch fields (sprinkler, ventilation, …) are boolean on the record but
/// read as `0.0`/`1.0` through [`TelemetryState::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    SpindleSpeed,
    SpindleTemp,
    SpindleTorque,
    Axis2Speed,
    Axis2Temp,
    Axis2Torque,
    HydraulicPressure,
    BusVoltage,
    PowerDraw,
    CoolantFlow,
    NetworkJitter,
    ControllerLoad,
    Sprinkler,
    Ventilation,
    Igniter,
    CoolantPump,
    EmergencyStop,
}

impl StateField {
    pub const ALL: [StateField; 17] = [
        StateField::SpindleSpeed,
        StateField::SpindleTemp,
        StateField::SpindleTorque,
        StateField::Axis2Speed,
        StateField::Axis2Temp,
        StateField::Axis2Torque,
        StateField::HydraulicPressure,
        StateField::BusVoltage,
        StateField::PowerDraw,
        StateField::CoolantFlow,
        StateField::NetworkJitter,
        StateField::ControllerLoad,
        StateField::Sprinkler,
        StateField::Ventilation,
        StateField::Igniter,
        StateField::CoolantPump,
        StateField::EmergencyStop,
    ];

    /// `true` for boolean subsystems.
    pub fn is_switch(self) -> bool {
        matches!(
            self,
            StateField::Sprinkler
                | StateField::Ventilation
                | StateField::Igniter
                | StateField::CoolantPump
                | StateField::EmergencyStop
        )
    }

    /// Name of the backing field on [`TelemetryState`].
    pub fn name(self) -> &'static str {
        match self {
            StateField::SpindleSpeed => "spindle_speed_rpm",
            StateField::SpindleTemp => "spindle_temp_c",
            StateField::SpindleTorque => "spindle_torque_nm",
            StateField::Axis2Speed => "axis2_speed_rpm",
            StateField::Axis2Temp => "axis2_temp_c",
            StateField::Axis2Torque => "axis2_torque_nm",
            StateField::HydraulicPressure => "hydraulic_pressure_bar",
            StateField::BusVoltage => "bus_voltage_v",
            StateField::PowerDraw => "power_draw_kw",
            StateField::CoolantFlow => "coolant_flow_lpm",
            StateField::NetworkJitter => "network_jitter_ms",
            StateField::ControllerLoad => "controller_load_pct",
            StateField::Sprinkler => "sprinkler_armed",
            StateField::Ventilation => "ventilation_on",
            StateField::Igniter => "igniter_on",
            StateField::CoolantPump => "coolant_pump_on",
            StateField::EmergencyStop => "estop_engaged",
        }
    }
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TelemetryState
// ─────────────────────────────────────────────────────────────────────────────

/// Machine telemetry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryState {
    pub spindle_speed_rpm: f64,
    pub spindle_temp_c: f64,
    pub spindle_torque_nm: f64,
    pub axis2_speed_rpm: f64,
    pub axis2_temp_c: f64,
    pub axis2_torque_nm: f64,
    pub hydraulic_pressure_bar: f64,
    pub bus_voltage_v: f64,
    /// Shared by both axes.
    pub power_draw_kw: f64,
    pub coolant_flow_lpm: f64,
    pub network_jitter_ms: f64,
    pub controller_load_pct: f64,
    pub sprinkler_armed: bool,
    pub ventilation_on: bool,
    pub igniter_on: bool,
    pub coolant_pump_on: bool,
    pub estop_engaged: bool,
    pub hazard_detected: HazardKind,
    pub health: HealthStatus,
}

impl Default for TelemetryState {
    /// The machine at rest.
    fn default() -> Self {
        Self {
            spindle_speed_rpm: 0.0,
            spindle_temp_c: 22.0,
            spindle_torque_nm: 0.0,
            axis2_speed_rpm: 0.0,
            axis2_temp_c: 22.0,
            axis2_torque_nm: 0.0,
            hydraulic_pressure_bar: 1.0,
            bus_voltage_v: 400.0,
            power_draw_kw: 0.0,
            coolant_flow_lpm: 12.0,
            network_jitter_ms: 4.0,
            controller_load_pct: 15.0,
            sprinkler_armed: true,
            ventilation_on: true,
            igniter_on: false,
            coolant_pump_on: true,
            estop_engaged: false,
            hazard_detected: HazardKind::None,
            health: HealthStatus::Nominal,
        }
    }
}

impl TelemetryState {
    /// Read `field` as a number.  Switches read as `0.0` or `1.0`.
    pub fn get(&self, field: StateField) -> f64 {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        match field {
            StateField::SpindleSpeed => self.spindle_speed_rpm,
            StateField::SpindleTemp => self.spindle_temp_c,
            StateField::SpindleTorque => self.spindle_torque_nm,
            StateField::Axis2Speed => self.axis2_speed_rpm,
            StateField::Axis2Temp => self.axis2_temp_c,
            StateField::Axis2Torque => self.axis2_torque_nm,
            StateField::HydraulicPressure => self.hydraulic_pressure_bar,
            StateField::BusVoltage => self.bus_voltage_v,
            StateField::PowerDraw => self.power_draw_kw,
            StateField::CoolantFlow => self.coolant_flow_lpm,
            StateField::NetworkJitter => self.network_jitter_ms,
            StateField::ControllerLoad => self.controller_load_pct,
            StateField::Sprinkler => flag(self.sprinkler_armed),
            StateField::Ventilation => flag(self.ventilation_on),
            StateField::Igniter => flag(self.igniter_on),
            StateField::CoolantPump => flag(self.coolant_pump_on),
            StateField::EmergencyStop => flag(self.estop_engaged),
        }
    }

    /// Write `value` into `field`.
    ///
    /// Numeric fields are clamped at zero (and NaN becomes zero); switches
    /// are set to `value != 0`.
    pub fn set(&mut self, field: StateField, value: f64) {
        let v = if value.is_nan() { 0.0 } else { value.max(0.0) };
        let on = v != 0.0;
        match field {
            StateField::SpindleSpeed => self.spindle_speed_rpm = v,
            StateField::SpindleTemp => self.spindle_temp_c = v,
            StateField::SpindleTorque => self.spindle_torque_nm = v,
            StateField::Axis2Speed => self.axis2_speed_rpm = v,
            StateField::Axis2Temp => self.axis2_temp_c = v,
            StateField::Axis2Torque => self.axis2_torque_nm = v,
            StateField::HydraulicPressure => self.hydraulic_pressure_bar = v,
            StateField::BusVoltage => self.bus_voltage_v = v,
            StateField::PowerDraw => self.power_draw_kw = v,
            StateField::CoolantFlow => self.coolant_flow_lpm = v,
            StateField::NetworkJitter => self.network_jitter_ms = v,
            StateField::ControllerLoad => self.controller_load_pct = v,
            StateField::Sprinkler => self.sprinkler_armed = on,
            StateField::Ventilation => self.ventilation_on = on,
            StateField::Igniter => self.igniter_on = on,
            StateField::CoolantPump => self.coolant_pump_on = on,
            StateField::EmergencyStop => self.estop_engaged = on,
        }
    }

    /// Every field whose value differs between `self` and `other`.
    pub fn diff(&self, other: &TelemetryState) -> Vec<StateField> {
        StateField::ALL
            .iter()
            .copied()
            .filter(|f| self.get(*f) != other.get(*f))
            .collect()
    }
}

/// A single folded mutation, as proposed to the context check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub parameter_key: String,
    pub field: StateField,
    pub before: f64,
    pub after: f64,
}

impl StateDelta {
    /// `true` when a switch goes from on to off.
    pub fn disables(&self) -> bool {
        self.field.is_switch() && self.before != 0.0 && self.after == 0.0
    }

    /// `true` when a switch goes from off to on.
    pub fn enables(&self) -> bool {
        self.field.is_switch() && self.before == 0.0 && self.after != 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_machine_at_rest() {
        let s = TelemetryState::default();
        assert_eq!(s.spindle_speed_rpm, 0.0);
        assert!(s.sprinkler_armed);
        assert!(!s.igniter_on);
        assert_eq!(s.hazard_detected, HazardKind::None);
    }

    #[test]
    fn every_numeric_field_is_non_negative_by_default() {
        let s = TelemetryState::default();
        for f in StateField::ALL {
            assert!(s.get(f) >= 0.0, "{f} is negative");
        }
    }

    #[test]
    fn set_clamps_negative_values() {
        let mut s = TelemetryState::default();
        s.set(StateField::SpindleSpeed, -50.0);
        assert_eq!(s.spindle_speed_rpm, 0.0);
        s.set(StateField::CoolantFlow, f64::NAN);
        assert_eq!(s.coolant_flow_lpm, 0.0);
    }

    #[test]
    fn switches_read_and_write_as_flags() {
        let mut s = TelemetryState::default();
        assert_eq!(s.get(StateField::Sprinkler), 1.0);
        s.set(StateField::Sprinkler, 0.0);
        assert!(!s.sprinkler_armed);
        s.set(StateField::Igniter, 1.0);
        assert_eq!(s.get(StateField::Igniter), 1.0);
    }

    #[test]
    fn diff_lists_changed_fields() {
        let a = TelemetryState::default();
        let mut b = a.clone();
        b.set(StateField::BusVoltage, 380.0);
        b.set(StateField::Ventilation, 0.0);
        assert_eq!(
            a.diff(&b),
            vec![StateField::BusVoltage, StateField::Ventilation]
        );
    }

    #[test]
    fn hazard_parse_accepts_common_spellings() {
        assert_eq!(HazardKind::parse("FIRE"), Some(HazardKind::Fire));
        assert_eq!(HazardKind::parse("gas leak"), Some(HazardKind::GasLeak));
        assert_eq!(HazardKind::parse("Gas-Leak"), Some(HazardKind::GasLeak));
        assert_eq!(HazardKind::parse("flood"), None);
        assert_eq!(HealthStatus::parse("degraded"), Some(HealthStatus::Degraded));
    }

    #[test]
    fn hazard_serializes_screaming_case() {
        let json = serde_json::to_string(&HazardKind::GasLeak).unwrap();
        assert_eq!(json, "\"GAS_LEAK\"");
    }

    #[test]
    fn delta_switch_direction() {
        let d = StateDelta {
            parameter_key: "sprinkler".into(),
            field: StateField::Sprinkler,
            before: 1.0,
            after: 0.0,
        };
        assert!(d.disables());
        assert!(!d.enables());
    }
}
