//! [`StateVerifier`] – physical limit interlock.
//!
//! During the physics fold every mutated field of the working state is
//! passed through [`StateVerifier::verify`].  Registered [`Rule`]s are
//! evaluated in order and the first breach is returned as a [`LimitBreach`];
//! the fold stops there and nothing is committed.
//!
//! Built-in rules, all driven by [`SafetyThresholds`]:
//! - [`SpeedCeiling`] – spindle and axis-2 speed (breach risk `0.9`)
//! - [`TemperatureCeiling`] – spindle and axis-2 temperature (`1.0`)
//! - [`TorqueCeiling`] – spindle and axis-2 torque (`0.85`)
//! - [`PowerCeiling`] – shared power draw (`0.9`)
//! - [`PressureCeiling`] – hydraulic pressure (`0.9`)

use machguard_types::{SafetyThresholds, StateField, TelemetryState};
use thiserror::Error;

/// A ceiling that a folded state exceeded.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{limit} exceeded: {field} at {value:.1} is above the {ceiling:.1} ceiling")]
pub struct LimitBreach {
    pub limit: String,
    pub field: StateField,
    pub value: f64,
    pub ceiling: f64,
    /// Physical risk attributed to this breach.
    pub risk: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single physical invariant over [`TelemetryState`].
pub trait Rule: Send + Sync {
    /// Human-readable name used in breach messages.
    fn name(&self) -> &str;

    /// Check `state`, considering only the fields in `touched`.
    fn check(&self, state: &TelemetryState, touched: &[StateField]) -> Result<(), LimitBreach>;
}

fn ceiling(
    rule: &dyn Rule,
    fields: &[StateField],
    max: f64,
    risk: f64,
    state: &TelemetryState,
    touched: &[StateField],
) -> Result<(), LimitBreach> {
    for field in fields.iter().filter(|f| touched.contains(f)) {
        let value = state.get(*field);
        if value > max {
            return Err(LimitBreach {
                limit: rule.name().to_string(),
                field: *field,
                value,
                ceiling: max,
                risk,
            });
        }
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// StateVerifier
// ────────────────────────────────────────────────────────────────────────────

/// Rule engine over folded telemetry.
///
/// # Example
///
/// ```
/// use machguard_kernel::state_verifier::StateVerifier;
/// use machguard_types::{SafetyThresholds, StateField, TelemetryState};
///
/// let verifier = StateVerifier::from_thresholds(&SafetyThresholds::default());
///
/// let mut state = TelemetryState::default();
/// state.set(StateField::SpindleTorque, 900.0);
///
/// // Untouched fields are not re-checked.
/// assert!(verifier.verify(&state, &[StateField::SpindleSpeed]).is_ok());
///
/// let breach = verifier.verify(&state, &[StateField::SpindleTorque]).unwrap_err();
/// assert_eq!(breach.limit, "max_torque_nm");
/// ```
#[derive(Default)]
pub struct StateVerifier {
    rules: Vec<Box<dyn Rule>>,
}

impl StateVerifier {
    /// Create an empty verifier with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// The five built-in ceilings.
    pub fn from_thresholds(t: &SafetyThresholds) -> Self {
        let mut v = Self::new();
        v.add_rule(Box::new(SpeedCeiling { max_rpm: t.max_speed_rpm }));
        v.add_rule(Box::new(TemperatureCeiling {
            max_c: t.max_temperature_c,
        }));
        v.add_rule(Box::new(TorqueCeiling { max_nm: t.max_torque_nm }));
        v.add_rule(Box::new(PowerCeiling { max_kw: t.max_power_kw }));
        v.add_rule(Box::new(PressureCeiling {
            max_bar: t.max_pressure_bar,
        }));
        v
    }

    /// Register a new [`Rule`].  Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the first [`LimitBreach`], or `Ok(())` when every rule passes.
    pub fn verify(&self, state: &TelemetryState, touched: &[StateField]) -> Result<(), LimitBreach> {
        for rule in &self.rules {
            rule.check(state, touched)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for StateVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.name()))
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

pub struct SpeedCeiling {
    pub max_rpm: f64,
}

impl Rule for SpeedCeiling {
    fn name(&self) -> &str {
        "max_speed_rpm"
    }

    fn check(&self, state: &TelemetryState, touched: &[StateField]) -> Result<(), LimitBreach> {
        ceiling(
            self,
            &[StateField::SpindleSpeed, StateField::Axis2Speed],
            self.max_rpm,
            0.9,
            state,
            touched,
        )
    }
}

pub struct TemperatureCeiling {
    pub max_c: f64,
}

impl Rule for TemperatureCeiling {
    fn name(&self) -> &str {
        "max_temperature_c"
    }

    fn check(&self, state: &TelemetryState, touched: &[StateField]) -> Result<(), LimitBreach> {
        ceiling(
            self,
            &[StateField::SpindleTemp, StateField::Axis2Temp],
            self.max_c,
            1.0,
            state,
            touched,
        )
    }
}

pub struct TorqueCeiling {
    pub max_nm: f64,
}

impl Rule for TorqueCeiling {
    fn name(&self) -> &str {
        "max_torque_nm"
    }

    fn check(&self, state: &TelemetryState, touched: &[StateField]) -> Result<(), LimitBreach> {
        ceiling(
            self,
            &[StateField::SpindleTorque, StateField::Axis2Torque],
            self.max_nm,
            0.85,
            state,
            touched,
        )
    }
}

pub struct PowerCeiling {
    pub max_kw: f64,
}

impl Rule for PowerCeiling {
    fn name(&self) -> &str {
        "max_power_kw"
    }

    fn check(&self, state: &TelemetryState, touched: &[StateField]) -> Result<(), LimitBreach> {
        ceiling(self, &[StateField::PowerDraw], self.max_kw, 0.9, state, touched)
    }
}

pub struct PressureCeiling {
    pub max_bar: f64,
}

impl Rule for PressureCeiling {
    fn name(&self) -> &str {
        "max_pressure_bar"
    }

    fn check(&self, state: &TelemetryState, touched: &[StateField]) -> Result<(), LimitBreach> {
        ceiling(
            self,
            &[StateField::HydraulicPressure],
            self.max_bar,
            0.9,
            state,
            touched,
        )
    }
}
