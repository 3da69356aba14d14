//! [`ConsequencePredictor`] – physical consequence simulator.
//!
//! The predictor holds an ordered table of [`CorrelationPoint`] anchors, each
//! describing how temperature, vibration, torque, power, voltage and
//! pressure behave together at one rotational speed.  Predictions are
//! piecewise-linear interpolations over that table:
//!
//! - **forward** ([`ConsequencePredictor::predict_from_speed`]): speed in,
//!   correlated quantities out.
//! - **inverse** ([`ConsequencePredictor::predict_from_parameter`]): any
//!   coupled quantity in, the speed that would produce it is looked up first
//!   and then projected forward.
//!
//! The predictor is pure and total.  Out-of-range inputs are clamped to the
//! extreme anchors and NaN is read as zero.
//!
//! # Example
//!
//! ```
//! use machguard_kernel::predictor::{ConsequencePredictor, PhysicalQuantity, PredictionStatus};
//! use machguard_types::SafetyThresholds;
//!
//! let predictor = ConsequencePredictor::with_defaults(SafetyThresholds::default());
//!
//! let p = predictor.predict_from_speed(1500.0);
//! assert!((p.expected_temperature - 42.1).abs() < 1e-9);
//! assert_eq!(p.status, PredictionStatus::Safe);
//!
//! let p = predictor.predict_from_parameter(PhysicalQuantity::Torque, 900.0);
//! assert_eq!(p.expected_speed, 4500.0);
//! assert_eq!(p.status, PredictionStatus::Critical);
//! ```

use std::fmt;

use machguard_types::{GuardError, SafetyThresholds};
use serde::{Deserialize, Serialize};
use tracing::trace;

// ─────────────────────────────────────────────────────────────────────────────
// Anchors
// ─────────────────────────────────────────────────────────────────────────────

/// A quantity the anchor table can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalQuantity {
    Speed,
    Temperature,
    Torque,
    Power,
    Voltage,
    Pressure,
}

impl PhysicalQuantity {
    pub fn name(self) -> &'static str {
        match self {
            PhysicalQuantity::Speed => "speed",
            PhysicalQuantity::Temperature => "temperature",
            PhysicalQuantity::Torque => "torque",
            PhysicalQuantity::Power => "power",
            PhysicalQuantity::Voltage => "voltage",
            PhysicalQuantity::Pressure => "pressure",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "speed" | "rpm" | "rotational_speed" => Some(PhysicalQuantity::Speed),
            "temperature" | "temp" => Some(PhysicalQuantity::Temperature),
            "torque" => Some(PhysicalQuantity::Torque),
            "power" => Some(PhysicalQuantity::Power),
            "voltage" => Some(PhysicalQuantity::Voltage),
            "pressure" => Some(PhysicalQuantity::Pressure),
            _ => None,
        }
    }

    fn of(self, point: &CorrelationPoint) -> f64 {
        match self {
            PhysicalQuantity::Speed => point.rotational_speed,
            PhysicalQuantity::Temperature => point.temperature,
            PhysicalQuantity::Torque => point.torque,
            PhysicalQuantity::Power => point.power,
            PhysicalQuantity::Voltage => point.voltage,
            PhysicalQuantity::Pressure => point.pressure,
        }
    }
}

impl fmt::Display for PhysicalQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One empirical sample of joint machine behaviour at a given speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPoint {
    pub rotational_speed: f64,
    pub temperature: f64,
    pub vibration: f64,
    pub torque: f64,
    pub power: f64,
    pub voltage: f64,
    pub pressure: f64,
}

const fn anchor(
    rotational_speed: f64,
    temperature: f64,
    vibration: f64,
    torque: f64,
    power: f64,
    voltage: f64,
    pressure: f64,
) -> CorrelationPoint {
    CorrelationPoint {
        rotational_speed,
        temperature,
        vibration,
        torque,
        power,
        voltage,
        pressure,
    }
}

/// Built-in spindle table, ascending by speed.
pub const DEFAULT_ANCHORS: [CorrelationPoint; 8] = [
    anchor(0.0, 22.0, 0.1, 0.0, 0.0, 0.0, 1.0),
    anchor(600.0, 28.5, 0.8, 95.0, 6.0, 120.0, 1.6),
    anchor(1200.0, 36.8, 1.6, 180.0, 22.6, 240.0, 2.4),
    anchor(1500.0, 42.1, 2.1, 230.0, 36.1, 300.0, 2.9),
    anchor(2400.0, 58.7, 3.4, 360.0, 90.5, 460.0, 4.1),
    anchor(3000.0, 71.3, 4.6, 450.0, 141.4, 560.0, 5.2),
    anchor(3600.0, 86.0, 6.2, 540.0, 203.6, 680.0, 6.4),
    anchor(4500.0, 104.5, 8.9, 690.0, 325.2, 820.0, 8.0),
];

// ─────────────────────────────────────────────────────────────────────────────
// Prediction
// ─────────────────────────────────────────────────────────────────────────────

/// Classification attached to a [`Prediction`].
///
/// Only `Safe` and `Critical` are produced today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictionStatus {
    Safe,
    Warning,
    FailImminent,
    Critical,
    Emergency,
}

/// Projected machine behaviour for one requested operating point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub expected_speed: f64,
    pub expected_temperature: f64,
    pub expected_vibration: f64,
    pub expected_torque: f64,
    pub expected_power: f64,
    pub risk_score: f64,
    pub status: PredictionStatus,
}

// ─────────────────────────────────────────────────────────────────────────────
// ConsequencePredictor
// ─────────────────────────────────────────────────────────────────────────────

/// Table-interpolating consequence predictor.
#[derive(Debug, Clone)]
pub struct ConsequencePredictor {
    anchors: Vec<CorrelationPoint>,
    thresholds: SafetyThresholds,
}

impl ConsequencePredictor {
    /// Build a predictor over `anchors`, which are sorted ascending by speed
    /// here (the caller's order is not trusted).
    pub fn new(
        mut anchors: Vec<CorrelationPoint>,
        thresholds: SafetyThresholds,
    ) -> Result<Self, GuardError> {
        if anchors.is_empty() {
            return Err(GuardError::EmptyAnchorTable);
        }
        anchors.sort_by(|a, b| a.rotational_speed.total_cmp(&b.rotational_speed));
        Ok(Self { anchors, thresholds })
    }

    /// Predictor over [`DEFAULT_ANCHORS`].
    pub fn with_defaults(thresholds: SafetyThresholds) -> Self {
        Self {
            anchors: DEFAULT_ANCHORS.to_vec(),
            thresholds,
        }
    }

    pub fn anchors(&self) -> &[CorrelationPoint] {
        &self.anchors
    }

    pub fn thresholds(&self) -> &SafetyThresholds {
        &self.thresholds
    }

    fn min_speed(&self) -> f64 {
        self.anchors.first().map_or(0.0, |a| a.rotational_speed)
    }

    fn max_speed(&self) -> f64 {
        self.anchors.last().map_or(0.0, |a| a.rotational_speed)
    }

    /// Forward projection from a requested speed.
    pub fn predict_from_speed(&self, requested_speed: f64) -> Prediction {
        let speed = sanitize(requested_speed);
        let column = |q: PhysicalQuantity| -> Vec<(f64, f64)> {
            self.anchors
                .iter()
                .map(|a| (a.rotational_speed, q.of(a)))
                .collect()
        };
        let vibration: Vec<(f64, f64)> = self
            .anchors
            .iter()
            .map(|a| (a.rotational_speed, a.vibration))
            .collect();

        let expected_temperature = interpolate(&column(PhysicalQuantity::Temperature), speed);
        let expected_torque = interpolate(&column(PhysicalQuantity::Torque), speed);
        let expected_power = interpolate(&column(PhysicalQuantity::Power), speed);
        let expected_vibration = interpolate(&vibration, speed);

        let risk_score = self.risk(expected_temperature, expected_torque);
        let status = if risk_score > 0.9 {
            PredictionStatus::Critical
        } else {
            PredictionStatus::Safe
        };
        trace!(speed, expected_temperature, expected_torque, risk_score, "forward prediction");

        Prediction {
            expected_speed: speed,
            expected_temperature,
            expected_vibration,
            expected_torque,
            expected_power,
            risk_score,
            status,
        }
    }

    /// Inverse lookup of the speed producing `target` for `quantity`,
    /// clamped to the anchor speed range.
    pub fn speed_for(&self, quantity: PhysicalQuantity, target: f64) -> f64 {
        let target = sanitize(target);
        let mut points: Vec<(f64, f64)> = self
            .anchors
            .iter()
            .map(|a| (quantity.of(a), a.rotational_speed))
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        interpolate(&points, target).clamp(self.min_speed(), self.max_speed())
    }

    /// Predict the machine's behaviour when `quantity` is driven to `target`.
    pub fn predict_from_parameter(&self, quantity: PhysicalQuantity, target: f64) -> Prediction {
        match quantity {
            PhysicalQuantity::Speed => self.predict_from_speed(target),
            other => self.predict_from_speed(self.speed_for(other, target)),
        }
    }

    fn risk(&self, temperature: f64, torque: f64) -> f64 {
        let t = &self.thresholds;
        let mut risk: f64 = 0.0;
        if temperature > t.max_temperature_c {
            risk = 1.0;
        } else if temperature > t.warning_temperature_c {
            risk = 0.75;
        }
        if torque > t.max_torque_nm {
            risk = risk.max(0.85);
        }
        risk
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value }
}

/// Bracket `x` in `points` (sorted ascending by key) and interpolate the
/// value linearly.  Outside the table the nearest extreme is returned; a
/// degenerate bracket uses the lower point.
fn interpolate(points: &[(f64, f64)], x: f64) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return 0.0;
    };
    let lower = points.iter().rev().find(|p| p.0 <= x).unwrap_or(first);
    let upper = points.iter().find(|p| p.0 >= x).unwrap_or(last);
    let span = upper.0 - lower.0;
    let factor = if span == 0.0 { 0.0 } else { (x - lower.0) / span };
    lower.1 + factor * (upper.1 - lower.1)
}
