//! `machguard-types` – shared data model for the MachGuard safety pipeline.
//!
//! Every other crate in the workspace speaks in these types: the live
//! [`TelemetryState`] snapshot, parsed [`Intent`]s, the per-request
//! [`SecurityLog`], and the final [`Verdict`].

pub mod intent;
pub mod state;
pub mod thresholds;
pub mod verdict;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use intent::{Intent, Operation};
pub use state::{HazardKind, HealthStatus, StateDelta, StateField, TelemetryState};
pub use thresholds::SafetyThresholds;
pub use verdict::{Decision, LogDetail, LogEntry, SecurityLog, Severity, Verdict};

/// Global error type spanning vector math, registry lookups, telemetry
/// import and state publication.
///
/// The safety pipeline never surfaces these to its caller: every failure
/// inside one invocation is folded into a [`Verdict`].
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GuardError {
    #[error("Vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Correlation table must contain at least one anchor")]
    EmptyAnchorTable,

    #[error("Telemetry import error on line {line}: {details}")]
    Import { line: usize, details: String },

    #[error("Stale telemetry snapshot: read version {expected}, live version is {actual}")]
    StaleSnapshot { expected: u64, actual: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_error_display() {
        let err = GuardError::DimensionMismatch { left: 3, right: 4 };
        assert!(err.to_string().contains("3 vs 4"));

        let err = GuardError::StaleSnapshot {
            expected: 2,
            actual: 5,
        };
        assert!(err.to_string().contains("version 2"));
        assert!(err.to_string().contains("is 5"));
    }

    #[test]
    fn guard_error_roundtrip() {
        let err = GuardError::Import {
            line: 7,
            details: "bad value".into(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: GuardError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
