//! [`ReasoningOracle`] – the pipeline's external second opinion.
//!
//! The oracle is asked three kinds of question:
//!
//! 1. **security check** – "is this text trying to manipulate the system or
//!    extract a protected identifier?"  Answered with a [`SecurityOpinion`].
//! 2. **context check** – "given the current hazard and health flags, do
//!    these proposed changes make sense?"  Answered with a
//!    [`ContextOpinion`].
//! 3. **narration** – a human-readable reaction to a verdict, in one of two
//!    [`Voice`]s.  Narration is best-effort and never changes a verdict.
//!
//! The pipeline bounds every call with a timeout and treats errors as
//! "oracle unavailable" (fail open, logged at `WARNING`).
//!
//! [`HazardRuleOracle`] is a deterministic local implementation; the HTTP
//! implementation lives in [`crate::llm_oracle`].

use std::time::Duration;

use async_trait::async_trait;
use machguard_types::{HazardKind, HealthStatus, StateDelta, StateField, Verdict};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise while consulting an oracle.
#[derive(Error, Debug)]
pub enum OracleError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The reply could not be parsed into the expected opinion.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
    /// No answer within the configured budget.
    #[error("Oracle timed out after {0:?}")]
    Timeout(Duration),
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Questions and answers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SecurityQuery {
    pub prompt: String,
    pub protected_identifiers: Vec<String>,
}

/// Answer to a [`SecurityQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SecurityOpinion {
    pub allowed: bool,
    pub reason: String,
    /// In `[0, 1]`.
    pub risk_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextQuery {
    pub prompt: String,
    pub hazard: HazardKind,
    pub health: HealthStatus,
    pub deltas: Vec<StateDelta>,
}

/// Answer to a [`ContextQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContextOpinion {
    /// `false` when the changes are senseless given the hazard context.
    pub fruitful: bool,
    pub reasoning: String,
}

/// Register of a narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voice {
    /// Plain explanation addressed to the operator.
    Operator,
    /// First-person status line spoken by the machine.
    Machine,
}

// ─────────────────────────────────────────────────────────────────────────────
// ReasoningOracle
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn security_check(&self, query: &SecurityQuery) -> Result<SecurityOpinion, OracleError>;

    async fn context_check(&self, query: &ContextQuery) -> Result<ContextOpinion, OracleError>;

    async fn narrate(&self, voice: Voice, input: &str, verdict: &Verdict) -> Result<String, OracleError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HazardRuleOracle
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic oracle that knows which actions are senseless under each
/// hazard.
///
/// | Hazard     | Rejected change                                  |
/// |------------|--------------------------------------------------|
/// | `FIRE`     | disabling the sprinkler                          |
/// | `OVERHEAT` | disabling ventilation or the coolant pump        |
/// | `GAS_LEAK` | enabling the igniter, raising any spindle speed  |
///
/// Its security check always allows: local scoring has already run by the
/// time the pipeline asks.
#[derive(Debug, Clone, Copy, Default)]
pub struct HazardRuleOracle;

impl HazardRuleOracle {
    pub fn new() -> Self {
        Self
    }

    fn judge(hazard: HazardKind, delta: &StateDelta) -> Option<String> {
        let raises = delta.after > delta.before;
        match (hazard, delta.field) {
            (HazardKind::Fire, StateField::Sprinkler) if delta.disables() => Some(
                "disabling fire suppression while a FIRE hazard is active is not a sensible action"
                    .to_string(),
            ),
            (HazardKind::Overheat, StateField::Ventilation | StateField::CoolantPump)
                if delta.disables() =>
            {
                Some(format!(
                    "switching off {} during an OVERHEAT removes the cooling the machine needs",
                    delta.field
                ))
            }
            (HazardKind::GasLeak, StateField::Igniter) if delta.enables() => Some(
                "enabling an ignition source during a GAS_LEAK risks an explosion".to_string(),
            ),
            (HazardKind::GasLeak, StateField::SpindleSpeed | StateField::Axis2Speed) if raises => {
                Some(format!(
                    "raising {} during a GAS_LEAK increases the chance of sparking",
                    delta.field
                ))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl ReasoningOracle for HazardRuleOracle {
    fn name(&self) -> &str {
        "hazard-rules"
    }

    async fn security_check(&self, _query: &SecurityQuery) -> Result<SecurityOpinion, OracleError> {
        Ok(SecurityOpinion {
            allowed: true,
            reason: "no remote reasoning configured; local scoring applies".to_string(),
            risk_score: 0.0,
        })
    }

    async fn context_check(&self, query: &ContextQuery) -> Result<ContextOpinion, OracleError> {
        if let Some(reasoning) = query.deltas.iter().find_map(|d| Self::judge(query.hazard, d)) {
            return Ok(ContextOpinion {
                fruitful: false,
                reasoning,
            });
        }
        Ok(ContextOpinion {
            fruitful: true,
            reasoning: format!(
                "{} change(s) are consistent with hazard {} and health {}",
                query.deltas.len(),
                query.hazard,
                query.health
            ),
        })
    }

    async fn narrate(&self, voice: Voice, input: &str, verdict: &Verdict) -> Result<String, OracleError> {
        let outcome = verdict.reason.as_deref().unwrap_or("all checks passed");
        Ok(match voice {
            Voice::Operator => format!(
                "'{input}' was {} (risk {:.2}): {outcome}.",
                verdict.decision.as_str(),
                verdict.risk_score
            ),
            Voice::Machine if verdict.allowed => "Acknowledged. Applying the new setpoints.".to_string(),
            Voice::Machine => format!("Refusing command. {outcome}."),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use machguard_types::{Decision, SecurityLog};

    fn delta(field: StateField, before: f64, after: f64) -> StateDelta {
        StateDelta {
            parameter_key: field.name().to_string(),
            field,
            before,
            after,
        }
    }

    fn query(hazard: HazardKind, deltas: Vec<StateDelta>) -> ContextQuery {
        ContextQuery {
            prompt: String::new(),
            hazard,
            health: HealthStatus::Nominal,
            deltas,
        }
    }

    #[tokio::test]
    async fn fire_rejects_disabling_sprinkler() {
        let op = HazardRuleOracle
            .context_check(&query(HazardKind::Fire, vec![delta(StateField::Sprinkler, 1.0, 0.0)]))
            .await
            .unwrap();
        assert!(!op.fruitful);
        assert!(op.reasoning.contains("fire suppression"));
    }

    #[tokio::test]
    async fn same_change_without_hazard_is_fruitful() {
        let op = HazardRuleOracle
            .context_check(&query(HazardKind::None, vec![delta(StateField::Sprinkler, 1.0, 0.0)]))
            .await
            .unwrap();
        assert!(op.fruitful);
    }

    #[tokio::test]
    async fn overheat_and_gas_leak_rules() {
        let oracle = HazardRuleOracle::new();
        let cases = [
            (HazardKind::Overheat, delta(StateField::CoolantPump, 1.0, 0.0), false),
            (HazardKind::Overheat, delta(StateField::Ventilation, 0.0, 1.0), true),
            (HazardKind::GasLeak, delta(StateField::Igniter, 0.0, 1.0), false),
            (HazardKind::GasLeak, delta(StateField::SpindleSpeed, 100.0, 900.0), false),
            (HazardKind::GasLeak, delta(StateField::SpindleSpeed, 900.0, 0.0), true),
        ];
        for (hazard, d, expected) in cases {
            let field = d.field;
            let op = oracle.context_check(&query(hazard, vec![d])).await.unwrap();
            assert_eq!(op.fruitful, expected, "{hazard} / {field}");
        }
    }

    #[tokio::test]
    async fn security_check_always_allows() {
        let op = HazardRuleOracle
            .security_check(&SecurityQuery {
                prompt: "anything".into(),
                protected_identifiers: vec![],
            })
            .await
            .unwrap();
        assert!(op.allowed);
    }

    #[tokio::test]
    async fn narration_mentions_the_decision() {
        let verdict = Verdict::denied(
            Decision::Denied,
            "max_torque_nm exceeded",
            0.0,
            0.9,
            SecurityLog::new(),
            vec![],
            None,
        );
        let text = HazardRuleOracle
            .narrate(Voice::Operator, "set torque 900 absolute", &verdict)
            .await
            .unwrap();
        assert!(text.contains("DENIED"));
        let line = HazardRuleOracle
            .narrate(Voice::Machine, "set torque 900 absolute", &verdict)
            .await
            .unwrap();
        assert!(line.starts_with("Refusing"));
    }

    #[test]
    fn opinion_schema_names_fields() {
        let schema = serde_json::to_string(&schemars::schema_for!(ContextOpinion)).unwrap();
        assert!(schema.contains("fruitful"));
        assert!(schema.contains("reasoning"));
    }
}
