//! One audit row per gatekeeper invocation.

use chrono::{DateTime, Utc};
use machguard_types::{Decision, TelemetryState, Verdict};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything needed to reconstruct why a request was allowed or refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// The operator's text, verbatim.
    pub input_text: String,
    /// Strict-grammar commands, `; `-joined.
    pub normalized_command: String,
    pub semantic_similarity: f64,
    /// Live telemetry the decision was taken against.
    pub state_snapshot: TelemetryState,
    pub reasoning_summary: Option<String>,
    pub verdict: Verdict,
    pub decision: Decision,
}

impl TransactionRecord {
    pub fn new(input_text: impl Into<String>, state_snapshot: TelemetryState, verdict: Verdict) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            input_text: input_text.into(),
            normalized_command: verdict.normalized_commands.join("; "),
            semantic_similarity: verdict.semantic_risk,
            state_snapshot,
            reasoning_summary: verdict.reasoning.clone().or_else(|| verdict.reason.clone()),
            decision: verdict.decision,
            verdict,
        }
    }
}
