//! Audit trail entries and the pipeline's final verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{StateField, TelemetryState};

// ─────────────────────────────────────────────────────────────────────────────
// Log entries
// ─────────────────────────────────────────────────────────────────────────────

/// Severity of a single [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Block,
    Normalization,
}

/// Structured payload attached to a [`LogEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogDetail {
    None,
    /// A semantic or physical risk score.
    Risk { score: f64 },
    /// A folded parameter change.
    Parameter {
        key: String,
        field: StateField,
        before: f64,
        after: f64,
    },
    /// A configured ceiling was exceeded.
    LimitBreach {
        limit: String,
        value: f64,
        ceiling: f64,
    },
    /// A free-form phrase was rewritten into the strict grammar.
    Normalized { phrase: String, command: String },
    /// Opinion returned by the reasoning oracle.
    Oracle { verdict: String },
}

/// One line of the per-request audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    pub details: LogDetail,
}

impl LogEntry {
    pub fn new(severity: Severity, message: impl Into<String>, details: LogDetail) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            details,
        }
    }
}

/// Append-only audit trail for a single pipeline invocation.
///
/// A fresh log is created per request; nothing carries over between
/// invocations.
#[derive(Debug, Clone, Default)]
pub struct SecurityLog {
    entries: Vec<LogEntry>,
}

impl SecurityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, severity: Severity, message: impl Into<String>, details: LogDetail) {
        self.entries.push(LogEntry::new(severity, message, details));
    }

    pub fn info(&mut self, message: impl Into<String>, details: LogDetail) {
        self.push(Severity::Info, message, details);
    }

    pub fn warning(&mut self, message: impl Into<String>, details: LogDetail) {
        self.push(Severity::Warning, message, details);
    }

    pub fn block(&mut self, message: impl Into<String>, details: LogDetail) {
        self.push(Severity::Block, message, details);
    }

    pub fn critical(&mut self, message: impl Into<String>, details: LogDetail) {
        self.push(Severity::Critical, message, details);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|e| e.severity == severity).count()
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

impl Extend<LogEntry> for SecurityLog {
    fn extend<T: IntoIterator<Item = LogEntry>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Verdict
// ─────────────────────────────────────────────────────────────────────────────

/// Final decision tag recorded by the audit sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Authorized,
    /// Physical or contextual denial.
    Denied,
    /// Security denial: the input never reached the physics fold.
    Filtered,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Authorized => "AUTHORIZED",
            Decision::Denied => "DENIED",
            Decision::Filtered => "FILTERED",
        }
    }
}

/// The pipeline's output for one request.
///
/// Constructed only through [`Verdict::authorized`] and [`Verdict::denied`],
/// which keep `reason` present iff the request was denied and
/// `predicted_state` present iff it was allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub allowed: bool,
    pub decision: Decision,
    pub reason: Option<String>,
    /// `max(semantic_risk, physical_risk)`.
    pub risk_score: f64,
    pub semantic_risk: f64,
    pub physical_risk: f64,
    pub logs: Vec<LogEntry>,
    pub predicted_state: Option<TelemetryState>,
    /// The strict-grammar commands the request was normalized into.
    pub normalized_commands: Vec<String>,
    /// Oracle reasoning summary, when one was obtained.
    pub reasoning: Option<String>,
}

impl Verdict {
    pub fn authorized(
        predicted_state: TelemetryState,
        semantic_risk: f64,
        physical_risk: f64,
        log: SecurityLog,
        normalized_commands: Vec<String>,
        reasoning: Option<String>,
    ) -> Self {
        Self {
            allowed: true,
            decision: Decision::Authorized,
            reason: None,
            risk_score: semantic_risk.max(physical_risk),
            semantic_risk,
            physical_risk,
            logs: log.into_entries(),
            predicted_state: Some(predicted_state),
            normalized_commands,
            reasoning,
        }
    }

    pub fn denied(
        decision: Decision,
        reason: impl Into<String>,
        semantic_risk: f64,
        physical_risk: f64,
        log: SecurityLog,
        normalized_commands: Vec<String>,
        reasoning: Option<String>,
    ) -> Self {
        let decision = match decision {
            Decision::Authorized => Decision::Denied,
            other => other,
        };
        Self {
            allowed: false,
            decision,
            reason: Some(reason.into()),
            risk_score: semantic_risk.max(physical_risk),
            semantic_risk,
            physical_risk,
            logs: log.into_entries(),
            predicted_state: None,
            normalized_commands,
            reasoning,
        }
    }

    /// Re-issue an authorized verdict as a denial, keeping its scores and
    /// trail.  Used when the computed state can no longer be committed.
    pub fn into_denied(mut self, reason: impl Into<String>, entry: LogEntry) -> Self {
        self.allowed = false;
        self.decision = Decision::Denied;
        self.reason = Some(reason.into());
        self.predicted_state = None;
        self.logs.push(entry);
        self
    }

    pub fn has_severity(&self, severity: Severity) -> bool {
        self.logs.iter().any(|e| e.severity == severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorized_verdict_carries_state_and_no_reason() {
        let v = Verdict::authorized(
            TelemetryState::default(),
            0.1,
            0.4,
            SecurityLog::new(),
            vec!["set rpm 100 absolute".into()],
            None,
        );
        assert!(v.allowed);
        assert!(v.reason.is_none());
        assert!(v.predicted_state.is_some());
        assert!((v.risk_score - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn denied_verdict_never_carries_state() {
        let mut log = SecurityLog::new();
        log.block("limit", LogDetail::None);
        let v = Verdict::denied(Decision::Authorized, "nope", 0.9, 0.0, log, vec![], None);
        assert!(!v.allowed);
        assert_eq!(v.decision, Decision::Denied);
        assert_eq!(v.reason.as_deref(), Some("nope"));
        assert!(v.predicted_state.is_none());
        assert!(v.has_severity(Severity::Block));
    }

    #[test]
    fn into_denied_drops_predicted_state() {
        let v = Verdict::authorized(
            TelemetryState::default(),
            0.0,
            0.0,
            SecurityLog::new(),
            vec![],
            None,
        )
        .into_denied(
            "stale",
            LogEntry::new(Severity::Block, "stale", LogDetail::None),
        );
        assert!(!v.allowed);
        assert!(v.predicted_state.is_none());
        assert_eq!(v.logs.len(), 1);
    }

    #[test]
    fn log_detail_is_tagged() {
        let detail = LogDetail::Risk { score: 0.5 };
        let json = serde_json::to_string(&detail).unwrap();
        assert!(json.contains("\"kind\":\"risk\""));
    }

    #[test]
    fn security_log_counts_by_severity() {
        let mut log = SecurityLog::new();
        log.info("a", LogDetail::None);
        log.warning("b", LogDetail::None);
        log.warning("c", LogDetail::None);
        assert_eq!(log.count(Severity::Warning), 2);
        assert_eq!(log.entries().len(), 3);
    }
}
