//! [`Gatekeeper`] – snapshot, validate, publish, audit.
//!
//! The gatekeeper is the only writer of validated state.  Each
//! [`Gatekeeper::submit`] call:
//!
//! 1. takes a consistent [`Snapshot`] of the live telemetry;
//! 2. runs the [`SafetyPipeline`] against it;
//! 3. on `AUTHORIZED`, publishes the predicted state with compare-and-swap.
//!    If another request published first the verdict is turned into a
//!    denial and nothing is committed (no automatic retry);
//! 4. hands a [`TransactionRecord`] to the [`AuditSink`].  Audit failures
//!    are logged and never change the verdict.

use std::sync::Arc;

use machguard_audit::{AuditSink, TransactionRecord};
use machguard_kernel::{parse_batch, ParameterRegistry, Snapshot, TelemetryStore};
use machguard_types::{GuardError, LogDetail, LogEntry, Severity, Verdict};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::oracle::Voice;
use crate::pipeline::{Mode, SafetyPipeline};

/// Best-effort narrations of one verdict.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reaction {
    pub operator: Option<String>,
    pub machine: Option<String>,
}

pub struct Gatekeeper {
    store: Arc<TelemetryStore>,
    pipeline: Arc<SafetyPipeline>,
    audit: Arc<dyn AuditSink>,
}

impl Gatekeeper {
    pub fn new(store: Arc<TelemetryStore>, pipeline: Arc<SafetyPipeline>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            pipeline,
            audit,
        }
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &SafetyPipeline {
        &self.pipeline
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// Validate `text` and, if authorized, apply it to the live state.
    pub async fn submit(&self, text: &str, mode: Mode) -> Verdict {
        let request_id = Uuid::new_v4();
        let span = info_span!("submit", %request_id, ?mode);
        async {
            let snapshot = self.store.snapshot();
            let verdict = self.pipeline.evaluate(text, &snapshot.state, mode).await;
            let verdict = self.publish(&snapshot, verdict);

            let record = TransactionRecord::new(text, (*snapshot.state).clone(), verdict.clone());
            if let Err(e) = self.audit.record(&record) {
                warn!(error = %e, "audit sink rejected transaction record");
            }
            info!(
                decision = verdict.decision.as_str(),
                risk = verdict.risk_score,
                "request decided"
            );
            verdict
        }
        .instrument(span)
        .await
    }

    fn publish(&self, snapshot: &Snapshot, verdict: Verdict) -> Verdict {
        let Some(next) = verdict.predicted_state.clone() else {
            return verdict;
        };
        match self.store.compare_and_publish(snapshot.version, next) {
            Ok(version) => {
                info!(version, "telemetry updated");
                verdict
            }
            Err(e) => {
                warn!(error = %e, "telemetry changed during validation");
                verdict.into_denied(
                    "Telemetry changed during validation; command not applied",
                    LogEntry::new(Severity::Block, e.to_string(), LogDetail::None),
                )
            }
        }
    }

    /// Merge a batch telemetry import into the live state.  Returns the new
    /// version.
    pub fn import(&self, text: &str) -> Result<u64, GuardError> {
        let patch = parse_batch(text, &ParameterRegistry::builtin())?;
        let version = self.store.merge(&patch);
        info!(version, fields = patch.len(), "telemetry imported");
        Ok(version)
    }

    /// Ask the oracle for both narrations of `verdict` at once, under a
    /// single shared timeout.
    pub async fn react(&self, input: &str, verdict: &Verdict) -> Reaction {
        let Some(oracle) = self.pipeline.oracle() else {
            return Reaction::default();
        };
        let both = async {
            tokio::join!(
                oracle.narrate(Voice::Operator, input, verdict),
                oracle.narrate(Voice::Machine, input, verdict),
            )
        };
        match tokio::time::timeout(self.pipeline.oracle_timeout(), both).await {
            Ok((operator, machine)) => Reaction {
                operator: operator.inspect_err(|e| warn!(error = %e, "operator narration failed")).ok(),
                machine: machine.inspect_err(|e| warn!(error = %e, "machine narration failed")).ok(),
            },
            Err(_) => {
                warn!("narration timed out");
                Reaction::default()
            }
        }
    }
}
