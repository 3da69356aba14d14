//! [`SafetyPipeline`] – the validation state machine.
//!
//! Every request walks the same stages:
//!
//! ```text
//! INIT → SEMANTIC_SCAN → PHYSICS_FOLD → CONTEXT_CHECK → AUTHORIZED
//!              │               │               │
//!              └──── FILTERED  └─── DENIED     └─── DENIED
//! ```
//!
//! 1. **SEMANTIC_SCAN** – local honeypot and jailbreak scoring, then the
//!    oracle's security opinion.  A flag ends the request as `FILTERED` with
//!    zero physical risk.
//! 2. **PHYSICS_FOLD** – the parsed intents are applied in order to a
//!    working copy of the snapshot.  Coupled parameters pull their axis'
//!    speed, temperature and torque (plus shared power) along via the
//!    [`ConsequencePredictor`].  Each step is checked against the
//!    [`StateVerifier`] and the predictor's `CRITICAL` classification; the
//!    first breach discards the working copy.
//! 3. **CONTEXT_CHECK** – the oracle judges the proposed deltas against the
//!    hazard and health flags.
//!
//! Oracle failures and timeouts fail open with a `WARNING` entry.  The
//! pipeline never returns an error: every outcome is a [`Verdict`].
//!
//! [`Mode::Admin`] keeps the honeypot scan, folds without ever blocking
//! (every mutation and every breach is logged at `WARNING`) and skips the
//! context check.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use machguard_kernel::{
    ConsequencePredictor, IntentParser, LimitBreach, ParameterRegistry, PredictionStatus,
    SemanticScorer, StateVerifier,
};
use machguard_types::{
    Decision, Intent, LogDetail, SafetyThresholds, SecurityLog, Severity, StateDelta, StateField,
    TelemetryState, Verdict,
};
use tracing::{debug, info, warn};

use crate::oracle::{ContextQuery, OracleError, ReasoningOracle, SecurityQuery};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default budget for a single oracle call.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(8);

/// Which variant of the pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Standard,
    /// Operator override: physical limits and context never block.
    Admin,
}

/// Stages of the state machine, used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    SemanticScan,
    PhysicsFold,
    ContextCheck,
    Authorized,
    Denied,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Init => "INIT",
            Stage::SemanticScan => "SEMANTIC_SCAN",
            Stage::PhysicsFold => "PHYSICS_FOLD",
            Stage::ContextCheck => "CONTEXT_CHECK",
            Stage::Authorized => "AUTHORIZED",
            Stage::Denied => "DENIED",
        })
    }
}

/// Tunables for [`SafetyPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub thresholds: SafetyThresholds,
    pub jailbreak_threshold: f64,
    pub honeypot_threshold: f64,
    pub oracle_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thresholds: SafetyThresholds::default(),
            jailbreak_threshold: machguard_kernel::semantic::JAILBREAK_THRESHOLD,
            honeypot_threshold: machguard_kernel::semantic::HONEYPOT_THRESHOLD,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage outcomes
// ─────────────────────────────────────────────────────────────────────────────

enum Scan {
    Clear { risk: f64 },
    Flagged { risk: f64, reason: String },
}

struct Fold {
    state: TelemetryState,
    deltas: Vec<StateDelta>,
    physical_risk: f64,
}

struct FoldDenial {
    reason: String,
    physical_risk: f64,
}

struct Breach {
    message: String,
    risk: f64,
    detail: LogDetail,
}

impl From<LimitBreach> for Breach {
    fn from(b: LimitBreach) -> Self {
        Self {
            message: b.to_string(),
            risk: b.risk,
            detail: LogDetail::LimitBreach {
                limit: b.limit,
                value: b.value,
                ceiling: b.ceiling,
            },
        }
    }
}

enum Context {
    Fruitful(Option<String>),
    Rejected(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// SafetyPipeline
// ─────────────────────────────────────────────────────────────────────────────

/// The orchestrating decision procedure.
///
/// Holds no per-request state; one instance can serve concurrent callers.
pub struct SafetyPipeline {
    parser: IntentParser,
    scorer: SemanticScorer,
    predictor: ConsequencePredictor,
    verifier: StateVerifier,
    oracle: Option<Arc<dyn ReasoningOracle>>,
    oracle_timeout: Duration,
}

impl Default for SafetyPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl SafetyPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            parser: IntentParser::new(ParameterRegistry::builtin()),
            scorer: SemanticScorer::new(config.jailbreak_threshold, config.honeypot_threshold),
            verifier: StateVerifier::from_thresholds(&config.thresholds),
            predictor: ConsequencePredictor::with_defaults(config.thresholds),
            oracle: None,
            oracle_timeout: config.oracle_timeout,
        }
    }

    /// Attach a reasoning oracle.  Without one, the oracle half of the
    /// semantic scan and the whole context check are skipped.
    pub fn with_oracle(mut self, oracle: Arc<dyn ReasoningOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Swap the anchor table.
    pub fn with_predictor(mut self, predictor: ConsequencePredictor) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn oracle(&self) -> Option<&Arc<dyn ReasoningOracle>> {
        self.oracle.as_ref()
    }

    pub fn oracle_timeout(&self) -> Duration {
        self.oracle_timeout
    }

    pub fn parser(&self) -> &IntentParser {
        &self.parser
    }

    pub fn thresholds(&self) -> &SafetyThresholds {
        self.predictor.thresholds()
    }

    /// Validate `raw` against `state`.
    pub async fn evaluate(&self, raw: &str, state: &TelemetryState, mode: Mode) -> Verdict {
        let mut log = SecurityLog::new();
        let parsed = self.parser.parse_request(raw);
        for rewrite in &parsed.rewrites {
            log.push(
                Severity::Normalization,
                format!("Normalized '{}' to '{}'", rewrite.phrase, rewrite.command),
                LogDetail::Normalized {
                    phrase: rewrite.phrase.clone(),
                    command: rewrite.command.clone(),
                },
            );
        }
        for line in &parsed.skipped {
            log.info(format!("No command recognised in '{line}'"), LogDetail::None);
        }
        let normalized = parsed.normalized;
        transition(Stage::Init, Stage::SemanticScan, mode);

        // SEMANTIC_SCAN
        let semantic_risk = match self.semantic_scan(raw, mode, &mut log).await {
            Scan::Clear { risk } => risk,
            Scan::Flagged { risk, reason } => {
                transition(Stage::SemanticScan, Stage::Denied, mode);
                return Verdict::denied(Decision::Filtered, reason, risk, 0.0, log, normalized, None);
            }
        };
        transition(Stage::SemanticScan, Stage::PhysicsFold, mode);

        // PHYSICS_FOLD
        let fold = match self.fold(&parsed.intents, state, mode, &mut log) {
            Ok(fold) => fold,
            Err(denial) => {
                transition(Stage::PhysicsFold, Stage::Denied, mode);
                return Verdict::denied(
                    Decision::Denied,
                    denial.reason,
                    semantic_risk,
                    denial.physical_risk,
                    log,
                    normalized,
                    None,
                );
            }
        };

        // CONTEXT_CHECK
        let mut reasoning = None;
        if mode == Mode::Standard {
            transition(Stage::PhysicsFold, Stage::ContextCheck, mode);
            match self.context_check(raw, state, &fold.deltas, &mut log).await {
                Context::Fruitful(r) => reasoning = r,
                Context::Rejected(why) => {
                    transition(Stage::ContextCheck, Stage::Denied, mode);
                    return Verdict::denied(
                        Decision::Denied,
                        format!("Contextual rejection: {why}"),
                        semantic_risk,
                        fold.physical_risk,
                        log,
                        normalized,
                        Some(why),
                    );
                }
            }
        }

        transition(last_checked_stage(mode), Stage::Authorized, mode);
        Verdict::authorized(
            fold.state,
            semantic_risk,
            fold.physical_risk,
            log,
            normalized,
            reasoning,
        )
    }

    // ── SEMANTIC_SCAN ────────────────────────────────────────────────────────

    async fn semantic_scan(&self, raw: &str, mode: Mode, log: &mut SecurityLog) -> Scan {
        let honeypot = self.scorer.scan_honeypots(raw);
        if honeypot.flagged {
            log.critical(
                format!(
                    "Protected identifier extraction attempt (closest: {})",
                    honeypot.closest.as_deref().unwrap_or("?")
                ),
                LogDetail::Risk {
                    score: honeypot.score,
                },
            );
            return Scan::Flagged {
                risk: honeypot.score,
                reason: "Request references a protected identifier".to_string(),
            };
        }
        if mode == Mode::Admin {
            log.info(
                "Admin override: honeypot scan only",
                LogDetail::Risk {
                    score: honeypot.score,
                },
            );
            return Scan::Clear {
                risk: honeypot.score,
            };
        }

        let scan = self.scorer.scan(raw);
        let risk = scan.max_score();
        if scan.jailbreak.flagged {
            log.block(
                format!(
                    "Prompt injection pattern detected (closest: {})",
                    scan.jailbreak.closest.as_deref().unwrap_or("?")
                ),
                LogDetail::Risk {
                    score: scan.jailbreak.score,
                },
            );
            return Scan::Flagged {
                risk,
                reason: "Request matches known prompt-injection phrasing".to_string(),
            };
        }
        log.info("Semantic scan clear", LogDetail::Risk { score: risk });

        let Some(oracle) = &self.oracle else {
            return Scan::Clear { risk };
        };
        let query = SecurityQuery {
            prompt: raw.to_string(),
            protected_identifiers: self.scorer.honeypot_identifiers().to_vec(),
        };
        match self.consult(oracle.security_check(&query)).await {
            Ok(opinion) if !opinion.allowed => {
                let risk = risk.max(opinion.risk_score);
                log.block(
                    format!("Security oracle '{}' rejected the request", oracle.name()),
                    LogDetail::Oracle {
                        verdict: opinion.reason.clone(),
                    },
                );
                Scan::Flagged {
                    risk,
                    reason: opinion.reason,
                }
            }
            Ok(opinion) => {
                debug!(oracle = oracle.name(), reason = %opinion.reason, "security oracle allowed");
                Scan::Clear { risk }
            }
            Err(e) => {
                warn!(oracle = oracle.name(), error = %e, "security oracle unavailable, failing open");
                log.warning(
                    format!("Security oracle unavailable, failing open: {e}"),
                    LogDetail::None,
                );
                Scan::Clear { risk }
            }
        }
    }

    // ── PHYSICS_FOLD ─────────────────────────────────────────────────────────

    fn fold(
        &self,
        intents: &[Intent],
        state: &TelemetryState,
        mode: Mode,
        log: &mut SecurityLog,
    ) -> Result<Fold, FoldDenial> {
        let registry = self.parser.registry();
        let mut work = state.clone();
        let mut deltas = Vec::new();
        let mut physical_risk: f64 = 0.0;

        for intent in intents {
            let spec = match registry.lookup(&intent.parameter_key) {
                Ok(spec) => spec,
                Err(e) => {
                    log.warning(format!("{e}, skipped"), LogDetail::None);
                    continue;
                }
            };
            let before = work.get(spec.field);
            let target = intent.target_from(before);
            if !target.is_finite() {
                let message = format!(
                    "{} {} does not yield a finite value",
                    intent.operation, spec.key
                );
                match mode {
                    Mode::Standard => {
                        log.block(message.clone(), LogDetail::None);
                        return Err(FoldDenial {
                            reason: format!("Physical limit violation: {message}"),
                            physical_risk: 1.0,
                        });
                    }
                    Mode::Admin => {
                        log.warning(format!("{message}, skipped"), LogDetail::None);
                        continue;
                    }
                }
            }
            work.set(spec.field, target);
            let after = work.get(spec.field);
            let severity = if mode == Mode::Admin {
                Severity::Warning
            } else {
                Severity::Info
            };
            log.push(
                severity,
                format!("{} {}: {before} -> {after}", intent.operation, spec.key),
                LogDetail::Parameter {
                    key: spec.key.to_string(),
                    field: spec.field,
                    before,
                    after,
                },
            );
            deltas.push(StateDelta {
                parameter_key: spec.key.to_string(),
                field: spec.field,
                before,
                after,
            });

            let mut correlated = Vec::new();
            let mut critical = None;
            if let Some(quantity) = spec.physical {
                let p = self.predictor.predict_from_parameter(quantity, after);
                physical_risk = physical_risk.max(p.risk_score);
                let projected = [
                    (spec.axis.speed_field(), p.expected_speed),
                    (spec.axis.temperature_field(), p.expected_temperature),
                    (spec.axis.torque_field(), p.expected_torque),
                    (StateField::PowerDraw, p.expected_power),
                ];
                for (field, value) in projected {
                    if field == spec.field {
                        continue;
                    }
                    let prev = work.get(field);
                    work.set(field, value);
                    let next = work.get(field);
                    if next != prev {
                        deltas.push(StateDelta {
                            parameter_key: spec.key.to_string(),
                            field,
                            before: prev,
                            after: next,
                        });
                    }
                    correlated.push(field);
                }
                log.info(
                    format!(
                        "Predicted {quantity} {after:.1}: {:.0} rpm, {:.1} °C, {:.0} Nm, {:.1} kW",
                        p.expected_speed, p.expected_temperature, p.expected_torque, p.expected_power
                    ),
                    LogDetail::Risk {
                        score: p.risk_score,
                    },
                );
                if p.status == PredictionStatus::Critical {
                    critical = Some(Breach {
                        message: format!(
                            "predicted consequence of {} {after:.1} is CRITICAL (risk {:.2})",
                            spec.key, p.risk_score
                        ),
                        risk: p.risk_score,
                        detail: LogDetail::Risk {
                            score: p.risk_score,
                        },
                    });
                }
            }

            let breach = self
                .verifier
                .verify(&work, &[spec.field])
                .and_then(|()| self.verifier.verify(&work, &correlated))
                .map_err(Breach::from)
                .err()
                .or(critical);

            if let Some(breach) = breach {
                physical_risk = physical_risk.max(breach.risk);
                match mode {
                    Mode::Standard => {
                        log.block(breach.message.clone(), breach.detail);
                        return Err(FoldDenial {
                            reason: format!("Physical limit violation: {}", breach.message),
                            physical_risk,
                        });
                    }
                    Mode::Admin => {
                        log.warning(format!("Override accepted: {}", breach.message), breach.detail);
                    }
                }
            }
        }

        Ok(Fold {
            state: work,
            deltas,
            physical_risk,
        })
    }

    // ── CONTEXT_CHECK ────────────────────────────────────────────────────────

    async fn context_check(
        &self,
        raw: &str,
        state: &TelemetryState,
        deltas: &[StateDelta],
        log: &mut SecurityLog,
    ) -> Context {
        let Some(oracle) = &self.oracle else {
            return Context::Fruitful(None);
        };
        if deltas.is_empty() {
            return Context::Fruitful(None);
        }
        let query = ContextQuery {
            prompt: raw.to_string(),
            hazard: state.hazard_detected,
            health: state.health,
            deltas: deltas.to_vec(),
        };
        match self.consult(oracle.context_check(&query)).await {
            Ok(opinion) if !opinion.fruitful => {
                log.block(
                    format!("Contextual rejection under hazard {}", state.hazard_detected),
                    LogDetail::Oracle {
                        verdict: opinion.reasoning.clone(),
                    },
                );
                Context::Rejected(opinion.reasoning)
            }
            Ok(opinion) => {
                log.info(
                    "Context check passed",
                    LogDetail::Oracle {
                        verdict: opinion.reasoning.clone(),
                    },
                );
                Context::Fruitful(Some(opinion.reasoning))
            }
            Err(e) => {
                warn!(oracle = oracle.name(), error = %e, "context oracle unavailable, failing open");
                log.warning(
                    format!("Context oracle unavailable, failing open: {e}"),
                    LogDetail::None,
                );
                Context::Fruitful(None)
            }
        }
    }

    /// Run one oracle call under the configured timeout.
    async fn consult<T>(
        &self,
        call: impl Future<Output = Result<T, OracleError>>,
    ) -> Result<T, OracleError> {
        tokio::time::timeout(self.oracle_timeout, call)
            .await
            .unwrap_or(Err(OracleError::Timeout(self.oracle_timeout)))
    }
}

/// The stage an authorized run leaves from.  The override pipeline never
/// enters CONTEXT_CHECK.
fn last_checked_stage(mode: Mode) -> Stage {
    match mode {
        Mode::Standard => Stage::ContextCheck,
        Mode::Admin => Stage::PhysicsFold,
    }
}

fn transition(from: Stage, to: Stage, mode: Mode) {
    match to {
        Stage::Authorized | Stage::Denied => info!(%from, %to, ?mode, "pipeline finished"),
        _ => debug!(%from, %to, ?mode, "pipeline stage"),
    }
}
