//! `machguard-runtime` – request orchestration for MachGuard.
//!
//! Wires the kernel's deterministic checks and an optional reasoning oracle
//! into the validation state machine, and commits authorized results to the
//! live telemetry.
//!
//! # Modules
//!
//! - [`pipeline`] – [`SafetyPipeline`]: the
//!   `INIT → SEMANTIC_SCAN → PHYSICS_FOLD → CONTEXT_CHECK` state machine that
//!   turns raw operator text into a [`Verdict`][machguard_types::Verdict].
//!   Runs in [`Mode::Standard`] or the [`Mode::Admin`] override.
//! - [`oracle`] – the [`ReasoningOracle`] trait plus
//!   [`HazardRuleOracle`], a deterministic implementation that rejects
//!   actions which make no sense under the active hazard.
//! - [`llm_oracle`] – [`LlmOracle`]: an OpenAI-compatible chat client
//!   (Ollama, vLLM, hosted APIs).  Opinion schemas are injected via
//!   `response_format`.
//! - [`gatekeeper`] – [`Gatekeeper`]: snapshot, validate, publish with
//!   compare-and-swap, audit.
//! - [`telemetry`] – [`init_tracing`]: global `tracing` subscriber with an
//!   optional OTLP span exporter.
//!
//! # Failure policy
//!
//! Oracle calls are bounded by
//! [`PipelineConfig::oracle_timeout`].  Errors and timeouts are logged at
//! `WARNING` and the request continues as if the oracle had agreed.

pub mod gatekeeper;
pub mod llm_oracle;
pub mod oracle;
pub mod pipeline;
pub mod telemetry;

pub use gatekeeper::{Gatekeeper, Reaction};
pub use llm_oracle::LlmOracle;
pub use oracle::{
    ContextOpinion, ContextQuery, HazardRuleOracle, OracleError, ReasoningOracle, SecurityOpinion,
    SecurityQuery, Voice,
};
pub use pipeline::{Mode, PipelineConfig, SafetyPipeline, Stage, DEFAULT_ORACLE_TIMEOUT};
pub use telemetry::{init_tracing, LogFormat, TracerProviderGuard};
