//! `machguard-kernel` – deterministic safety core
//!
//! Everything in this crate is synchronous and free of I/O: given the same
//! text and the same telemetry it always reaches the same conclusion.  The
//! async orchestration around it lives in `machguard-runtime`.
//!
//! # Modules
//!
//! - [`registry`] – [`ParameterRegistry`][registry::ParameterRegistry]:
//!   natural-language aliases for every telemetry field, with units, axis
//!   routing and the physically coupled set.
//! - [`vocabulary`] – the verb synonyms shared by both intent parsers.
//! - [`intent_parser`] – [`IntentParser`][intent_parser::IntentParser]:
//!   strict four-token grammar plus a keyword normalizer for free-form text.
//! - [`predictor`] – [`ConsequencePredictor`][predictor::ConsequencePredictor]:
//!   interpolates correlated temperature, vibration, torque and power from an
//!   anchor table and scores the physical risk.
//! - [`semantic`] – [`SemanticScorer`][semantic::SemanticScorer]: word
//!   vectors and cosine similarity against jailbreak and honeypot phrases.
//! - [`state_verifier`] – [`StateVerifier`][state_verifier::StateVerifier]:
//!   ceiling rules evaluated on every folded state.
//! - [`telemetry_store`] – [`TelemetryStore`][telemetry_store::TelemetryStore]:
//!   the versioned live record with compare-and-publish.
//! - [`import`] – batch key/value telemetry import.

pub mod import;
pub mod intent_parser;
pub mod predictor;
pub mod registry;
pub mod semantic;
pub mod state_verifier;
pub mod telemetry_store;
pub mod vocabulary;

pub use import::{parse_batch, TelemetryPatch};
pub use intent_parser::{IntentParser, ParsedRequest, Rewrite};
pub use predictor::{ConsequencePredictor, CorrelationPoint, PhysicalQuantity, Prediction, PredictionStatus};
pub use registry::{Axis, ParameterRegistry, ParameterSpec};
pub use semantic::{SemanticScan, SemanticScorer, ThreatCategory, ThreatMatch};
pub use state_verifier::{LimitBreach, Rule, StateVerifier};
pub use telemetry_store::{Snapshot, TelemetryStore};
