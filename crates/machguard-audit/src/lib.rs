//! `machguard-audit` – the decision ledger.
//!
//! Every request that passes through the gatekeeper leaves exactly one
//! [`TransactionRecord`][record::TransactionRecord]: what was asked, what it
//! was normalized into, how similar it looked to known attacks, the
//! telemetry it was judged against and the verdict.
//!
//! # Modules
//!
//! - [`record`] – [`TransactionRecord`][record::TransactionRecord] and its
//!   construction from a [`Verdict`][machguard_types::Verdict].
//! - [`ledger`] – the [`AuditSink`][ledger::AuditSink] trait with a SQLite
//!   implementation ([`SqliteAuditLog`][ledger::SqliteAuditLog]) and an
//!   in-process one ([`MemoryAuditLog`][ledger::MemoryAuditLog]).

pub mod ledger;
pub mod record;

pub use ledger::{AuditError, AuditSink, MemoryAuditLog, SqliteAuditLog, DEFAULT_MEMORY_CAPACITY};
pub use record::TransactionRecord;
