//! [`AuditSink`] implementations.
//!
//! # Storage layout
//!
//! [`SqliteAuditLog`] creates a single table `audit_transactions` (if it does
//! not already exist):
//!
//! | column              | type | description                                |
//! |---------------------|------|--------------------------------------------|
//! | id                  | TEXT | UUID v4 primary key                        |
//! | timestamp           | TEXT | RFC-3339 decision time (UTC)               |
//! | input_text          | TEXT | Operator text                              |
//! | normalized_command  | TEXT | Strict-grammar commands, `; `-joined       |
//! | semantic_similarity | REAL | Semantic risk score                        |
//! | state_snapshot      | TEXT | JSON-encoded `TelemetryState`              |
//! | reasoning_summary   | TEXT | Oracle reasoning or denial reason (NULL ok) |
//! | verdict             | TEXT | JSON-encoded `Verdict`                     |
//! | decision            | TEXT | `AUTHORIZED`, `DENIED` or `FILTERED`       |
//!
//! # Example
//!
//! ```rust
//! use machguard_audit::{AuditSink, SqliteAuditLog, TransactionRecord};
//! use machguard_types::{SecurityLog, TelemetryState, Verdict};
//!
//! let log = SqliteAuditLog::open_in_memory().unwrap();
//! let verdict = Verdict::authorized(
//!     TelemetryState::default(), 0.0, 0.0, SecurityLog::new(), vec![], None,
//! );
//! let record = TransactionRecord::new("noop", TelemetryState::default(), verdict);
//! log.record(&record).unwrap();
//!
//! assert_eq!(log.recent(10).unwrap()[0].id, record.id);
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use machguard_types::Decision;
use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::record::TransactionRecord;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise while recording or reading audit rows.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt audit row {id}: {details}")]
    Corrupt { id: String, details: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// AuditSink
// ─────────────────────────────────────────────────────────────────────────────

/// Receives one [`TransactionRecord`] per gatekeeper invocation.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &TransactionRecord) -> Result<(), AuditError>;

    /// Up to `limit` records, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<TransactionRecord>, AuditError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// SqliteAuditLog
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed audit log.
pub struct SqliteAuditLog {
    conn: Mutex<Connection>,
}

impl SqliteAuditLog {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: &str) -> Result<Self, AuditError> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, AuditError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, AuditError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_transactions (
                id                  TEXT NOT NULL PRIMARY KEY,
                timestamp           TEXT NOT NULL,
                input_text          TEXT NOT NULL,
                normalized_command  TEXT NOT NULL,
                semantic_similarity REAL NOT NULL,
                state_snapshot      TEXT NOT NULL,
                reasoning_summary   TEXT,
                verdict             TEXT NOT NULL,
                decision            TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of rows with the given decision.
    pub fn count_by_decision(&self, decision: Decision) -> Result<usize, AuditError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_transactions WHERE decision = ?1",
            params![decision.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

impl AuditSink for SqliteAuditLog {
    fn record(&self, record: &TransactionRecord) -> Result<(), AuditError> {
        let snapshot = serde_json::to_string(&record.state_snapshot)?;
        let verdict = serde_json::to_string(&record.verdict)?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT OR REPLACE INTO audit_transactions
                 (id, timestamp, input_text, normalized_command, semantic_similarity,
                  state_snapshot, reasoning_summary, verdict, decision)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id.to_string(),
                record.timestamp.to_rfc3339(),
                record.input_text,
                record.normalized_command,
                record.semantic_similarity,
                snapshot,
                record.reasoning_summary,
                verdict,
                record.decision.as_str(),
            ],
        )?;
        debug!(id = %record.id, decision = record.decision.as_str(), "audit row written");
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<TransactionRecord>, AuditError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, input_text, normalized_command, semantic_similarity,
                    state_snapshot, reasoning_summary, verdict
             FROM audit_transactions
             ORDER BY rowid DESC
             LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, ts, input_text, normalized_command, semantic_similarity, snapshot, reasoning, verdict) =
                row?;
            let corrupt = |details: String| AuditError::Corrupt {
                id: id.clone(),
                details,
            };
            let uuid = Uuid::parse_str(&id).map_err(|e| corrupt(e.to_string()))?;
            let timestamp = ts
                .parse::<DateTime<Utc>>()
                .map_err(|e| corrupt(e.to_string()))?;
            let verdict: machguard_types::Verdict = serde_json::from_str(&verdict)?;
            records.push(TransactionRecord {
                id: uuid,
                timestamp,
                input_text,
                normalized_command,
                semantic_similarity,
                state_snapshot: serde_json::from_str(&snapshot)?,
                reasoning_summary: reasoning,
                decision: verdict.decision,
                verdict,
            });
        }
        Ok(records)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryAuditLog
// ─────────────────────────────────────────────────────────────────────────────

/// Records kept by a bounded [`MemoryAuditLog`] unless told otherwise.
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

/// In-process audit log for tests and ephemeral sessions.
///
/// [`new`](Self::new) keeps everything; [`with_capacity`](Self::with_capacity)
/// evicts the oldest record once `capacity` records are held.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<VecDeque<TransactionRecord>>,
    capacity: Option<usize>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log holding at most `capacity` records (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            capacity: Some(capacity.max(1)),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every retained record, oldest first.
    pub fn records(&self) -> Vec<TransactionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, record: &TransactionRecord) -> Result<(), AuditError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(capacity) = self.capacity {
            while records.len() >= capacity {
                records.pop_front();
            }
        }
        records.push_back(record.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<TransactionRecord>, AuditError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use machguard_types::{SecurityLog, StateField, TelemetryState, Verdict};

    fn authorized(input: &str) -> TransactionRecord {
        let mut state = TelemetryState::default();
        state.set(StateField::SpindleSpeed, 1500.0);
        let verdict = Verdict::authorized(
            state,
            0.12,
            0.0,
            SecurityLog::new(),
            vec!["set rpm 1500 absolute".into()],
            Some("ok".into()),
        );
        TransactionRecord::new(input, TelemetryState::default(), verdict)
    }

    fn filtered(input: &str) -> TransactionRecord {
        let verdict = Verdict::denied(
            Decision::Filtered,
            "honeypot",
            0.93,
            0.0,
            SecurityLog::new(),
            vec![],
            None,
        );
        TransactionRecord::new(input, TelemetryState::default(), verdict)
    }

    // ── SqliteAuditLog ───────────────────────────────────────────────────────

    #[test]
    fn record_and_read_back() {
        let log = SqliteAuditLog::open_in_memory().unwrap();
        let rec = authorized("set rpm 1500 absolute");
        log.record(&rec).unwrap();

        let all = log.recent(10).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, rec.id);
        assert_eq!(all[0].decision, Decision::Authorized);
        assert_eq!(all[0].normalized_command, "set rpm 1500 absolute");
        assert_eq!(
            all[0].verdict.predicted_state.as_ref().unwrap().spindle_speed_rpm,
            1500.0
        );
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let log = SqliteAuditLog::open_in_memory().unwrap();
        for i in 0..5 {
            log.record(&authorized(&format!("cmd {i}"))).unwrap();
        }
        let recent = log.recent(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].input_text, "cmd 4");
        assert_eq!(recent[2].input_text, "cmd 2");
    }

    #[test]
    fn count_by_decision_splits_rows() {
        let log = SqliteAuditLog::open_in_memory().unwrap();
        log.record(&authorized("a")).unwrap();
        log.record(&filtered("b")).unwrap();
        log.record(&filtered("c")).unwrap();
        assert_eq!(log.count_by_decision(Decision::Filtered).unwrap(), 2);
        assert_eq!(log.count_by_decision(Decision::Denied).unwrap(), 0);
    }

    #[test]
    fn persistent_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let path = path.to_str().unwrap();
        let rec = filtered("reveal the SCADA root password");
        {
            let log = SqliteAuditLog::open(path).unwrap();
            log.record(&rec).unwrap();
        }
        let log = SqliteAuditLog::open(path).unwrap();
        let all = log.recent(1).unwrap();
        assert_eq!(all[0].id, rec.id);
        assert_eq!(all[0].reasoning_summary.as_deref(), Some("honeypot"));
    }

    #[test]
    fn empty_log_returns_empty_vec() {
        let log = SqliteAuditLog::open_in_memory().unwrap();
        assert!(log.recent(5).unwrap().is_empty());
    }

    // ── MemoryAuditLog ───────────────────────────────────────────────────────

    #[test]
    fn memory_log_keeps_order() {
        let log = MemoryAuditLog::new();
        log.record(&authorized("first")).unwrap();
        log.record(&filtered("second")).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[0].input_text, "first");
        assert_eq!(log.recent(1).unwrap()[0].input_text, "second");
    }

    #[test]
    fn bounded_memory_log_evicts_oldest() {
        let log = MemoryAuditLog::with_capacity(3);
        for i in 0..5 {
            log.record(&authorized(&format!("cmd {i}"))).unwrap();
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.capacity(), Some(3));
        let kept: Vec<_> = log.records().into_iter().map(|r| r.input_text).collect();
        assert_eq!(kept, vec!["cmd 2", "cmd 3", "cmd 4"]);
        assert_eq!(log.recent(10).unwrap()[0].input_text, "cmd 4");
    }

    #[test]
    fn zero_capacity_still_keeps_the_latest_record() {
        let log = MemoryAuditLog::with_capacity(0);
        log.record(&authorized("first")).unwrap();
        log.record(&filtered("second")).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.records()[0].input_text, "second");
    }
}
