//! [`TelemetryStore`] – the single live telemetry record.
//!
//! Readers take a [`Snapshot`] (an `Arc` plus a version number) and work on
//! their own copy.  Writers never mutate the live record in place: they
//! build a complete replacement and publish it with
//! [`TelemetryStore::compare_and_publish`], which only succeeds when nobody
//! else published since the snapshot was taken.

use std::sync::{Arc, PoisonError, RwLock};

use machguard_types::{GuardError, TelemetryState};
use tracing::debug;

use crate::import::TelemetryPatch;

/// A consistent read of the live state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    pub state: Arc<TelemetryState>,
}

#[derive(Debug)]
struct Live {
    version: u64,
    state: Arc<TelemetryState>,
}

/// Thread-safe owner of the live [`TelemetryState`].
///
/// # Example
///
/// ```
/// use machguard_kernel::telemetry_store::TelemetryStore;
/// use machguard_types::{StateField, TelemetryState};
///
/// let store = TelemetryStore::default();
/// let snap = store.snapshot();
///
/// let mut next = (*snap.state).clone();
/// next.set(StateField::SpindleSpeed, 1200.0);
/// store.compare_and_publish(snap.version, next.clone()).unwrap();
///
/// // A second writer holding the old version loses.
/// assert!(store.compare_and_publish(snap.version, next).is_err());
/// ```
#[derive(Debug)]
pub struct TelemetryStore {
    live: RwLock<Live>,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new(TelemetryState::default())
    }
}

impl TelemetryStore {
    pub fn new(initial: TelemetryState) -> Self {
        Self {
            live: RwLock::new(Live {
                version: 0,
                state: Arc::new(initial),
            }),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let live = self.live.read().unwrap_or_else(PoisonError::into_inner);
        Snapshot {
            version: live.version,
            state: Arc::clone(&live.state),
        }
    }

    /// The live state, without its version.
    pub fn current(&self) -> Arc<TelemetryState> {
        self.snapshot().state
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Replace the live record with `next` if the live version still equals
    /// `expected`.  Returns the new version.
    pub fn compare_and_publish(&self, expected: u64, next: TelemetryState) -> Result<u64, GuardError> {
        let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
        if live.version != expected {
            return Err(GuardError::StaleSnapshot {
                expected,
                actual: live.version,
            });
        }
        live.version += 1;
        live.state = Arc::new(next);
        debug!(version = live.version, "telemetry published");
        Ok(live.version)
    }

    /// Unconditionally replace the live record.
    pub fn replace(&self, next: TelemetryState) -> u64 {
        let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
        live.version += 1;
        live.state = Arc::new(next);
        debug!(version = live.version, "telemetry replaced");
        live.version
    }

    /// Apply a batch-import patch as one whole-record replacement.
    pub fn merge(&self, patch: &TelemetryPatch) -> u64 {
        let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = (*live.state).clone();
        patch.apply_to(&mut next);
        live.version += 1;
        live.state = Arc::new(next);
        debug!(version = live.version, fields = patch.len(), "telemetry merged");
        live.version
    }
}
