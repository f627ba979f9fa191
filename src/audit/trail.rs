//! Durable, append-only event log.
//!
//! The [`LogStore`] keeps the event sequence for one storage partition and
//! rewrites the whole sequence on every append. Storage failures never
//! escape this module: reads degrade to an empty log and writes are skipped,
//! leaving the in-memory sequence authoritative for the current process.
//! Durability is therefore best-effort under storage pressure.

use std::rc::Rc;

use super::attempt::AttemptId;
use super::event::TestEvent;
use super::export::{export_snapshot, ExportArtifact};
use super::summary::{summarize, violation_count, SessionSummary};
use crate::clock::{Clock, SystemClock};
use crate::storage::Storage;

/// Storage keys used inside a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    /// Key holding the serialized event sequence
    pub events: String,
    /// Key holding the attempt identifier
    pub attempt: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            events: "secure_test_event_log".to_string(),
            attempt: "secure_test_attempt_id".to_string(),
        }
    }
}

/// Append-only event log bound to one storage partition.
///
/// # Example
///
/// ```
/// use proctor_core::MemoryStorage;
/// use proctor_core::audit::{EventMetadata, EventType, FocusState, LogStore, TestEvent};
/// use chrono::Utc;
///
/// let mut store = LogStore::open(MemoryStorage::new());
/// let attempt = store.attempt_id();
///
/// store.append(TestEvent::new(
///     EventType::SessionStart,
///     Utc::now(),
///     attempt,
///     "Q1",
///     EventMetadata::new("visible", FocusState::Focused),
/// ));
///
/// assert_eq!(store.events().len(), 1);
/// assert_eq!(store.load().len(), 1);
/// ```
pub struct LogStore<S: Storage> {
    storage: S,
    keys: StorageKeys,
    clock: Rc<dyn Clock>,
    events: Vec<TestEvent>,
    attempt_id: Option<AttemptId>,
}

impl<S: Storage> LogStore<S> {
    /// Opens the log in `storage` under the default keys and loads any
    /// previously persisted sequence.
    pub fn open(storage: S) -> Self {
        Self::open_with(storage, StorageKeys::default(), Rc::new(SystemClock))
    }

    /// Opens the log with explicit keys and clock.
    pub fn open_with(storage: S, keys: StorageKeys, clock: Rc<dyn Clock>) -> Self {
        let mut store = Self {
            storage,
            keys,
            clock,
            events: Vec::new(),
            attempt_id: None,
        };
        store.events = store.load();
        store
    }

    /// Reads the persisted sequence.
    ///
    /// Returns an empty sequence when nothing is stored, when storage cannot
    /// be read, or when the stored value does not parse.
    pub fn load(&self) -> Vec<TestEvent> {
        let raw = match self.storage.get(&self.keys.events) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(
                    target: "proctor_audit",
                    error = %e,
                    "event log unreadable, starting empty"
                );
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(
                    target: "proctor_audit",
                    error = %e,
                    "persisted event log is malformed, starting empty"
                );
                Vec::new()
            }
        }
    }

    /// Re-reads the persisted sequence into memory and returns it.
    pub fn reload(&mut self) -> &[TestEvent] {
        self.events = self.load();
        &self.events
    }

    /// Appends `event` and persists the full sequence before returning it.
    ///
    /// A failed write is logged and skipped; the returned sequence always
    /// includes `event`.
    pub fn append(&mut self, event: TestEvent) -> &[TestEvent] {
        self.events.push(event);
        self.persist();
        &self.events
    }

    fn persist(&self) {
        let serialized = match serde_json::to_string(&self.events) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    target: "proctor_audit",
                    error = %e,
                    "event log could not be serialized, write skipped"
                );
                return;
            }
        };
        if let Err(e) = self.storage.set(&self.keys.events, &serialized) {
            tracing::warn!(
                target: "proctor_audit",
                error = %e,
                kind = %e.kind(),
                events = self.events.len(),
                "event log write skipped"
            );
        }
    }

    /// Returns the in-memory sequence.
    pub fn events(&self) -> &[TestEvent] {
        &self.events
    }

    /// Returns the current attempt identifier, minting and persisting one on
    /// first access.
    pub fn attempt_id(&mut self) -> AttemptId {
        if let Some(id) = &self.attempt_id {
            return id.clone();
        }

        let id = match self.read_attempt_id() {
            Some(id) => id,
            None => {
                let id = AttemptId::mint(self.clock.now());
                if let Err(e) = self.storage.set(&self.keys.attempt, id.as_str()) {
                    tracing::warn!(
                        target: "proctor_audit",
                        error = %e,
                        attempt_id = %id,
                        "attempt id not persisted"
                    );
                }
                tracing::info!(target: "proctor_audit", attempt_id = %id, "minted attempt id");
                id
            }
        };

        self.attempt_id = Some(id.clone());
        id
    }

    /// Returns the attempt identifier if one exists, without minting one.
    pub fn stored_attempt_id(&self) -> Option<AttemptId> {
        self.attempt_id.clone().or_else(|| self.read_attempt_id())
    }

    fn read_attempt_id(&self) -> Option<AttemptId> {
        match self.storage.get(&self.keys.attempt) {
            Ok(stored) => stored.filter(|s| !s.is_empty()).map(AttemptId::from),
            Err(e) => {
                tracing::warn!(target: "proctor_audit", error = %e, "attempt id unreadable");
                None
            }
        }
    }

    /// Number of violation events in the log.
    pub fn violation_count(&self) -> usize {
        violation_count(&self.events)
    }

    /// Summary of the log.
    pub fn summary(&self) -> SessionSummary {
        summarize(&self.events)
    }

    /// Serializes the log into a file named after the current attempt.
    pub fn export_snapshot(&mut self) -> Result<ExportArtifact, serde_json::Error> {
        let attempt_id = self.attempt_id();
        export_snapshot(&self.events, &attempt_id)
    }

    /// Clears the event sequence and the attempt identifier, both in memory
    /// and in storage. The next [`attempt_id`](Self::attempt_id) call mints a
    /// new identifier.
    pub fn reset(&mut self) {
        for key in [&self.keys.events, &self.keys.attempt] {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!(
                    target: "proctor_audit",
                    error = %e,
                    key = %key,
                    "could not clear storage key"
                );
            }
        }
        self.events.clear();
        self.attempt_id = None;
        tracing::info!(target: "proctor_audit", "event log cleared");
    }

    /// Returns the underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }
}
