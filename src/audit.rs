//! Integrity event model and the append-only audit log.
//!
//! This module provides:
//! - `EventType` / `TestEvent`: the canonical event shape and the closed set
//!   of event kinds, including which kinds are violations
//! - `AttemptId`: per-session identifier minted on first access
//! - `LogStore`: durable, ordered, append-only event sequence
//! - `summarize` / `violation_count`: aggregate views recomputed from the log
//! - `ExportArtifact`: pretty-printed, re-parseable snapshot for download

mod attempt;
mod event;
mod export;
mod summary;
mod trail;

pub use attempt::AttemptId;
pub use event::{
    is_violation, Classification, EventId, EventMetadata, EventType, FocusState, TestEvent,
    VIOLATION_EVENTS,
};
pub use export::{export_file_name, export_snapshot, ExportArtifact};
pub use summary::{summarize, violation_count, Breakdown, SessionSummary};
pub use trail::{LogStore, StorageKeys};
