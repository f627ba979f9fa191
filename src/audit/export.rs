//! Downloadable snapshot of an event sequence.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::attempt::AttemptId;
use super::event::TestEvent;

/// A serialized, human-readable copy of the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    file_name: String,
    bytes: Vec<u8>,
}

impl ExportArtifact {
    /// MIME type of the payload.
    pub const CONTENT_TYPE: &'static str = "application/json";

    /// File name, `event-log-<attemptId>.json`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Pretty-printed JSON payload.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the artifact and returns the payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Writes the artifact into `dir` under its file name.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> io::Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// File name used for the export of `attempt_id`.
pub fn export_file_name(attempt_id: &AttemptId) -> String {
    format!("event-log-{attempt_id}.json")
}

/// Serializes `events` into an [`ExportArtifact`] named after `attempt_id`.
///
/// The payload parses back into the same sequence.
pub fn export_snapshot(
    events: &[TestEvent],
    attempt_id: &AttemptId,
) -> Result<ExportArtifact, serde_json::Error> {
    Ok(ExportArtifact {
        file_name: export_file_name(attempt_id),
        bytes: serde_json::to_vec_pretty(events)?,
    })
}
