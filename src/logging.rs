use std::fmt;

use crate::audit::{Classification, TestEvent};

/// Attempt-scoped logging interface.
///
/// Every line carries the attempt id as a structured field so log output can
/// be correlated with an exported event log.
#[derive(Debug)]
pub struct AttemptLog<'a> {
    attempt_id: &'a str,
}

impl<'a> AttemptLog<'a> {
    /// Creates a logger tagged with `attempt_id`.
    pub fn new(attempt_id: &'a str) -> Self {
        Self { attempt_id }
    }

    /// Returns the attempt ID associated with this logger.
    pub fn attempt_id(&self) -> &str {
        self.attempt_id
    }

    /// Logs an info-level message.
    pub fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(attempt_id = %self.attempt_id, "{}", args);
    }

    /// Logs a warning-level message.
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(attempt_id = %self.attempt_id, "{}", args);
    }

    /// Logs a debug-level message.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(attempt_id = %self.attempt_id, "{}", args);
    }

    /// Emits a recorded event as a structured audit record.
    ///
    /// Violations are logged at `warn`, everything else at `info`.
    pub fn event(&self, event: &TestEvent) {
        let meta = event.metadata();
        match event.event_type().classification() {
            Classification::Violation => tracing::warn!(
                target: "proctor_audit",
                attempt_id = %self.attempt_id,
                event_id = %event.id(),
                event_type = %event.event_type(),
                question_id = %event.question_id(),
                browser_state = %meta.browser_state,
                focus_state = %meta.focus_state,
                "violation recorded"
            ),
            classification => tracing::info!(
                target: "proctor_audit",
                attempt_id = %self.attempt_id,
                event_id = %event.id(),
                event_type = %event.event_type(),
                question_id = %event.question_id(),
                browser_state = %meta.browser_state,
                focus_state = %meta.focus_state,
                %classification,
                "event recorded"
            ),
        }
    }
}
