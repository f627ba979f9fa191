//! Aggregate views derived from the event sequence.
//!
//! Nothing here is stored. Every view is recomputed from the full sequence
//! on each call, so it always agrees with the log it was computed from.

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::event::{EventType, TestEvent};

/// Counts the events whose kind is a violation.
///
/// Always equal to `summarize(events).total_violations`.
pub fn violation_count(events: &[TestEvent]) -> usize {
    events
        .iter()
        .filter(|e| e.event_type().is_violation())
        .count()
}

/// Per-kind event counts, keyed in order of first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakdown {
    counts: Vec<(EventType, usize)>,
}

impl Breakdown {
    fn increment(&mut self, event_type: EventType) {
        match self.counts.iter_mut().find(|(t, _)| *t == event_type) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((event_type, 1)),
        }
    }

    /// Count for `event_type`, or zero if it never occurred.
    pub fn get(&self, event_type: EventType) -> usize {
        self.counts
            .iter()
            .find(|(t, _)| *t == event_type)
            .map_or(0, |(_, count)| *count)
    }

    /// Iterates `(kind, count)` pairs in first-occurrence order.
    pub fn iter(&self) -> impl Iterator<Item = (EventType, usize)> + '_ {
        self.counts.iter().copied()
    }

    /// Kinds present, in first-occurrence order.
    pub fn keys(&self) -> Vec<EventType> {
        self.counts.iter().map(|(t, _)| *t).collect()
    }

    /// Number of distinct kinds.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns `true` if no events were counted.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl Serialize for Breakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len()))?;
        for (event_type, count) in &self.counts {
            map.serialize_entry(event_type.as_str(), count)?;
        }
        map.end()
    }
}

/// Aggregate statistics over one event sequence.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Number of events
    pub total_events: usize,
    /// Number of violation events
    pub total_violations: usize,
    /// Timestamp of the first event
    pub session_start: Option<DateTime<Utc>>,
    /// Timestamp of the last event
    pub session_end: Option<DateTime<Utc>>,
    /// Counts per kind, first-occurrence order
    pub breakdown_by_type: Breakdown,
}

/// Computes the [`SessionSummary`] for `events` in a single pass.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use proctor_core::audit::{
///     summarize, AttemptId, EventMetadata, EventType, FocusState, TestEvent,
/// };
///
/// let make = |t| TestEvent::new(
///     t,
///     Utc::now(),
///     AttemptId::from("ATT-1"),
///     "Q1",
///     EventMetadata::new("visible", FocusState::Focused),
/// );
/// let events = vec![make(EventType::SessionStart), make(EventType::WindowBlur)];
///
/// let summary = summarize(&events);
/// assert_eq!(summary.total_events, 2);
/// assert_eq!(summary.total_violations, 1);
/// assert_eq!(
///     summary.breakdown_by_type.keys(),
///     vec![EventType::SessionStart, EventType::WindowBlur]
/// );
/// ```
pub fn summarize(events: &[TestEvent]) -> SessionSummary {
    let mut total_violations = 0;
    let mut breakdown = Breakdown::default();

    for event in events {
        if event.event_type().is_violation() {
            total_violations += 1;
        }
        breakdown.increment(event.event_type());
    }

    SessionSummary {
        total_events: events.len(),
        total_violations,
        session_start: events.first().map(TestEvent::timestamp),
        session_end: events.last().map(TestEvent::timestamp),
        breakdown_by_type: breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AttemptId, EventMetadata, FocusState};
    use chrono::Duration;

    fn events_of(types: &[EventType]) -> Vec<TestEvent> {
        let start = Utc::now();
        types
            .iter()
            .enumerate()
            .map(|(i, t)| {
                TestEvent::new(
                    *t,
                    start + Duration::seconds(i as i64),
                    AttemptId::from("ATT-SUM"),
                    "Q1",
                    EventMetadata::new("visible", FocusState::Focused),
                )
            })
            .collect()
    }

    #[test]
    fn empty_sequence_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_events, 0);
        assert_eq!(summary.total_violations, 0);
        assert!(summary.session_start.is_none());
        assert!(summary.session_end.is_none());
        assert!(summary.breakdown_by_type.is_empty());
    }

    #[test]
    fn mixed_sequence_summary() {
        let events = events_of(&[
            EventType::SessionStart,
            EventType::VisibilityHidden,
            EventType::VisibilityVisible,
            EventType::WindowBlur,
        ]);
        let summary = summarize(&events);

        assert_eq!(summary.total_events, 4);
        assert_eq!(summary.total_violations, 2);
        assert_eq!(violation_count(&events), 2);
        assert_eq!(summary.session_start, Some(events[0].timestamp()));
        assert_eq!(summary.session_end, Some(events[3].timestamp()));
        assert_eq!(
            summary.breakdown_by_type.iter().collect::<Vec<_>>(),
            vec![
                (EventType::SessionStart, 1),
                (EventType::VisibilityHidden, 1),
                (EventType::VisibilityVisible, 1),
                (EventType::WindowBlur, 1),
            ]
        );
    }

    #[test]
    fn breakdown_keeps_first_occurrence_order() {
        let events = events_of(&[
            EventType::WindowBlur,
            EventType::CopyAttempt,
            EventType::WindowBlur,
            EventType::SessionStart,
            EventType::CopyAttempt,
            EventType::WindowBlur,
        ]);
        let breakdown = summarize(&events).breakdown_by_type;

        assert_eq!(
            breakdown.keys(),
            vec![
                EventType::WindowBlur,
                EventType::CopyAttempt,
                EventType::SessionStart
            ]
        );
        assert_eq!(breakdown.get(EventType::WindowBlur), 3);
        assert_eq!(breakdown.get(EventType::CopyAttempt), 2);
        assert_eq!(breakdown.get(EventType::PasteAttempt), 0);
    }

    #[test]
    fn breakdown_serializes_in_order() {
        let events = events_of(&[
            EventType::WindowFocus,
            EventType::SessionStart,
            EventType::WindowFocus,
        ]);
        let json = serde_json::to_string(&summarize(&events).breakdown_by_type).unwrap();
        assert_eq!(json, r#"{"window_focus":2,"session_start":1}"#);
    }

    #[test]
    fn summary_serializes_camel_case() {
        let summary = summarize(&events_of(&[EventType::SessionStart]));
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["totalEvents"], 1);
        assert_eq!(value["totalViolations"], 0);
        assert!(value["sessionStart"].is_string());
        assert_eq!(value["breakdownByType"]["session_start"], 1);
    }
}
