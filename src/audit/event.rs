//! Event schema and the closed set of event kinds.
//!
//! Every integrity signal observed during an attempt is normalized into a
//! [`TestEvent`]. Whether an [`EventType`] counts as a violation is decided
//! here and nowhere else.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::attempt::{base36, AttemptId};

/// Kind of integrity event being recorded.
///
/// The set is closed. Adding a variant forces a decision in
/// [`EventType::classification`], which has no wildcard arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The user switched to another tab
    TabSwitch,
    /// The user came back from another tab
    TabReturn,
    /// The window lost input focus
    WindowBlur,
    /// The window regained input focus
    WindowFocus,
    /// A copy to the clipboard was attempted
    CopyAttempt,
    /// A paste from the clipboard was attempted
    PasteAttempt,
    /// The page became hidden
    VisibilityHidden,
    /// The page became visible again
    VisibilityVisible,
    /// The monitored session began
    SessionStart,
    /// The monitored session was submitted
    SessionEnd,
}

/// Event kinds that count as integrity violations.
pub const VIOLATION_EVENTS: [EventType; 5] = [
    EventType::TabSwitch,
    EventType::WindowBlur,
    EventType::CopyAttempt,
    EventType::PasteAttempt,
    EventType::VisibilityHidden,
];

/// Returns `true` if `event_type` is in [`VIOLATION_EVENTS`].
pub fn is_violation(event_type: EventType) -> bool {
    event_type.classification() == Classification::Violation
}

/// How an event bears on session integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// A breach of the test rules
    Violation,
    /// A monitored condition returned to a compliant state
    Restored,
    /// Session lifecycle bookkeeping
    Neutral,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Violation => write!(f, "violation"),
            Classification::Restored => write!(f, "restored"),
            Classification::Neutral => write!(f, "neutral"),
        }
    }
}

impl EventType {
    /// Every event kind, in declaration order.
    pub const ALL: [EventType; 10] = [
        EventType::TabSwitch,
        EventType::TabReturn,
        EventType::WindowBlur,
        EventType::WindowFocus,
        EventType::CopyAttempt,
        EventType::PasteAttempt,
        EventType::VisibilityHidden,
        EventType::VisibilityVisible,
        EventType::SessionStart,
        EventType::SessionEnd,
    ];

    /// Classifies this event kind.
    pub fn classification(self) -> Classification {
        match self {
            EventType::TabSwitch
            | EventType::WindowBlur
            | EventType::CopyAttempt
            | EventType::PasteAttempt
            | EventType::VisibilityHidden => Classification::Violation,
            EventType::TabReturn | EventType::WindowFocus | EventType::VisibilityVisible => {
                Classification::Restored
            }
            EventType::SessionStart | EventType::SessionEnd => Classification::Neutral,
        }
    }

    /// Returns `true` for violation kinds.
    pub fn is_violation(self) -> bool {
        is_violation(self)
    }

    /// Wire name, as it appears in persisted logs.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::TabSwitch => "tab_switch",
            EventType::TabReturn => "tab_return",
            EventType::WindowBlur => "window_blur",
            EventType::WindowFocus => "window_focus",
            EventType::CopyAttempt => "copy_attempt",
            EventType::PasteAttempt => "paste_attempt",
            EventType::VisibilityHidden => "visibility_hidden",
            EventType::VisibilityVisible => "visibility_visible",
            EventType::SessionStart => "session_start",
            EventType::SessionEnd => "session_end",
        }
    }

    /// Short message shown to the user when this event fires.
    ///
    /// Kinds without a dedicated message fall back to the wire name.
    pub fn label(self) -> &'static str {
        match self {
            EventType::TabSwitch | EventType::VisibilityHidden => "Tab switch detected!",
            EventType::VisibilityVisible => "Focus restored",
            EventType::WindowBlur => "Window focus lost!",
            EventType::WindowFocus => "Window focus restored",
            EventType::CopyAttempt => "Copy attempt blocked!",
            EventType::PasteAttempt => "Paste attempt blocked!",
            other => other.as_str(),
        }
    }

    /// Title-cased name for listings, e.g. `"Visibility Hidden"`.
    pub fn display_name(self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identifier of one event.
///
/// Combines the capture instant in milliseconds with seven random base36
/// characters, so ids sort roughly by time and collide with negligible
/// probability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    const RANDOM_LEN: usize = 7;

    /// Generates a fresh id for an event captured at `at`.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();
        let mut suffix = String::with_capacity(Self::RANDOM_LEN);
        for _ in 0..Self::RANDOM_LEN {
            suffix.push_str(&base36(rng.gen_range(0..36)));
        }
        Self(format!("{}-{}", at.timestamp_millis(), suffix))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the monitored window holds input focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusState {
    /// Window has focus
    Focused,
    /// Window lost focus
    Blurred,
}

impl FocusState {
    /// Maps a focus boolean onto the state.
    pub fn from_focused(focused: bool) -> Self {
        if focused {
            FocusState::Focused
        } else {
            FocusState::Blurred
        }
    }
}

impl fmt::Display for FocusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FocusState::Focused => write!(f, "focused"),
            FocusState::Blurred => write!(f, "blurred"),
        }
    }
}

/// Context captured alongside every event.
///
/// `browser_state` and `focus_state` are always present. Event-specific
/// extras (for example the submitted answer) are flattened into the same
/// object when serialized. Extras never shadow `browserState`, `focusState`
/// or `userAgent`: those keys are written to the typed fields instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    /// Page visibility at capture time (`"visible"`, `"hidden"`, ...)
    pub browser_state: String,
    /// Window focus at capture time
    pub focus_state: FocusState,
    /// Client user agent, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl EventMetadata {
    /// Creates metadata with the two mandatory fields.
    pub fn new(browser_state: impl Into<String>, focus_state: FocusState) -> Self {
        Self {
            browser_state: browser_state.into(),
            focus_state,
            user_agent: None,
            extra: Map::new(),
        }
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Adds one extra entry, replacing any previous value under `key`.
    ///
    /// `browserState`, `focusState` and `userAgent` override the typed
    /// fields. A `focusState` that is neither `"focused"` nor `"blurred"` is
    /// dropped.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_extra(key.into(), value.into());
        self
    }

    /// Merges caller-supplied extras; later entries win.
    pub fn merge_extra(mut self, extra: Map<String, Value>) -> Self {
        for (key, value) in extra {
            self.insert_extra(key, value);
        }
        self
    }

    /// Event-specific extras.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    fn insert_extra(&mut self, key: String, value: Value) {
        match key.as_str() {
            "browserState" => self.browser_state = scalar_string(value),
            "focusState" => {
                if let Ok(state) = serde_json::from_value(value) {
                    self.focus_state = state;
                }
            }
            "userAgent" => {
                self.user_agent = match value {
                    Value::Null => None,
                    other => Some(scalar_string(other)),
                }
            }
            _ => {
                self.extra.insert(key, value);
            }
        }
    }
}

fn scalar_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// One immutable record per observed occurrence.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use proctor_core::audit::{AttemptId, EventMetadata, EventType, FocusState, TestEvent};
///
/// let event = TestEvent::new(
///     EventType::CopyAttempt,
///     Utc::now(),
///     AttemptId::from("ATT-1"),
///     "Q1",
///     EventMetadata::new("visible", FocusState::Focused),
/// );
///
/// assert!(event.event_type().is_violation());
/// assert_eq!(event.question_id(), "Q1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEvent {
    id: EventId,
    event_type: EventType,
    timestamp: DateTime<Utc>,
    attempt_id: AttemptId,
    question_id: String,
    metadata: EventMetadata,
}

impl TestEvent {
    /// Creates an event with a freshly generated id.
    pub fn new(
        event_type: EventType,
        timestamp: DateTime<Utc>,
        attempt_id: AttemptId,
        question_id: impl Into<String>,
        metadata: EventMetadata,
    ) -> Self {
        Self {
            id: EventId::generate(timestamp),
            event_type,
            timestamp,
            attempt_id,
            question_id: question_id.into(),
            metadata,
        }
    }

    /// Returns the event id.
    pub fn id(&self) -> &EventId {
        &self.id
    }

    /// Returns the event kind.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Returns the capture instant.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the owning attempt.
    pub fn attempt_id(&self) -> &AttemptId {
        &self.attempt_id
    }

    /// Returns the activity unit that was active at capture time.
    pub fn question_id(&self) -> &str {
        &self.question_id
    }

    /// Returns the captured context.
    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

impl fmt::Display for TestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TestEvent[type={}, at={}, attempt={}, question={}, focus={}, visibility={}]",
            self.event_type,
            self.timestamp.to_rfc3339(),
            self.attempt_id,
            self.question_id,
            self.metadata.focus_state,
            self.metadata.browser_state,
        )
    }
}
