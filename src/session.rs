//! Session controller: wires sensor output into the log store.
//!
//! A [`SessionController`] owns the attempt identifier and the
//! [`LogStore`], turns each observed event kind into a [`TestEvent`] with
//! live context attached, and keeps a short-lived [`Warning`] plus cached
//! focus and visibility flags for the status display.
//!
//! [`Session`] bundles a controller with a [`Sensor`] bound to the same
//! environment.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde_json::{Map, Value};

use crate::audit::{
    AttemptId, Classification, EventMetadata, EventType, ExportArtifact, FocusState, LogStore,
    SessionSummary, TestEvent,
};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::logging::AttemptLog;
use crate::sensor::{Environment, Sensor, VisibilityState};
use crate::storage::Storage;

/// Transient notice for the UI about the latest violation or restoration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Event that raised the warning
    pub event_type: EventType,
    /// Human-readable message
    pub message: &'static str,
    /// [`Classification::Violation`] or [`Classification::Restored`]
    pub classification: Classification,
    /// Increments with every warning raised during the session
    pub sequence: u64,
}

#[derive(Debug)]
struct PendingWarning {
    warning: Warning,
    clears_at: DateTime<Utc>,
}

/// Read model for a status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Violations recorded so far
    pub violation_count: usize,
    /// Current attempt
    pub attempt_id: AttemptId,
    /// Whether the window currently has focus
    pub focused: bool,
    /// Whether the page is currently visible
    pub visible: bool,
}

/// Owns the current attempt and records events into its log.
pub struct SessionController<S: Storage> {
    store: RefCell<LogStore<S>>,
    attempt_id: RefCell<AttemptId>,
    env: Rc<Environment>,
    clock: Rc<dyn Clock>,
    question_id: RefCell<String>,
    warning: RefCell<Option<PendingWarning>>,
    warning_ttl: Duration,
    warning_seq: Cell<u64>,
    focused: Cell<bool>,
    visible: Cell<bool>,
    submitted: Cell<bool>,
}

impl<S: Storage> SessionController<S> {
    /// Opens the log in `storage`, resolves the attempt id and records
    /// `session_start`.
    pub fn start(config: &SessionConfig, storage: S, env: Rc<Environment>) -> Self {
        Self::start_with_clock(config, storage, env, Rc::new(SystemClock))
    }

    /// Same as [`start`](Self::start) with an explicit clock.
    pub fn start_with_clock(
        config: &SessionConfig,
        storage: S,
        env: Rc<Environment>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let mut store = LogStore::open_with(storage, config.keys.clone(), Rc::clone(&clock));
        let attempt_id = store.attempt_id();

        let controller = Self {
            store: RefCell::new(store),
            attempt_id: RefCell::new(attempt_id),
            focused: Cell::new(env.has_focus()),
            visible: Cell::new(env.visibility() == VisibilityState::Visible),
            env,
            clock,
            question_id: RefCell::new(config.question_id.clone()),
            warning: RefCell::new(None),
            warning_ttl: config.warning_ttl,
            warning_seq: Cell::new(0),
            submitted: Cell::new(false),
        };

        controller.log(|log| log.info(format_args!("session started")));
        let question = controller.question_id();
        controller.append(EventType::SessionStart, &question, Map::new());
        controller
    }

    fn log<R>(&self, f: impl FnOnce(&AttemptLog<'_>) -> R) -> R {
        let attempt = self.attempt_id.borrow();
        f(&AttemptLog::new(attempt.as_str()))
    }

    /// Current attempt identifier.
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id.borrow().clone()
    }

    /// Activity unit attached to sensor-driven events.
    pub fn question_id(&self) -> String {
        self.question_id.borrow().clone()
    }

    /// Changes the activity unit attached to subsequent sensor-driven events.
    pub fn set_question_id(&self, question_id: impl Into<String>) {
        *self.question_id.borrow_mut() = question_id.into();
    }

    fn timestamp(&self) -> DateTime<Utc> {
        let now = self.clock.now().trunc_subsecs(3);
        match self.store.borrow().events().last() {
            Some(last) if last.timestamp() > now => last.timestamp(),
            _ => now,
        }
    }

    fn append(
        &self,
        event_type: EventType,
        question_id: &str,
        extra: Map<String, Value>,
    ) -> TestEvent {
        let mut metadata = EventMetadata::new(
            self.env.visibility().as_str(),
            FocusState::from_focused(self.env.has_focus()),
        );
        if let Some(agent) = self.env.user_agent() {
            metadata = metadata.with_user_agent(agent);
        }
        let metadata = metadata.merge_extra(extra);

        let event = TestEvent::new(
            event_type,
            self.timestamp(),
            self.attempt_id(),
            question_id,
            metadata,
        );
        self.store.borrow_mut().append(event.clone());
        self.log(|log| log.event(&event));
        event
    }

    /// Records one observed signal.
    ///
    /// Builds the event with live visibility, focus and user agent, appends
    /// it, raises the warning for violations and restorations, and updates
    /// the cached focus and visibility flags.
    pub fn record_violation_signal(
        &self,
        event_type: EventType,
        question_id: &str,
        extra: Map<String, Value>,
    ) -> TestEvent {
        let event = self.append(event_type, question_id, extra);

        let classification = event_type.classification();
        if classification != Classification::Neutral {
            let sequence = self.warning_seq.get() + 1;
            self.warning_seq.set(sequence);
            // Replaces any pending warning together with its clear deadline.
            *self.warning.borrow_mut() = Some(PendingWarning {
                warning: Warning {
                    event_type,
                    message: event_type.label(),
                    classification,
                    sequence,
                },
                clears_at: self.clock.now() + self.warning_ttl,
            });
        }

        match event_type {
            EventType::WindowBlur => self.focused.set(false),
            EventType::WindowFocus => self.focused.set(true),
            EventType::VisibilityHidden => self.visible.set(false),
            EventType::VisibilityVisible => self.visible.set(true),
            _ => {}
        }

        event
    }

    /// Records a signal against the current activity unit with no extras.
    pub fn record_signal(&self, event_type: EventType) -> TestEvent {
        let question = self.question_id();
        self.record_violation_signal(event_type, &question, Map::new())
    }

    /// Records `session_end` with the submitted answer. Only the first
    /// submission is recorded; later calls return `None`.
    pub fn submit(&self, selected_answer: &str) -> Option<TestEvent> {
        if self.submitted.replace(true) {
            self.log(|log| log.debug(format_args!("duplicate submission ignored")));
            return None;
        }
        let mut extra = Map::new();
        extra.insert("selectedAnswer".into(), Value::from(selected_answer));
        let question = self.question_id();
        Some(self.append(EventType::SessionEnd, &question, extra))
    }

    /// Returns `true` once `session_end` has been recorded.
    pub fn is_submitted(&self) -> bool {
        self.submitted.get()
    }

    /// The current warning, or `None` once its display time has elapsed.
    pub fn warning(&self) -> Option<Warning> {
        let mut pending = self.warning.borrow_mut();
        let expired = matches!(pending.as_ref(), Some(p) if self.clock.now() >= p.clears_at);
        if expired {
            *pending = None;
        }
        pending.as_ref().map(|p| p.warning.clone())
    }

    /// Clears the warning before its timer runs out.
    pub fn dismiss_warning(&self) {
        self.warning.borrow_mut().take();
    }

    /// Cached focus flag.
    pub fn is_focused(&self) -> bool {
        self.focused.get()
    }

    /// Cached visibility flag.
    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    /// Runs `f` over the current event sequence without cloning it.
    pub fn with_events<R>(&self, f: impl FnOnce(&[TestEvent]) -> R) -> R {
        f(self.store.borrow().events())
    }

    /// Clones the current event sequence.
    pub fn events(&self) -> Vec<TestEvent> {
        self.with_events(<[TestEvent]>::to_vec)
    }

    /// Violations recorded so far.
    pub fn violation_count(&self) -> usize {
        self.store.borrow().violation_count()
    }

    /// Summary of the current log.
    pub fn summary(&self) -> SessionSummary {
        self.store.borrow().summary()
    }

    /// Status bar read model.
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            violation_count: self.violation_count(),
            attempt_id: self.attempt_id(),
            focused: self.is_focused(),
            visible: self.is_visible(),
        }
    }

    /// Exports the log for download.
    pub fn export_snapshot(&self) -> Result<ExportArtifact, serde_json::Error> {
        self.store.borrow_mut().export_snapshot()
    }

    /// Clears the log and the stored attempt id, then adopts the freshly
    /// minted attempt id. The warning and submission state are reset.
    pub fn clear_logs(&self) {
        let fresh = {
            let mut store = self.store.borrow_mut();
            store.reset();
            store.attempt_id()
        };
        self.log(|log| log.info(format_args!("logs cleared, next attempt {fresh}")));
        *self.attempt_id.borrow_mut() = fresh;
        self.warning.borrow_mut().take();
        self.submitted.set(false);
    }
}

/// A controller plus the sensor feeding it.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use proctor_core::{MemoryStorage, Session, SessionConfig};
/// use proctor_core::audit::EventType;
/// use proctor_core::sensor::Environment;
///
/// let env = Rc::new(Environment::new(None));
/// let session = Session::start(&SessionConfig::default(), MemoryStorage::new(), Rc::clone(&env));
///
/// env.blur();
/// env.copy();
///
/// let controller = session.controller();
/// assert_eq!(controller.violation_count(), 2);
/// assert!(!controller.is_focused());
/// assert_eq!(controller.events()[0].event_type(), EventType::SessionStart);
/// ```
pub struct Session<S: Storage + 'static> {
    controller: Rc<SessionController<S>>,
    sensor: Sensor,
}

impl<S: Storage + 'static> Session<S> {
    /// Starts a controller and an enabled sensor on `env`.
    pub fn start(config: &SessionConfig, storage: S, env: Rc<Environment>) -> Self {
        Self::start_with_clock(config, storage, env, Rc::new(SystemClock))
    }

    /// Same as [`start`](Self::start) with an explicit clock.
    pub fn start_with_clock(
        config: &SessionConfig,
        storage: S,
        env: Rc<Environment>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let controller = Rc::new(SessionController::start_with_clock(
            config,
            storage,
            Rc::clone(&env),
            clock,
        ));
        let mut sensor = Sensor::new(env, Self::handler_for(&controller));
        sensor.enable();
        Self { controller, sensor }
    }

    fn handler_for(controller: &Rc<SessionController<S>>) -> impl Fn(EventType) + 'static {
        let weak = Rc::downgrade(controller);
        move |event_type| {
            if let Some(controller) = weak.upgrade() {
                controller.record_signal(event_type);
            }
        }
    }

    /// The controller.
    pub fn controller(&self) -> &Rc<SessionController<S>> {
        &self.controller
    }

    /// The sensor.
    pub fn sensor(&self) -> &Sensor {
        &self.sensor
    }

    /// Enables or disables monitoring.
    pub fn set_monitoring(&mut self, enabled: bool) {
        self.sensor.set_enabled(enabled);
    }

    /// Submits the answer; see [`SessionController::submit`].
    pub fn submit(&self, selected_answer: &str) -> Option<TestEvent> {
        self.controller.submit(selected_answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStorage;

    fn controller() -> (Rc<ManualClock>, Rc<Environment>, SessionController<MemoryStorage>) {
        let clock = Rc::new(ManualClock::default());
        let env = Rc::new(Environment::new(Some("test-agent".into())));
        let controller = SessionController::start_with_clock(
            &SessionConfig::default(),
            MemoryStorage::new(),
            Rc::clone(&env),
            clock.clone(),
        );
        (clock, env, controller)
    }

    #[test]
    fn start_records_session_start_only() {
        let (_, _, controller) = controller();
        let events = controller.events();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), EventType::SessionStart);
        assert_eq!(events[0].question_id(), "Q1");
        assert_eq!(events[0].attempt_id(), &controller.attempt_id());
        assert_eq!(controller.violation_count(), 0);
        assert!(controller.warning().is_none());
    }

    #[test]
    fn metadata_reflects_live_environment() {
        let (_, env, controller) = controller();
        env.blur();

        let mut extra = Map::new();
        extra.insert("note".into(), Value::from("manual"));
        let event = controller.record_violation_signal(EventType::WindowBlur, "Q2", extra);

        let meta = event.metadata();
        assert_eq!(meta.browser_state, "visible");
        assert_eq!(meta.focus_state, FocusState::Blurred);
        assert_eq!(meta.user_agent.as_deref(), Some("test-agent"));
        assert_eq!(meta.extra()["note"], "manual");
        assert_eq!(event.question_id(), "Q2");
    }

    #[test]
    fn reserved_extras_keep_log_readable() {
        let storage = Rc::new(MemoryStorage::new());
        let env = Rc::new(Environment::new(Some("test-agent".into())));
        let controller = SessionController::start_with_clock(
            &SessionConfig::default(),
            Rc::clone(&storage),
            env,
            Rc::new(ManualClock::default()),
        );

        let mut extra = Map::new();
        extra.insert("browserState".into(), Value::from("prerender"));
        extra.insert("userAgent".into(), Value::from("kiosk"));
        let event = controller.record_violation_signal(EventType::CopyAttempt, "Q1", extra);
        assert_eq!(event.metadata().browser_state, "prerender");
        assert_eq!(event.metadata().user_agent.as_deref(), Some("kiosk"));

        let reloaded = LogStore::open(Rc::clone(&storage));
        assert_eq!(reloaded.events(), &controller.events()[..]);
        assert_eq!(reloaded.events().last(), Some(&event));
    }

    #[test]
    fn violation_raises_warning_and_updates_flags() {
        let (_, _, controller) = controller();
        controller.record_signal(EventType::WindowBlur);

        let warning = controller.warning().unwrap();
        assert_eq!(warning.event_type, EventType::WindowBlur);
        assert_eq!(warning.message, "Window focus lost!");
        assert_eq!(warning.classification, Classification::Violation);
        assert!(!controller.is_focused());

        controller.record_signal(EventType::WindowFocus);
        let warning = controller.warning().unwrap();
        assert_eq!(warning.classification, Classification::Restored);
        assert_eq!(warning.sequence, 2);
        assert!(controller.is_focused());
    }

    #[test]
    fn warning_clears_after_ttl() {
        let (clock, _, controller) = controller();
        controller.record_signal(EventType::CopyAttempt);

        clock.advance(Duration::milliseconds(2_999));
        assert!(controller.warning().is_some());
        clock.advance(Duration::milliseconds(1));
        assert!(controller.warning().is_none());
    }

    #[test]
    fn new_warning_replaces_pending_timer() {
        let (clock, _, controller) = controller();
        controller.record_signal(EventType::VisibilityHidden);
        clock.advance(Duration::milliseconds(2_000));
        controller.record_signal(EventType::VisibilityVisible);
        clock.advance(Duration::milliseconds(2_000));

        // First timer would have fired by now; the replacement has not.
        let warning = controller.warning().unwrap();
        assert_eq!(warning.event_type, EventType::VisibilityVisible);
        assert_eq!(warning.message, "Focus restored");
    }

    #[test]
    fn dismiss_warning_cancels_timer() {
        let (_, _, controller) = controller();
        controller.record_signal(EventType::PasteAttempt);
        controller.dismiss_warning();
        assert!(controller.warning().is_none());
    }

    #[test]
    fn neutral_events_leave_warning_alone() {
        let (_, _, controller) = controller();
        controller.record_signal(EventType::CopyAttempt);
        controller.record_signal(EventType::SessionStart);
        assert_eq!(
            controller.warning().unwrap().event_type,
            EventType::CopyAttempt
        );
    }

    #[test]
    fn submit_records_once_with_answer() {
        let (_, _, controller) = controller();
        let event = controller.submit("b").unwrap();

        assert_eq!(event.event_type(), EventType::SessionEnd);
        assert_eq!(event.metadata().extra()["selectedAnswer"], "b");
        assert!(controller.submit("c").is_none());
        assert_eq!(controller.events().len(), 2);
        assert!(controller.warning().is_none());
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let (clock, _, controller) = controller();
        clock.advance(Duration::seconds(-30));
        let event = controller.record_signal(EventType::WindowBlur);

        let events = controller.events();
        assert_eq!(event.timestamp(), events[0].timestamp());
        assert!(events.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    }

    #[test]
    fn status_snapshot() {
        let (_, _, controller) = controller();
        controller.record_signal(EventType::VisibilityHidden);

        let status = controller.status();
        assert_eq!(status.violation_count, 1);
        assert!(!status.visible);
        assert!(status.focused);
        assert_eq!(status.attempt_id, controller.attempt_id());
    }

    #[test]
    fn clear_logs_starts_new_attempt() {
        let (clock, _, controller) = controller();
        let before = controller.attempt_id();
        controller.record_signal(EventType::CopyAttempt);
        controller.submit("a");

        clock.advance(Duration::seconds(1));
        controller.clear_logs();

        assert!(controller.events().is_empty());
        assert_ne!(controller.attempt_id(), before);
        assert!(controller.warning().is_none());
        assert!(!controller.is_submitted());

        let event = controller.record_signal(EventType::WindowBlur);
        assert_eq!(event.attempt_id(), &controller.attempt_id());
    }

    #[test]
    fn session_wires_sensor_into_log() {
        let env = Rc::new(Environment::new(None));
        let mut session = Session::start(
            &SessionConfig::default(),
            MemoryStorage::new(),
            Rc::clone(&env),
        );

        env.set_visibility(VisibilityState::Hidden);
        env.set_visibility(VisibilityState::Visible);
        env.blur();

        let controller = Rc::clone(session.controller());
        let types: Vec<_> = controller.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                EventType::SessionStart,
                EventType::VisibilityHidden,
                EventType::VisibilityVisible,
                EventType::WindowBlur,
            ]
        );
        assert_eq!(controller.summary().total_violations, 2);

        session.set_monitoring(false);
        assert!(!session.sensor().is_enabled());
        assert!(!env.paste().default_prevented);
        assert_eq!(controller.events().len(), 4);
    }

    #[test]
    fn dropping_session_detaches_sensor() {
        let env = Rc::new(Environment::new(None));
        let session = Session::start(
            &SessionConfig::default(),
            MemoryStorage::new(),
            Rc::clone(&env),
        );
        assert_eq!(env.listener_count(), 6);
        drop(session);
        assert_eq!(env.listener_count(), 0);
    }
}
