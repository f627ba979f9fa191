use std::rc::Rc;

use chrono::Duration;
use proctor_core::audit::{EventType, LogStore, StorageKeys, TestEvent};
use proctor_core::sensor::{Environment, VisibilityState};
use proctor_core::{
    FileStorage, ManualClock, MemoryStorage, Session, SessionConfig, SessionController, Storage,
};

fn event_types(events: &[TestEvent]) -> Vec<EventType> {
    events.iter().map(TestEvent::event_type).collect()
}

#[test]
fn fresh_session_has_only_session_start() {
    let env = Rc::new(Environment::new(None));
    let session = Session::start(&SessionConfig::default(), MemoryStorage::new(), env);

    let summary = session.controller().summary();
    assert_eq!(summary.total_events, 1);
    assert_eq!(summary.total_violations, 0);
    assert_eq!(
        event_types(&session.controller().events()),
        vec![EventType::SessionStart]
    );
}

#[test]
fn hidden_visible_blur_scenario() {
    let env = Rc::new(Environment::new(None));
    let session = Session::start(
        &SessionConfig::default(),
        MemoryStorage::new(),
        Rc::clone(&env),
    );

    env.set_visibility(VisibilityState::Hidden);
    env.set_visibility(VisibilityState::Visible);
    env.blur();

    let summary = session.controller().summary();
    assert_eq!(summary.total_violations, 2);
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
fn copy_while_enabled_and_disabled() {
    let env = Rc::new(Environment::new(None));
    let mut session = Session::start(
        &SessionConfig::default(),
        MemoryStorage::new(),
        Rc::clone(&env),
    );

    let dispatch = env.copy();
    assert!(dispatch.default_prevented);
    assert_eq!(
        event_types(&session.controller().events()),
        vec![EventType::SessionStart, EventType::CopyAttempt]
    );

    session.set_monitoring(false);
    let dispatch = env.copy();
    assert!(!dispatch.default_prevented);
    assert_eq!(session.controller().events().len(), 2);
}

#[test]
fn handler_replacement_uses_latest_callback() {
    let env = Rc::new(Environment::new(None));
    let session = Session::start(
        &SessionConfig::default(),
        MemoryStorage::new(),
        Rc::clone(&env),
    );
    let controller = Rc::clone(session.controller());

    // Two replacements: the first would tag a stale question, the second
    // routes through the controller with the live one.
    let stale = Rc::clone(&controller);
    session.sensor().set_handler(move |t| {
        stale.record_violation_signal(t, "STALE", Default::default());
    });
    let live = Rc::clone(&controller);
    session.sensor().set_handler(move |t| {
        live.record_violation_signal(t, "LIVE", Default::default());
    });

    env.set_visibility(VisibilityState::Hidden);

    let events = controller.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type(), EventType::VisibilityHidden);
    assert_eq!(events[1].question_id(), "LIVE");
}

#[test]
fn file_backed_log_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig {
        storage_dir: dir.path().to_path_buf(),
        ..SessionConfig::default()
    };

    let env = Rc::new(Environment::new(None));
    let first_attempt = {
        let session = Session::start(
            &config,
            FileStorage::new(&config.storage_dir),
            Rc::clone(&env),
        );
        env.paste();
        session.submit("b");
        session.controller().attempt_id()
    };

    let store = LogStore::open(FileStorage::new(&config.storage_dir));
    assert_eq!(
        event_types(store.events()),
        vec![
            EventType::SessionStart,
            EventType::PasteAttempt,
            EventType::SessionEnd
        ]
    );
    assert!(store
        .events()
        .iter()
        .all(|e| e.attempt_id() == &first_attempt));
    assert_eq!(store.events()[2].metadata().extra()["selectedAnswer"], "b");

    // A second session in the same partition keeps appending under the
    // stored attempt id.
    let session = Session::start(&config, FileStorage::new(&config.storage_dir), env);
    assert_eq!(session.controller().attempt_id(), first_attempt);
    assert_eq!(session.controller().events().len(), 4);
}

#[test]
fn reset_then_load_is_empty_with_new_attempt() {
    let storage = Rc::new(MemoryStorage::new());
    let clock = Rc::new(ManualClock::default());
    let env = Rc::new(Environment::new(None));
    let controller = SessionController::start_with_clock(
        &SessionConfig::default(),
        Rc::clone(&storage),
        env,
        clock.clone(),
    );
    let before = controller.attempt_id();

    clock.advance(Duration::milliseconds(10));
    controller.clear_logs();

    let store = LogStore::open_with(
        Rc::clone(&storage),
        StorageKeys::default(),
        clock.clone(),
    );
    assert!(store.load().is_empty());
    assert_ne!(controller.attempt_id(), before);
}

#[test]
fn degraded_storage_keeps_live_log() {
    let storage = Rc::new(MemoryStorage::new());
    let env = Rc::new(Environment::new(None));
    let session = Session::start(
        &SessionConfig::default(),
        Rc::clone(&storage),
        Rc::clone(&env),
    );

    storage.set_disabled(true);
    env.blur();
    env.copy();

    assert_eq!(session.controller().violation_count(), 2);
    assert_eq!(session.controller().events().len(), 3);

    storage.set_disabled(false);
    let raw = storage.get("secure_test_event_log").unwrap().unwrap();
    let durable: Vec<TestEvent> = serde_json::from_str(&raw).unwrap();
    assert_eq!(durable.len(), 1);
}
