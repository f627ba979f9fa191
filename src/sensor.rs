//! Sensor layer: raw environment signals in, canonical event kinds out.
//!
//! An [`Environment`] stands in for the host page. It tracks visibility and
//! focus, holds listener registrations, and delivers raw signals to them on
//! the caller's thread. A [`Sensor`] binds to the five signal sources the
//! monitor cares about and turns each raw signal into exactly one
//! [`EventType`] handed to its reaction callback.
//!
//! The callback lives in a [`HandlerCell`] that listeners read at dispatch
//! time, so replacing it never requires re-subscribing and a replaced
//! callback is never invoked again.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::audit::{Classification, EventType};

/// Page visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityState {
    /// Page is shown
    Visible,
    /// Page is in a background tab or minimized
    Hidden,
}

impl VisibilityState {
    /// String form stored in event metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            VisibilityState::Visible => "visible",
            VisibilityState::Hidden => "hidden",
        }
    }
}

impl fmt::Display for VisibilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw signal sources an environment can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Visibility changed
    VisibilityChange,
    /// Window lost focus
    Blur,
    /// Window gained focus
    Focus,
    /// Clipboard copy
    Copy,
    /// Clipboard paste
    Paste,
    /// Context menu requested
    ContextMenu,
}

/// A raw signal as seen by listeners.
///
/// Carries the environment state after the signal took effect. Listeners may
/// call [`prevent_default`](Self::prevent_default) to suppress the host's
/// default action.
#[derive(Debug)]
pub struct SignalEvent {
    kind: SignalKind,
    visibility: VisibilityState,
    focused: bool,
    default_prevented: Cell<bool>,
}

impl SignalEvent {
    /// Returns the signal source.
    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Visibility after the signal.
    pub fn visibility(&self) -> VisibilityState {
        self.visibility
    }

    /// Focus after the signal.
    pub fn focused(&self) -> bool {
        self.focused
    }

    /// Suppresses the default action.
    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    /// Returns `true` if some listener suppressed the default action.
    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}

/// Result of delivering one raw signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// Number of listeners invoked
    pub delivered: usize,
    /// Whether the host's default action was suppressed
    pub default_prevented: bool,
}

impl Dispatch {
    const NONE: Dispatch = Dispatch {
        delivered: 0,
        default_prevented: false,
    };
}

/// Handle returned by [`Environment::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&SignalEvent)>;

/// Single-threaded host environment: state plus listener registry.
///
/// # Example
///
/// ```
/// use proctor_core::sensor::{Environment, SignalKind};
///
/// let env = Environment::new(None);
/// let id = env.add_listener(SignalKind::Copy, |signal| signal.prevent_default());
///
/// assert!(env.copy().default_prevented);
/// assert!(env.remove_listener(id));
/// assert!(!env.copy().default_prevented);
/// ```
pub struct Environment {
    visibility: Cell<VisibilityState>,
    focused: Cell<bool>,
    user_agent: Option<String>,
    listeners: RefCell<Vec<(ListenerId, SignalKind, Listener)>>,
    next_id: Cell<u64>,
}

impl Environment {
    /// Creates a visible, focused environment.
    pub fn new(user_agent: Option<String>) -> Self {
        Self {
            visibility: Cell::new(VisibilityState::Visible),
            focused: Cell::new(true),
            user_agent,
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Current visibility.
    pub fn visibility(&self) -> VisibilityState {
        self.visibility.get()
    }

    /// Current focus.
    pub fn has_focus(&self) -> bool {
        self.focused.get()
    }

    /// Client user agent, if known.
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Registers `listener` for `kind`.
    pub fn add_listener(
        &self,
        kind: SignalKind,
        listener: impl Fn(&SignalEvent) + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .push((id, kind, Rc::new(listener)));
        id
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    /// Total number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count_for(&self, kind: SignalKind) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }

    /// Changes visibility. Listeners fire only on an actual transition.
    pub fn set_visibility(&self, state: VisibilityState) -> Dispatch {
        if self.visibility.replace(state) == state {
            return Dispatch::NONE;
        }
        self.dispatch(SignalKind::VisibilityChange)
    }

    /// Takes focus away from the window.
    pub fn blur(&self) -> Dispatch {
        if !self.focused.replace(false) {
            return Dispatch::NONE;
        }
        self.dispatch(SignalKind::Blur)
    }

    /// Gives focus back to the window.
    pub fn focus(&self) -> Dispatch {
        if self.focused.replace(true) {
            return Dispatch::NONE;
        }
        self.dispatch(SignalKind::Focus)
    }

    /// Raises a clipboard copy.
    pub fn copy(&self) -> Dispatch {
        self.dispatch(SignalKind::Copy)
    }

    /// Raises a clipboard paste.
    pub fn paste(&self) -> Dispatch {
        self.dispatch(SignalKind::Paste)
    }

    /// Raises a context-menu request.
    pub fn context_menu(&self) -> Dispatch {
        self.dispatch(SignalKind::ContextMenu)
    }

    fn dispatch(&self, kind: SignalKind) -> Dispatch {
        let signal = SignalEvent {
            kind,
            visibility: self.visibility.get(),
            focused: self.focused.get(),
            default_prevented: Cell::new(false),
        };

        // Snapshot so listeners may add or remove registrations while running.
        let targets: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, l)| Rc::clone(l))
            .collect();

        for listener in &targets {
            listener(&signal);
        }

        Dispatch {
            delivered: targets.len(),
            default_prevented: signal.default_prevented(),
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("visibility", &self.visibility.get())
            .field("focused", &self.focused.get())
            .field("user_agent", &self.user_agent)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

type Handler = Rc<dyn Fn(EventType)>;

/// Indirection cell holding the current reaction callback.
#[derive(Clone)]
pub struct HandlerCell {
    current: Rc<RefCell<Handler>>,
}

impl HandlerCell {
    /// Creates a cell holding `handler`.
    pub fn new(handler: impl Fn(EventType) + 'static) -> Self {
        Self {
            current: Rc::new(RefCell::new(Rc::new(handler))),
        }
    }

    /// Replaces the callback.
    pub fn replace(&self, handler: impl Fn(EventType) + 'static) {
        *self.current.borrow_mut() = Rc::new(handler);
    }

    /// Invokes whatever callback is current right now.
    pub fn dispatch(&self, event_type: EventType) {
        // Release the borrow before calling so the callback may replace itself.
        let handler: Handler = self.current.borrow().clone();
        handler(event_type);
    }
}

impl fmt::Debug for HandlerCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerCell").finish_non_exhaustive()
    }
}

/// Signal sources a sensor subscribes to, one listener each.
const SUBSCRIPTIONS: [SignalKind; 6] = [
    SignalKind::VisibilityChange,
    SignalKind::Blur,
    SignalKind::Focus,
    SignalKind::Copy,
    SignalKind::Paste,
    SignalKind::ContextMenu,
];

/// Translates a raw signal into its canonical event kind.
///
/// Context-menu requests produce nothing.
pub fn classify_signal(signal: &SignalEvent) -> Option<EventType> {
    match signal.kind() {
        SignalKind::VisibilityChange => Some(match signal.visibility() {
            VisibilityState::Hidden => EventType::VisibilityHidden,
            VisibilityState::Visible => EventType::VisibilityVisible,
        }),
        SignalKind::Blur => Some(EventType::WindowBlur),
        SignalKind::Focus => Some(EventType::WindowFocus),
        SignalKind::Copy => Some(EventType::CopyAttempt),
        SignalKind::Paste => Some(EventType::PasteAttempt),
        SignalKind::ContextMenu => None,
    }
}

/// Binds integrity listeners to an [`Environment`].
///
/// While enabled, clipboard and context-menu defaults are suppressed and
/// every visibility, focus and clipboard signal reaches the current handler
/// as one [`EventType`]. Disabling (or dropping) the sensor removes every
/// listener it attached.
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use proctor_core::audit::EventType;
/// use proctor_core::sensor::{Environment, Sensor};
///
/// let env = Rc::new(Environment::new(None));
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let sink = Rc::clone(&seen);
/// let mut sensor = Sensor::new(Rc::clone(&env), move |t| sink.borrow_mut().push(t));
/// sensor.enable();
///
/// assert!(env.copy().default_prevented);
/// assert_eq!(*seen.borrow(), vec![EventType::CopyAttempt]);
/// ```
pub struct Sensor {
    env: Rc<Environment>,
    handler: HandlerCell,
    attached: Vec<ListenerId>,
    live: Rc<Cell<bool>>,
}

impl Sensor {
    /// Creates a disabled sensor.
    pub fn new(env: Rc<Environment>, handler: impl Fn(EventType) + 'static) -> Self {
        Self {
            env,
            handler: HandlerCell::new(handler),
            attached: Vec::new(),
            live: Rc::new(Cell::new(false)),
        }
    }

    /// Replaces the reaction callback without touching subscriptions.
    pub fn set_handler(&self, handler: impl Fn(EventType) + 'static) {
        self.handler.replace(handler);
    }

    /// Returns `true` while listeners are attached.
    pub fn is_enabled(&self) -> bool {
        !self.attached.is_empty()
    }

    /// Enables or disables the sensor.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.enable();
        } else {
            self.disable();
        }
    }

    /// Attaches all listeners. Does nothing if already enabled.
    pub fn enable(&mut self) {
        if self.is_enabled() {
            return;
        }

        // Fresh flag per attachment so listeners from an earlier enable can
        // never observe this one as live.
        let live = Rc::new(Cell::new(true));
        for kind in SUBSCRIPTIONS {
            let handler = self.handler.clone();
            let live = Rc::clone(&live);
            let id = self.env.add_listener(kind, move |signal| {
                if live.get() {
                    react(signal, &handler);
                }
            });
            self.attached.push(id);
        }
        self.live = live;
        tracing::debug!(
            target: "proctor_sensor",
            listeners = self.attached.len(),
            "sensor enabled"
        );
    }

    /// Detaches every listener this sensor attached. Does nothing if already
    /// disabled. No event is emitted once this returns.
    pub fn disable(&mut self) {
        if !self.is_enabled() {
            return;
        }
        self.live.set(false);
        for id in self.attached.drain(..) {
            if !self.env.remove_listener(id) {
                tracing::warn!(target: "proctor_sensor", ?id, "listener already detached");
            }
        }
        tracing::debug!(target: "proctor_sensor", "sensor disabled");
    }

    /// Returns the environment this sensor binds to.
    pub fn environment(&self) -> &Rc<Environment> {
        &self.env
    }
}

impl Drop for Sensor {
    fn drop(&mut self) {
        self.disable();
    }
}

impl fmt::Debug for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sensor")
            .field("enabled", &self.is_enabled())
            .field("listeners", &self.attached.len())
            .finish()
    }
}

fn react(signal: &SignalEvent, handler: &HandlerCell) {
    if matches!(
        signal.kind(),
        SignalKind::Copy | SignalKind::Paste | SignalKind::ContextMenu
    ) {
        signal.prevent_default();
    }

    let Some(event_type) = classify_signal(signal) else {
        return;
    };

    match event_type.classification() {
        Classification::Violation => {
            tracing::warn!(target: "proctor_sensor", event = %event_type, "{}", event_type.label())
        }
        _ => tracing::info!(
            target: "proctor_sensor",
            event = %event_type,
            "{}",
            event_type.label()
        ),
    }
    handler.dispatch(event_type);
}
