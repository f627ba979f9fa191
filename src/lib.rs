//! Integrity-event capture and audit logging for monitored test sessions.
//!
//! This crate records what happens to a single client session while a timed
//! activity is running:
//! - **Sensor layer**: turns raw environment signals (visibility, focus,
//!   clipboard) into canonical event kinds
//! - **Log store**: persists an append-only, ordered event sequence per
//!   storage partition
//! - **Aggregates**: violation counts and summaries recomputed from the log
//! - **Session controller**: owns the attempt id and wires it all together
//!
//! # Core Types
//!
//! - [`audit::TestEvent`]: one immutable record per occurrence
//! - [`audit::LogStore`]: append-only event log bound to a [`Storage`]
//! - [`sensor::Sensor`]: listener set bound to a [`sensor::Environment`]
//! - [`SessionController`]: records signals, tracks warnings and status
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//! use proctor_core::{MemoryStorage, Session, SessionConfig};
//! use proctor_core::sensor::{Environment, VisibilityState};
//!
//! let env = Rc::new(Environment::new(Some("kiosk".to_string())));
//! let session = Session::start(&SessionConfig::default(), MemoryStorage::new(), Rc::clone(&env));
//!
//! env.set_visibility(VisibilityState::Hidden);
//! env.set_visibility(VisibilityState::Visible);
//!
//! let summary = session.controller().summary();
//! assert_eq!(summary.total_events, 3);
//! assert_eq!(summary.total_violations, 1);
//! ```
//!
//! Integrity rests entirely on the local log. Nothing here signs, verifies or
//! submits events anywhere.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
mod clock;
mod config;
mod error;
mod logging;
pub mod sensor;
mod session;
mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use error::{ConfigError, StorageError, StorageErrorKind};
pub use logging::AttemptLog;
pub use session::{Session, SessionController, StatusSnapshot, Warning};
pub use storage::{FileStorage, MemoryStorage, Storage};
