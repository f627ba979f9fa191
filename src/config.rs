//! Session configuration.

use std::path::PathBuf;

use chrono::Duration;
use tracing::debug;

use crate::audit::StorageKeys;
use crate::error::ConfigError;
use crate::sensor::Environment;

/// Settings for one monitored session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Directory of the file-backed storage partition
    pub storage_dir: PathBuf,
    /// Keys used inside the partition
    pub keys: StorageKeys,
    /// Activity unit recorded on events when none is given
    pub question_id: String,
    /// How long a warning stays visible before it clears itself
    pub warning_ttl: Duration,
    /// User agent reported in event metadata
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(".proctor"),
            keys: StorageKeys::default(),
            question_id: "Q1".to_string(),
            warning_ttl: Duration::milliseconds(3_000),
            user_agent: format!("proctor-core/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl SessionConfig {
    /// Builds a config from `PROCTOR_*` environment variables, falling back
    /// to defaults for anything unset.
    ///
    /// | Variable | Field |
    /// | --- | --- |
    /// | `PROCTOR_STORAGE_DIR` | `storage_dir` |
    /// | `PROCTOR_EVENTS_KEY` | `keys.events` |
    /// | `PROCTOR_ATTEMPT_KEY` | `keys.attempt` |
    /// | `PROCTOR_QUESTION_ID` | `question_id` |
    /// | `PROCTOR_WARNING_TTL_MS` | `warning_ttl` |
    /// | `PROCTOR_USER_AGENT` | `user_agent` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let var = |name: &'static str| match lookup(name) {
            Some(value) if !value.is_empty() => Some(value),
            _ => {
                debug!("{name} not set, using default");
                None
            }
        };

        if let Some(dir) = var("PROCTOR_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(dir);
        }
        if let Some(key) = var("PROCTOR_EVENTS_KEY") {
            config.keys.events = key;
        }
        if let Some(key) = var("PROCTOR_ATTEMPT_KEY") {
            config.keys.attempt = key;
        }
        if let Some(question) = var("PROCTOR_QUESTION_ID") {
            config.question_id = question;
        }
        if let Some(raw) = var("PROCTOR_WARNING_TTL_MS") {
            let ms: u32 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: "PROCTOR_WARNING_TTL_MS",
                expected: "a whole number of milliseconds",
                value: raw.clone(),
            })?;
            config.warning_ttl = Duration::milliseconds(i64::from(ms));
        }
        if let Some(agent) = var("PROCTOR_USER_AGENT") {
            config.user_agent = agent;
        }

        Ok(config)
    }

    /// Creates a visible, focused environment reporting the configured user
    /// agent.
    pub fn environment(&self) -> Environment {
        Environment::new(Some(self.user_agent.clone()))
    }
}
