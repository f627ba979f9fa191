//! Attempt identifiers.
//!
//! An attempt is one monitored session. Its identifier is minted lazily from
//! the creation instant and persisted until the log is reset.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identifier shared by every event recorded during one attempt.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use proctor_core::audit::AttemptId;
///
/// let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
/// let id = AttemptId::mint(at);
/// assert_eq!(id.as_str(), "ATT-LOYW3V28");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(String);

impl AttemptId {
    /// Prefix carried by every minted identifier.
    pub const PREFIX: &'static str = "ATT-";

    /// Mints the identifier for an attempt created at `at`: the prefix
    /// followed by the upper-case base36 rendering of its Unix milliseconds.
    pub fn mint(at: DateTime<Utc>) -> Self {
        let millis = at.timestamp_millis().unsigned_abs();
        Self(format!("{}{}", Self::PREFIX, base36(millis).to_uppercase()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AttemptId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AttemptId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lower-case base36 rendering of `n`.
pub(crate) fn base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36_DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    // Every byte comes from BASE36_DIGITS, which is ASCII.
    digits.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn base36_known_values() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(1_295), "zz");
    }

    #[test]
    fn mint_uses_prefix_and_upper_case() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let id = AttemptId::mint(at);
        assert!(id.as_str().starts_with("ATT-"));
        assert_eq!(id.as_str(), id.as_str().to_uppercase());
    }

    #[test]
    fn different_instants_mint_different_ids() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let a = AttemptId::mint(at);
        let b = AttemptId::mint(at + Duration::milliseconds(1));
        assert_ne!(a, b);
    }

    #[test]
    fn attempt_id_serializes_as_plain_string() {
        let id = AttemptId::from("ATT-ABC");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ATT-ABC\"");
        assert_eq!(id.to_string(), "ATT-ABC");
    }
}
