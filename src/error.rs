use std::fmt;

/// Errors raised by a [`Storage`](crate::Storage) partition.
///
/// These never cross the [`LogStore`](crate::audit::LogStore) boundary: a
/// failed read degrades to an empty log and a failed write is skipped.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Storage is disabled or otherwise refuses access.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// The partition cannot hold the value being written.
    #[error("storage quota exceeded: {needed} bytes needed, {limit} bytes allowed")]
    QuotaExceeded {
        /// Bytes the partition would hold after the write
        needed: usize,
        /// Configured capacity
        limit: usize,
    },
    /// Underlying filesystem error.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A value could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Returns the coarse category of this error.
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::Unavailable(_) => StorageErrorKind::Unavailable,
            StorageError::QuotaExceeded { .. } => StorageErrorKind::QuotaExceeded,
            StorageError::Io(_) => StorageErrorKind::Io,
            StorageError::Serialization(_) => StorageErrorKind::Serialization,
        }
    }
}

/// Category of a [`StorageError`], handy for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// Storage disabled or denied
    Unavailable,
    /// Capacity reached
    QuotaExceeded,
    /// Filesystem error
    Io,
    /// Encode/decode failure
    Serialization,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageErrorKind::Unavailable => write!(f, "unavailable"),
            StorageErrorKind::QuotaExceeded => write!(f, "quota exceeded"),
            StorageErrorKind::Io => write!(f, "I/O error"),
            StorageErrorKind::Serialization => write!(f, "serialization error"),
        }
    }
}

/// Errors produced while reading [`SessionConfig`](crate::SessionConfig) from
/// the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable was set but could not be parsed.
    #[error("{var} must be {expected}, got {value:?}")]
    InvalidValue {
        /// Variable name
        var: &'static str,
        /// Description of the accepted format
        expected: &'static str,
        /// The rejected raw value
        value: String,
    },
}
