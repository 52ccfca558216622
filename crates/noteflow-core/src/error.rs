//! Error handling for noteflow
//!
//! Listener failures never surface here: they are recovered inside the bus.
//! These types cover the fallible edges around it:
//! - Configuration validation
//! - Durable history storage
//! - Global bus initialization
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is outside its valid range
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Dotted path of the offending option.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Create an invalid-value error
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Durable store error type
///
/// Persistence is best effort; the bus logs these and carries on in memory.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The store cannot be used at all
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The store refused a write because it is full
    #[error("Storage quota exceeded writing '{key}' ({bytes} bytes)")]
    QuotaExceeded {
        /// The key being written.
        key: String,
        /// Size of the rejected value.
        bytes: usize,
    },

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Main error type for the event bus crate
#[derive(Error, Debug)]
pub enum EventBusError {
    /// The global bus was already constructed
    #[error("Event bus is already initialized")]
    AlreadyInitialized,

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Persistence error
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl EventBusError {
    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, EventBusError::Config(_))
    }

    /// Check if this is a persistence error
    pub fn is_persistence_error(&self) -> bool {
        matches!(self, EventBusError::Persistence(_))
    }
}

/// Result type using EventBusError
pub type Result<T> = std::result::Result<T, EventBusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("history.limit", "must be > 0");
        assert_eq!(err.to_string(), "Invalid value for 'history.limit': must be > 0");
    }

    #[test]
    fn test_persistence_error_display() {
        let err = PersistenceError::QuotaExceeded {
            key: "history".to_string(),
            bytes: 42,
        };
        assert_eq!(
            err.to_string(),
            "Storage quota exceeded writing 'history' (42 bytes)"
        );
    }

    #[test]
    fn test_error_classification() {
        let err: EventBusError = ConfigError::invalid("x", "y").into();
        assert!(err.is_config_error());
        assert!(!err.is_persistence_error());

        let err: EventBusError = PersistenceError::Unavailable("disabled".to_string()).into();
        assert!(err.is_persistence_error());
        assert_eq!(err.to_string(), "Storage unavailable: disabled");
    }
}
