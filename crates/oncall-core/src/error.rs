//! Error types for the oncall-core crate.

use thiserror::Error;

/// Errors that can occur while ingesting, routing or escalating alerts.
#[derive(Debug, Error)]
pub enum OnCallError {
    /// Malformed or insufficient input.
    #[error("validation failed: {reason}")]
    Validation {
        /// Why the input was rejected.
        reason: String,
    },

    /// The alert store is unreachable or a write could not be committed.
    #[error("storage error: {reason}")]
    Storage {
        /// The underlying storage failure.
        reason: String,
    },

    /// Dispatch was requested on a channel name nobody registered.
    #[error("unknown notification channel: {name}")]
    UnknownChannel {
        /// The requested channel name.
        name: String,
    },

    /// A schedule, layer or chain is configured in a way that cannot work.
    #[error("configuration error: {reason}")]
    Configuration {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// No alert group exists for the given fingerprint.
    #[error("alert not found: {fingerprint}")]
    AlertNotFound {
        /// The fingerprint that was looked up.
        fingerprint: String,
    },

    /// A channel failed to deliver a notification.
    #[error("notification failed: {reason}")]
    NotificationFailed {
        /// The reason reported by the channel.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl OnCallError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for OnCallError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for on-call operations.
pub type Result<T> = std::result::Result<T, OnCallError>;
