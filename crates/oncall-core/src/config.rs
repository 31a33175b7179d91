//! Runtime settings for the lifecycle manager and escalation engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by ingestion and escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnCallConfig {
    /// Upper bound on a single channel send (in seconds).
    pub dispatch_timeout_secs: u64,
    /// Channel used by `notify_user` steps that don't name one.
    pub default_user_channel: String,
    /// Severity recorded when an event carries no `severity` label.
    pub default_severity: String,
    /// Whether events with an empty label set are rejected.
    pub reject_empty_labels: bool,
}

impl Default for OnCallConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_secs: 10,
            default_user_channel: "email".to_string(),
            default_severity: "info".to_string(),
            reject_empty_labels: true,
        }
    }
}

impl OnCallConfig {
    /// Returns the dispatch timeout as a [`Duration`].
    #[must_use]
    pub const fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}
