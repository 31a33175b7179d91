//! Inbound alert payloads.
//!
//! [`AlertEvent`] is the already-decoded event the lifecycle manager ingests.
//! [`PrometheusWebhook`] is the Alertmanager webhook body, which carries a
//! batch of alerts and converts into one event per alert.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw alert event, as reported by its source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Reported status; only `firing` and `resolved` are accepted.
    pub status: String,
    /// Alert labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Alert annotations.
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl AlertEvent {
    /// Creates an event with the given status and no labels.
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
        }
    }

    /// A firing event.
    #[must_use]
    pub fn firing() -> Self {
        Self::new("firing")
    }

    /// A resolved event.
    #[must_use]
    pub fn resolved() -> Self {
        Self::new("resolved")
    }

    /// Adds a label.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds an annotation.
    #[must_use]
    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// Alertmanager webhook body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusWebhook {
    /// Payload format version.
    #[serde(default)]
    pub version: String,
    /// Alertmanager group key.
    #[serde(default)]
    pub group_key: String,
    /// Status of the whole group.
    #[serde(default)]
    pub status: String,
    /// Receiver name.
    #[serde(default)]
    pub receiver: String,
    /// Alerts in the group.
    #[serde(default)]
    pub alerts: Vec<PrometheusAlert>,
}

/// One alert inside an Alertmanager webhook.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusAlert {
    /// `firing` or `resolved`.
    pub status: String,
    /// Alert labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Alert annotations.
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    /// When the condition started.
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    /// When the condition ended.
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// Link back to the source expression.
    #[serde(default, rename = "generatorURL")]
    pub generator_url: String,
    /// Alertmanager's own fingerprint. Not used for deduplication.
    #[serde(default)]
    pub fingerprint: String,
}

impl From<PrometheusAlert> for AlertEvent {
    fn from(alert: PrometheusAlert) -> Self {
        Self {
            status: alert.status,
            labels: alert.labels,
            annotations: alert.annotations,
        }
    }
}

impl PrometheusWebhook {
    /// Splits the webhook into one event per alert, in payload order.
    #[must_use]
    pub fn into_events(self) -> Vec<AlertEvent> {
        self.alerts.into_iter().map(AlertEvent::from).collect()
    }
}
