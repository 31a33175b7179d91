//! Notification dispatch.
//!
//! Every concrete transport implements [`NotificationChannel`]. The
//! [`Dispatcher`] owns an explicit name → channel table, so the escalation
//! engine only ever talks to channels it was given at construction.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{OnCallError, Result};
use crate::types::AlertGroup;

/// Result of one channel send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResult {
    /// Whether the channel accepted the message.
    pub success: bool,
    /// The channel that processed the send.
    pub channel: String,
    /// Optional message or error description.
    pub message: Option<String>,
    /// Response status code (if applicable).
    pub status_code: Option<u16>,
}

impl NotificationResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(channel: impl Into<String>) -> Self {
        Self {
            success: true,
            channel: channel.into(),
            message: None,
            status_code: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            channel: channel.into(),
            message: Some(message.into()),
            status_code: None,
        }
    }

    /// Sets the status code.
    #[must_use]
    pub const fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

/// A transport that can deliver an alert to a recipient.
#[async_trait]
pub trait NotificationChannel: Send + Sync + fmt::Debug {
    /// Returns the name the channel is registered under.
    fn name(&self) -> &str;

    /// Delivers `alert` to `recipient`. An empty recipient means the
    /// channel's own default destination.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::NotificationFailed` if the transport fails
    /// before a response is received.
    async fn send(&self, alert: &AlertGroup, recipient: &str) -> Result<NotificationResult>;

    /// Returns true if this channel is enabled.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Outcome of a dispatch, as recorded on the notification row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The channel accepted the message.
    Sent,
    /// Delivery failed.
    Failed(String),
    /// The caller's token fired before the channel answered.
    Cancelled,
}

impl DispatchOutcome {
    /// Returns true for [`DispatchOutcome::Sent`].
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Sent => None,
            Self::Failed(reason) => Some(reason),
            Self::Cancelled => Some("dispatch cancelled"),
        }
    }
}

/// Name → channel table with a per-send timeout.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    channels: HashMap<String, Arc<dyn NotificationChannel>>,
    timeout: Duration,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            channels: HashMap::new(),
            timeout,
        }
    }

    /// Registers a channel under its own name, replacing any previous one.
    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        let name = channel.name().to_string();
        debug!(channel = %name, "Registered notification channel");
        self.channels.insert(name, channel);
    }

    /// Builder form of [`Dispatcher::register`].
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.register(channel);
        self
    }

    /// Returns true if a channel is registered under `name`.
    #[must_use]
    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Returns the registered channel names, sorted.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the per-send timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends `alert` to `recipient` over the channel called `channel`.
    ///
    /// Exactly one attempt is made. Transport errors, refusals and timeouts
    /// are reported as [`DispatchOutcome::Failed`]; a fired `cancel` token as
    /// [`DispatchOutcome::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::UnknownChannel` if no channel has that name.
    pub async fn dispatch(
        &self,
        channel: &str,
        alert: &AlertGroup,
        recipient: &str,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome> {
        let target = self
            .channels
            .get(channel)
            .ok_or_else(|| OnCallError::UnknownChannel {
                name: channel.to_string(),
            })?;

        if !target.is_enabled() {
            warn!(channel = %channel, fingerprint = %alert.fingerprint, "Channel disabled, notification dropped");
            return Ok(DispatchOutcome::Failed(format!("channel '{channel}' is disabled")));
        }

        info!(
            channel = %channel,
            recipient = %recipient,
            fingerprint = %alert.fingerprint,
            "Sending notification"
        );

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => DispatchOutcome::Cancelled,
            sent = tokio::time::timeout(self.timeout, target.send(alert, recipient)) => match sent {
                Err(_) => DispatchOutcome::Failed(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                )),
                Ok(Err(e)) => DispatchOutcome::Failed(e.to_string()),
                Ok(Ok(result)) if result.success => DispatchOutcome::Sent,
                Ok(Ok(result)) => DispatchOutcome::Failed(
                    result
                        .message
                        .unwrap_or_else(|| format!("channel '{channel}' refused the message")),
                ),
            },
        };

        if let DispatchOutcome::Failed(reason) = &outcome {
            warn!(
                channel = %channel,
                fingerprint = %alert.fingerprint,
                error = %reason,
                "Notification failed"
            );
        }

        Ok(outcome)
    }
}
