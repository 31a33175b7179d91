//! Concrete notification channels.
//!
//! - [`ChatChannel`]: Slack-compatible incoming webhook
//! - [`WebhookChannel`]: generic JSON POST
//! - [`EmailChannel`]: renders the message and logs it; SMTP lives elsewhere
//! - [`LogChannel`]: writes the alert to `tracing`

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::dispatch::{NotificationChannel, NotificationResult};
use crate::error::{OnCallError, Result};
use crate::types::{AlertGroup, AlertStatus};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Labels promoted to their own field in chat messages.
const CHAT_LABEL_FIELDS: [&str; 3] = ["alertname", "instance", "job"];

/// Configuration shared by the HTTP channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// The name the channel registers under.
    pub name: String,
    /// Default destination, used when a send has no recipient.
    #[serde(default)]
    pub url: String,
    /// HTTP headers to include with requests.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Timeout in seconds for HTTP requests.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    /// Whether this channel is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_enabled() -> bool {
    true
}

impl WebhookConfig {
    /// Creates a configuration with a default destination.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            headers: HashMap::new(),
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            enabled: true,
        }
    }

    /// Adds a header to the configuration.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets whether the channel is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Picks the recipient when given, the configured URL otherwise.
    fn destination<'a>(&'a self, recipient: &'a str) -> Option<&'a str> {
        if !recipient.is_empty() {
            Some(recipient)
        } else if !self.url.is_empty() {
            Some(&self.url)
        } else {
            None
        }
    }
}

/// Shared HTTP plumbing for the chat and webhook channels.
#[derive(Debug, Clone)]
struct HttpSender {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl HttpSender {
    fn new(config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OnCallError::configuration(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    /// POSTs `body` and returns the response status.
    async fn post<T: Serialize + Sync>(&self, url: &str, body: &T) -> Result<u16> {
        let mut request = self.client.post(url).json(body);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| OnCallError::NotificationFailed {
                reason: format!("{}: {e}", self.config.name),
            })?;
        Ok(response.status().as_u16())
    }
}

// ============ Chat ============

/// Slack-compatible incoming-webhook message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Headline.
    pub text: String,
    /// Coloured side panels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<ChatAttachment>,
}

/// A coloured panel of fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAttachment {
    /// Hex colour of the side bar.
    pub color: String,
    /// Title/value fields.
    pub fields: Vec<ChatField>,
}

/// One title/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatField {
    /// Field title.
    pub title: String,
    /// Field value.
    pub value: String,
    /// Whether the field can share a row.
    pub short: bool,
}

impl ChatField {
    fn new(title: impl Into<String>, value: impl Into<String>, short: bool) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short,
        }
    }
}

impl ChatMessage {
    /// Renders the chat message for an alert group.
    #[must_use]
    pub fn from_alert(alert: &AlertGroup) -> Self {
        let (icon, color) = match alert.status {
            AlertStatus::Resolved => ("✅", "#00FF00"),
            AlertStatus::Acknowledged => ("👀", "#FFFF00"),
            AlertStatus::Firing => ("🔥", severity_color(&alert.severity)),
        };

        let mut fields = vec![
            ChatField::new("Status", alert.status.as_str(), true),
            ChatField::new("Severity", &alert.severity, true),
        ];
        if !alert.description.is_empty() {
            fields.push(ChatField::new("Description", &alert.description, false));
        }
        for key in CHAT_LABEL_FIELDS {
            if let Some(value) = alert.label(key) {
                fields.push(ChatField::new(key, value, true));
            }
        }

        Self {
            text: format!("{icon} *{}* - {}", alert.severity, alert.summary),
            attachments: vec![ChatAttachment {
                color: color.to_string(),
                fields,
            }],
        }
    }
}

fn severity_color(severity: &str) -> &'static str {
    match severity {
        "critical" => "#FF0000",
        "warning" => "#FFA500",
        "info" => "#0000FF",
        _ => "#808080",
    }
}

/// Posts alerts to a Slack-compatible incoming webhook.
///
/// A non-empty recipient is used as the webhook URL, so one channel can
/// reach several rooms. Anything but `200 OK` is a failure.
#[derive(Debug, Clone)]
pub struct ChatChannel {
    http: HttpSender,
}

impl ChatChannel {
    /// Creates a chat channel.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: WebhookConfig) -> Result<Self> {
        Ok(Self {
            http: HttpSender::new(config)?,
        })
    }
}

#[async_trait]
impl NotificationChannel for ChatChannel {
    fn name(&self) -> &str {
        &self.http.config.name
    }

    async fn send(&self, alert: &AlertGroup, recipient: &str) -> Result<NotificationResult> {
        let Some(url) = self.http.config.destination(recipient) else {
            return Ok(NotificationResult::failure(self.name(), "no webhook URL configured"));
        };

        let message = ChatMessage::from_alert(alert);
        let status = self.http.post(url, &message).await?;
        if status != 200 {
            return Ok(NotificationResult::failure(
                self.name(),
                format!("chat webhook returned status {status}"),
            )
            .with_status_code(status));
        }

        info!(
            channel = %self.name(),
            fingerprint = %alert.fingerprint,
            severity = %alert.severity,
            status = %alert.status,
            "Chat notification sent"
        );
        Ok(NotificationResult::success(self.name()).with_status_code(status))
    }

    fn is_enabled(&self) -> bool {
        self.http.config.enabled
    }
}

// ============ Webhook ============

/// Generic JSON body posted by [`WebhookChannel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Alert group identity.
    pub fingerprint: String,
    /// Current status.
    pub status: AlertStatus,
    /// Severity label value.
    pub severity: String,
    /// One-line summary.
    pub summary: String,
    /// Longer description.
    pub description: String,
    /// Labels.
    pub labels: HashMap<String, String>,
    /// Annotations.
    pub annotations: HashMap<String, String>,
    /// When the group was first seen.
    pub created_at: DateTime<Utc>,
}

impl WebhookPayload {
    /// Creates a payload from an alert group.
    #[must_use]
    pub fn from_alert(alert: &AlertGroup) -> Self {
        Self {
            fingerprint: alert.fingerprint.clone(),
            status: alert.status,
            severity: alert.severity.clone(),
            summary: alert.summary.clone(),
            description: alert.description.clone(),
            labels: alert.labels.clone(),
            annotations: alert.annotations.clone(),
            created_at: alert.created_at,
        }
    }
}

/// Posts a [`WebhookPayload`] to the recipient URL. Any 2xx is a success.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    http: HttpSender,
}

impl WebhookChannel {
    /// Creates a webhook channel.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: WebhookConfig) -> Result<Self> {
        Ok(Self {
            http: HttpSender::new(config)?,
        })
    }

    /// Returns the default URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.http.config.url
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.http.config.name
    }

    async fn send(&self, alert: &AlertGroup, recipient: &str) -> Result<NotificationResult> {
        let Some(url) = self.http.config.destination(recipient) else {
            return Ok(NotificationResult::failure(self.name(), "no webhook URL configured"));
        };

        let payload = WebhookPayload::from_alert(alert);
        let status = self.http.post(url, &payload).await?;
        if !(200..300).contains(&status) {
            return Ok(NotificationResult::failure(
                self.name(),
                format!("webhook returned status {status}"),
            )
            .with_status_code(status));
        }

        debug!(channel = %self.name(), url = %url, fingerprint = %alert.fingerprint, "Webhook delivered");
        Ok(NotificationResult::success(self.name()).with_status_code(status))
    }

    fn is_enabled(&self) -> bool {
        self.http.config.enabled
    }
}

// ============ Email ============

/// Email notification channel.
///
/// Renders subject and body and logs the delivery. The SMTP transport is
/// provided by the deployment, not by this crate.
#[derive(Debug, Clone)]
pub struct EmailChannel {
    name: String,
    from: String,
    enabled: bool,
}

impl EmailChannel {
    /// Creates a new email channel.
    #[must_use]
    pub fn new(name: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            enabled: true,
        }
    }

    /// Sets whether the channel is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the sender address.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.from
    }

    /// Renders the subject line.
    #[must_use]
    pub fn subject(alert: &AlertGroup) -> String {
        format!(
            "[{}] [{}] {}",
            alert.status.as_str().to_uppercase(),
            alert.severity,
            alert.summary
        )
    }

    /// Renders the plain-text body.
    #[must_use]
    pub fn body(alert: &AlertGroup) -> String {
        let mut body = format!(
            "{}\n\nStatus: {}\nSeverity: {}\nFingerprint: {}\n",
            alert.summary, alert.status, alert.severity, alert.fingerprint
        );
        if !alert.description.is_empty() {
            body.push_str(&format!("\n{}\n", alert.description));
        }
        let mut labels: Vec<_> = alert.labels.iter().collect();
        labels.sort();
        if !labels.is_empty() {
            body.push_str("\nLabels:\n");
            for (key, value) in labels {
                body.push_str(&format!("  {key}={value}\n"));
            }
        }
        body
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &AlertGroup, recipient: &str) -> Result<NotificationResult> {
        if recipient.is_empty() {
            return Ok(NotificationResult::failure(self.name(), "email needs a recipient"));
        }

        let subject = Self::subject(alert);
        info!(
            channel = %self.name(),
            to = %recipient,
            from = %self.from,
            subject = %subject,
            fingerprint = %alert.fingerprint,
            "Email notification"
        );
        debug!(body = %Self::body(alert), "Email body");

        Ok(NotificationResult::success(self.name()).with_message(subject))
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

// ============ Log ============

/// A channel that logs notifications for debugging.
#[derive(Debug, Clone)]
pub struct LogChannel {
    name: String,
}

impl LogChannel {
    /// Creates a new log channel.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new("log")
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &AlertGroup, recipient: &str) -> Result<NotificationResult> {
        match alert.status {
            AlertStatus::Firing => {
                error!(
                    fingerprint = %alert.fingerprint,
                    recipient = %recipient,
                    severity = %alert.severity,
                    summary = %alert.summary,
                    labels = ?alert.labels,
                    "ALERT"
                );
            }
            AlertStatus::Acknowledged | AlertStatus::Resolved => {
                info!(
                    fingerprint = %alert.fingerprint,
                    recipient = %recipient,
                    status = %alert.status,
                    "ALERT UPDATE"
                );
            }
        }
        Ok(NotificationResult::success(self.name()).with_message("logged to tracing"))
    }
}
