//! Core types for the on-call system.
//!
//! This module provides the records shared by the lifecycle manager, the
//! escalation engine and the store:
//! - [`AlertStatus`] and [`AlertGroup`]: the deduplicated alert record
//! - [`EscalationChain`] and [`EscalationPolicy`]: ordered notify/wait steps
//! - [`EscalationRun`] and [`RunState`]: one execution of a chain
//! - [`Notification`]: one recorded dispatch attempt
//! - [`Integration`]: an alert source linked to a chain

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OnCallError, Result};

/// The lifecycle status of an alert group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// The source reports the condition as active.
    Firing,
    /// An operator has taken ownership.
    Acknowledged,
    /// The source (or an operator) reports the condition as over.
    Resolved,
}

impl AlertStatus {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Firing => "firing",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    /// Returns true if this status ends escalation.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Acknowledged | Self::Resolved)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = OnCallError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firing" => Ok(Self::Firing),
            "acknowledged" => Ok(Self::Acknowledged),
            "resolved" => Ok(Self::Resolved),
            other => Err(OnCallError::validation(format!("unknown alert status '{other}'"))),
        }
    }
}

/// The mutable part of an alert group, as written by one ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertFields {
    /// Reported status.
    pub status: AlertStatus,
    /// Severity taken from the `severity` label.
    pub severity: String,
    /// One-line summary.
    pub summary: String,
    /// Longer description.
    pub description: String,
    /// All labels, including the ones excluded from the fingerprint.
    pub labels: HashMap<String, String>,
    /// Annotations.
    pub annotations: HashMap<String, String>,
    /// Chain to link; `None` keeps whatever link the group already has.
    pub escalation_chain_id: Option<String>,
}

/// The deduplicated record of one logical alert condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertGroup {
    /// Identity derived from the significant labels.
    pub fingerprint: String,
    /// Current lifecycle status.
    pub status: AlertStatus,
    /// Severity label value.
    pub severity: String,
    /// One-line summary.
    pub summary: String,
    /// Longer description.
    pub description: String,
    /// Labels from the latest event.
    pub labels: HashMap<String, String>,
    /// Annotations from the latest event.
    pub annotations: HashMap<String, String>,
    /// Linked escalation chain.
    pub escalation_chain_id: Option<String>,
    /// Who acknowledged the current incident.
    pub acknowledged_by: Option<String>,
    /// When the current incident was acknowledged.
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// When the current incident was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// First time this fingerprint was seen.
    pub created_at: DateTime<Utc>,
    /// Last mutation.
    pub updated_at: DateTime<Utc>,
}

impl AlertGroup {
    /// Creates a new group from the fields of its first event.
    #[must_use]
    pub fn new(fingerprint: impl Into<String>, fields: AlertFields, now: DateTime<Utc>) -> Self {
        let mut group = Self {
            fingerprint: fingerprint.into(),
            status: fields.status,
            severity: String::new(),
            summary: String::new(),
            description: String::new(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            escalation_chain_id: None,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        group.apply(fields, now);
        group
    }

    /// Overwrites the mutable fields in place. `created_at` is untouched.
    pub fn apply(&mut self, fields: AlertFields, now: DateTime<Utc>) {
        self.transition(fields.status, None, now);
        self.severity = fields.severity;
        self.summary = fields.summary;
        self.description = fields.description;
        self.labels = fields.labels;
        self.annotations = fields.annotations;
        if fields.escalation_chain_id.is_some() {
            self.escalation_chain_id = fields.escalation_chain_id;
        }
        self.updated_at = now;
    }

    /// Moves the group to `status`, maintaining the ack/resolve timestamps.
    pub fn transition(&mut self, status: AlertStatus, actor: Option<&str>, now: DateTime<Utc>) {
        match status {
            AlertStatus::Firing => {
                if self.status.is_terminal() {
                    self.acknowledged_by = None;
                    self.acknowledged_at = None;
                    self.resolved_at = None;
                }
            }
            AlertStatus::Acknowledged => {
                if self.status != AlertStatus::Acknowledged {
                    self.acknowledged_at = Some(now);
                }
                if let Some(actor) = actor {
                    self.acknowledged_by = Some(actor.to_string());
                }
            }
            AlertStatus::Resolved => {
                if self.status != AlertStatus::Resolved || self.resolved_at.is_none() {
                    self.resolved_at = Some(now);
                }
            }
        }
        self.status = status;
        self.updated_at = now;
    }

    /// Returns a label value.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// The kind of an escalation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    /// Page whoever is on call for the schedule named by `target`.
    NotifyUser,
    /// Send to the channel named by `target`.
    NotifyChannel,
    /// Pause for `wait_seconds`.
    Wait,
}

impl PolicyType {
    /// Returns the policy type as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotifyUser => "notify_user",
            Self::NotifyChannel => "notify_channel",
            Self::Wait => "wait",
        }
    }
}

impl std::fmt::Display for PolicyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One step of an escalation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Execution order within the chain.
    pub step_number: u32,
    /// What the step does.
    pub policy_type: PolicyType,
    /// Schedule id (`notify_user`) or channel name (`notify_channel`).
    #[serde(default)]
    pub target: String,
    /// Channel used to reach the on-call user (`notify_user` only).
    #[serde(default)]
    pub channel: Option<String>,
    /// Fixed destination on the channel (`notify_channel` only).
    #[serde(default)]
    pub recipient: Option<String>,
    /// Pause length (`wait` only).
    #[serde(default)]
    pub wait_seconds: u64,
}

impl EscalationPolicy {
    /// A step paging the on-call user of `schedule_id`.
    #[must_use]
    pub fn notify_user(step_number: u32, schedule_id: impl Into<String>) -> Self {
        Self {
            step_number,
            policy_type: PolicyType::NotifyUser,
            target: schedule_id.into(),
            channel: None,
            recipient: None,
            wait_seconds: 0,
        }
    }

    /// A step posting to a fixed channel.
    #[must_use]
    pub fn notify_channel(step_number: u32, channel: impl Into<String>) -> Self {
        Self {
            step_number,
            policy_type: PolicyType::NotifyChannel,
            target: channel.into(),
            channel: None,
            recipient: None,
            wait_seconds: 0,
        }
    }

    /// A pause of `seconds`.
    #[must_use]
    pub fn wait(step_number: u32, seconds: u64) -> Self {
        Self {
            step_number,
            policy_type: PolicyType::Wait,
            target: String::new(),
            channel: None,
            recipient: None,
            wait_seconds: seconds,
        }
    }

    /// Sets the channel used to reach the on-call user.
    #[must_use]
    pub fn via(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Sets the fixed recipient of a channel step.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Returns the wait length as a [`Duration`].
    #[must_use]
    pub const fn wait_duration(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }
}

/// An ordered list of escalation steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationChain {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Steps, in any order; execution follows `step_number`.
    pub policies: Vec<EscalationPolicy>,
}

impl EscalationChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            policies: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, policy: EscalationPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Checks that the chain can be executed.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Configuration` if the chain has no steps, two
    /// steps share a step number, or a notify step has no target.
    pub fn validate(&self) -> Result<()> {
        if self.policies.is_empty() {
            return Err(OnCallError::configuration(format!(
                "escalation chain '{}' has no steps",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for policy in &self.policies {
            if !seen.insert(policy.step_number) {
                return Err(OnCallError::configuration(format!(
                    "escalation chain '{}' repeats step number {}",
                    self.id, policy.step_number
                )));
            }
            if policy.policy_type != PolicyType::Wait && policy.target.is_empty() {
                return Err(OnCallError::configuration(format!(
                    "step {} of chain '{}' ({}) has no target",
                    policy.step_number, self.id, policy.policy_type
                )));
            }
        }

        Ok(())
    }

    /// Returns the steps sorted by step number after validating the chain.
    ///
    /// # Errors
    ///
    /// Same as [`EscalationChain::validate`].
    pub fn ordered_steps(&self) -> Result<Vec<EscalationPolicy>> {
        self.validate()?;
        let mut steps = self.policies.clone();
        steps.sort_by_key(|p| p.step_number);
        Ok(steps)
    }
}

/// States of an escalation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, no step executed yet.
    Pending,
    /// A notify step is being dispatched.
    Notifying,
    /// A wait step's timer is running.
    Waiting,
    /// Stopped because the alert was acknowledged.
    StoppedAcknowledged,
    /// Stopped because the alert was resolved.
    StoppedResolved,
    /// Stopped after the last step, or on a structural failure.
    StoppedExhausted,
}

impl RunState {
    /// Returns the state as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Notifying => "notifying",
            Self::Waiting => "waiting",
            Self::StoppedAcknowledged => "stopped_acknowledged",
            Self::StoppedResolved => "stopped_resolved",
            Self::StoppedExhausted => "stopped_exhausted",
        }
    }

    /// Returns true for the three stopped states.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::StoppedAcknowledged | Self::StoppedResolved | Self::StoppedExhausted
        )
    }

    /// The stopped state matching a terminal alert status.
    #[must_use]
    pub const fn stopped_by(status: AlertStatus) -> Option<Self> {
        match status {
            AlertStatus::Acknowledged => Some(Self::StoppedAcknowledged),
            AlertStatus::Resolved => Some(Self::StoppedResolved),
            AlertStatus::Firing => None,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One execution of an escalation chain for one alert group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRun {
    /// Unique identifier.
    pub id: String,
    /// The alert group being escalated.
    pub fingerprint: String,
    /// The chain being executed.
    pub chain_id: String,
    /// Index into the ordered steps of the next step to execute.
    pub step_index: usize,
    /// Current state.
    pub state: RunState,
    /// When the run was created.
    pub started_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
    /// When the running wait step ends.
    pub due_at: Option<DateTime<Utc>>,
    /// Structural failure that stopped the run.
    pub error: Option<String>,
}

impl EscalationRun {
    /// Creates a pending run.
    #[must_use]
    pub fn new(fingerprint: impl Into<String>, chain_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            fingerprint: fingerprint.into(),
            chain_id: chain_id.into(),
            step_index: 0,
            state: RunState::Pending,
            started_at: now,
            updated_at: now,
            due_at: None,
            error: None,
        }
    }

    /// Returns true while the run can still act.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Moves to `state`, clearing any wait deadline.
    pub fn enter(&mut self, state: RunState) {
        self.state = state;
        self.due_at = None;
        self.updated_at = Utc::now();
    }
}

/// Delivery status of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    /// Recorded, dispatch in flight.
    Pending,
    /// The channel accepted the message.
    Sent,
    /// Delivery failed; `error` says why.
    Failed,
}

impl NotificationStatus {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Returns true once the attempt has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A record of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier.
    pub id: String,
    /// Fingerprint of the alert group notified about.
    pub alert_fingerprint: String,
    /// Escalation run that issued the dispatch.
    pub run_id: Option<String>,
    /// Channel name.
    pub channel: String,
    /// Recipient on that channel.
    pub recipient: String,
    /// Delivery status.
    pub status: NotificationStatus,
    /// Failure reason.
    pub error: Option<String>,
    /// When the channel accepted the message.
    pub sent_at: Option<DateTime<Utc>>,
    /// When the attempt was recorded.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Creates a pending notification.
    #[must_use]
    pub fn pending(
        alert_fingerprint: impl Into<String>,
        channel: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            alert_fingerprint: alert_fingerprint.into(),
            run_id: None,
            channel: channel.into(),
            recipient: recipient.into(),
            status: NotificationStatus::Pending,
            error: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }

    /// Attaches the issuing run.
    #[must_use]
    pub fn for_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// The kind of system an integration receives alerts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationKind {
    /// Prometheus Alertmanager webhook receiver.
    Prometheus,
    /// Grafana alerting contact point.
    Grafana,
    /// Generic JSON webhook.
    Webhook,
}

/// An alert source and the chain its alerts escalate through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Source kind.
    pub kind: IntegrationKind,
    /// Source-specific settings.
    #[serde(default)]
    pub config: HashMap<String, String>,
    /// Chain linked to alerts from this source.
    pub escalation_chain_id: Option<String>,
}

impl Integration {
    /// Creates an integration without a linked chain.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: IntegrationKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            config: HashMap::new(),
            escalation_chain_id: None,
        }
    }

    /// Links a chain.
    #[must_use]
    pub fn with_chain(mut self, chain_id: impl Into<String>) -> Self {
        self.escalation_chain_id = Some(chain_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(status: AlertStatus) -> AlertFields {
        AlertFields {
            status,
            severity: "critical".to_string(),
            summary: "Disk almost full".to_string(),
            description: String::new(),
            labels: HashMap::from([("alertname".to_string(), "DiskFull".to_string())]),
            annotations: HashMap::new(),
            escalation_chain_id: None,
        }
    }

    mod status_tests {
        use super::*;

        #[test]
        fn status_as_str() {
            assert_eq!(AlertStatus::Firing.as_str(), "firing");
            assert_eq!(AlertStatus::Acknowledged.as_str(), "acknowledged");
            assert_eq!(AlertStatus::Resolved.as_str(), "resolved");
        }

        #[test]
        fn status_terminal() {
            assert!(!AlertStatus::Firing.is_terminal());
            assert!(AlertStatus::Acknowledged.is_terminal());
            assert!(AlertStatus::Resolved.is_terminal());
        }

        #[test]
        fn status_parse() {
            assert_eq!("firing".parse::<AlertStatus>().unwrap(), AlertStatus::Firing);
            assert_eq!(" RESOLVED ".parse::<AlertStatus>().unwrap(), AlertStatus::Resolved);
            assert!(matches!(
                "pending".parse::<AlertStatus>(),
                Err(OnCallError::Validation { .. })
            ));
        }

        #[test]
        fn status_serializes_lowercase() {
            let json = serde_json::to_string(&AlertStatus::Acknowledged).unwrap();
            assert_eq!(json, "\"acknowledged\"");
        }
    }

    mod alert_group_tests {
        use super::*;
        use chrono::Duration as ChronoDuration;

        #[test]
        fn apply_preserves_created_at() {
            let t0 = Utc::now();
            let mut group = AlertGroup::new("fp", fields(AlertStatus::Firing), t0);
            let t1 = t0 + ChronoDuration::seconds(30);

            group.apply(fields(AlertStatus::Resolved), t1);

            assert_eq!(group.created_at, t0);
            assert_eq!(group.updated_at, t1);
            assert_eq!(group.status, AlertStatus::Resolved);
            assert_eq!(group.resolved_at, Some(t1));
        }

        #[test]
        fn refire_clears_incident_fields() {
            let t0 = Utc::now();
            let mut group = AlertGroup::new("fp", fields(AlertStatus::Firing), t0);
            group.transition(AlertStatus::Acknowledged, Some("alice"), t0);
            assert_eq!(group.acknowledged_by.as_deref(), Some("alice"));

            group.apply(fields(AlertStatus::Firing), t0);

            assert_eq!(group.status, AlertStatus::Firing);
            assert!(group.acknowledged_by.is_none());
            assert!(group.acknowledged_at.is_none());
            assert!(group.resolved_at.is_none());
        }

        #[test]
        fn apply_keeps_chain_link_when_absent() {
            let t0 = Utc::now();
            let mut first = fields(AlertStatus::Firing);
            first.escalation_chain_id = Some("primary".to_string());
            let mut group = AlertGroup::new("fp", first, t0);

            group.apply(fields(AlertStatus::Firing), t0);
            assert_eq!(group.escalation_chain_id.as_deref(), Some("primary"));
        }

        #[test]
        fn label_lookup() {
            let group = AlertGroup::new("fp", fields(AlertStatus::Firing), Utc::now());
            assert_eq!(group.label("alertname"), Some("DiskFull"));
            assert_eq!(group.label("instance"), None);
        }
    }

    mod chain_tests {
        use super::*;

        #[test]
        fn ordered_steps_sorts_by_step_number() {
            let chain = EscalationChain::new("c1", "Primary")
                .step(EscalationPolicy::wait(2, 300))
                .step(EscalationPolicy::notify_user(1, "sre"))
                .step(EscalationPolicy::notify_channel(3, "chat"));

            let steps = chain.ordered_steps().unwrap();
            let numbers: Vec<u32> = steps.iter().map(|s| s.step_number).collect();
            assert_eq!(numbers, vec![1, 2, 3]);
        }

        #[test]
        fn empty_chain_rejected() {
            let chain = EscalationChain::new("c1", "Empty");
            assert!(matches!(
                chain.validate(),
                Err(OnCallError::Configuration { .. })
            ));
        }

        #[test]
        fn duplicate_step_numbers_rejected() {
            let chain = EscalationChain::new("c1", "Dup")
                .step(EscalationPolicy::notify_user(1, "sre"))
                .step(EscalationPolicy::wait(1, 60));
            match chain.validate() {
                Err(OnCallError::Configuration { reason }) => {
                    assert!(reason.contains("repeats step number 1"));
                }
                other => panic!("expected Configuration error, got {other:?}"),
            }
        }

        #[test]
        fn notify_without_target_rejected() {
            let chain =
                EscalationChain::new("c1", "NoTarget").step(EscalationPolicy::notify_user(1, ""));
            assert!(chain.validate().is_err());
        }

        #[test]
        fn policy_builders() {
            let step = EscalationPolicy::notify_user(1, "sre").via("chat");
            assert_eq!(step.channel.as_deref(), Some("chat"));

            let step = EscalationPolicy::notify_channel(2, "webhook").to("https://hooks.example.com");
            assert_eq!(step.recipient.as_deref(), Some("https://hooks.example.com"));

            assert_eq!(EscalationPolicy::wait(3, 90).wait_duration(), Duration::from_secs(90));
        }

        #[test]
        fn policy_type_serde_snake_case() {
            let json = serde_json::to_string(&PolicyType::NotifyChannel).unwrap();
            assert_eq!(json, "\"notify_channel\"");
            let parsed: EscalationPolicy = serde_json::from_str(
                r#"{"step_number": 1, "policy_type": "wait", "wait_seconds": 30}"#,
            )
            .unwrap();
            assert_eq!(parsed, EscalationPolicy::wait(1, 30));
        }
    }

    mod run_tests {
        use super::*;

        #[test]
        fn run_state_terminal() {
            assert!(!RunState::Pending.is_terminal());
            assert!(!RunState::Notifying.is_terminal());
            assert!(!RunState::Waiting.is_terminal());
            assert!(RunState::StoppedAcknowledged.is_terminal());
            assert!(RunState::StoppedResolved.is_terminal());
            assert!(RunState::StoppedExhausted.is_terminal());
        }

        #[test]
        fn stopped_by_status() {
            assert_eq!(
                RunState::stopped_by(AlertStatus::Acknowledged),
                Some(RunState::StoppedAcknowledged)
            );
            assert_eq!(
                RunState::stopped_by(AlertStatus::Resolved),
                Some(RunState::StoppedResolved)
            );
            assert_eq!(RunState::stopped_by(AlertStatus::Firing), None);
        }

        #[test]
        fn new_run_is_pending() {
            let run = EscalationRun::new("fp", "c1");
            assert_eq!(run.state, RunState::Pending);
            assert_eq!(run.step_index, 0);
            assert!(run.is_active());
        }

        #[test]
        fn enter_clears_deadline() {
            let mut run = EscalationRun::new("fp", "c1");
            run.due_at = Some(Utc::now());
            run.enter(RunState::StoppedResolved);
            assert!(run.due_at.is_none());
            assert!(!run.is_active());
        }
    }

    mod notification_tests {
        use super::*;

        #[test]
        fn pending_notification() {
            let n = Notification::pending("fp", "email", "alice@example.com").for_run("run-1");
            assert_eq!(n.status, NotificationStatus::Pending);
            assert_eq!(n.run_id.as_deref(), Some("run-1"));
            assert!(n.sent_at.is_none());
        }

        #[test]
        fn notification_status_terminal() {
            assert!(!NotificationStatus::Pending.is_terminal());
            assert!(NotificationStatus::Sent.is_terminal());
            assert!(NotificationStatus::Failed.is_terminal());
        }
    }

    mod integration_tests {
        use super::*;

        #[test]
        fn integration_with_chain() {
            let integration = Integration::new("prom", "Prometheus", IntegrationKind::Prometheus)
                .with_chain("primary");
            assert_eq!(integration.escalation_chain_id.as_deref(), Some("primary"));
        }
    }
}
