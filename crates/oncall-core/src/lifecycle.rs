//! Alert lifecycle manager.
//!
//! This module provides the [`AlertLifecycle`] which is the entry point for
//! inbound alerts and operator actions. It turns raw events into deduplicated
//! alert groups and tells the escalation engine when an incident starts or
//! ends.
//!
//! Status policy:
//! - sources may only report `firing` or `resolved`
//! - `acknowledged` is reachable only through [`AlertLifecycle::acknowledge`]
//! - `firing` after `resolved`/`acknowledged` is a new incident and starts a
//!   fresh escalation run; `firing` while firing does not
//! - `resolved` always stops the active run
//!
//! Every write for one fingerprint holds that fingerprint's lock from the
//! store write until the escalation engine has been told about it, so the
//! engine sees status changes in commit order.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::OnCallConfig;
use crate::directory::Directory;
use crate::error::{OnCallError, Result};
use crate::escalation::{EscalationEngine, StartOutcome};
use crate::fingerprint::{SEVERITY_LABEL, fingerprint};
use crate::store::AlertStore;
use crate::types::{AlertFields, AlertGroup, AlertStatus};
use crate::webhook::{AlertEvent, PrometheusWebhook};

const SUMMARY_ANNOTATION: &str = "summary";
const DESCRIPTION_ANNOTATION: &str = "description";
const ALERTNAME_LABEL: &str = "alertname";

/// What one ingestion did.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// The group after the write.
    pub group: AlertGroup,
    /// True if the fingerprint was seen for the first time.
    pub created: bool,
    /// Status before the write, `None` when created.
    pub previous_status: Option<AlertStatus>,
    /// Set when the event opened an incident on a linked group.
    pub escalation: Option<StartOutcome>,
    /// True if the event stopped a live escalation run.
    pub stopped_escalation: bool,
}

impl IngestOutcome {
    /// Returns true if this event started a new incident.
    #[must_use]
    pub fn opened_incident(&self) -> bool {
        self.group.status == AlertStatus::Firing
            && (self.created || self.previous_status.is_some_and(|s| s.is_terminal()))
    }
}

/// Ingests alerts and applies operator actions.
#[derive(Debug, Clone)]
pub struct AlertLifecycle {
    store: Arc<dyn AlertStore>,
    engine: EscalationEngine,
    directory: Directory,
    config: OnCallConfig,
    /// fingerprint -> write lock. Groups are never deleted, so neither are
    /// their locks.
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl AlertLifecycle {
    /// Creates a lifecycle manager.
    #[must_use]
    pub fn new(
        store: Arc<dyn AlertStore>,
        engine: EscalationEngine,
        directory: Directory,
        config: OnCallConfig,
    ) -> Self {
        Self {
            store,
            engine,
            directory,
            config,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the escalation engine.
    #[must_use]
    pub fn engine(&self) -> &EscalationEngine {
        &self.engine
    }

    // ============ Ingestion ============

    /// Ingests one event with no integration context.
    ///
    /// An existing chain link on the group is kept.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Validation` for an empty label set or a status
    /// other than `firing`/`resolved`, and `OnCallError::Storage` if the
    /// write cannot be committed.
    pub async fn ingest(&self, event: AlertEvent) -> Result<IngestOutcome> {
        self.ingest_linked(event, None).await
    }

    /// Ingests one event received through `integration_id`, linking the group
    /// to the integration's escalation chain.
    ///
    /// # Errors
    ///
    /// As [`AlertLifecycle::ingest`], plus `OnCallError::Configuration` for an
    /// unknown integration.
    pub async fn ingest_via(
        &self,
        integration_id: &str,
        event: AlertEvent,
    ) -> Result<IngestOutcome> {
        let chain_id = self.integration_chain(integration_id)?;
        self.ingest_linked(event, chain_id).await
    }

    /// Ingests every alert of an Alertmanager webhook concurrently.
    ///
    /// Alerts are independent: one failing does not affect the others. The
    /// results are in payload order.
    pub async fn ingest_webhook(&self, payload: PrometheusWebhook) -> Vec<Result<IngestOutcome>> {
        self.ingest_batch(payload, None).await
    }

    /// [`AlertLifecycle::ingest_webhook`] for a webhook received through an
    /// integration.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Configuration` for an unknown integration.
    pub async fn ingest_webhook_via(
        &self,
        integration_id: &str,
        payload: PrometheusWebhook,
    ) -> Result<Vec<Result<IngestOutcome>>> {
        let chain_id = self.integration_chain(integration_id)?;
        Ok(self.ingest_batch(payload, chain_id).await)
    }

    async fn ingest_batch(
        &self,
        payload: PrometheusWebhook,
        chain_id: Option<String>,
    ) -> Vec<Result<IngestOutcome>> {
        debug!(
            group_key = %payload.group_key,
            alerts = payload.alerts.len(),
            "Processing alert webhook"
        );
        let ingestions = payload
            .into_events()
            .into_iter()
            .map(|event| self.ingest_linked(event, chain_id.clone()));
        join_all(ingestions).await
    }

    fn integration_chain(&self, integration_id: &str) -> Result<Option<String>> {
        self.directory
            .integration(integration_id)
            .map(|i| i.escalation_chain_id)
            .ok_or_else(|| {
                OnCallError::configuration(format!("unknown integration '{integration_id}'"))
            })
    }

    async fn ingest_linked(
        &self,
        event: AlertEvent,
        chain_id: Option<String>,
    ) -> Result<IngestOutcome> {
        let status = self.reported_status(&event)?;
        if event.labels.is_empty() && self.config.reject_empty_labels {
            return Err(OnCallError::validation(
                "alert has no labels and cannot be deduplicated",
            ));
        }

        let fp = fingerprint(&event.labels);
        let fields = self.derive_fields(event, status, chain_id);
        let _guard = self.lock_fingerprint(&fp).await;
        let upsert = self.store.upsert_alert_group(&fp, fields).await?;

        let mut outcome = IngestOutcome {
            group: upsert.group,
            created: upsert.created,
            previous_status: upsert.previous_status,
            escalation: None,
            stopped_escalation: false,
        };

        match status {
            AlertStatus::Firing if outcome.opened_incident() => {
                info!(
                    fingerprint = %fp,
                    severity = %outcome.group.severity,
                    created = outcome.created,
                    "Incident opened"
                );
                outcome.escalation = Some(self.engine.start(&outcome.group).await?);
            }
            AlertStatus::Firing => {
                debug!(fingerprint = %fp, "Alert still firing");
            }
            AlertStatus::Resolved | AlertStatus::Acknowledged => {
                outcome.stopped_escalation = self.engine.on_status_change(&fp, status);
                info!(fingerprint = %fp, "Alert resolved by source");
            }
        }

        Ok(outcome)
    }

    fn reported_status(&self, event: &AlertEvent) -> Result<AlertStatus> {
        match event.status.parse::<AlertStatus>()? {
            AlertStatus::Acknowledged => Err(OnCallError::validation(
                "sources may only report 'firing' or 'resolved'",
            )),
            status => Ok(status),
        }
    }

    fn derive_fields(
        &self,
        event: AlertEvent,
        status: AlertStatus,
        escalation_chain_id: Option<String>,
    ) -> AlertFields {
        let non_empty = |v: &&String| !v.is_empty();

        let severity = event
            .labels
            .get(SEVERITY_LABEL)
            .filter(non_empty)
            .cloned()
            .unwrap_or_else(|| self.config.default_severity.clone());
        let summary = event
            .annotations
            .get(SUMMARY_ANNOTATION)
            .filter(non_empty)
            .or_else(|| event.labels.get(ALERTNAME_LABEL))
            .cloned()
            .unwrap_or_default();
        let description = event
            .annotations
            .get(DESCRIPTION_ANNOTATION)
            .cloned()
            .unwrap_or_default();

        AlertFields {
            status,
            severity,
            summary,
            description,
            labels: event.labels,
            annotations: event.annotations,
            escalation_chain_id,
        }
    }

    // ============ Operator actions ============

    /// Acknowledges an alert on behalf of `actor`, stopping its escalation.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::AlertNotFound` for an unknown fingerprint and
    /// `OnCallError::Validation` if the alert is already resolved.
    pub async fn acknowledge(&self, fingerprint: &str, actor: &str) -> Result<AlertGroup> {
        let _guard = self.lock_fingerprint(fingerprint).await;
        let group = self
            .store
            .acknowledge_alert_group(fingerprint, actor)
            .await
            .inspect_err(|e| {
                if matches!(e, OnCallError::AlertNotFound { .. }) {
                    warn!(fingerprint = %fingerprint, "Operator action on unknown alert");
                }
            })?;
        self.engine
            .on_status_change(fingerprint, AlertStatus::Acknowledged);
        info!(fingerprint = %fingerprint, actor = %actor, "Alert acknowledged");
        Ok(group)
    }

    /// Resolves an alert on behalf of `actor`, stopping its escalation.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::AlertNotFound` for an unknown fingerprint.
    pub async fn resolve(&self, fingerprint: &str, actor: &str) -> Result<AlertGroup> {
        let _guard = self.lock_fingerprint(fingerprint).await;
        let group = self
            .store
            .set_status(fingerprint, AlertStatus::Resolved, Some(actor))
            .await?;
        self.engine.on_status_change(fingerprint, AlertStatus::Resolved);
        info!(fingerprint = %fingerprint, actor = %actor, "Alert resolved by operator");
        Ok(group)
    }

    // ============ Queries ============

    /// Returns the alert group for a fingerprint.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Storage` if the store cannot be read.
    pub async fn get(&self, fingerprint: &str) -> Result<Option<AlertGroup>> {
        self.store.get_alert_group(fingerprint).await
    }

    /// Lists alert groups, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Storage` if the store cannot be read.
    pub async fn list(&self, status: Option<AlertStatus>) -> Result<Vec<AlertGroup>> {
        self.store.list_alert_groups(status).await
    }

    async fn lock_fingerprint(&self, fingerprint: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            self.locks
                .lock()
                .entry(fingerprint.to_string())
                .or_default(),
        );
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::channels::LogChannel;
    use crate::store::{MemoryStore, UpsertOutcome};
    use crate::types::{
        EscalationChain, EscalationPolicy, EscalationRun, Integration, IntegrationKind,
        Notification, NotificationStatus, RunState,
    };
    use crate::webhook::PrometheusAlert;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    /// A [`MemoryStore`] that lets another writer's commit land at awkward
    /// moments.
    #[derive(Debug, Default)]
    struct ScriptedStore {
        inner: MemoryStore,
        /// Pause after committing a `resolved` upsert.
        resolve_delay: Duration,
        /// Commit a resolution right before every acknowledgment.
        resolve_before_ack: bool,
    }

    #[async_trait]
    impl AlertStore for ScriptedStore {
        async fn upsert_alert_group(
            &self,
            fingerprint: &str,
            fields: AlertFields,
        ) -> Result<UpsertOutcome> {
            let resolved = fields.status == AlertStatus::Resolved;
            let outcome = self.inner.upsert_alert_group(fingerprint, fields).await?;
            if resolved {
                tokio::time::sleep(self.resolve_delay).await;
            }
            Ok(outcome)
        }

        async fn get_alert_group(&self, fingerprint: &str) -> Result<Option<AlertGroup>> {
            self.inner.get_alert_group(fingerprint).await
        }

        async fn list_alert_groups(&self, status: Option<AlertStatus>) -> Result<Vec<AlertGroup>> {
            self.inner.list_alert_groups(status).await
        }

        async fn acknowledge_alert_group(
            &self,
            fingerprint: &str,
            actor: &str,
        ) -> Result<AlertGroup> {
            if self.resolve_before_ack {
                self.inner
                    .set_status(fingerprint, AlertStatus::Resolved, None)
                    .await?;
            }
            self.inner.acknowledge_alert_group(fingerprint, actor).await
        }

        async fn set_status(
            &self,
            fingerprint: &str,
            status: AlertStatus,
            actor: Option<&str>,
        ) -> Result<AlertGroup> {
            self.inner.set_status(fingerprint, status, actor).await
        }

        async fn record_notification(&self, notification: Notification) -> Result<String> {
            self.inner.record_notification(notification).await
        }

        async fn complete_notification(
            &self,
            id: &str,
            status: NotificationStatus,
            error: Option<String>,
        ) -> Result<Notification> {
            self.inner.complete_notification(id, status, error).await
        }

        async fn notifications_for(&self, fingerprint: &str) -> Result<Vec<Notification>> {
            self.inner.notifications_for(fingerprint).await
        }

        async fn save_run(&self, run: &EscalationRun) -> Result<()> {
            self.inner.save_run(run).await
        }

        async fn get_run(&self, id: &str) -> Result<Option<EscalationRun>> {
            self.inner.get_run(id).await
        }

        async fn runs_for(&self, fingerprint: &str) -> Result<Vec<EscalationRun>> {
            self.inner.runs_for(fingerprint).await
        }

        async fn unfinished_runs(&self) -> Result<Vec<EscalationRun>> {
            self.inner.unfinished_runs().await
        }
    }

    fn lifecycle_with(config: OnCallConfig) -> (AlertLifecycle, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (build(store.clone(), config), store)
    }

    fn build(store: Arc<dyn AlertStore>, config: OnCallConfig) -> AlertLifecycle {
        let directory = Directory::new();
        directory
            .upsert_chain(
                EscalationChain::new("primary", "Primary")
                    .step(EscalationPolicy::notify_channel(1, "log"))
                    .step(EscalationPolicy::wait(2, 600)),
            )
            .unwrap();
        directory
            .upsert_integration(
                Integration::new("prom", "Prometheus", IntegrationKind::Prometheus)
                    .with_chain("primary"),
            )
            .unwrap();

        let dispatcher =
            Dispatcher::new(Duration::from_secs(5)).with_channel(Arc::new(LogChannel::default()));
        let engine = EscalationEngine::new(
            store.clone(),
            directory.clone(),
            dispatcher,
            config.clone(),
        );
        AlertLifecycle::new(store, engine, directory, config)
    }

    fn lifecycle() -> (AlertLifecycle, Arc<MemoryStore>) {
        lifecycle_with(OnCallConfig::default())
    }

    fn cpu_event(status: &str) -> AlertEvent {
        AlertEvent::new(status)
            .label("alertname", "HighCPU")
            .label("instance", "node-1")
    }

    mod derivation_tests {
        use super::*;

        #[tokio::test]
        async fn defaults_when_labels_sparse() {
            let (lifecycle, _) = lifecycle();
            let outcome = lifecycle.ingest(cpu_event("firing")).await.unwrap();

            assert!(outcome.created);
            assert_eq!(outcome.group.severity, "info");
            assert_eq!(outcome.group.summary, "HighCPU");
            assert_eq!(outcome.group.description, "");
            assert_eq!(outcome.group.fingerprint, fingerprint(&outcome.group.labels));
        }

        #[tokio::test]
        async fn annotations_take_precedence() {
            let (lifecycle, _) = lifecycle();
            let event = cpu_event("firing")
                .label("severity", "critical")
                .annotation("summary", "CPU above 90%")
                .annotation("description", "for 10 minutes");
            let group = lifecycle.ingest(event).await.unwrap().group;

            assert_eq!(group.severity, "critical");
            assert_eq!(group.summary, "CPU above 90%");
            assert_eq!(group.description, "for 10 minutes");
        }

        #[tokio::test]
        async fn empty_severity_uses_default() {
            let (lifecycle, _) = lifecycle();
            let group = lifecycle
                .ingest(cpu_event("firing").label("severity", ""))
                .await
                .unwrap()
                .group;
            assert_eq!(group.severity, "info");
        }

        #[tokio::test]
        async fn summary_empty_without_alertname() {
            let (lifecycle, _) = lifecycle();
            let group = lifecycle
                .ingest(AlertEvent::firing().label("job", "node"))
                .await
                .unwrap()
                .group;
            assert_eq!(group.summary, "");
        }
    }

    mod validation_tests {
        use super::*;

        #[tokio::test]
        async fn empty_labels_rejected() {
            let (lifecycle, store) = lifecycle();
            let result = lifecycle.ingest(AlertEvent::firing()).await;
            assert!(matches!(result, Err(OnCallError::Validation { .. })));
            assert!(store.list_alert_groups(None).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn empty_labels_accepted_when_configured() {
            let (lifecycle, _) = lifecycle_with(OnCallConfig {
                reject_empty_labels: false,
                ..OnCallConfig::default()
            });
            let outcome = lifecycle.ingest(AlertEvent::firing()).await.unwrap();
            assert_eq!(outcome.group.fingerprint, "e3b0c44298fc1c14");
        }

        #[tokio::test]
        async fn acknowledged_status_from_source_rejected() {
            let (lifecycle, _) = lifecycle();
            let result = lifecycle.ingest(cpu_event("acknowledged")).await;
            assert!(matches!(result, Err(OnCallError::Validation { .. })));
        }

        #[tokio::test]
        async fn unknown_status_rejected() {
            let (lifecycle, _) = lifecycle();
            let result = lifecycle.ingest(cpu_event("pending")).await;
            assert!(matches!(result, Err(OnCallError::Validation { .. })));
        }

        #[tokio::test]
        async fn unknown_integration() {
            let (lifecycle, _) = lifecycle();
            let result = lifecycle.ingest_via("nope", cpu_event("firing")).await;
            assert!(matches!(result, Err(OnCallError::Configuration { .. })));
        }
    }

    mod dedup_tests {
        use super::*;

        #[tokio::test]
        async fn same_labels_one_group() {
            let (lifecycle, store) = lifecycle();
            let first = lifecycle.ingest(cpu_event("firing")).await.unwrap();
            let second = lifecycle
                .ingest(cpu_event("firing").label("severity", "critical"))
                .await
                .unwrap();

            assert!(first.created);
            assert!(!second.created);
            assert_eq!(first.group.fingerprint, second.group.fingerprint);
            assert_eq!(second.group.created_at, first.group.created_at);
            assert_eq!(second.group.severity, "critical");
            assert_eq!(store.list_alert_groups(None).await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn webhook_batch_processed_concurrently() {
            let (lifecycle, store) = lifecycle();
            let alert = |instance: &str, status: &str| PrometheusAlert {
                status: status.to_string(),
                labels: HashMap::from([
                    ("alertname".to_string(), "HighCPU".to_string()),
                    ("instance".to_string(), instance.to_string()),
                ]),
                ..PrometheusAlert::default()
            };
            let payload = PrometheusWebhook {
                alerts: vec![
                    alert("node-1", "firing"),
                    alert("node-2", "firing"),
                    alert("node-3", "bogus"),
                ],
                ..PrometheusWebhook::default()
            };

            let results = lifecycle.ingest_webhook(payload).await;
            assert_eq!(results.len(), 3);
            assert!(results[0].is_ok());
            assert!(results[1].is_ok());
            assert!(matches!(results[2], Err(OnCallError::Validation { .. })));
            assert_eq!(store.list_alert_groups(None).await.unwrap().len(), 2);
        }
    }

    mod incident_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn integration_links_chain_and_starts_run() {
            let (lifecycle, _) = lifecycle();
            let outcome = lifecycle
                .ingest_via("prom", cpu_event("firing"))
                .await
                .unwrap();

            assert_eq!(outcome.group.escalation_chain_id.as_deref(), Some("primary"));
            assert!(matches!(outcome.escalation, Some(StartOutcome::Started(_))));
            assert!(lifecycle.engine().run_for(&outcome.group.fingerprint).is_some());
        }

        #[tokio::test]
        async fn unlinked_alert_has_no_escalation() {
            let (lifecycle, _) = lifecycle();
            let outcome = lifecycle.ingest(cpu_event("firing")).await.unwrap();
            assert_eq!(outcome.escalation, Some(StartOutcome::NotLinked));
        }

        #[tokio::test(start_paused = true)]
        async fn refiring_while_firing_does_not_restart() {
            let (lifecycle, store) = lifecycle();
            let first = lifecycle.ingest_via("prom", cpu_event("firing")).await.unwrap();
            let second = lifecycle.ingest(cpu_event("firing")).await.unwrap();

            assert!(second.escalation.is_none());
            // the chain link survives an event without integration context
            assert_eq!(second.group.escalation_chain_id.as_deref(), Some("primary"));
            let runs = store.runs_for(&first.group.fingerprint).await.unwrap();
            assert_eq!(runs.len(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn resolved_event_stops_run_and_refire_opens_new_incident() {
            let (lifecycle, store) = lifecycle();
            let first = lifecycle.ingest_via("prom", cpu_event("firing")).await.unwrap();
            let fp = first.group.fingerprint.clone();
            let first_run = first.escalation.as_ref().and_then(|s| s.run_id()).unwrap().to_string();

            let resolved = lifecycle.ingest(cpu_event("resolved")).await.unwrap();
            assert!(resolved.stopped_escalation);
            assert!(resolved.group.resolved_at.is_some());
            let run = lifecycle.engine().wait_for(&first_run).await.unwrap().unwrap();
            assert_eq!(run.state, RunState::StoppedResolved);

            let refired = lifecycle.ingest(cpu_event("firing")).await.unwrap();
            assert!(refired.opened_incident());
            assert!(refired.group.resolved_at.is_none());
            assert!(matches!(refired.escalation, Some(StartOutcome::Started(ref id)) if *id != first_run));
            assert_eq!(store.runs_for(&fp).await.unwrap().len(), 2);
        }
    }

    mod ordering_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn refire_racing_resolve_gets_fresh_run() {
            let store = Arc::new(ScriptedStore {
                resolve_delay: Duration::from_millis(50),
                ..ScriptedStore::default()
            });
            let lifecycle = build(store, OnCallConfig::default());
            let first = lifecycle.ingest_via("prom", cpu_event("firing")).await.unwrap();
            let fp = first.group.fingerprint.clone();
            let first_run = first
                .escalation
                .as_ref()
                .and_then(StartOutcome::run_id)
                .unwrap()
                .to_string();

            let (resolved, refired) = tokio::join!(
                lifecycle.ingest(cpu_event("resolved")),
                async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    lifecycle.ingest(cpu_event("firing")).await
                }
            );
            let resolved = resolved.unwrap();
            let refired = refired.unwrap();

            assert!(resolved.stopped_escalation);
            assert_eq!(refired.previous_status, Some(AlertStatus::Resolved));
            let second_run = match refired.escalation {
                Some(StartOutcome::Started(id)) => id,
                other => panic!("expected a fresh run, got {other:?}"),
            };
            assert_ne!(second_run, first_run);
            assert_eq!(lifecycle.engine().run_for(&fp), Some(second_run));

            let group = lifecycle.get(&fp).await.unwrap().unwrap();
            assert_eq!(group.status, AlertStatus::Firing);
            let old = lifecycle.engine().wait_for(&first_run).await.unwrap().unwrap();
            assert_eq!(old.state, RunState::StoppedResolved);
        }

        #[tokio::test]
        async fn acknowledge_never_overwrites_resolution() {
            let store = Arc::new(ScriptedStore {
                resolve_before_ack: true,
                ..ScriptedStore::default()
            });
            let lifecycle = build(store, OnCallConfig::default());
            let fp = lifecycle.ingest(cpu_event("firing")).await.unwrap().group.fingerprint;

            let result = lifecycle.acknowledge(&fp, "alice").await;
            assert!(matches!(result, Err(OnCallError::Validation { .. })));

            let group = lifecycle.get(&fp).await.unwrap().unwrap();
            assert_eq!(group.status, AlertStatus::Resolved);
            assert!(group.resolved_at.is_some());
            assert!(group.acknowledged_by.is_none());
        }
    }

    mod operator_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn acknowledge_stops_run() {
            let (lifecycle, _) = lifecycle();
            let outcome = lifecycle.ingest_via("prom", cpu_event("firing")).await.unwrap();
            let fp = outcome.group.fingerprint.clone();
            let run_id = outcome.escalation.as_ref().and_then(|s| s.run_id()).unwrap().to_string();

            let group = lifecycle.acknowledge(&fp, "alice").await.unwrap();
            assert_eq!(group.status, AlertStatus::Acknowledged);
            assert_eq!(group.acknowledged_by.as_deref(), Some("alice"));

            let run = lifecycle.engine().wait_for(&run_id).await.unwrap().unwrap();
            assert_eq!(run.state, RunState::StoppedAcknowledged);
        }

        #[tokio::test]
        async fn acknowledge_unknown_alert() {
            let (lifecycle, _) = lifecycle();
            let result = lifecycle.acknowledge("0000000000000000", "alice").await;
            assert!(matches!(result, Err(OnCallError::AlertNotFound { .. })));
        }

        #[tokio::test]
        async fn acknowledge_resolved_rejected() {
            let (lifecycle, _) = lifecycle();
            let fp = lifecycle.ingest(cpu_event("resolved")).await.unwrap().group.fingerprint;
            let result = lifecycle.acknowledge(&fp, "alice").await;
            assert!(matches!(result, Err(OnCallError::Validation { .. })));
        }

        #[tokio::test]
        async fn resolve_and_list() {
            let (lifecycle, _) = lifecycle();
            let fp = lifecycle.ingest(cpu_event("firing")).await.unwrap().group.fingerprint;
            lifecycle
                .ingest(AlertEvent::firing().label("alertname", "DiskFull"))
                .await
                .unwrap();

            lifecycle.resolve(&fp, "bob").await.unwrap();

            let firing = lifecycle.list(Some(AlertStatus::Firing)).await.unwrap();
            assert_eq!(firing.len(), 1);
            assert_eq!(firing[0].summary, "DiskFull");
            let resolved = lifecycle.get(&fp).await.unwrap().unwrap();
            assert_eq!(resolved.status, AlertStatus::Resolved);
        }
    }
}
