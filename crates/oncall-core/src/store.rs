//! Persistence contract for alert groups, notifications and escalation runs.
//!
//! [`AlertStore`] is the logical contract the lifecycle manager and the
//! escalation engine rely on. The one hard requirement is that
//! [`AlertStore::upsert_alert_group`] is atomic per fingerprint: concurrent
//! callers with the same fingerprint must end up with exactly one group and
//! exactly one of them must observe `created == true`.
//!
//! [`MemoryStore`] implements the contract in memory and, when opened on a
//! directory, writes a JSON snapshot after every committed mutation.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{OnCallError, Result};
use crate::types::{
    AlertFields, AlertGroup, AlertStatus, EscalationRun, Notification, NotificationStatus,
};

const SNAPSHOT_FILE: &str = "oncall-state.json";

/// Result of an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// The group after the write.
    pub group: AlertGroup,
    /// True if this call created the group.
    pub created: bool,
    /// Status before the write, `None` when created.
    pub previous_status: Option<AlertStatus>,
}

/// Storage operations required by the on-call core.
#[async_trait]
pub trait AlertStore: Send + Sync + fmt::Debug {
    /// Creates the group for `fingerprint` or overwrites its mutable fields.
    async fn upsert_alert_group(
        &self,
        fingerprint: &str,
        fields: AlertFields,
    ) -> Result<UpsertOutcome>;

    /// Returns the group for `fingerprint`.
    async fn get_alert_group(&self, fingerprint: &str) -> Result<Option<AlertGroup>>;

    /// Returns all groups, optionally only those with `status`.
    async fn list_alert_groups(&self, status: Option<AlertStatus>) -> Result<Vec<AlertGroup>>;

    /// Acknowledges a group on behalf of `actor` in one atomic step.
    ///
    /// Fails with `OnCallError::Validation` if the group is already resolved,
    /// so a resolution committed by a concurrent writer is never overwritten.
    async fn acknowledge_alert_group(&self, fingerprint: &str, actor: &str) -> Result<AlertGroup>;

    /// Moves a group to `status`, recording `actor` for acknowledgments.
    async fn set_status(
        &self,
        fingerprint: &str,
        status: AlertStatus,
        actor: Option<&str>,
    ) -> Result<AlertGroup>;

    /// Stores a new notification row and returns its id.
    async fn record_notification(&self, notification: Notification) -> Result<String>;

    /// Finishes a pending notification. Terminal rows are never changed again.
    async fn complete_notification(
        &self,
        id: &str,
        status: NotificationStatus,
        error: Option<String>,
    ) -> Result<Notification>;

    /// Returns the notifications recorded for a group, oldest first.
    async fn notifications_for(&self, fingerprint: &str) -> Result<Vec<Notification>>;

    /// Inserts or replaces an escalation run.
    async fn save_run(&self, run: &EscalationRun) -> Result<()>;

    /// Returns a run by id.
    async fn get_run(&self, id: &str) -> Result<Option<EscalationRun>>;

    /// Returns every run for a group, oldest first.
    async fn runs_for(&self, fingerprint: &str) -> Result<Vec<EscalationRun>>;

    /// Returns every run that has not reached a stopped state.
    async fn unfinished_runs(&self) -> Result<Vec<EscalationRun>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    groups: HashMap<String, AlertGroup>,
    #[serde(default)]
    notifications: Vec<Notification>,
    #[serde(default)]
    runs: HashMap<String, EscalationRun>,
    /// notification id -> position in `notifications`
    #[serde(skip)]
    notification_index: HashMap<String, usize>,
    /// fingerprint -> positions in `notifications`, oldest first
    #[serde(skip)]
    notifications_by_alert: HashMap<String, Vec<usize>>,
}

impl StoreState {
    /// Rebuilds the notification indexes after loading a snapshot.
    fn reindex(&mut self) {
        self.notification_index.clear();
        self.notifications_by_alert.clear();
        for (pos, notification) in self.notifications.iter().enumerate() {
            self.notification_index.insert(notification.id.clone(), pos);
            self.notifications_by_alert
                .entry(notification.alert_fingerprint.clone())
                .or_default()
                .push(pos);
        }
    }

    fn push_notification(&mut self, notification: Notification) -> Result<String> {
        if self.notification_index.contains_key(&notification.id) {
            return Err(OnCallError::storage(format!(
                "notification {} already recorded",
                notification.id
            )));
        }
        let pos = self.notifications.len();
        let id = notification.id.clone();
        self.notification_index.insert(id.clone(), pos);
        self.notifications_by_alert
            .entry(notification.alert_fingerprint.clone())
            .or_default()
            .push(pos);
        self.notifications.push(notification);
        Ok(id)
    }

    fn notification_mut(&mut self, id: &str) -> Option<&mut Notification> {
        let pos = *self.notification_index.get(id)?;
        self.notifications.get_mut(pos)
    }
}

/// In-memory [`AlertStore`] with optional JSON snapshots.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Creates an empty store that keeps nothing on disk.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store persisted under `dir`, loading the previous snapshot.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Storage` if the directory cannot be created or
    /// an existing snapshot cannot be read.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            OnCallError::storage(format!("cannot create {}: {e}", dir.display()))
        })?;

        let path = dir.join(SNAPSHOT_FILE);
        let mut state = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| {
                OnCallError::storage(format!("cannot read {}: {e}", path.display()))
            })?;
            serde_json::from_str::<StoreState>(&raw).map_err(|e| {
                OnCallError::storage(format!("corrupt snapshot {}: {e}", path.display()))
            })?
        } else {
            StoreState::default()
        };
        state.reindex();

        debug!(
            path = %path.display(),
            groups = state.groups.len(),
            notifications = state.notifications.len(),
            runs = state.runs.len(),
            "Loaded on-call state"
        );

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    /// Applies `mutate` under the write lock and persists the result.
    ///
    /// If the snapshot cannot be written the in-memory state is rolled back
    /// so memory and disk never disagree about a committed write. Stores
    /// without a snapshot path mutate in place with no backup copy.
    fn commit<T>(&self, mutate: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut state = self.state.write();
        let Some(path) = &self.snapshot_path else {
            return mutate(&mut state);
        };

        let backup = state.clone();
        let value = mutate(&mut state)?;
        if let Err(e) = write_snapshot(path, &state) {
            warn!(path = %path.display(), error = %e, "Snapshot write failed, rolling back");
            *state = backup;
            return Err(e);
        }
        Ok(value)
    }
}

fn write_snapshot(path: &Path, state: &StoreState) -> Result<()> {
    let json = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .and_then(|()| fs::rename(&tmp, path))
        .map_err(|e| OnCallError::storage(format!("cannot write {}: {e}", path.display())))
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn upsert_alert_group(
        &self,
        fingerprint: &str,
        fields: AlertFields,
    ) -> Result<UpsertOutcome> {
        self.commit(|state| {
            let now = Utc::now();
            let outcome = match state.groups.get_mut(fingerprint) {
                Some(group) => {
                    let previous_status = group.status;
                    group.apply(fields, now);
                    UpsertOutcome {
                        group: group.clone(),
                        created: false,
                        previous_status: Some(previous_status),
                    }
                }
                None => {
                    let group = AlertGroup::new(fingerprint, fields, now);
                    state.groups.insert(fingerprint.to_string(), group.clone());
                    UpsertOutcome {
                        group,
                        created: true,
                        previous_status: None,
                    }
                }
            };
            Ok(outcome)
        })
    }

    async fn get_alert_group(&self, fingerprint: &str) -> Result<Option<AlertGroup>> {
        Ok(self.state.read().groups.get(fingerprint).cloned())
    }

    async fn list_alert_groups(&self, status: Option<AlertStatus>) -> Result<Vec<AlertGroup>> {
        let mut groups: Vec<AlertGroup> = self
            .state
            .read()
            .groups
            .values()
            .filter(|g| status.is_none_or(|s| g.status == s))
            .cloned()
            .collect();
        groups.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        Ok(groups)
    }

    async fn acknowledge_alert_group(&self, fingerprint: &str, actor: &str) -> Result<AlertGroup> {
        self.commit(|state| {
            let group =
                state
                    .groups
                    .get_mut(fingerprint)
                    .ok_or_else(|| OnCallError::AlertNotFound {
                        fingerprint: fingerprint.to_string(),
                    })?;
            if group.status == AlertStatus::Resolved {
                return Err(OnCallError::validation(format!(
                    "alert {fingerprint} is already resolved"
                )));
            }
            group.transition(AlertStatus::Acknowledged, Some(actor), Utc::now());
            Ok(group.clone())
        })
    }

    async fn set_status(
        &self,
        fingerprint: &str,
        status: AlertStatus,
        actor: Option<&str>,
    ) -> Result<AlertGroup> {
        self.commit(|state| {
            let group =
                state
                    .groups
                    .get_mut(fingerprint)
                    .ok_or_else(|| OnCallError::AlertNotFound {
                        fingerprint: fingerprint.to_string(),
                    })?;
            group.transition(status, actor, Utc::now());
            Ok(group.clone())
        })
    }

    async fn record_notification(&self, notification: Notification) -> Result<String> {
        self.commit(|state| state.push_notification(notification))
    }

    async fn complete_notification(
        &self,
        id: &str,
        status: NotificationStatus,
        error: Option<String>,
    ) -> Result<Notification> {
        if !status.is_terminal() {
            return Err(OnCallError::validation(format!(
                "notification {id} cannot be completed as {status}"
            )));
        }

        self.commit(|state| {
            let row = state
                .notification_mut(id)
                .ok_or_else(|| OnCallError::storage(format!("unknown notification {id}")))?;
            if row.status.is_terminal() {
                return Err(OnCallError::validation(format!(
                    "notification {id} already completed as {}",
                    row.status
                )));
            }
            row.status = status;
            row.error = error;
            if status == NotificationStatus::Sent {
                row.sent_at = Some(Utc::now());
            }
            Ok(row.clone())
        })
    }

    async fn notifications_for(&self, fingerprint: &str) -> Result<Vec<Notification>> {
        let state = self.state.read();
        Ok(state
            .notifications_by_alert
            .get(fingerprint)
            .map(|positions| {
                positions
                    .iter()
                    .filter_map(|&pos| state.notifications.get(pos))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save_run(&self, run: &EscalationRun) -> Result<()> {
        self.commit(|state| {
            state.runs.insert(run.id.clone(), run.clone());
            Ok(())
        })
    }

    async fn get_run(&self, id: &str) -> Result<Option<EscalationRun>> {
        Ok(self.state.read().runs.get(id).cloned())
    }

    async fn runs_for(&self, fingerprint: &str) -> Result<Vec<EscalationRun>> {
        let mut runs: Vec<EscalationRun> = self
            .state
            .read()
            .runs
            .values()
            .filter(|r| r.fingerprint == fingerprint)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.started_at);
        Ok(runs)
    }

    async fn unfinished_runs(&self) -> Result<Vec<EscalationRun>> {
        let mut runs: Vec<EscalationRun> = self
            .state
            .read()
            .runs
            .values()
            .filter(|r| r.is_active())
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.started_at);
        Ok(runs)
    }
}
