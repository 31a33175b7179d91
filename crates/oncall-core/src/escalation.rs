//! Escalation engine.
//!
//! Each run walks the ordered steps of one chain for one alert group on its
//! own tokio task:
//!
//! ```text
//! pending -> notifying <-> waiting -> stopped_acknowledged
//!                                   | stopped_resolved
//!                                   | stopped_exhausted
//! ```
//!
//! Status changes are pushed in through [`EscalationEngine::on_status_change`],
//! which cancels the run's token so a pending wait ends immediately. The
//! alert status is also re-read from the store before every step, so a change
//! written by another process is honoured at the next step boundary.
//!
//! Every run is persisted after each transition. A restarted process calls
//! [`EscalationEngine::recover`] to pick up unfinished runs where they left
//! off; waits resume with whatever time remains until `due_at`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::OnCallConfig;
use crate::directory::Directory;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::{OnCallError, Result};
use crate::store::AlertStore;
use crate::types::{
    AlertGroup, AlertStatus, EscalationPolicy, EscalationRun, Notification, NotificationStatus,
    PolicyType, RunState,
};

/// Result of [`EscalationEngine::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new run was started.
    Started(String),
    /// The group already has a non-terminal run; nothing was started.
    AlreadyRunning(String),
    /// The group is not linked to a chain.
    NotLinked,
}

impl StartOutcome {
    /// Returns the id of the run that is now escalating the group.
    #[must_use]
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::Started(id) | Self::AlreadyRunning(id) => Some(id),
            Self::NotLinked => None,
        }
    }
}

/// Control block of one live run.
#[derive(Debug, Clone)]
struct RunHandle {
    run_id: String,
    token: CancellationToken,
    stop: Arc<Mutex<Option<RunState>>>,
}

impl RunHandle {
    fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            token: CancellationToken::new(),
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// `None` means the engine is shutting down rather than stopping the run.
    fn stop_reason(&self) -> Option<RunState> {
        *self.stop.lock()
    }
}

#[derive(Debug)]
struct EngineInner {
    store: Arc<dyn AlertStore>,
    directory: Directory,
    dispatcher: Dispatcher,
    config: OnCallConfig,
    /// fingerprint -> live run
    active: Mutex<HashMap<String, RunHandle>>,
    /// run id -> task
    tasks: Mutex<HashMap<String, JoinHandle<RunState>>>,
}

/// Drives escalation runs.
///
/// Cloning is cheap; clones share the same runs.
#[derive(Debug, Clone)]
pub struct EscalationEngine {
    inner: Arc<EngineInner>,
}

impl EscalationEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn AlertStore>,
        directory: Directory,
        dispatcher: Dispatcher,
        config: OnCallConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                directory,
                dispatcher,
                config,
                active: Mutex::new(HashMap::new()),
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Starts escalating `group` through its linked chain.
    ///
    /// At most one non-terminal run exists per fingerprint; a second start
    /// returns [`StartOutcome::AlreadyRunning`] and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Storage` if the new run cannot be persisted.
    pub async fn start(&self, group: &AlertGroup) -> Result<StartOutcome> {
        let Some(chain_id) = &group.escalation_chain_id else {
            debug!(fingerprint = %group.fingerprint, "No escalation chain linked");
            return Ok(StartOutcome::NotLinked);
        };

        let run = EscalationRun::new(&group.fingerprint, chain_id);
        let handle = {
            let mut active = self.inner.active.lock();
            if let Some(existing) = active.get(&group.fingerprint) {
                debug!(
                    fingerprint = %group.fingerprint,
                    run_id = %existing.run_id,
                    "Escalation already running"
                );
                return Ok(StartOutcome::AlreadyRunning(existing.run_id.clone()));
            }
            let handle = RunHandle::new(&run.id);
            active.insert(group.fingerprint.clone(), handle.clone());
            handle
        };

        if let Err(e) = self.inner.store.save_run(&run).await {
            self.inner.release(&run);
            return Err(e);
        }

        let run_id = run.id.clone();
        self.launch(run, handle);
        Ok(StartOutcome::Started(run_id))
    }

    /// Stops the group's run if `status` ends escalation.
    ///
    /// Returns true if a live run was signalled.
    pub fn on_status_change(&self, fingerprint: &str, status: AlertStatus) -> bool {
        let Some(stopped) = RunState::stopped_by(status) else {
            return false;
        };
        let Some(handle) = self.inner.active.lock().remove(fingerprint) else {
            return false;
        };

        *handle.stop.lock() = Some(stopped);
        handle.token.cancel();
        info!(
            fingerprint = %fingerprint,
            run_id = %handle.run_id,
            state = %stopped,
            "Escalation stop requested"
        );
        true
    }

    /// Resumes every persisted run that has not stopped.
    ///
    /// Runs whose alert is already acknowledged or resolved are finalized
    /// instead. Returns the number of runs resumed.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Storage` if the store cannot be read.
    pub async fn recover(&self) -> Result<usize> {
        let mut resumed = 0;
        for run in self.inner.store.unfinished_runs().await? {
            let group = self.inner.store.get_alert_group(&run.fingerprint).await?;
            let Some(group) = group else {
                self.inner
                    .finish(run, RunState::StoppedExhausted, Some("alert group not found".to_string()))
                    .await;
                continue;
            };
            if let Some(stopped) = RunState::stopped_by(group.status) {
                self.inner.finish(run, stopped, None).await;
                continue;
            }

            let registered = {
                let mut active = self.inner.active.lock();
                match active.get(&run.fingerprint) {
                    Some(existing) if existing.run_id != run.id => Err(existing.run_id.clone()),
                    Some(_) => Ok(None),
                    None => {
                        let handle = RunHandle::new(&run.id);
                        active.insert(run.fingerprint.clone(), handle.clone());
                        Ok(Some(handle))
                    }
                }
            };

            match registered {
                Ok(Some(handle)) => {
                    info!(
                        run_id = %run.id,
                        fingerprint = %run.fingerprint,
                        step = run.step_index,
                        state = %run.state,
                        "Resuming escalation run"
                    );
                    self.launch(run, handle);
                    resumed += 1;
                }
                Ok(None) => {}
                Err(live) => {
                    let reason = format!("superseded by run {live}");
                    self.inner
                        .finish(run, RunState::StoppedExhausted, Some(reason))
                        .await;
                }
            }
        }
        Ok(resumed)
    }

    /// Waits for a run's task to end and returns the stored run.
    ///
    /// Returns immediately for runs that are not live in this engine.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Storage` if the store cannot be read.
    pub async fn wait_for(&self, run_id: &str) -> Result<Option<EscalationRun>> {
        let task = self.inner.tasks.lock().remove(run_id);
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(run_id = %run_id, error = %e, "Escalation task aborted");
            }
        }
        self.inner.store.get_run(run_id).await
    }

    /// Returns the live run id for a fingerprint.
    #[must_use]
    pub fn run_for(&self, fingerprint: &str) -> Option<String> {
        self.inner
            .active
            .lock()
            .get(fingerprint)
            .map(|h| h.run_id.clone())
    }

    /// Returns `(fingerprint, run_id)` for every live run, sorted.
    #[must_use]
    pub fn active_runs(&self) -> Vec<(String, String)> {
        let mut runs: Vec<(String, String)> = self
            .inner
            .active
            .lock()
            .iter()
            .map(|(fp, h)| (fp.clone(), h.run_id.clone()))
            .collect();
        runs.sort();
        runs
    }

    /// Suspends every live run without finalizing it.
    ///
    /// Suspended runs stay persisted in their current state and are picked up
    /// by [`EscalationEngine::recover`].
    pub fn shutdown(&self) {
        let handles: Vec<RunHandle> = self.inner.active.lock().drain().map(|(_, h)| h).collect();
        info!(runs = handles.len(), "Suspending escalation runs");
        for handle in handles {
            handle.token.cancel();
        }
    }

    fn launch(&self, run: EscalationRun, handle: RunHandle) {
        let run_id = run.id.clone();
        let task = tokio::spawn(Arc::clone(&self.inner).drive(run, handle));
        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|_, t| !t.is_finished());
        tasks.insert(run_id, task);
    }
}

impl EngineInner {
    async fn drive(self: Arc<Self>, mut run: EscalationRun, handle: RunHandle) -> RunState {
        debug!(
            run_id = %run.id,
            fingerprint = %run.fingerprint,
            chain_id = %run.chain_id,
            "Escalation run started"
        );

        loop {
            if handle.token.is_cancelled() {
                return match handle.stop_reason() {
                    Some(stopped) => self.finish(run, stopped, None).await,
                    None => self.suspend(run).await,
                };
            }

            let group = match self.store.get_alert_group(&run.fingerprint).await {
                Ok(Some(group)) => group,
                Ok(None) => {
                    let reason = "alert group not found".to_string();
                    return self.finish(run, RunState::StoppedExhausted, Some(reason)).await;
                }
                Err(e) => {
                    return self
                        .finish(run, RunState::StoppedExhausted, Some(e.to_string()))
                        .await;
                }
            };
            if let Some(stopped) = RunState::stopped_by(group.status) {
                return self.finish(run, stopped, None).await;
            }

            let steps = match self.steps_for(&run.chain_id) {
                Ok(steps) => steps,
                Err(e) => {
                    warn!(run_id = %run.id, chain_id = %run.chain_id, error = %e, "Escalation chain unusable");
                    return self
                        .finish(run, RunState::StoppedExhausted, Some(e.to_string()))
                        .await;
                }
            };
            let Some(step) = steps.get(run.step_index) else {
                return self.finish(run, RunState::StoppedExhausted, None).await;
            };

            debug!(
                run_id = %run.id,
                step_number = step.step_number,
                policy = %step.policy_type,
                "Executing escalation step"
            );

            match step.policy_type {
                PolicyType::Wait => {
                    let due = match run.due_at {
                        Some(due) => due,
                        None => match TimeDelta::from_std(step.wait_duration())
                            .ok()
                            .and_then(|wait| Utc::now().checked_add_signed(wait))
                        {
                            Some(due) => due,
                            None => {
                                let reason =
                                    format!("wait of {}s is out of range", step.wait_seconds);
                                return self
                                    .finish(run, RunState::StoppedExhausted, Some(reason))
                                    .await;
                            }
                        },
                    };
                    run.enter(RunState::Waiting);
                    run.due_at = Some(due);
                    self.persist(&run).await;

                    let remaining = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    tokio::select! {
                        biased;
                        () = handle.token.cancelled() => continue,
                        () = tokio::time::sleep(remaining) => {}
                    }
                }
                PolicyType::NotifyUser | PolicyType::NotifyChannel => {
                    run.enter(RunState::Notifying);
                    self.persist(&run).await;
                    self.notify(&run, step, &group, &handle).await;
                    if handle.token.is_cancelled() {
                        // Stop or suspend without advancing; a suspended
                        // step is delivered again after recovery.
                        continue;
                    }
                }
            }

            run.step_index += 1;
            run.due_at = None;
            run.updated_at = Utc::now();
            self.persist(&run).await;
        }
    }

    fn steps_for(&self, chain_id: &str) -> Result<Vec<EscalationPolicy>> {
        self.directory
            .chain(chain_id)
            .ok_or_else(|| {
                OnCallError::configuration(format!("unknown escalation chain '{chain_id}'"))
            })?
            .ordered_steps()
    }

    /// Resolves who a `notify_user` step pages.
    fn on_call(&self, schedule_id: &str) -> std::result::Result<String, String> {
        let schedule = self
            .directory
            .schedule(schedule_id)
            .ok_or_else(|| format!("unknown schedule '{schedule_id}'"))?;
        match schedule.resolve(Utc::now()) {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(format!("nobody on call for schedule '{schedule_id}'")),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Executes one notify step. Always leaves exactly one completed
    /// notification row behind, whatever happens.
    async fn notify(
        &self,
        run: &EscalationRun,
        step: &EscalationPolicy,
        group: &AlertGroup,
        handle: &RunHandle,
    ) {
        let (channel, recipient) = match step.policy_type {
            PolicyType::NotifyUser => (
                step.channel
                    .clone()
                    .unwrap_or_else(|| self.config.default_user_channel.clone()),
                self.on_call(&step.target),
            ),
            _ => (
                step.target.clone(),
                Ok(step.recipient.clone().unwrap_or_default()),
            ),
        };

        let pending = Notification::pending(
            &run.fingerprint,
            &channel,
            recipient.as_deref().unwrap_or_default(),
        )
        .for_run(&run.id);
        let notification_id = match self.store.record_notification(pending).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(run_id = %run.id, error = %e, "Failed to record notification");
                None
            }
        };

        let outcome = match &recipient {
            Err(reason) => DispatchOutcome::Failed(reason.clone()),
            Ok(recipient) => self
                .dispatcher
                .dispatch(&channel, group, recipient, &handle.token)
                .await
                .unwrap_or_else(|e| DispatchOutcome::Failed(e.to_string())),
        };

        match &outcome {
            DispatchOutcome::Sent => info!(
                run_id = %run.id,
                fingerprint = %run.fingerprint,
                step_number = step.step_number,
                channel = %channel,
                "Escalation notification sent"
            ),
            DispatchOutcome::Cancelled => info!(
                run_id = %run.id,
                fingerprint = %run.fingerprint,
                step_number = step.step_number,
                channel = %channel,
                "Escalation notification interrupted"
            ),
            DispatchOutcome::Failed(reason) => warn!(
                run_id = %run.id,
                fingerprint = %run.fingerprint,
                step_number = step.step_number,
                channel = %channel,
                error = %reason,
                "Escalation notification failed"
            ),
        }

        let Some(id) = notification_id else {
            return;
        };
        let status = if outcome.is_sent() {
            NotificationStatus::Sent
        } else {
            NotificationStatus::Failed
        };
        let reason = match outcome {
            DispatchOutcome::Sent => None,
            DispatchOutcome::Failed(reason) => Some(reason),
            DispatchOutcome::Cancelled => Some(interrupted_reason(handle.stop_reason())),
        };
        if let Err(e) = self.store.complete_notification(&id, status, reason).await {
            error!(notification_id = %id, error = %e, "Failed to complete notification");
        }
    }

    async fn persist(&self, run: &EscalationRun) {
        if let Err(e) = self.store.save_run(run).await {
            error!(run_id = %run.id, error = %e, "Failed to persist escalation run");
        }
    }

    async fn finish(
        &self,
        mut run: EscalationRun,
        state: RunState,
        error: Option<String>,
    ) -> RunState {
        run.enter(state);
        run.error = error;
        self.persist(&run).await;
        self.release(&run);

        match &run.error {
            Some(reason) => warn!(
                run_id = %run.id,
                fingerprint = %run.fingerprint,
                state = %state,
                error = %reason,
                "Escalation run stopped"
            ),
            None => info!(
                run_id = %run.id,
                fingerprint = %run.fingerprint,
                state = %state,
                steps_done = run.step_index,
                "Escalation run stopped"
            ),
        }
        state
    }

    async fn suspend(&self, run: EscalationRun) -> RunState {
        self.persist(&run).await;
        debug!(run_id = %run.id, state = %run.state, "Escalation run suspended");
        run.state
    }

    /// Drops the live entry for `run`, unless a newer run replaced it.
    fn release(&self, run: &EscalationRun) {
        let mut active = self.active.lock();
        if active
            .get(&run.fingerprint)
            .is_some_and(|h| h.run_id == run.id)
        {
            active.remove(&run.fingerprint);
        }
    }
}

/// Reason recorded on a notification whose send was cut short.
fn interrupted_reason(stop: Option<RunState>) -> String {
    match stop {
        Some(RunState::StoppedAcknowledged) => "cancelled: alert acknowledged".to_string(),
        Some(RunState::StoppedResolved) => "cancelled: alert resolved".to_string(),
        Some(state) => format!("cancelled: run {state}"),
        None => "interrupted by shutdown".to_string(),
    }
}
