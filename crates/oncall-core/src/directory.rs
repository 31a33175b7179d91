//! Routing configuration: schedules, escalation chains and integrations.
//!
//! Entries are validated on write, so the escalation engine only ever sees
//! configuration that passed [`Schedule::validate`] and
//! [`EscalationChain::validate`] at the time it was stored.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use crate::error::{OnCallError, Result};
use crate::schedule::{OnCallShift, Schedule};
use crate::types::{EscalationChain, Integration};

/// Shared, read-mostly routing configuration.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    schedules: Arc<RwLock<HashMap<String, Schedule>>>,
    chains: Arc<RwLock<HashMap<String, EscalationChain>>>,
    integrations: Arc<RwLock<HashMap<String, Integration>>>,
}

impl Directory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ============ Schedules ============

    /// Adds or replaces a schedule.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Configuration` if the schedule has no id or an
    /// invalid layer.
    pub fn upsert_schedule(&self, schedule: Schedule) -> Result<()> {
        if schedule.id.is_empty() {
            return Err(OnCallError::configuration("schedule id must not be empty"));
        }
        schedule.validate()?;
        info!(schedule_id = %schedule.id, layers = schedule.layers.len(), "Schedule stored");
        self.schedules.write().insert(schedule.id.clone(), schedule);
        Ok(())
    }

    /// Removes a schedule, returning it if it existed.
    pub fn remove_schedule(&self, id: &str) -> Option<Schedule> {
        let removed = self.schedules.write().remove(id);
        if removed.is_some() {
            info!(schedule_id = %id, "Schedule removed");
        }
        removed
    }

    /// Returns a schedule by id.
    #[must_use]
    pub fn schedule(&self, id: &str) -> Option<Schedule> {
        self.schedules.read().get(id).cloned()
    }

    /// Returns all schedules.
    #[must_use]
    pub fn schedules(&self) -> Vec<Schedule> {
        self.schedules.read().values().cloned().collect()
    }

    /// Returns who is on call for a schedule at `at`.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Configuration` for an unknown schedule.
    pub fn on_call(&self, schedule_id: &str, at: DateTime<Utc>) -> Result<Option<OnCallShift>> {
        let guard = self.schedules.read();
        let schedule = guard
            .get(schedule_id)
            .ok_or_else(|| OnCallError::configuration(format!("unknown schedule '{schedule_id}'")))?;
        schedule.on_call(at)
    }

    // ============ Chains ============

    /// Adds or replaces an escalation chain.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Configuration` if the chain fails validation.
    pub fn upsert_chain(&self, chain: EscalationChain) -> Result<()> {
        if chain.id.is_empty() {
            return Err(OnCallError::configuration("escalation chain id must not be empty"));
        }
        chain.validate()?;
        info!(chain_id = %chain.id, steps = chain.policies.len(), "Escalation chain stored");
        self.chains.write().insert(chain.id.clone(), chain);
        Ok(())
    }

    /// Removes a chain, returning it if it existed.
    ///
    /// Runs already executing the chain stop as exhausted at their next step.
    pub fn remove_chain(&self, id: &str) -> Option<EscalationChain> {
        let removed = self.chains.write().remove(id);
        if removed.is_some() {
            info!(chain_id = %id, "Escalation chain removed");
        }
        removed
    }

    /// Returns a chain by id.
    #[must_use]
    pub fn chain(&self, id: &str) -> Option<EscalationChain> {
        self.chains.read().get(id).cloned()
    }

    // ============ Integrations ============

    /// Adds or replaces an integration.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Configuration` if the id is empty or the linked
    /// chain is unknown.
    pub fn upsert_integration(&self, integration: Integration) -> Result<()> {
        if integration.id.is_empty() {
            return Err(OnCallError::configuration("integration id must not be empty"));
        }
        if let Some(chain_id) = &integration.escalation_chain_id {
            if !self.chains.read().contains_key(chain_id) {
                return Err(OnCallError::configuration(format!(
                    "integration '{}' links unknown escalation chain '{chain_id}'",
                    integration.id
                )));
            }
        }
        info!(integration_id = %integration.id, kind = ?integration.kind, "Integration stored");
        self.integrations
            .write()
            .insert(integration.id.clone(), integration);
        Ok(())
    }

    /// Returns an integration by id.
    #[must_use]
    pub fn integration(&self, id: &str) -> Option<Integration> {
        self.integrations.read().get(id).cloned()
    }
}
