//! Alert routing and on-call escalation.
//!
//! `oncall-core` receives alerts from monitoring sources, collapses repeats
//! into alert groups, works out who is on call, and pages them through an
//! ordered escalation chain until someone acknowledges or the alert resolves.
//!
//! # Features
//!
//! - **Deduplication**: Alerts with the same identity labels share one group
//! - **Rotations**: Daily, weekly and custom layers resolve the on-call user
//! - **Escalation Chains**: Notify, wait, notify again; stopped by ack or resolve
//! - **Crash Recovery**: Runs are persisted and resume where they left off
//! - **Channels**: Chat, webhook, email and log delivery with per-send timeouts
//! - **Alertmanager Compatible**: Accepts Prometheus Alertmanager webhook payloads
//!
//! # Example
//!
//! ```rust,no_run
//! use oncall_core::{
//!     AlertEvent, AlertLifecycle, Directory, Dispatcher, EscalationChain, EscalationEngine,
//!     EscalationPolicy, Layer, MemoryStore, OnCallConfig, RotationType, Schedule,
//!     channels::LogChannel,
//! };
//! use chrono::Utc;
//! use std::sync::Arc;
//!
//! # async fn run() -> oncall_core::Result<()> {
//! let config = OnCallConfig::default();
//! let directory = Directory::new();
//!
//! // Who is on call
//! directory.upsert_schedule(
//!     Schedule::new("sre", "SRE").layer(
//!         Layer::new("primary", RotationType::Weekly, Utc::now()).with_users(["alice", "bob"]),
//!     ),
//! )?;
//!
//! // Page the on-call user, wait five minutes, then page the team channel
//! directory.upsert_chain(
//!     EscalationChain::new("default", "Default")
//!         .step(EscalationPolicy::notify_user(1, "sre").via("log"))
//!         .step(EscalationPolicy::wait(2, 300))
//!         .step(EscalationPolicy::notify_channel(3, "log")),
//! )?;
//!
//! let store = Arc::new(MemoryStore::new());
//! let dispatcher = Dispatcher::new(config.dispatch_timeout())
//!     .with_channel(Arc::new(LogChannel::default()));
//! let engine = EscalationEngine::new(store.clone(), directory.clone(), dispatcher, config.clone());
//! let lifecycle = AlertLifecycle::new(store, engine, directory, config);
//!
//! let event = AlertEvent::firing()
//!     .label("alertname", "HighCPU")
//!     .label("instance", "node-1")
//!     .label("severity", "critical");
//!
//! let outcome = lifecycle.ingest(event).await?;
//! lifecycle.acknowledge(&outcome.group.fingerprint, "alice").await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod channels;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod escalation;
pub mod fingerprint;
pub mod lifecycle;
pub mod schedule;
pub mod store;
pub mod types;
pub mod webhook;

// Re-export main types at crate root
pub use config::OnCallConfig;
pub use directory::Directory;
pub use dispatch::{DispatchOutcome, Dispatcher, NotificationChannel, NotificationResult};
pub use error::{OnCallError, Result};
pub use escalation::{EscalationEngine, StartOutcome};
pub use fingerprint::fingerprint;
pub use lifecycle::{AlertLifecycle, IngestOutcome};
pub use schedule::{Layer, OnCallShift, RotationType, Schedule};
pub use store::{AlertStore, MemoryStore, UpsertOutcome};
pub use types::{
    AlertFields, AlertGroup, AlertStatus, EscalationChain, EscalationPolicy, EscalationRun,
    Integration, IntegrationKind, Notification, NotificationStatus, PolicyType, RunState,
};
pub use webhook::{AlertEvent, PrometheusAlert, PrometheusWebhook};
