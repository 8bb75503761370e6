// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! State projection: the view the UI renders.
//!
//! Every UI action goes through [`LeadsProjection`]. Mutations are applied
//! to the in-memory list before any I/O starts, then handed to the engine.
//! The outbox count and the pending-lead set are always re-read from the
//! outbox after an enqueue, drain or clear, never tracked as counters.
//!
//! Changes are published as [`ProjectionSnapshot`]s on a `watch` channel.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use leads_sync::{ConnectivityMonitor, LeadsProjection, LeadStatus, SyncConfig, SyncEngine};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = SyncConfig::default();
//! let monitor = ConnectivityMonitor::new(config.start_online);
//! let (engine, api) = SyncEngine::open(&config, monitor.handle()).await.unwrap();
//! api.set_token(Some("session-token".into()));
//!
//! let projection = Arc::new(LeadsProjection::new(Arc::new(engine), config.refresh_after_drain));
//! let _relay = projection.attach(&monitor);
//!
//! projection.load_leads().await.ok();
//! projection.update_lead_status("lead-1", LeadStatus::Success).await.ok();
//! println!("{} pending", projection.snapshot().outbox_count);
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::engine::{
    DrainOutcome, LoadOutcome, LoadSource, MutationOutcome, RemoteFailure, SyncEngine, SyncError,
};
use crate::lead::{now_millis, Lead, LeadStatus};
use crate::outbox::OutboxEntry;

/// What the UI sees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionSnapshot {
    /// Merged lead list
    pub leads: Vec<Lead>,
    pub is_loading: bool,
    pub error: Option<SyncError>,
    pub outbox_count: u64,
    /// Leads with at least one unsynced mutation
    pub pending_lead_ids: BTreeSet<String>,
    /// The list came from the local replica (offline banner)
    pub showing_cached: bool,
    /// Epoch millis of the last successful remote read
    pub last_sync_at: Option<i64>,
    /// Epoch millis of the last `load_leads` that produced a list
    pub last_loaded_at: Option<i64>,
    pub online: bool,
}

impl ProjectionSnapshot {
    #[must_use]
    pub fn is_pending(&self, lead_id: &str) -> bool {
        self.pending_lead_ids.contains(lead_id)
    }

    #[must_use]
    pub fn lead(&self, lead_id: &str) -> Option<&Lead> {
        self.leads.iter().find(|l| l.id == lead_id)
    }
}

pub struct LeadsProjection {
    engine: Arc<SyncEngine>,
    state: RwLock<ProjectionSnapshot>,
    tx: watch::Sender<ProjectionSnapshot>,
    refresh_after_drain: bool,
}

impl LeadsProjection {
    pub fn new(engine: Arc<SyncEngine>, refresh_after_drain: bool) -> Self {
        let initial = ProjectionSnapshot {
            online: engine.is_online(),
            ..ProjectionSnapshot::default()
        };
        let (tx, _rx) = watch::channel(initial.clone());
        Self {
            engine,
            state: RwLock::new(initial),
            tx,
            refresh_after_drain,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    #[must_use]
    pub fn snapshot(&self) -> ProjectionSnapshot {
        self.state.read().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProjectionSnapshot> {
        self.tx.subscribe()
    }

    /// Spawn the connectivity relay: every transition to online runs
    /// [`sync_outbox`](Self::sync_outbox).
    pub fn attach(self: &Arc<Self>, monitor: &ConnectivityMonitor) -> JoinHandle<()> {
        let projection = Arc::clone(self);
        monitor.spawn_relay(move || {
            let projection = Arc::clone(&projection);
            async move {
                if let Err(e) = projection.sync_outbox().await {
                    warn!(error = %e, "Outbox sync on reconnect failed");
                }
            }
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // UI operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// Load the lead list through the engine and publish it.
    pub async fn load_leads(&self) -> Result<LoadOutcome, SyncError> {
        self.update(|s| s.is_loading = true);

        let result = self.engine.load_leads().await;
        match &result {
            Ok(outcome) => {
                let error = match &outcome.source {
                    LoadSource::Remote => None,
                    LoadSource::Cache { reason } => reason.user_error(),
                };
                self.update(|s| {
                    s.leads = outcome.leads.clone();
                    s.showing_cached = outcome.is_from_cache();
                    s.last_sync_at = outcome.last_sync_at;
                    s.last_loaded_at = Some(now_millis());
                    s.error = error;
                });
            }
            Err(e) => {
                let error = e.clone();
                self.update(|s| {
                    s.leads.clear();
                    s.showing_cached = false;
                    s.error = Some(error);
                });
            }
        }

        self.refresh_outbox_view().await;
        self.update(|s| s.is_loading = false);
        result
    }

    /// Set a lead's status. The visible list changes before any I/O.
    pub async fn update_lead_status(
        &self,
        id: &str,
        status: LeadStatus,
    ) -> Result<MutationOutcome, SyncError> {
        self.update(|s| {
            if let Some(lead) = s.leads.iter_mut().find(|l| l.id == id) {
                lead.status = status;
            }
        });

        let result = self.engine.mutate_status(id, status).await;
        if let Ok(MutationOutcome::Confirmed { status: Some(resolved) }) = &result {
            if *resolved != status {
                let resolved = *resolved;
                self.update(|s| {
                    if let Some(lead) = s.leads.iter_mut().find(|l| l.id == id) {
                        lead.status = resolved;
                    }
                });
            }
        }
        self.finish_mutation(&result).await;
        result
    }

    /// Delete a lead. It leaves the visible list immediately and is never
    /// put back, whatever the server says.
    pub async fn delete_lead(&self, id: &str) -> Result<MutationOutcome, SyncError> {
        self.update(|s| s.leads.retain(|l| l.id != id));

        let result = self.engine.delete_lead(id).await;
        self.finish_mutation(&result).await;
        result
    }

    /// Drain the outbox, then reload from the server if anything replayed
    /// or nothing has been loaded yet.
    ///
    /// Only an expired session touches the visible error; a later drain that
    /// replays something clears it again.
    pub async fn sync_outbox(&self) -> Result<DrainOutcome, SyncError> {
        let result = self.engine.drain_outbox().await;
        match &result {
            Ok(DrainOutcome::Completed(report)) => {
                let expired = report.session_expired();
                let mut never_loaded = false;
                self.update(|s| {
                    if expired {
                        s.error = Some(SyncError::SessionExpired);
                    } else if s.error == Some(SyncError::SessionExpired) && report.replayed > 0 {
                        s.error = None;
                    }
                    never_loaded = s.error == Some(SyncError::NoCachedData);
                });

                // A session that started offline with an empty cache gets its
                // first real load here
                if self.refresh_after_drain && (report.replayed > 0 || never_loaded) {
                    debug!(replayed = report.replayed, never_loaded, "Reloading leads after drain");
                    if let Err(e) = self.load_leads().await {
                        warn!(error = %e, "Reload after drain failed");
                    }
                }
            }
            Ok(DrainOutcome::Skipped(reason)) => debug!(?reason, "Outbox sync skipped"),
            Err(e) => {
                let error = e.clone();
                self.update(|s| s.error = Some(error));
            }
        }

        self.refresh_outbox_view().await;
        result
    }

    pub async fn get_outbox_items(&self) -> Result<Vec<OutboxEntry>, SyncError> {
        self.engine.outbox_items().await
    }

    /// Discard every queued mutation. Optimistic edits already in the
    /// replica stay until the next successful load.
    pub async fn clear_outbox(&self) -> Result<u64, SyncError> {
        let result = self.engine.clear_outbox().await;
        if let Ok(removed) = result {
            info!(removed, "Outbox cleared by user");
        }
        self.refresh_outbox_view().await;
        result
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════════

    async fn finish_mutation(&self, result: &Result<MutationOutcome, SyncError>) {
        let error = match result {
            Ok(MutationOutcome::Confirmed { .. }) => None,
            Ok(MutationOutcome::Queued { cause, .. }) => cause.user_error(),
            Err(e) => Some(e.clone()),
        };
        self.update(|s| s.error = error);
        self.refresh_outbox_view().await;

        // Online but queued behind an older entry: nothing else will drain
        // it until the next reconnect. This re-enters `sync_outbox`, which
        // ends in `refresh_outbox_view` again.
        if let Ok(MutationOutcome::Queued { cause: RemoteFailure::QueuedBehind, .. }) = result {
            if self.engine.is_online() {
                if let Err(e) = self.sync_outbox().await {
                    warn!(error = %e, "Draining queued-behind mutation failed");
                }
            }
        }
    }

    /// Recompute the outbox count and pending set from the outbox itself.
    async fn refresh_outbox_view(&self) {
        match self.engine.outbox_items().await {
            Ok(items) => {
                let count = items.len() as u64;
                let ids: BTreeSet<String> = items.into_iter().map(|e| e.lead_id).collect();
                self.update(|s| {
                    s.outbox_count = count;
                    s.pending_lead_ids = ids;
                });
            }
            Err(e) => warn!(error = %e, "Reading outbox for projection failed"),
        }
    }

    /// Apply `f` under the write lock, then publish.
    fn update(&self, f: impl FnOnce(&mut ProjectionSnapshot)) {
        let snapshot = {
            let mut state = self.state.write();
            f(&mut *state);
            state.online = self.engine.is_online();
            state.clone()
        };
        self.tx.send_replace(snapshot);
    }
}
