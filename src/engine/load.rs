//! Read path: remote first, replica on failure.

use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::lead::Lead;
use crate::outbox::OutboxEntry;
use crate::remote::ApiError;

use super::reconcile::apply_pending;
use super::writes::{apply_writes, LoadWindow, LocalWrite};
use super::{EngineState, LoadOutcome, LoadSource, RemoteFailure, SyncEngine, SyncError};

impl SyncEngine {
    /// Load the lead list.
    ///
    /// Online: fetch, normalize, overlay pending outbox mutations and any
    /// local write made since the fetch started, replace the replica
    /// snapshot. A snapshot write failure is logged and the fresh list is
    /// still returned.
    ///
    /// Offline or on any remote failure: read the replica and overlay
    /// pending mutations. An empty replica is [`SyncError::NoCachedData`].
    #[instrument(skip(self), fields(online = self.is_online()))]
    pub async fn load_leads(&self) -> Result<LoadOutcome, SyncError> {
        self.set_state(EngineState::Loading);
        let window = self.local_writes.open_window();

        let reason = if self.is_online() {
            match self.fetch_remote().await {
                Ok(leads) => return Ok(self.finish_remote_load(leads, &window).await),
                Err(e) => {
                    warn!(error = %e, "Remote load failed, falling back to cache");
                    RemoteFailure::from(&e)
                }
            }
        } else {
            RemoteFailure::Offline
        };

        self.load_from_cache(reason, &window).await
    }

    async fn fetch_remote(&self) -> Result<Vec<Lead>, ApiError> {
        let start = Instant::now();
        let result = self.api.list_leads().await;
        crate::metrics::record_remote_latency("load", start.elapsed());

        match result {
            Ok(raw) => {
                crate::metrics::record_operation("remote", "load", "success");
                let total = raw.len();
                let leads: Vec<Lead> = raw.iter().filter_map(Lead::from_remote).collect();
                if leads.len() < total {
                    warn!(dropped = total - leads.len(), "Dropped lead records without an id");
                }
                Ok(leads)
            }
            Err(e) => {
                crate::metrics::record_operation("remote", "load", "error");
                crate::metrics::record_remote_error("load", RemoteFailure::from(&e).class());
                Err(e)
            }
        }
    }

    async fn finish_remote_load(&self, leads: Vec<Lead>, window: &LoadWindow<'_>) -> LoadOutcome {
        let pending = self.pending_for_overlay().await;
        let (early, seen) = window.since(window.start());
        let mut merged = apply_writes(apply_pending(leads, &pending), &early);

        let last_sync_at = match self.replica.save_snapshot(&merged).await {
            Ok(at) => Some(at),
            // Replica already logged it and kept the timestamp in-process
            Err(_) => self.replica.last_sync_at().await.ok().flatten(),
        };

        // The snapshot may have replaced cache writes that raced with it
        let (late, _) = window.since(seen);
        for (id, write) in &late {
            debug!(id, ?write, "Reapplying write made during snapshot");
            match write {
                LocalWrite::Status(status) => self.cache_status(id, *status).await,
                LocalWrite::Deleted => {
                    if let Err(e) = self.replica.remove_cached(id).await {
                        warn!(id, error = %e, "Removing lead from cache failed");
                    }
                }
            }
        }
        let (late, _) = window.since(seen);
        merged = apply_writes(merged, &late);

        crate::metrics::set_cached_leads(merged.len());
        info!(count = merged.len(), pending = pending.len(), "Leads loaded from server");
        self.set_state(EngineState::Idle);

        LoadOutcome {
            leads: merged,
            source: LoadSource::Remote,
            last_sync_at,
        }
    }

    async fn load_from_cache(
        &self,
        reason: RemoteFailure,
        window: &LoadWindow<'_>,
    ) -> Result<LoadOutcome, SyncError> {
        let cached = match self.replica.get_all_cached().await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "Reading cached leads failed");
                Vec::new()
            }
        };

        if cached.is_empty() {
            warn!(reason = reason.class(), "No cached leads to fall back to");
            crate::metrics::record_operation("replica", "load", "empty");
            self.set_state(EngineState::Error);
            return Err(SyncError::NoCachedData);
        }

        let pending = self.pending_for_overlay().await;
        let last_sync_at = self.replica.last_sync_at().await.unwrap_or_else(|e| {
            warn!(error = %e, "Reading lastSyncAt failed");
            None
        });
        let (recent, _) = window.since(window.start());
        let merged = apply_writes(apply_pending(cached, &pending), &recent);

        crate::metrics::record_operation("replica", "load", "success");
        info!(
            count = merged.len(),
            reason = reason.class(),
            last_sync_at,
            "Leads loaded from cache"
        );
        self.set_state(EngineState::Idle);

        Ok(LoadOutcome {
            leads: merged,
            source: LoadSource::Cache { reason },
            last_sync_at,
        })
    }

    /// Pending entries for overlaying; an unreadable outbox overlays nothing.
    async fn pending_for_overlay(&self) -> Vec<OutboxEntry> {
        self.outbox.list_pending().await.unwrap_or_else(|e| {
            warn!(error = %e, "Reading outbox failed, showing leads without pending changes");
            Vec::new()
        })
    }
}
