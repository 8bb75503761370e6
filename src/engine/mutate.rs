//! Write path: replica first, then the server or the outbox.

use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::lead::LeadStatus;
use crate::outbox::{status_payload, MutationKind};
use crate::remote::resolve_status;

use super::writes::LocalWrite;
use super::{MutationOutcome, RemoteFailure, SyncEngine, SyncError};

impl SyncEngine {
    /// Change a lead's status.
    ///
    /// The replica is updated first. When online and nothing older is queued
    /// for the lead, the PATCH goes out directly and the server's resolved
    /// status is written back; otherwise (or if the PATCH fails) the
    /// mutation is queued.
    ///
    /// Errors only when the outbox write itself fails.
    #[instrument(skip(self), fields(online = self.is_online()))]
    pub async fn mutate_status(
        &self,
        id: &str,
        status: LeadStatus,
    ) -> Result<MutationOutcome, SyncError> {
        self.local_writes.record(id, LocalWrite::Status(status));
        self.cache_status(id, status).await;

        let cause = match self.direct_write_blocker(id).await {
            Some(cause) => cause,
            None => {
                let start = Instant::now();
                let result = self.api.patch_status(id, status).await;
                crate::metrics::record_remote_latency("patch_status", start.elapsed());

                match result {
                    Ok(body) => {
                        let resolved = resolve_status(&body, status);
                        if resolved != status {
                            info!(
                                id,
                                requested = %status,
                                %resolved,
                                "Server resolved a different status"
                            );
                            self.local_writes.record(id, LocalWrite::Status(resolved));
                            self.cache_status(id, resolved).await;
                        }
                        crate::metrics::record_operation("remote", "patch_status", "success");
                        return Ok(MutationOutcome::Confirmed { status: Some(resolved) });
                    }
                    Err(e) => {
                        let cause = RemoteFailure::from(&e);
                        warn!(id, error = %e, "Status update failed, queueing");
                        crate::metrics::record_remote_error("patch_status", cause.class());
                        cause
                    }
                }
            }
        };

        let entry_id = self
            .outbox
            .enqueue(MutationKind::PatchStatus, id, Some(status_payload(status)))
            .await?;
        crate::metrics::record_operation("remote", "patch_status", "queued");
        Ok(MutationOutcome::Queued { entry_id, cause })
    }

    /// Delete a lead: drop it from the replica, then DELETE or queue.
    #[instrument(skip(self), fields(online = self.is_online()))]
    pub async fn delete_lead(&self, id: &str) -> Result<MutationOutcome, SyncError> {
        self.local_writes.record(id, LocalWrite::Deleted);
        if let Err(e) = self.replica.remove_cached(id).await {
            warn!(id, error = %e, "Removing lead from cache failed");
        }

        let cause = match self.direct_write_blocker(id).await {
            Some(cause) => cause,
            None => {
                let start = Instant::now();
                let result = self.api.delete_lead(id).await;
                crate::metrics::record_remote_latency("delete", start.elapsed());

                match result {
                    Ok(()) => {
                        crate::metrics::record_operation("remote", "delete", "success");
                        return Ok(MutationOutcome::Confirmed { status: None });
                    }
                    Err(e) => {
                        let cause = RemoteFailure::from(&e);
                        warn!(id, error = %e, "Delete failed, queueing");
                        crate::metrics::record_remote_error("delete", cause.class());
                        cause
                    }
                }
            }
        };

        let entry_id = self.outbox.enqueue(MutationKind::DeleteLead, id, None).await?;
        crate::metrics::record_operation("remote", "delete", "queued");
        Ok(MutationOutcome::Queued { entry_id, cause })
    }

    /// Reason a mutation cannot go to the server right now, if any.
    ///
    /// Besides being offline, a lead with older queued mutations must not be
    /// written directly or the replay would apply them out of order.
    async fn direct_write_blocker(&self, id: &str) -> Option<RemoteFailure> {
        if !self.is_online() {
            return Some(RemoteFailure::Offline);
        }
        match self.outbox.list_pending().await {
            Ok(pending) if pending.iter().any(|e| e.lead_id == id) => {
                debug!(id, "Older mutation still queued for lead");
                Some(RemoteFailure::QueuedBehind)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(id, error = %e, "Reading outbox failed, queueing to keep order");
                Some(RemoteFailure::QueuedBehind)
            }
        }
    }

    /// Set a cached lead's status. Cache failures are not fatal.
    pub(crate) async fn cache_status(&self, id: &str, status: LeadStatus) {
        match self.replica.get_cached_by_id(id).await {
            Ok(Some(mut lead)) => {
                if lead.status == status {
                    return;
                }
                lead.status = status;
                if let Err(e) = self.replica.update_cached(&lead).await {
                    warn!(id, error = %e, "Writing status to cache failed");
                }
            }
            Ok(None) => debug!(id, "Lead not cached, skipping local status write"),
            Err(e) => warn!(id, error = %e, "Reading cached lead failed"),
        }
    }
}
