// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local replica of server-owned lead data.
//!
//! Holds the last-known-good snapshot of every lead plus the `lastSyncAt`
//! marker used for the "showing cached data" banner. No remote calls.
//!
//! Snapshot writes are all-or-nothing. When one fails the caller keeps its
//! in-memory result and the replica still remembers the sync time
//! in-process, so staleness reporting follows the last successful network
//! read rather than the last successful disk write.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::lead::{now_millis, Lead};
use crate::storage::traits::{leads_of, ReplicaStore, StorageError};

/// One row of the `leads` cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedLeadRecord {
    pub id: String,
    pub data: Lead,
    /// Epoch millis of the write that produced this row.
    pub updated_at: i64,
}

impl CachedLeadRecord {
    #[must_use]
    pub fn new(lead: Lead, updated_at: i64) -> Self {
        Self {
            id: lead.id.clone(),
            data: lead,
            updated_at,
        }
    }
}

/// Replica facade owned by the sync engine.
pub struct LocalReplica {
    store: Arc<dyn ReplicaStore>,
    /// Sync time recorded when the durable write could not be made.
    unpersisted_sync_at: RwLock<Option<i64>>,
}

impl LocalReplica {
    pub fn new(store: Arc<dyn ReplicaStore>) -> Self {
        Self {
            store,
            unpersisted_sync_at: RwLock::new(None),
        }
    }

    /// Atomically replace the cached set and stamp `lastSyncAt`.
    ///
    /// Returns the timestamp used. On error the timestamp is still kept
    /// in-process and reported by [`last_sync_at`](Self::last_sync_at).
    pub async fn save_snapshot(&self, leads: &[Lead]) -> Result<i64, StorageError> {
        let now = now_millis();
        let records: Vec<CachedLeadRecord> = leads
            .iter()
            .cloned()
            .map(|lead| CachedLeadRecord::new(lead, now))
            .collect();

        match self.store.save_snapshot(&records, now).await {
            Ok(()) => {
                *self.unpersisted_sync_at.write() = None;
                debug!(count = records.len(), "Replica snapshot saved");
                Ok(now)
            }
            Err(e) => {
                *self.unpersisted_sync_at.write() = Some(now);
                warn!(error = %e, count = records.len(), "Replica snapshot write failed");
                crate::metrics::record_cache_write_failure("snapshot");
                Err(e)
            }
        }
    }

    pub async fn get_all_cached(&self) -> Result<Vec<Lead>, StorageError> {
        Ok(leads_of(self.store.all_cached().await?))
    }

    pub async fn get_cached_by_id(&self, id: &str) -> Result<Option<Lead>, StorageError> {
        Ok(self.store.cached_by_id(id).await?.map(|r| r.data))
    }

    /// Newest of the durable marker and any in-process fallback.
    pub async fn last_sync_at(&self) -> Result<Option<i64>, StorageError> {
        let fallback = *self.unpersisted_sync_at.read();
        let stored = match self.store.last_sync_at().await {
            Ok(stored) => stored,
            Err(e) if fallback.is_some() => {
                warn!(error = %e, "Reading lastSyncAt failed, using in-process value");
                None
            }
            Err(e) => return Err(e),
        };
        Ok(stored.max(fallback))
    }

    /// Write one lead back to the cache (optimistic local edit).
    pub async fn update_cached(&self, lead: &Lead) -> Result<(), StorageError> {
        let record = CachedLeadRecord::new(lead.clone(), now_millis());
        self.store.upsert_cached(&record).await.inspect_err(|_| {
            crate::metrics::record_cache_write_failure("upsert");
        })
    }

    pub async fn remove_cached(&self, id: &str) -> Result<(), StorageError> {
        self.store.remove_cached(id).await.inspect_err(|_| {
            crate::metrics::record_cache_write_failure("remove");
        })
    }
}
