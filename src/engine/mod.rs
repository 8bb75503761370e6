// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync engine.
//!
//! The [`SyncEngine`] ties the local replica, the mutation outbox, the
//! remote API and the connectivity signal together:
//!
//! - reads go remote first and fall back to the replica ([`load`])
//! - writes are applied to the replica, then confirmed remotely or queued
//!   in the outbox ([`mutate`])
//! - the outbox is replayed in FIFO order when connectivity returns
//!   ([`drain`])
//!
//! # States
//!
//! ```text
//! Idle → Loading → Idle
//! Idle → Syncing → Idle
//!          ↓
//!        Error   (no cached data, session expired)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use leads_sync::{ConnectivityMonitor, HttpLeadsApi, InMemoryStore, SyncEngine, EngineState};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let monitor = ConnectivityMonitor::new(true);
//! let store = Arc::new(InMemoryStore::new());
//! let api = HttpLeadsApi::new("https://crm.example.com/api", std::time::Duration::from_secs(15))
//!     .unwrap()
//!     .with_token("session-token");
//! let engine = SyncEngine::with_store(store, Arc::new(api), monitor.handle());
//!
//! assert_eq!(engine.state(), EngineState::Idle);
//! let outcome = engine.load_leads().await;
//! # let _ = outcome;
//! # }
//! ```

mod drain;
mod load;
mod mutate;
pub mod reconcile;
mod types;
mod writes;

pub use types::{
    DrainHalt, DrainOutcome, DrainReport, EngineState, LoadOutcome, LoadSource,
    MutationOutcome, OutboxStats, RemoteFailure, SkipReason, SyncError,
};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::outbox::{Outbox, OutboxEntry};
use crate::remote::{HttpLeadsApi, LeadsApi};
use crate::replica::LocalReplica;
use crate::storage::sql::SqliteStore;
use crate::storage::traits::{OutboxStore, ReplicaStore};

/// The sync engine: owns the replica and outbox and talks to the server.
pub struct SyncEngine {
    replica: LocalReplica,
    outbox: Outbox,
    api: Arc<dyn LeadsApi>,
    connectivity: Connectivity,

    state: watch::Sender<EngineState>,
    state_rx: watch::Receiver<EngineState>,

    /// Single-flight flag for the outbox drain
    draining: AtomicBool,

    /// Writes to replay over list fetches that were already in flight
    local_writes: writes::LocalWrites,
}

impl SyncEngine {
    /// Create an engine over separate replica and outbox stores.
    pub fn new(
        replica_store: Arc<dyn ReplicaStore>,
        outbox_store: Arc<dyn OutboxStore>,
        api: Arc<dyn LeadsApi>,
        connectivity: Connectivity,
    ) -> Self {
        let (state, state_rx) = watch::channel(EngineState::Idle);
        Self {
            replica: LocalReplica::new(replica_store),
            outbox: Outbox::new(outbox_store),
            api,
            connectivity,
            state,
            state_rx,
            draining: AtomicBool::new(false),
            local_writes: writes::LocalWrites::default(),
        }
    }

    /// Create an engine over one store that keeps both the replica and the
    /// outbox.
    pub fn with_store<S>(store: Arc<S>, api: Arc<dyn LeadsApi>, connectivity: Connectivity) -> Self
    where
        S: ReplicaStore + OutboxStore + 'static,
    {
        Self::new(store.clone(), store, api, connectivity)
    }

    /// Open the SQLite store and HTTP client named by `config`.
    ///
    /// The HTTP client is returned alongside the engine so the host can
    /// install and rotate the session token.
    pub async fn open(
        config: &SyncConfig,
        connectivity: Connectivity,
    ) -> Result<(Self, Arc<HttpLeadsApi>), SyncError> {
        config.validate().map_err(|e| SyncError::Config(e.to_string()))?;

        let store = Arc::new(SqliteStore::connect(&config.store_url).await?);
        let api = Arc::new(
            HttpLeadsApi::new(&config.api_base_url, config.request_timeout())
                .map_err(|e| SyncError::Config(e.to_string()))?,
        );

        info!(
            api = %config.api_base_url,
            store = %config.store_url,
            online = connectivity.is_online(),
            "Sync engine opened"
        );
        let engine = Self::with_store(store, api.clone(), connectivity);
        Ok((engine, api))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // State & Introspection
    // ═══════════════════════════════════════════════════════════════════════════

    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub(crate) fn set_state(&self, next: EngineState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "Engine state changed");
        }
    }

    /// Pending outbox entries, oldest first.
    pub async fn outbox_items(&self) -> Result<Vec<OutboxEntry>, SyncError> {
        Ok(self.outbox.list_pending().await?)
    }

    pub async fn outbox_count(&self) -> Result<u64, SyncError> {
        Ok(self.outbox.count().await?)
    }

    /// Ids of leads that still have unsynced mutations.
    pub async fn pending_lead_ids(&self) -> Result<BTreeSet<String>, SyncError> {
        let pending = self.outbox.list_pending().await?;
        Ok(reconcile::pending_lead_ids(&pending))
    }

    /// Discard every queued mutation. Returns how many were dropped.
    pub async fn clear_outbox(&self) -> Result<u64, SyncError> {
        Ok(self.outbox.clear().await?)
    }

    /// Epoch millis of the last successful remote read.
    pub async fn last_sync_at(&self) -> Result<Option<i64>, SyncError> {
        Ok(self.replica.last_sync_at().await?)
    }

    pub async fn outbox_stats(&self) -> Result<OutboxStats, SyncError> {
        Ok(OutboxStats {
            pending: self.outbox.count().await?,
            total_enqueued: self.outbox.total_enqueued(),
            total_replayed: self.outbox.total_replayed(),
            draining: self.is_draining(),
            online: self.is_online(),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-crate fake of the remote API for engine and projection tests.

    use std::collections::{HashMap, VecDeque};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use crate::lead::LeadStatus;
    use crate::remote::{ApiError, LeadsApi};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        List,
        Patch(String, LeadStatus),
        Delete(String),
    }

    /// Server double: a map of leads plus a queue of scripted failures.
    #[derive(Default)]
    pub struct FakeApi {
        pub leads: Mutex<Vec<Value>>,
        pub calls: Mutex<Vec<Call>>,
        pub failures: Mutex<VecDeque<ApiError>>,
        pub patch_overrides: Mutex<HashMap<String, Value>>,
    }

    impl FakeApi {
        pub fn with_leads(ids: &[&str]) -> Self {
            let fake = Self::default();
            *fake.leads.lock() = ids
                .iter()
                .map(|id| json!({"id": id, "name": format!("Lead {id}"), "status": "new"}))
                .collect();
            fake
        }

        pub fn fail_next(&self, err: ApiError) {
            self.failures.lock().push_back(err);
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        pub fn status_of(&self, id: &str) -> Option<String> {
            self.leads
                .lock()
                .iter()
                .find(|l| l["id"] == id)
                .and_then(|l| l["status"].as_str().map(str::to_string))
        }

        fn next_failure(&self) -> Result<(), ApiError> {
            match self.failures.lock().pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl LeadsApi for FakeApi {
        async fn list_leads(&self) -> Result<Vec<Value>, ApiError> {
            self.calls.lock().push(Call::List);
            self.next_failure()?;
            Ok(self.leads.lock().clone())
        }

        async fn patch_status(&self, id: &str, status: LeadStatus) -> Result<Value, ApiError> {
            self.calls.lock().push(Call::Patch(id.to_string(), status));
            self.next_failure()?;
            if let Some(body) = self.patch_overrides.lock().get(id) {
                return Ok(body.clone());
            }
            let mut leads = self.leads.lock();
            let lead = leads
                .iter_mut()
                .find(|l| l["id"] == id)
                .ok_or_else(|| ApiError::from_status(404, "lead not found"))?;
            lead["status"] = json!(status.as_str());
            Ok(json!({"lead": lead.clone()}))
        }

        async fn delete_lead(&self, id: &str) -> Result<(), ApiError> {
            self.calls.lock().push(Call::Delete(id.to_string()));
            self.next_failure()?;
            self.leads.lock().retain(|l| l["id"] != id);
            Ok(())
        }
    }
}
