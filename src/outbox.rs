// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable mutation outbox.
//!
//! Write operations that could not be confirmed remotely are appended here
//! and replayed in creation order by the engine's drain. An entry lives
//! through `created → (attempted)* → removed`; there is no terminal failed
//! state, so a permanently rejected mutation stays queued until it succeeds
//! or the user clears the outbox.
//!
//! Losing an entry is data loss, so [`Outbox::enqueue`] never swallows a
//! storage error: it comes back as [`OutboxError::NotSaved`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::lead::{now_millis, LeadStatus};
use crate::storage::traits::{OutboxStore, StorageError};

/// Kind of queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationKind {
    PatchStatus,
    DeleteLead,
}

impl MutationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatchStatus => "PATCH_STATUS",
            Self::DeleteLead => "DELETE_LEAD",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PATCH_STATUS" => Some(Self::PatchStatus),
            "DELETE_LEAD" => Some(Self::DeleteLead),
            _ => None,
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: i64,
    pub kind: MutationKind,
    pub lead_id: String,
    pub payload: Option<Value>,
    /// Epoch millis.
    pub created_at: i64,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl OutboxEntry {
    /// Requested status of a `PATCH_STATUS` entry.
    #[must_use]
    pub fn requested_status(&self) -> Option<LeadStatus> {
        self.payload
            .as_ref()?
            .get("status")?
            .as_str()
            .and_then(LeadStatus::parse)
    }
}

/// Payload stored with a `PATCH_STATUS` entry.
#[must_use]
pub fn status_payload(status: LeadStatus) -> Value {
    json!({ "status": status.as_str() })
}

#[derive(Error, Debug)]
pub enum OutboxError {
    /// The mutation could not be persisted. Surface as "action not saved".
    #[error("Action not saved: {0}")]
    NotSaved(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Outbox facade owned by the sync engine.
pub struct Outbox {
    store: Arc<dyn OutboxStore>,
    total_enqueued: AtomicU64,
    total_replayed: AtomicU64,
}

impl Outbox {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self {
            store,
            total_enqueued: AtomicU64::new(0),
            total_replayed: AtomicU64::new(0),
        }
    }

    /// Durably append a mutation. Returns the new entry id.
    pub async fn enqueue(
        &self,
        kind: MutationKind,
        lead_id: &str,
        payload: Option<Value>,
    ) -> Result<i64, OutboxError> {
        let id = self
            .store
            .append(kind, lead_id, payload.as_ref(), now_millis())
            .await
            .map_err(|e| {
                error!(error = %e, %kind, lead_id, "Failed to persist outbox entry");
                crate::metrics::record_operation("outbox", "enqueue", "error");
                OutboxError::NotSaved(e.to_string())
            })?;

        self.total_enqueued.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_operation("outbox", "enqueue", "success");
        info!(entry_id = id, %kind, lead_id, "Mutation queued in outbox");
        Ok(id)
    }

    /// Pending entries, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<OutboxEntry>, OutboxError> {
        Ok(self.store.list_pending().await?)
    }

    pub async fn mark_attempt(&self, entry_id: i64, error: &str) -> Result<(), OutboxError> {
        self.store.mark_attempt(entry_id, error).await?;
        debug!(entry_id, error, "Outbox attempt recorded");
        Ok(())
    }

    /// Remove an entry after its remote mutation was confirmed.
    pub async fn remove(&self, entry_id: i64) -> Result<(), OutboxError> {
        self.store.remove(entry_id).await?;
        self.total_replayed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn count(&self) -> Result<u64, OutboxError> {
        let count = self.store.count().await?;
        crate::metrics::set_outbox_entries(count);
        Ok(count)
    }

    /// Manually discard every queued mutation.
    pub async fn clear(&self) -> Result<u64, OutboxError> {
        let removed = self.store.clear().await?;
        crate::metrics::set_outbox_entries(0);
        info!(removed, "Outbox cleared");
        Ok(removed)
    }

    #[must_use]
    pub fn total_enqueued(&self) -> u64 {
        self.total_enqueued.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_replayed(&self) -> u64 {
        self.total_replayed.load(Ordering::Relaxed)
    }
}
