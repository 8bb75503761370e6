use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::lead::Lead;
use crate::outbox::{MutationKind, OutboxEntry};
use crate::replica::CachedLeadRecord;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Item not found")]
    NotFound,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Stored record could not be (de)serialized: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Durable home of the lead replica and the `lastSyncAt` marker.
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// Replace every cached record and set `lastSyncAt` in one transaction.
    /// Either both writes land or neither does.
    async fn save_snapshot(
        &self,
        records: &[CachedLeadRecord],
        synced_at: i64,
    ) -> Result<(), StorageError>;

    async fn all_cached(&self) -> Result<Vec<CachedLeadRecord>, StorageError>;

    async fn cached_by_id(&self, id: &str) -> Result<Option<CachedLeadRecord>, StorageError>;

    async fn last_sync_at(&self) -> Result<Option<i64>, StorageError>;

    /// Insert or replace a single record.
    async fn upsert_cached(&self, record: &CachedLeadRecord) -> Result<(), StorageError>;

    /// Remove a single record. Missing ids are not an error.
    async fn remove_cached(&self, id: &str) -> Result<(), StorageError>;
}

/// Durable FIFO of pending remote mutations.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Append an entry and return its auto-assigned id.
    async fn append(
        &self,
        kind: MutationKind,
        lead_id: &str,
        payload: Option<&Value>,
        created_at: i64,
    ) -> Result<i64, StorageError>;

    /// All entries in append order (ascending id). `created_at` is
    /// informational and never used for ordering.
    async fn list_pending(&self) -> Result<Vec<OutboxEntry>, StorageError>;

    /// Increment `attempts` and record `last_error`.
    async fn mark_attempt(&self, entry_id: i64, error: &str) -> Result<(), StorageError>;

    async fn remove(&self, entry_id: i64) -> Result<(), StorageError>;

    async fn count(&self) -> Result<u64, StorageError>;

    /// Drop every entry. Returns how many were removed.
    async fn clear(&self) -> Result<u64, StorageError>;
}

/// Convenience for code that only needs the lead out of a record.
pub(crate) fn leads_of(records: Vec<CachedLeadRecord>) -> Vec<Lead> {
    records.into_iter().map(|r| r.data).collect()
}
