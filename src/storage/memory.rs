use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::traits::{OutboxStore, ReplicaStore, StorageError};
use crate::outbox::{MutationKind, OutboxEntry};
use crate::replica::CachedLeadRecord;

/// Process-local replica + outbox.
///
/// Snapshot replacement holds the meta lock for the whole swap so readers
/// of `last_sync_at` never see a timestamp ahead of the rows.
pub struct InMemoryStore {
    leads: DashMap<String, CachedLeadRecord>,
    last_sync_at: RwLock<Option<i64>>,
    outbox: Mutex<OutboxTable>,
}

#[derive(Default)]
struct OutboxTable {
    next_id: i64,
    entries: BTreeMap<i64, OutboxEntry>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            leads: DashMap::new(),
            last_sync_at: RwLock::new(None),
            outbox: Mutex::new(OutboxTable::default()),
        }
    }

    /// Cached lead count
    #[must_use]
    pub fn len(&self) -> usize {
        self.leads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplicaStore for InMemoryStore {
    async fn save_snapshot(
        &self,
        records: &[CachedLeadRecord],
        synced_at: i64,
    ) -> Result<(), StorageError> {
        let mut meta = self.last_sync_at.write();
        self.leads.clear();
        for record in records {
            self.leads.insert(record.id.clone(), record.clone());
        }
        *meta = Some(synced_at);
        Ok(())
    }

    async fn all_cached(&self) -> Result<Vec<CachedLeadRecord>, StorageError> {
        let mut records: Vec<CachedLeadRecord> =
            self.leads.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn cached_by_id(&self, id: &str) -> Result<Option<CachedLeadRecord>, StorageError> {
        Ok(self.leads.get(id).map(|r| r.value().clone()))
    }

    async fn last_sync_at(&self) -> Result<Option<i64>, StorageError> {
        Ok(*self.last_sync_at.read())
    }

    async fn upsert_cached(&self, record: &CachedLeadRecord) -> Result<(), StorageError> {
        self.leads.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn remove_cached(&self, id: &str) -> Result<(), StorageError> {
        self.leads.remove(id);
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn append(
        &self,
        kind: MutationKind,
        lead_id: &str,
        payload: Option<&Value>,
        created_at: i64,
    ) -> Result<i64, StorageError> {
        let mut table = self.outbox.lock();
        table.next_id += 1;
        let id = table.next_id;
        table.entries.insert(
            id,
            OutboxEntry {
                id,
                kind,
                lead_id: lead_id.to_string(),
                payload: payload.cloned(),
                created_at,
                attempts: 0,
                last_error: None,
            },
        );
        Ok(id)
    }

    async fn list_pending(&self) -> Result<Vec<OutboxEntry>, StorageError> {
        let mut entries: Vec<OutboxEntry> = self.outbox.lock().entries.values().cloned().collect();
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    async fn mark_attempt(&self, entry_id: i64, error: &str) -> Result<(), StorageError> {
        let mut table = self.outbox.lock();
        let entry = table.entries.get_mut(&entry_id).ok_or(StorageError::NotFound)?;
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_error = Some(error.to_string());
        Ok(())
    }

    async fn remove(&self, entry_id: i64) -> Result<(), StorageError> {
        self.outbox.lock().entries.remove(&entry_id);
        Ok(())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.outbox.lock().entries.len() as u64)
    }

    async fn clear(&self) -> Result<u64, StorageError> {
        let mut table = self.outbox.lock();
        let removed = table.entries.len() as u64;
        table.entries.clear();
        Ok(removed)
    }
}
