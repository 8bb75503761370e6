// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite storage backend for the replica and the outbox.
//!
//! Schema:
//! ```sql
//! CREATE TABLE leads_cache (
//!   id TEXT PRIMARY KEY,
//!   data TEXT NOT NULL,          -- Lead as JSON
//!   updated_at INTEGER NOT NULL  -- epoch millis of the write
//! );
//! CREATE TABLE outbox (
//!   id INTEGER PRIMARY KEY AUTOINCREMENT,
//!   kind TEXT NOT NULL,          -- PATCH_STATUS | DELETE_LEAD
//!   lead_id TEXT NOT NULL,
//!   payload TEXT,                -- JSON or NULL
//!   created_at INTEGER NOT NULL,
//!   attempts INTEGER NOT NULL DEFAULT 0,
//!   last_error TEXT
//! );
//! CREATE TABLE sync_meta (
//!   key TEXT PRIMARY KEY,        -- only 'lastSyncAt' today
//!   value INTEGER NOT NULL
//! );
//! ```
//!
//! `save_snapshot` is the only multi-row write and runs in a single
//! transaction together with the `lastSyncAt` upsert. Every other write
//! touches exactly one row.

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tracing::{debug, info};

use super::traits::{OutboxStore, ReplicaStore, StorageError};
use crate::outbox::{MutationKind, OutboxEntry};
use crate::replica::CachedLeadRecord;
use crate::resilience::retry::{retry, retry_if, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

const LAST_SYNC_KEY: &str = "lastSyncAt";

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// Lock contention is worth another try; anything else is not.
fn is_transient(err: &StorageError) -> bool {
    match err {
        StorageError::Backend(msg) => {
            let msg = msg.to_ascii_lowercase();
            msg.contains("locked") || msg.contains("busy")
        }
        _ => false,
    }
}

pub struct SqliteStore {
    pool: AnyPool,
}

impl SqliteStore {
    /// Open (creating if needed) a database file.
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StorageError> {
        let url = format!("sqlite://{}?mode=rwc", path.as_ref().to_string_lossy());
        Self::connect(&url).await
    }

    /// Connect using a `sqlite:` URL, e.g. `sqlite://leads.db?mode=rwc`
    /// or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        if !url.starts_with("sqlite:") {
            return Err(StorageError::Backend(format!(
                "Unsupported store URL '{}': only sqlite is supported",
                url
            )));
        }
        install_drivers();

        // A private in-memory database lives exactly as long as its connection.
        let in_memory = url.contains(":memory:");

        info!(url, in_memory, "Opening local store");

        let pool = retry("sqlite_connect", &RetryConfig::startup(), || async {
            let mut options = AnyPoolOptions::new()
                .max_connections(if in_memory { 1 } else { 4 })
                .acquire_timeout(Duration::from_secs(10))
                .after_connect(|conn, _meta| {
                    Box::pin(async move {
                        sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                        // FULL: a committed outbox append must survive power loss.
                        sqlx::query("PRAGMA synchronous = FULL").execute(&mut *conn).await?;
                        sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                        Ok(())
                    })
                });
            if in_memory {
                options = options.idle_timeout(None).max_lifetime(None);
            }
            options.connect(url).await.map_err(backend)
        })
        .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Get a clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        const STATEMENTS: [&str; 3] = [
            r#"
            CREATE TABLE IF NOT EXISTS leads_cache (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS outbox (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                lead_id TEXT NOT NULL,
                payload TEXT,
                created_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sync_meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )
            "#,
        ];

        for sql in STATEMENTS {
            retry("sqlite_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(sql).execute(&self.pool).await.map_err(backend)
            })
            .await?;
        }
        debug!("Local store schema ready");
        Ok(())
    }

    fn record_from_row(row: &AnyRow) -> Result<CachedLeadRecord, StorageError> {
        let id: String = row.try_get("id").map_err(backend)?;
        let data: String = row.try_get("data").map_err(backend)?;
        let updated_at: i64 = row.try_get("updated_at").map_err(backend)?;
        Ok(CachedLeadRecord {
            id,
            data: serde_json::from_str(&data)?,
            updated_at,
        })
    }

    fn entry_from_row(row: &AnyRow) -> Result<OutboxEntry, StorageError> {
        let kind: String = row.try_get("kind").map_err(backend)?;
        let kind = MutationKind::parse(&kind)
            .ok_or_else(|| StorageError::Serialization(format!("unknown outbox kind '{}'", kind)))?;
        let payload: Option<String> = row.try_get("payload").map_err(backend)?;
        let payload = payload.map(|p| serde_json::from_str::<Value>(&p)).transpose()?;
        let attempts: i64 = row.try_get("attempts").map_err(backend)?;

        Ok(OutboxEntry {
            id: row.try_get("id").map_err(backend)?,
            kind,
            lead_id: row.try_get("lead_id").map_err(backend)?,
            payload,
            created_at: row.try_get("created_at").map_err(backend)?,
            attempts: attempts.max(0) as u32,
            last_error: row.try_get("last_error").map_err(backend)?,
        })
    }
}

#[async_trait]
impl ReplicaStore for SqliteStore {
    async fn save_snapshot(
        &self,
        records: &[CachedLeadRecord],
        synced_at: i64,
    ) -> Result<(), StorageError> {
        let rows: Vec<(String, String, i64)> = records
            .iter()
            .map(|r| -> Result<(String, String, i64), StorageError> {
                Ok((r.id.clone(), serde_json::to_string(&r.data)?, r.updated_at))
            })
            .collect::<Result<_, _>>()?;

        retry_if("sqlite_save_snapshot", &RetryConfig::local_io(), is_transient, || async {
            let mut tx = self.pool.begin().await.map_err(backend)?;

            sqlx::query("DELETE FROM leads_cache")
                .execute(&mut *tx)
                .await
                .map_err(backend)?;

            for (id, data, updated_at) in &rows {
                sqlx::query("INSERT INTO leads_cache (id, data, updated_at) VALUES (?, ?, ?)")
                    .bind(id)
                    .bind(data)
                    .bind(*updated_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend)?;
            }

            sqlx::query(
                "INSERT INTO sync_meta (key, value) VALUES (?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(LAST_SYNC_KEY)
            .bind(synced_at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

            tx.commit().await.map_err(backend)
        })
        .await?;

        debug!(count = rows.len(), synced_at, "Snapshot committed");
        Ok(())
    }

    async fn all_cached(&self) -> Result<Vec<CachedLeadRecord>, StorageError> {
        let rows = sqlx::query("SELECT id, data, updated_at FROM leads_cache ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(Self::record_from_row).collect()
    }

    async fn cached_by_id(&self, id: &str) -> Result<Option<CachedLeadRecord>, StorageError> {
        let row = sqlx::query("SELECT id, data, updated_at FROM leads_cache WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn last_sync_at(&self) -> Result<Option<i64>, StorageError> {
        let row = sqlx::query("SELECT value FROM sync_meta WHERE key = ?")
            .bind(LAST_SYNC_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|r| r.try_get::<i64, _>("value").map_err(backend))
            .transpose()
    }

    async fn upsert_cached(&self, record: &CachedLeadRecord) -> Result<(), StorageError> {
        let data = serde_json::to_string(&record.data)?;
        retry_if("sqlite_upsert_cached", &RetryConfig::local_io(), is_transient, || async {
            sqlx::query(
                "INSERT INTO leads_cache (id, data, updated_at) VALUES (?, ?, ?) \
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            )
            .bind(&record.id)
            .bind(&data)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
            Ok(())
        })
        .await
    }

    async fn remove_cached(&self, id: &str) -> Result<(), StorageError> {
        retry_if("sqlite_remove_cached", &RetryConfig::local_io(), is_transient, || async {
            sqlx::query("DELETE FROM leads_cache WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl OutboxStore for SqliteStore {
    async fn append(
        &self,
        kind: MutationKind,
        lead_id: &str,
        payload: Option<&Value>,
        created_at: i64,
    ) -> Result<i64, StorageError> {
        let payload = payload.map(serde_json::to_string).transpose()?;

        retry_if("sqlite_outbox_append", &RetryConfig::local_io(), is_transient, || async {
            let row = sqlx::query(
                "INSERT INTO outbox (kind, lead_id, payload, created_at, attempts) \
                 VALUES (?, ?, ?, ?, 0) RETURNING id",
            )
            .bind(kind.as_str())
            .bind(lead_id)
            .bind(payload.clone())
            .bind(created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
            row.try_get::<i64, _>("id").map_err(backend)
        })
        .await
    }

    async fn list_pending(&self) -> Result<Vec<OutboxEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, kind, lead_id, payload, created_at, attempts, last_error \
             FROM outbox ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(Self::entry_from_row).collect()
    }

    async fn mark_attempt(&self, entry_id: i64, error: &str) -> Result<(), StorageError> {
        let result = retry_if("sqlite_outbox_mark", &RetryConfig::local_io(), is_transient, || async {
            sqlx::query("UPDATE outbox SET attempts = attempts + 1, last_error = ? WHERE id = ?")
                .bind(error)
                .bind(entry_id)
                .execute(&self.pool)
                .await
                .map_err(backend)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn remove(&self, entry_id: i64) -> Result<(), StorageError> {
        retry_if("sqlite_outbox_remove", &RetryConfig::local_io(), is_transient, || async {
            sqlx::query("DELETE FROM outbox WHERE id = ?")
                .bind(entry_id)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
            Ok(())
        })
        .await
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM outbox")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        let count: i64 = row.try_get("cnt").map_err(backend)?;
        Ok(count.max(0) as u64)
    }

    async fn clear(&self) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM outbox")
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }
}
