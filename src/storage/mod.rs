// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backends for the replica and the outbox.
//!
//! - [`sql::SqliteStore`]: durable, file-backed (sqlx `Any` driver on SQLite)
//! - [`memory::InMemoryStore`]: process-local, for tests and throwaway sessions

pub mod memory;
pub mod sql;
pub mod traits;

pub use memory::InMemoryStore;
pub use sql::SqliteStore;
pub use traits::{OutboxStore, ReplicaStore, StorageError};
