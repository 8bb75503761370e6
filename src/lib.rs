//! # Leads Sync
//!
//! Offline-first synchronization for a CRM lead list.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     State Projection                        │
//! │  • Lead list, loading/error flags, pending markers         │
//! │  • Optimistic edits applied before any I/O                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Sync Engine                          │
//! │  • Remote-first reads with cache fallback                  │
//! │  • Remote write or durable enqueue                         │
//! │  • Single-flight FIFO outbox drain                         │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                    │
//!          ▼                   ▼                    ▼
//! ┌────────────────┐  ┌────────────────┐  ┌────────────────────┐
//! │ Local Replica  │  │ Mutation       │  │ Remote Leads API   │
//! │ leads + meta   │  │ Outbox         │  │ GET/PATCH/DELETE   │
//! └────────────────┘  └────────────────┘  └────────────────────┘
//!          └──────── SQLite / memory ───────┘
//!
//!            Connectivity Monitor ── online ──▶ drain
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use leads_sync::{ConnectivityMonitor, LeadsProjection, LeadStatus, SyncConfig, SyncEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SyncConfig::from_file("leads_sync.toml").unwrap_or_default();
//!     let monitor = ConnectivityMonitor::new(config.start_online);
//!
//!     let (engine, api) = SyncEngine::open(&config, monitor.handle())
//!         .await
//!         .expect("Failed to open sync engine");
//!     api.set_token(Some("session-token".into()));
//!
//!     let projection = Arc::new(LeadsProjection::new(Arc::new(engine), config.refresh_after_drain));
//!     let _relay = projection.attach(&monitor);
//!
//!     projection.load_leads().await.ok();
//!     projection.update_lead_status("lead-1", LeadStatus::Success).await.ok();
//!
//!     // Host network events
//!     monitor.set_online(false);
//!     monitor.set_online(true); // triggers an outbox drain
//! }
//! ```
//!
//! ## Modules
//!
//! - [`projection`]: The UI-facing [`LeadsProjection`]
//! - [`engine`]: The [`SyncEngine`] (load, mutate, drain)
//! - [`replica`]: Local cache of server leads
//! - [`outbox`]: Durable queue of unsynced mutations
//! - [`storage`]: Store backends (SQLite, memory)
//! - [`remote`]: The leads REST API client
//! - [`connectivity`]: Host network signal relay
//! - [`resilience`]: Retry helpers for local I/O

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod lead;
pub mod metrics;
pub mod outbox;
pub mod projection;
pub mod remote;
pub mod replica;
pub mod resilience;
pub mod storage;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::{ConfigError, SyncConfig};
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use engine::{
    DrainHalt, DrainOutcome, DrainReport, EngineState, LoadOutcome, LoadSource,
    MutationOutcome, OutboxStats, RemoteFailure, SkipReason, SyncEngine, SyncError,
};
pub use lead::{Lead, LeadStatus};
pub use outbox::{MutationKind, Outbox, OutboxEntry, OutboxError};
pub use projection::{LeadsProjection, ProjectionSnapshot};
pub use remote::{ApiError, HttpLeadsApi, LeadsApi};
pub use replica::{CachedLeadRecord, LocalReplica};
pub use resilience::retry::RetryConfig;
pub use storage::{InMemoryStore, OutboxStore, ReplicaStore, SqliteStore, StorageError};
