//! Public types for the sync engine.

use thiserror::Error;

use crate::lead::{Lead, LeadStatus};
use crate::outbox::OutboxError;
use crate::remote::ApiError;
use crate::storage::traits::StorageError;

/// Engine lifecycle state.
///
/// Use [`super::SyncEngine::state()`] to check the current state or
/// [`super::SyncEngine::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing in flight
    Idle,
    /// `load_leads` running
    Loading,
    /// Outbox drain running
    Syncing,
    /// Last operation ended in a terminal error (no cache, session expired)
    Error,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Loading => write!(f, "Loading"),
            Self::Syncing => write!(f, "Syncing"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Errors that cross the engine boundary. Transport errors never do.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Remote unreachable and nothing cached. Remedy: get online.
    #[error("No saved data: connect to the internet to load leads")]
    NoCachedData,
    /// HTTP 401. The auth collaborator must force a re-login.
    #[error("Session expired: sign in again")]
    SessionExpired,
    /// The server refused a mutation (4xx other than 401).
    #[error("Server rejected the change (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    /// A mutation could not be written to the outbox.
    #[error("Action not saved: {0}")]
    ActionNotSaved(String),
    #[error("Local storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<OutboxError> for SyncError {
    fn from(err: OutboxError) -> Self {
        match err {
            OutboxError::NotSaved(msg) => SyncError::ActionNotSaved(msg),
            OutboxError::Storage(e) => SyncError::Storage(e.to_string()),
        }
    }
}

/// Why a mutation went to the outbox instead of being confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    /// Connectivity reported offline; no request was made
    Offline,
    /// An older mutation for the same lead is still queued
    QueuedBehind,
    Network(String),
    Unauthorized,
    Rejected { status: u16, message: String },
    Server { status: u16 },
    Decode(String),
}

impl From<&ApiError> for RemoteFailure {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Network(msg) => Self::Network(msg.clone()),
            ApiError::Unauthorized => Self::Unauthorized,
            ApiError::Rejected { status, message } => Self::Rejected {
                status: *status,
                message: message.clone(),
            },
            ApiError::Server { status, .. } => Self::Server { status: *status },
            ApiError::Decode(msg) => Self::Decode(msg.clone()),
        }
    }
}

impl RemoteFailure {
    /// Metric label
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::QueuedBehind => "queued_behind",
            Self::Network(_) => "network",
            Self::Unauthorized => "unauthorized",
            Self::Rejected { .. } => "rejected",
            Self::Server { .. } => "server",
            Self::Decode(_) => "decode",
        }
    }

    /// The error the UI should show, if any. Offline and network trouble
    /// only warrant the informational banner.
    #[must_use]
    pub fn user_error(&self) -> Option<SyncError> {
        match self {
            Self::Unauthorized => Some(SyncError::SessionExpired),
            Self::Rejected { status, message } => Some(SyncError::Rejected {
                status: *status,
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

/// Where a lead list came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// Fresh from the server
    Remote,
    /// Local replica, because the remote read failed or was skipped
    Cache { reason: RemoteFailure },
}

/// Result of [`super::SyncEngine::load_leads`].
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// Merged view: remote or cached records with queued mutations applied
    pub leads: Vec<Lead>,
    pub source: LoadSource,
    /// Epoch millis of the last successful remote read
    pub last_sync_at: Option<i64>,
}

impl LoadOutcome {
    #[must_use]
    pub fn is_from_cache(&self) -> bool {
        matches!(self.source, LoadSource::Cache { .. })
    }
}

/// Result of a status update or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The server applied it. For status updates `status` is what the
    /// server says it resolved to.
    Confirmed { status: Option<LeadStatus> },
    /// Durably queued for replay.
    Queued { entry_id: i64, cause: RemoteFailure },
}

impl MutationOutcome {
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

/// Why a drain did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    AlreadyRunning,
}

/// Why a drain stopped before the end of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainHalt {
    /// 401 from the server. Remaining entries wait for re-login.
    SessionExpired,
    /// Connectivity dropped mid-drain.
    WentOffline,
}

/// Summary of one drain pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries replayed against the server
    pub attempted: usize,
    /// Confirmed and removed
    pub replayed: usize,
    /// Failed, attempt recorded, still queued
    pub failed: usize,
    /// Outbox depth after the pass
    pub remaining: u64,
    pub halt: Option<DrainHalt>,
}

impl DrainReport {
    #[must_use]
    pub fn session_expired(&self) -> bool {
        self.halt == Some(DrainHalt::SessionExpired)
    }
}

/// Result of [`super::SyncEngine::drain_outbox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Skipped(SkipReason),
    Completed(DrainReport),
}

/// Outbox observability snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboxStats {
    /// Entries currently queued
    pub pending: u64,
    /// Entries queued since startup
    pub total_enqueued: u64,
    /// Entries confirmed by replay since startup
    pub total_replayed: u64,
    /// Whether a drain is in progress
    pub draining: bool,
    pub online: bool,
}
