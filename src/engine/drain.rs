// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Outbox drain: FIFO replay of queued mutations.
//!
//! At most one drain runs at a time. A second caller gets
//! [`SkipReason::AlreadyRunning`] instead of waiting.
//!
//! Each entry is replayed exactly as recorded. Success removes it; failure
//! records the attempt and moves on to the next entry, except for a 401,
//! which stops the pass so nothing else is sent with a dead session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::outbox::{MutationKind, OutboxEntry};
use crate::remote::{resolve_status, ApiError};

use super::writes::LocalWrite;
use super::{
    DrainHalt, DrainOutcome, DrainReport, EngineState, RemoteFailure, SkipReason, SyncEngine,
    SyncError,
};

/// What replaying one entry against the server produced.
enum Replay {
    Applied,
    Failed(String),
    Unauthorized,
}

impl SyncEngine {
    /// Replay every pending outbox entry, oldest first.
    ///
    /// Skips when offline or when another drain is in flight. Errors only if
    /// the pending list itself cannot be read.
    pub async fn drain_outbox(&self) -> Result<DrainOutcome, SyncError> {
        if !self.is_online() {
            return Ok(DrainOutcome::Skipped(SkipReason::Offline));
        }
        if self.draining.swap(true, Ordering::AcqRel) {
            crate::metrics::record_operation("engine", "drain", "skipped");
            return Ok(DrainOutcome::Skipped(SkipReason::AlreadyRunning));
        }
        let _guard = DrainGuard(&self.draining);

        let drain_id = Uuid::new_v4().to_string();
        let span = info_span!("drain", %drain_id);
        self.set_state(EngineState::Syncing);

        let result = self.replay_pending().instrument(span).await;
        match &result {
            Ok(report) if report.session_expired() => self.set_state(EngineState::Error),
            Ok(_) => self.set_state(EngineState::Idle),
            Err(_) => self.set_state(EngineState::Error),
        }
        result.map(DrainOutcome::Completed)
    }

    async fn replay_pending(&self) -> Result<DrainReport, SyncError> {
        let pending = self.outbox.list_pending().await.map_err(|e| {
            error!(error = %e, "Reading outbox for drain failed");
            SyncError::from(e)
        })?;

        let mut report = DrainReport {
            attempted: 0,
            replayed: 0,
            failed: 0,
            remaining: pending.len() as u64,
            halt: None,
        };
        if pending.is_empty() {
            return Ok(report);
        }

        info!(pending = pending.len(), "Starting outbox drain");

        for entry in &pending {
            if !self.is_online() {
                warn!(entry_id = entry.id, "Went offline mid-drain, stopping");
                report.halt = Some(DrainHalt::WentOffline);
                break;
            }

            report.attempted += 1;
            match self.replay(entry).await {
                Replay::Applied => {
                    report.replayed += 1;
                    if let Err(e) = self.outbox.remove(entry.id).await {
                        // Entry stays queued and is replayed again next pass
                        error!(
                            entry_id = entry.id,
                            error = %e,
                            "Failed to remove replayed outbox entry"
                        );
                    }
                }
                Replay::Failed(reason) => {
                    report.failed += 1;
                    warn!(
                        entry_id = entry.id,
                        kind = %entry.kind,
                        lead_id = %entry.lead_id,
                        %reason,
                        "Replay failed"
                    );
                    self.record_attempt(entry, &reason).await;
                }
                Replay::Unauthorized => {
                    report.failed += 1;
                    self.record_attempt(entry, &ApiError::Unauthorized.to_string()).await;
                    warn!(entry_id = entry.id, "Session expired during drain, stopping");
                    report.halt = Some(DrainHalt::SessionExpired);
                    break;
                }
            }
        }

        report.remaining = match self.outbox.count().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Counting outbox after drain failed");
                (pending.len() - report.replayed) as u64
            }
        };

        crate::metrics::record_drain(report.replayed, report.failed, report.session_expired());
        info!(
            attempted = report.attempted,
            replayed = report.replayed,
            failed = report.failed,
            remaining = report.remaining,
            halt = ?report.halt,
            "Outbox drain complete"
        );
        Ok(report)
    }

    async fn replay(&self, entry: &OutboxEntry) -> Replay {
        let start = Instant::now();
        let (op, result) = match entry.kind {
            MutationKind::PatchStatus => {
                let Some(status) = entry.requested_status() else {
                    return Replay::Failed("entry has no valid status payload".into());
                };
                let result = self
                    .api
                    .patch_status(&entry.lead_id, status)
                    .await
                    .map(|body| resolve_status(&body, status));
                if let Ok(resolved) = result {
                    self.local_writes.record(&entry.lead_id, LocalWrite::Status(resolved));
                    self.cache_status(&entry.lead_id, resolved).await;
                }
                ("patch_status", result.map(|_| ()))
            }
            MutationKind::DeleteLead => {
                let result = self.api.delete_lead(&entry.lead_id).await;
                if result.is_ok() {
                    self.local_writes.record(&entry.lead_id, LocalWrite::Deleted);
                    if let Err(e) = self.replica.remove_cached(&entry.lead_id).await {
                        warn!(
                            lead_id = %entry.lead_id,
                            error = %e,
                            "Removing replayed delete from cache failed"
                        );
                    }
                }
                ("delete", result)
            }
        };
        crate::metrics::record_remote_latency(op, start.elapsed());

        match result {
            Ok(()) => Replay::Applied,
            Err(e) => {
                crate::metrics::record_remote_error(op, RemoteFailure::from(&e).class());
                if e.is_auth_failure() {
                    Replay::Unauthorized
                } else {
                    Replay::Failed(e.to_string())
                }
            }
        }
    }

    async fn record_attempt(&self, entry: &OutboxEntry, reason: &str) {
        if let Err(e) = self.outbox.mark_attempt(entry.id, reason).await {
            warn!(entry_id = entry.id, error = %e, "Failed to record outbox attempt");
        }
    }
}

/// RAII guard to reset the draining flag.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::connectivity::ConnectivityMonitor;
    use crate::engine::test_support::{Call, FakeApi};
    use crate::lead::LeadStatus;
    use crate::outbox::status_payload;
    use crate::storage::InMemoryStore;

    async fn offline_engine(api: Arc<FakeApi>) -> (SyncEngine, ConnectivityMonitor) {
        let monitor = ConnectivityMonitor::new(true);
        let engine = SyncEngine::with_store(Arc::new(InMemoryStore::new()), api, monitor.handle());
        engine.load_leads().await.unwrap();
        monitor.set_online(false);
        (engine, monitor)
    }

    fn completed(outcome: DrainOutcome) -> DrainReport {
        match outcome {
            DrainOutcome::Completed(report) => report,
            other => panic!("expected a completed drain, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_drain_replays_in_fifo_order() {
        let api = Arc::new(FakeApi::with_leads(&["a", "b", "c"]));
        let (engine, monitor) = offline_engine(api.clone()).await;

        engine.mutate_status("c", LeadStatus::Success).await.unwrap();
        engine.delete_lead("a").await.unwrap();
        engine.mutate_status("b", LeadStatus::Failed).await.unwrap();

        monitor.set_online(true);
        let report = completed(engine.drain_outbox().await.unwrap());

        assert_eq!(report.replayed, 3);
        assert_eq!(report.remaining, 0);
        assert_eq!(
            api.calls()[1..].to_vec(),
            vec![
                Call::Patch("c".into(), LeadStatus::Success),
                Call::Delete("a".into()),
                Call::Patch("b".into(), LeadStatus::Failed),
            ]
        );
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.outbox_stats().await.unwrap().total_replayed, 3);
    }

    #[tokio::test]
    async fn test_drain_skips_when_offline() {
        let api = Arc::new(FakeApi::with_leads(&["a"]));
        let (engine, _monitor) = offline_engine(api.clone()).await;
        engine.delete_lead("a").await.unwrap();

        assert_eq!(
            engine.drain_outbox().await.unwrap(),
            DrainOutcome::Skipped(SkipReason::Offline)
        );
        assert_eq!(engine.outbox_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drain_is_single_flight() {
        let api = Arc::new(FakeApi::with_leads(&["a"]));
        let (engine, monitor) = offline_engine(api).await;
        monitor.set_online(true);

        engine.draining.store(true, Ordering::Release);
        assert_eq!(
            engine.drain_outbox().await.unwrap(),
            DrainOutcome::Skipped(SkipReason::AlreadyRunning)
        );

        engine.draining.store(false, Ordering::Release);
        assert!(matches!(engine.drain_outbox().await.unwrap(), DrainOutcome::Completed(_)));
        assert!(!engine.is_draining());
    }

    #[tokio::test]
    async fn test_failed_entry_stays_and_drain_continues() {
        let api = Arc::new(FakeApi::with_leads(&["a", "b"]));
        let (engine, monitor) = offline_engine(api.clone()).await;
        engine.mutate_status("a", LeadStatus::Success).await.unwrap();
        engine.mutate_status("b", LeadStatus::Success).await.unwrap();

        monitor.set_online(true);
        api.fail_next(ApiError::Server { status: 500, message: "boom".into() });
        let report = completed(engine.drain_outbox().await.unwrap());

        assert_eq!(report.attempted, 2);
        assert_eq!(report.replayed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 1);
        assert_eq!(report.halt, None);

        let left = engine.outbox_items().await.unwrap();
        assert_eq!(left[0].lead_id, "a");
        assert_eq!(left[0].attempts, 1);
        assert!(left[0].last_error.as_deref().unwrap().contains("500"));
        assert_eq!(api.status_of("b").as_deref(), Some("success"));
    }

    #[tokio::test]
    async fn test_unauthorized_halts_drain() {
        let api = Arc::new(FakeApi::with_leads(&["a", "b", "c"]));
        let (engine, monitor) = offline_engine(api.clone()).await;
        engine.delete_lead("a").await.unwrap();
        engine.delete_lead("b").await.unwrap();
        engine.delete_lead("c").await.unwrap();

        monitor.set_online(true);
        api.fail_next(ApiError::Unauthorized);
        let report = completed(engine.drain_outbox().await.unwrap());

        assert!(report.session_expired());
        assert_eq!(report.attempted, 1);
        assert_eq!(report.remaining, 3);
        assert_eq!(engine.state(), EngineState::Error);

        let left = engine.outbox_items().await.unwrap();
        assert_eq!(left[0].attempts, 1);
        assert_eq!(left[1].attempts, 0);
        assert_eq!(left[2].attempts, 0);
    }

    #[tokio::test]
    async fn test_empty_outbox_drain_is_noop() {
        let api = Arc::new(FakeApi::with_leads(&[]));
        let monitor = ConnectivityMonitor::new(true);
        let engine = SyncEngine::with_store(Arc::new(InMemoryStore::new()), api.clone(), monitor.handle());

        let report = completed(engine.drain_outbox().await.unwrap());
        assert_eq!(report.attempted, 0);
        assert!(api.calls().is_empty());
        // Idempotent
        let report = completed(engine.drain_outbox().await.unwrap());
        assert_eq!(report.remaining, 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_recorded_not_sent() {
        let api = Arc::new(FakeApi::with_leads(&["a"]));
        let (engine, monitor) = offline_engine(api.clone()).await;
        engine
            .outbox
            .enqueue(MutationKind::PatchStatus, "a", Some(serde_json::json!({"status": 3})))
            .await
            .unwrap();
        engine
            .outbox
            .enqueue(MutationKind::PatchStatus, "a", Some(status_payload(LeadStatus::Failed)))
            .await
            .unwrap();

        monitor.set_online(true);
        let report = completed(engine.drain_outbox().await.unwrap());
        assert_eq!(report.failed, 1);
        assert_eq!(report.replayed, 1);
        assert_eq!(api.calls()[1..].to_vec(), vec![Call::Patch("a".into(), LeadStatus::Failed)]);
    }
}
