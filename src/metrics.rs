// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for leads-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for installing an exporter; with
//! none installed every call is a no-op.
//!
//! # Metric Naming Convention
//! - `leads_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `component`: remote, replica, outbox, engine
//! - `operation`: load, patch_status, delete, enqueue, drain
//! - `status`: success, error, queued, skipped

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record an operation outcome
pub fn record_operation(component: &str, operation: &str, status: &str) {
    counter!(
        "leads_sync_operations_total",
        "component" => component.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record remote call latency
pub fn record_remote_latency(operation: &str, duration: Duration) {
    histogram!(
        "leads_sync_remote_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a failed remote call by error class
pub fn record_remote_error(operation: &str, class: &str) {
    counter!(
        "leads_sync_remote_errors_total",
        "operation" => operation.to_string(),
        "class" => class.to_string()
    )
    .increment(1);
}

/// Set outbox depth
pub fn set_outbox_entries(count: u64) {
    gauge!("leads_sync_outbox_entries").set(count as f64);
}

/// Set connectivity (1 = online, 0 = offline)
pub fn set_online(online: bool) {
    gauge!("leads_sync_online").set(if online { 1.0 } else { 0.0 });
}

/// Record the result of one drain pass
pub fn record_drain(replayed: usize, failed: usize, halted_on_auth: bool) {
    counter!("leads_sync_outbox_replayed_total").increment(replayed as u64);
    counter!("leads_sync_outbox_replay_failures_total").increment(failed as u64);
    if halted_on_auth {
        counter!("leads_sync_drain_auth_halts_total").increment(1);
    }
}

/// Record a non-fatal replica write failure
pub fn record_cache_write_failure(operation: &str) {
    counter!(
        "leads_sync_cache_write_failures_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Set number of cached leads after a load
pub fn set_cached_leads(count: usize) {
    gauge!("leads_sync_cached_leads").set(count as f64);
}
