// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Offline session walkthrough.
//!
//! Demonstrates:
//! 1. Loading leads into a SQLite-backed replica
//! 2. Editing and deleting while offline (changes queue in the outbox)
//! 3. Reconnecting, which drains the outbox in order
//! 4. Displaying the metrics the engine emitted
//!
//! The remote API is an in-process stand-in, so nothing needs to be running.
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=leads_sync=debug cargo run --example offline_session
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use leads_sync::{
    ApiError, ConnectivityMonitor, LeadStatus, LeadsApi, LeadsProjection, SqliteStore,
    SyncEngine,
};

/// Stand-in for the CRM server.
struct DemoServer {
    leads: Mutex<Vec<Value>>,
}

#[async_trait]
impl LeadsApi for DemoServer {
    async fn list_leads(&self) -> Result<Vec<Value>, ApiError> {
        Ok(self.leads.lock().clone())
    }

    async fn patch_status(&self, id: &str, status: LeadStatus) -> Result<Value, ApiError> {
        println!("   → server: PATCH /leads/{id} {{status: {status}}}");
        let mut leads = self.leads.lock();
        let lead = leads
            .iter_mut()
            .find(|l| l["id"] == id)
            .ok_or_else(|| ApiError::from_status(404, "Lead not found"))?;
        lead["status"] = json!(status.as_str());
        Ok(json!({"data": {"lead": lead.clone()}}))
    }

    async fn delete_lead(&self, id: &str) -> Result<(), ApiError> {
        println!("   → server: DELETE /leads/{id}");
        self.leads.lock().retain(|l| l["id"] != id);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Wire the engine over a fresh SQLite file
    // ─────────────────────────────────────────────────────────────────────────
    let db_path = std::env::temp_dir().join(format!("leads_sync_demo_{}.db", std::process::id()));
    let store = Arc::new(SqliteStore::open(&db_path).await?);
    let server = Arc::new(DemoServer {
        leads: Mutex::new(vec![
            json!({"id": "lead-1", "name": "Ada", "city": "London", "status": "new"}),
            json!({"id": "lead-2", "name": "Grace", "city": "Arlington", "status": "new"}),
            json!({"id": 3, "name": "Edsger", "city": "Austin", "status": "new"}),
        ]),
    });

    let monitor = ConnectivityMonitor::new(true);
    let engine = SyncEngine::with_store(store, server.clone(), monitor.handle());
    let projection = Arc::new(LeadsProjection::new(Arc::new(engine), true));
    let _relay = projection.attach(&monitor);

    println!("\n📥 Loading leads (online)...");
    projection.load_leads().await?;
    for lead in projection.snapshot().leads {
        println!("   {} {:<8} {}", lead.id, lead.status.as_str(), lead.name);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Work offline
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📴 Going offline...");
    monitor.set_online(false);

    projection.update_lead_status("lead-1", LeadStatus::Success).await?;
    projection.delete_lead("lead-2").await?;

    let snap = projection.snapshot();
    println!("   Outbox: {} pending, leads: {:?}", snap.outbox_count, snap.pending_lead_ids);
    for entry in projection.get_outbox_items().await? {
        println!("   #{} {} {}", entry.id, entry.kind, entry.lead_id);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Reconnect: the relay drains the outbox
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📶 Back online...");
    monitor.set_online(true);

    let mut rx = projection.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        while rx.borrow_and_update().outbox_count > 0 {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await?;

    let snap = projection.snapshot();
    println!("   Outbox: {} pending, showing cached: {}", snap.outbox_count, snap.showing_cached);
    for lead in &snap.leads {
        println!("   {} {:<8} {}", lead.id, lead.status.as_str(), lead.name);
    }
    println!("   Engine: {:?}", projection.engine().outbox_stats().await?);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    for (key, _, _, value) in snapshotter.snapshot().into_vec() {
        let value = match value {
            DebugValue::Counter(v) => v.to_string(),
            DebugValue::Gauge(v) => v.to_string(),
            DebugValue::Histogram(v) => format!("{} samples", v.len()),
        };
        println!("   {} = {}", key.key().name(), value);
    }

    let _ = std::fs::remove_file(&db_path);
    Ok(())
}
