//! Shared test doubles for the integration suites.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use leads_sync::{
    ApiError, ConnectivityMonitor, InMemoryStore, LeadStatus, LeadsApi, LeadsProjection,
    SyncEngine,
};

/// A remote call as the server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Patch { id: String, status: String },
    Delete(String),
}

/// In-process stand-in for the leads REST API.
///
/// Keeps a server-side lead table, logs every call, and can be scripted to
/// fail the next N calls, or to hold writes or list fetches until released.
pub struct FakeLeadsApi {
    leads: Mutex<Vec<Value>>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<VecDeque<ApiError>>,
    gate_writes: AtomicBool,
    gate: Semaphore,
    gate_list: AtomicBool,
    list_gate: Semaphore,
}

impl FakeLeadsApi {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            leads: Mutex::new(
                ids.iter()
                    .map(|id| {
                        json!({
                            "id": id,
                            "name": format!("Lead {id}"),
                            "phone": "+10000000000",
                            "city": "Springfield",
                            "status": "new",
                            "createdAt": "2026-01-05T09:30:00Z",
                        })
                    })
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            gate_writes: AtomicBool::new(false),
            gate: Semaphore::new(0),
            gate_list: AtomicBool::new(false),
            list_gate: Semaphore::new(0),
        }
    }

    pub fn fail_next(&self, err: ApiError) {
        self.failures.lock().push_back(err);
    }

    /// Block PATCH/DELETE until [`release_writes`](Self::release_writes).
    pub fn hold_writes(&self) {
        self.gate_writes.store(true, Ordering::SeqCst);
    }

    pub fn release_writes(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Block `GET /leads` after reading the table, until
    /// [`release_list`](Self::release_list).
    pub fn hold_list(&self) {
        self.gate_list.store(true, Ordering::SeqCst);
    }

    pub fn release_list(&self) {
        self.list_gate.add_permits(1);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| *c != Call::List).collect()
    }

    pub fn has_lead(&self, id: &str) -> bool {
        self.leads.lock().iter().any(|l| l["id"] == id)
    }

    pub fn status_of(&self, id: &str) -> Option<String> {
        self.leads
            .lock()
            .iter()
            .find(|l| l["id"] == id)
            .and_then(|l| l["status"].as_str().map(str::to_string))
    }

    fn next_failure(&self) -> Result<(), ApiError> {
        match self.failures.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn pass_gate(&self) {
        if self.gate_writes.load(Ordering::SeqCst) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
    }
}

#[async_trait]
impl LeadsApi for FakeLeadsApi {
    async fn list_leads(&self) -> Result<Vec<Value>, ApiError> {
        self.calls.lock().push(Call::List);
        self.next_failure()?;
        let leads = self.leads.lock().clone();
        if self.gate_list.load(Ordering::SeqCst) {
            if let Ok(permit) = self.list_gate.acquire().await {
                permit.forget();
            }
        }
        Ok(leads)
    }

    async fn patch_status(&self, id: &str, status: LeadStatus) -> Result<Value, ApiError> {
        self.calls.lock().push(Call::Patch {
            id: id.to_string(),
            status: status.as_str().to_string(),
        });
        self.pass_gate().await;
        self.next_failure()?;

        let mut leads = self.leads.lock();
        let lead = leads
            .iter_mut()
            .find(|l| l["id"] == id)
            .ok_or_else(|| ApiError::from_status(404, "Lead not found"))?;
        lead["status"] = json!(status.as_str());
        Ok(json!({"success": true, "data": {"lead": lead.clone()}}))
    }

    async fn delete_lead(&self, id: &str) -> Result<(), ApiError> {
        self.calls.lock().push(Call::Delete(id.to_string()));
        self.pass_gate().await;
        self.next_failure()?;
        self.leads.lock().retain(|l| l["id"] != id);
        Ok(())
    }
}

/// Everything a scenario needs, wired over the in-memory store.
pub struct Harness {
    pub api: Arc<FakeLeadsApi>,
    pub monitor: ConnectivityMonitor,
    pub projection: Arc<LeadsProjection>,
}

impl Harness {
    pub fn in_memory(ids: &[&str], online: bool) -> Self {
        let api = Arc::new(FakeLeadsApi::new(ids));
        let monitor = ConnectivityMonitor::new(online);
        let engine = SyncEngine::with_store(
            Arc::new(InMemoryStore::new()),
            api.clone(),
            monitor.handle(),
        );
        Self {
            projection: Arc::new(LeadsProjection::new(Arc::new(engine), true)),
            api,
            monitor,
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        self.projection.engine()
    }
}

/// Let spawned tasks (the connectivity relay) run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
}
