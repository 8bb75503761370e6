//! Property-based tests (fuzzing) for normalization and replay ordering.
//!
//! Uses proptest to generate random/malformed server payloads and random
//! mutation sequences, and checks that parsing never panics and that the
//! pending-mutation overlay behaves like replaying the queue in order.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::HashMap;

use proptest::prelude::*;
use serde_json::{json, Value};

use leads_sync::engine::reconcile::apply_pending;
use leads_sync::outbox::status_payload;
use leads_sync::remote::{extract_lead_list, resolve_status};
use leads_sync::{InMemoryStore, Lead, LeadStatus, MutationKind, OutboxEntry, OutboxStore};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate arbitrary JSON values (including invalid structures)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
        prop_oneof![Just("new"), Just("success"), Just("failed"), Just("SUCCESS")]
            .prop_map(|s| Value::String(s.to_string())),
    ];

    leaf.prop_recursive(
        4,   // depth
        64,  // max nodes
        10,  // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
                prop::collection::hash_map(
                    prop_oneof![
                        Just("id".to_string()),
                        Just("status".to_string()),
                        Just("lead".to_string()),
                        Just("data".to_string()),
                        Just("createdAt".to_string()),
                        "[a-z_]{1,12}",
                    ],
                    inner,
                    0..8
                )
                .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

fn status_strategy() -> impl Strategy<Value = LeadStatus> {
    prop_oneof![
        Just(LeadStatus::New),
        Just(LeadStatus::Success),
        Just(LeadStatus::Failed),
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Patch(usize, LeadStatus),
    Delete(usize),
}

fn op_strategy(leads: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..leads, status_strategy()).prop_map(|(i, s)| Op::Patch(i, s)),
        1 => (0..leads).prop_map(Op::Delete),
    ]
}

fn to_entries(ops: &[Op]) -> Vec<OutboxEntry> {
    ops.iter()
        .enumerate()
        .map(|(n, op)| {
            let (kind, lead, payload) = match op {
                Op::Patch(i, s) => (MutationKind::PatchStatus, *i, Some(status_payload(*s))),
                Op::Delete(i) => (MutationKind::DeleteLead, *i, None),
            };
            OutboxEntry {
                id: n as i64 + 1,
                kind,
                lead_id: format!("lead-{lead}"),
                payload,
                created_at: 1_000 + n as i64,
                attempts: 0,
                last_error: None,
            }
        })
        .collect()
}

// =============================================================================
// Normalization Fuzz Tests
// =============================================================================

proptest! {
    /// Normalizing a server record never panics; accepted records have an id
    #[test]
    fn fuzz_lead_from_arbitrary_json(raw in arbitrary_json_strategy()) {
        if let Some(lead) = Lead::from_remote(&raw) {
            prop_assert!(!lead.id.is_empty());
        }
    }

    /// A record with a non-empty string id is always accepted
    #[test]
    fn fuzz_lead_with_id_always_accepted(
        id in "[A-Za-z0-9-]{1,24}",
        extra in arbitrary_json_strategy(),
    ) {
        let raw = json!({"id": id.clone(), "extra": extra, "status": "bogus"});
        let lead = Lead::from_remote(&raw).unwrap();
        prop_assert_eq!(lead.id, id);
        prop_assert_eq!(lead.status, LeadStatus::New);
    }

    /// Unwrapping list envelopes never panics
    #[test]
    fn fuzz_extract_lead_list(body in arbitrary_json_strategy()) {
        let _ = extract_lead_list(body);
    }

    /// Status resolution never panics and only returns the requested
    /// status or one found in the body
    #[test]
    fn fuzz_resolve_status(body in arbitrary_json_strategy(), requested in status_strategy()) {
        let resolved = resolve_status(&body, requested);
        let text = body.to_string().to_lowercase();
        prop_assert!(resolved == requested || text.contains(resolved.as_str()));
    }

    /// A top-level status always wins
    #[test]
    fn prop_top_level_status_wins(
        top in status_strategy(),
        nested in status_strategy(),
        requested in status_strategy(),
    ) {
        let body = json!({
            "status": top.as_str(),
            "lead": {"status": nested.as_str()},
            "data": {"status": nested.as_str(), "lead": {"status": nested.as_str()}},
        });
        prop_assert_eq!(resolve_status(&body, requested), top);
    }
}

// =============================================================================
// Overlay Ordering Tests
// =============================================================================

proptest! {
    /// Overlaying the queue equals replaying it one entry at a time against
    /// a simple model of the server
    #[test]
    fn prop_overlay_matches_sequential_replay(ops in prop::collection::vec(op_strategy(5), 0..30)) {
        let leads: Vec<Lead> = (0..5).map(|i| Lead::new(format!("lead-{i}"), LeadStatus::New)).collect();

        let mut model: HashMap<String, Option<LeadStatus>> =
            leads.iter().map(|l| (l.id.clone(), Some(l.status))).collect();
        for op in &ops {
            match op {
                Op::Patch(i, s) => {
                    let slot = model.get_mut(&format!("lead-{i}")).unwrap();
                    if slot.is_some() {
                        *slot = Some(*s);
                    }
                }
                Op::Delete(i) => {
                    model.insert(format!("lead-{i}"), None);
                }
            }
        }

        let merged = apply_pending(leads.clone(), &to_entries(&ops));

        for lead in &leads {
            let expected = model[&lead.id];
            let actual = merged.iter().find(|l| l.id == lead.id).map(|l| l.status);
            prop_assert_eq!(actual, expected, "lead {}", lead.id);
        }
        // Surviving leads keep their original relative order
        let order: Vec<&str> = merged.iter().map(|l| l.id.as_str()).collect();
        let mut sorted = order.clone();
        sorted.sort();
        prop_assert_eq!(order, sorted);
    }

    /// The outbox hands entries back in the order they were appended
    #[test]
    fn prop_outbox_is_fifo(ops in prop::collection::vec(op_strategy(4), 1..20)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let store = InMemoryStore::new();
            let mut appended = Vec::new();
            for entry in to_entries(&ops) {
                let id = store
                    .append(entry.kind, &entry.lead_id, entry.payload.as_ref(), entry.created_at)
                    .await
                    .unwrap();
                appended.push((id, entry.lead_id, entry.kind));
            }

            let pending: Vec<_> = store
                .list_pending()
                .await
                .unwrap()
                .into_iter()
                .map(|e| (e.id, e.lead_id, e.kind))
                .collect();
            assert_eq!(pending, appended);
        });
    }
}
