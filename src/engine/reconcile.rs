//! Overlay of queued mutations on a lead list.

use std::collections::BTreeSet;

use crate::lead::Lead;
use crate::outbox::{MutationKind, OutboxEntry};

/// Apply `pending` (oldest first) on top of `leads`.
///
/// Local pending mutations win over whatever the server returned: a queued
/// delete hides the lead, a queued status update overrides its status.
pub fn apply_pending(mut leads: Vec<Lead>, pending: &[OutboxEntry]) -> Vec<Lead> {
    for entry in pending {
        match entry.kind {
            MutationKind::PatchStatus => {
                let Some(status) = entry.requested_status() else {
                    continue;
                };
                if let Some(lead) = leads.iter_mut().find(|l| l.id == entry.lead_id) {
                    lead.status = status;
                }
            }
            MutationKind::DeleteLead => leads.retain(|l| l.id != entry.lead_id),
        }
    }
    leads
}

/// Ids of leads with at least one unsynced mutation.
pub fn pending_lead_ids(pending: &[OutboxEntry]) -> BTreeSet<String> {
    pending.iter().map(|e| e.lead_id.clone()).collect()
}
