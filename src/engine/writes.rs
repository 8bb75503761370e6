//! Local writes made while a remote load is in flight.
//!
//! A list fetch that started before a write can return the lead's old
//! value. Each load opens a [`LoadWindow`]; writes recorded after it opened
//! are replayed on top of the fetched list before it is published or
//! snapshotted. The log only grows while at least one load is open.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::lead::{Lead, LeadStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocalWrite {
    Status(LeadStatus),
    Deleted,
}

#[derive(Default)]
pub(crate) struct LocalWrites {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    seq: u64,
    log: Vec<(u64, String, LocalWrite)>,
    /// Open loads keyed by the sequence they started at
    open: BTreeMap<u64, usize>,
}

impl LocalWrites {
    pub(crate) fn record(&self, id: &str, write: LocalWrite) {
        let mut inner = self.inner.lock();
        inner.seq += 1;
        if !inner.open.is_empty() {
            let seq = inner.seq;
            inner.log.push((seq, id.to_string(), write));
        }
    }

    pub(crate) fn open_window(&self) -> LoadWindow<'_> {
        let mut inner = self.inner.lock();
        let start = inner.seq;
        *inner.open.entry(start).or_insert(0) += 1;
        LoadWindow { writes: self, start }
    }

    #[cfg(test)]
    fn logged(&self) -> usize {
        self.inner.lock().log.len()
    }
}

/// An open load. Dropping it prunes writes no other open load needs.
pub(crate) struct LoadWindow<'a> {
    writes: &'a LocalWrites,
    start: u64,
}

impl LoadWindow<'_> {
    pub(crate) fn start(&self) -> u64 {
        self.start
    }

    /// Writes recorded after sequence `after`, oldest first, plus the
    /// newest sequence returned.
    pub(crate) fn since(&self, after: u64) -> (Vec<(String, LocalWrite)>, u64) {
        let inner = self.writes.inner.lock();
        let writes = inner
            .log
            .iter()
            .filter(|(seq, ..)| *seq > after)
            .map(|(_, id, write)| (id.clone(), *write))
            .collect();
        (writes, inner.seq)
    }
}

impl Drop for LoadWindow<'_> {
    fn drop(&mut self) {
        let mut inner = self.writes.inner.lock();
        let remaining = inner.open.get_mut(&self.start).map(|count| {
            *count -= 1;
            *count
        });
        if remaining == Some(0) {
            inner.open.remove(&self.start);
        }
        match inner.open.keys().next().copied() {
            Some(oldest) => inner.log.retain(|(seq, ..)| *seq > oldest),
            None => inner.log.clear(),
        }
    }
}

/// Apply `writes` in order. Status writes for leads not in the list are
/// ignored.
pub(crate) fn apply_writes(mut leads: Vec<Lead>, writes: &[(String, LocalWrite)]) -> Vec<Lead> {
    for (id, write) in writes {
        match write {
            LocalWrite::Status(status) => {
                if let Some(lead) = leads.iter_mut().find(|l| &l.id == id) {
                    lead.status = *status;
                }
            }
            LocalWrite::Deleted => leads.retain(|l| &l.id != id),
        }
    }
    leads
}
