//! Per-backend conversation logs with an active-key pointer.
//!
//! Every mutation goes through the active log, so switching backends swaps
//! what callers see without copying or merging entries.

use std::collections::BTreeMap;

use crate::core::backend::BackendId;
use crate::core::message::Entry;

#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    logs: BTreeMap<BackendId, Vec<Entry>>,
    active: BackendId,
}

impl HistoryStore {
    pub fn new(active: BackendId) -> Self {
        Self::from_logs(BTreeMap::new(), active)
    }

    pub fn from_logs(mut logs: BTreeMap<BackendId, Vec<Entry>>, active: BackendId) -> Self {
        for backend in BackendId::ALL {
            logs.entry(backend).or_default();
        }
        Self { logs, active }
    }

    pub fn active_backend(&self) -> BackendId {
        self.active
    }

    /// Points the store at another backend's log. Returns `false` when the
    /// backend was already active.
    pub fn set_active(&mut self, backend: BackendId) -> bool {
        if self.active == backend {
            return false;
        }
        self.active = backend;
        true
    }

    pub fn entries(&self) -> &[Entry] {
        self.entries_for(self.active)
    }

    pub fn entries_for(&self, backend: BackendId) -> &[Entry] {
        self.logs.get(&backend).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn logs(&self) -> &BTreeMap<BackendId, Vec<Entry>> {
        &self.logs
    }

    fn active_log_mut(&mut self) -> &mut Vec<Entry> {
        self.logs.entry(self.active).or_default()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn push(&mut self, entry: Entry) {
        self.active_log_mut().push(entry);
    }

    /// Inserts at `index`, clamped to the end of the log.
    pub fn insert(&mut self, index: usize, entry: Entry) {
        let log = self.active_log_mut();
        let index = index.min(log.len());
        log.insert(index, entry);
    }

    pub fn remove(&mut self, index: usize) -> Option<Entry> {
        let log = self.active_log_mut();
        (index < log.len()).then(|| log.remove(index))
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries().iter().position(|entry| entry.id == id)
    }

    pub fn get_index(&self, index: usize) -> Option<&Entry> {
        self.entries().get(index)
    }

    pub fn get_index_mut(&mut self, index: usize) -> Option<&mut Entry> {
        self.active_log_mut().get_mut(index)
    }

    pub fn last(&self) -> Option<&Entry> {
        self.entries().last()
    }

    /// Index of the nearest user entry strictly before `index`.
    pub fn preceding_user_index(&self, index: usize) -> Option<usize> {
        let end = index.min(self.len());
        self.entries()[..end].iter().rposition(Entry::is_user)
    }

    /// Drops every stored `shorter`/`longer` tag in the active log.
    pub fn clear_modifications(&mut self) {
        for entry in self.active_log_mut() {
            entry.modification = None;
        }
    }

    pub fn all_ids(&self) -> impl Iterator<Item = &str> {
        self.logs.values().flatten().map(|entry| entry.id.as_str())
    }
}
