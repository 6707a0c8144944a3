//! IdempotencyIndex: `(idempotency_key -> fingerprint, command_id,
//! state)` with conflict detection and a bounded retention window
//! (spec.md §3, §4.5 step 4; window policy decided in SPEC_FULL.md §12).

use crate::jsonl::JsonlStore;
use mu_types::command::CommandState;
use mu_types::error::MuError;
use mu_types::idempotency::IdempotencyEntry;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// Max entries retained per `(channel, tenant, conversation)` before the
/// oldest is evicted (SPEC_FULL.md open-question decision).
pub const MAX_ENTRIES_PER_CONVERSATION: usize = 10_000;

struct Inner {
    by_key: BTreeMap<String, IdempotencyEntry>,
    order_by_conversation: BTreeMap<(String, String, String), VecDeque<String>>,
}

pub struct IdempotencyIndex {
    journal: JsonlStore,
    inner: Mutex<Inner>,
}

/// Result of probing the index before accepting a command
/// (spec.md §4.5 step 4).
pub enum Probe {
    /// No entry for this key yet.
    Fresh,
    /// Entry exists with a matching fingerprint.
    Match(IdempotencyEntry),
    /// Entry exists with a different fingerprint.
    Conflict(IdempotencyEntry),
}

impl IdempotencyIndex {
    pub fn open(journal_path: impl Into<std::path::PathBuf>) -> Result<Self, MuError> {
        let journal = JsonlStore::new(journal_path);
        let entries: Vec<IdempotencyEntry> = journal.stream()?;
        let mut inner = Inner {
            by_key: BTreeMap::new(),
            order_by_conversation: BTreeMap::new(),
        };
        for entry in entries {
            inner.insert_tracking(&entry);
            inner.by_key.insert(entry.idempotency_key.clone(), entry);
        }
        Ok(Self {
            journal,
            inner: Mutex::new(inner),
        })
    }

    pub fn probe(&self, idempotency_key: &str, fingerprint: &str) -> Probe {
        let inner = self.inner.lock().unwrap();
        match inner.by_key.get(idempotency_key) {
            None => Probe::Fresh,
            Some(entry) if entry.fingerprint == fingerprint => Probe::Match(entry.clone()),
            Some(entry) => Probe::Conflict(entry.clone()),
        }
    }

    /// Record a new idempotency entry, journaling before the in-memory
    /// index is updated (spec.md §4.7 "journaled before delivery").
    pub fn record(&self, entry: IdempotencyEntry) -> Result<(), MuError> {
        self.journal.append(&entry)?;
        let mut inner = self.inner.lock().unwrap();
        inner.insert_tracking(&entry);
        inner.by_key.insert(entry.idempotency_key.clone(), entry);
        inner.evict_overflow(&self.journal)?;
        Ok(())
    }

    /// Update the recorded state for a key once its command reaches a
    /// new state (e.g. terminal), journaling the updated row.
    pub fn update_state(&self, idempotency_key: &str, state: CommandState) -> Result<(), MuError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.by_key.get_mut(idempotency_key) {
            entry.state = state;
            let updated = entry.clone();
            drop(inner);
            self.journal.append(&updated)?;
        }
        Ok(())
    }
}

impl Inner {
    fn insert_tracking(&mut self, entry: &IdempotencyEntry) {
        let key = (
            entry.channel.to_string(),
            entry.channel_tenant_id.clone(),
            entry.channel_conversation_id.clone(),
        );
        let order = self.order_by_conversation.entry(key).or_default();
        if !order.contains(&entry.idempotency_key) {
            order.push_back(entry.idempotency_key.clone());
        }
    }

    fn evict_overflow(&mut self, journal: &JsonlStore) -> Result<(), MuError> {
        let mut evicted_any = false;
        for order in self.order_by_conversation.values_mut() {
            while order.len() > MAX_ENTRIES_PER_CONVERSATION {
                if let Some(oldest) = order.pop_front() {
                    self.by_key.remove(&oldest);
                    evicted_any = true;
                }
            }
        }
        if evicted_any {
            // Compact the on-disk journal to match the in-memory index.
            let remaining: Vec<IdempotencyEntry> = self.by_key.values().cloned().collect();
            journal.write(&remaining)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mu_types::channel::Channel;
    use tempfile::tempdir;

    fn entry(key: &str, fingerprint: &str) -> IdempotencyEntry {
        IdempotencyEntry {
            idempotency_key: key.to_string(),
            channel: Channel::Slack,
            channel_tenant_id: "T".to_string(),
            channel_conversation_id: "C".to_string(),
            fingerprint: fingerprint.to_string(),
            command_id: "cmd-1".to_string(),
            created_at_ms: 1000,
            state: CommandState::Completed,
        }
    }

    #[test]
    fn fresh_key_reports_fresh() {
        let dir = tempdir().unwrap();
        let idx = IdempotencyIndex::open(dir.path().join("idempotency.jsonl")).unwrap();
        assert!(matches!(idx.probe("k1", "fp1"), Probe::Fresh));
    }

    #[test]
    fn same_key_different_fingerprint_is_conflict() {
        let dir = tempdir().unwrap();
        let idx = IdempotencyIndex::open(dir.path().join("idempotency.jsonl")).unwrap();
        idx.record(entry("k1", "fp1")).unwrap();
        assert!(matches!(idx.probe("k1", "fp2"), Probe::Conflict(_)));
        assert!(matches!(idx.probe("k1", "fp1"), Probe::Match(_)));
    }
}
