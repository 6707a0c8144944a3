//! The durable outbound queue (spec.md §4.7).
//!
//! Enqueue and state transitions are journaled before the delivery
//! attempt runs; on crash + replay, `delivered` is only ever recorded
//! after the callback has confirmed success, since the worker journals
//! `delivered` itself rather than assuming success ahead of the call.

use crate::backoff::backoff_ms;
use mu_store::jsonl::JsonlStore;
use mu_types::error::MuError;
use mu_types::outbox::{OutboundEnvelope, OutboxRecord, OutboxState};
use mu_types::TimestampMs;
use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Whether `enqueue` created a new record or returned an existing one
/// (spec.md §4.7 "idempotent enqueue").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeKind {
    New,
    Existing,
}

pub struct EnqueueOutcome {
    pub record: OutboxRecord,
    pub dedupe_kind: DedupeKind,
}

pub struct Outbox {
    journal: JsonlStore,
    append_lock: Mutex<()>,
    by_id: RwLock<BTreeMap<String, OutboxRecord>>,
    by_dedupe_key: RwLock<BTreeMap<String, String>>,
}

impl Outbox {
    pub fn open(journal_path: impl Into<std::path::PathBuf>) -> Result<Self, MuError> {
        let journal = JsonlStore::new(journal_path);
        let entries: Vec<OutboxRecord> = journal.stream()?;
        let mut by_id = BTreeMap::new();
        let mut by_dedupe_key = BTreeMap::new();
        for record in entries {
            by_dedupe_key.insert(record.dedupe_key.clone(), record.outbox_id.clone());
            by_id.insert(record.outbox_id.clone(), record);
        }
        Ok(Self {
            journal,
            append_lock: Mutex::new(()),
            by_id: RwLock::new(by_id),
            by_dedupe_key: RwLock::new(by_dedupe_key),
        })
    }

    /// `enqueue({dedupeKey, envelope, nowMs})` (spec.md §4.7). Returns
    /// the existing record unchanged if `dedupe_key` is already known.
    pub fn enqueue(&self, dedupe_key: String, envelope: OutboundEnvelope, now_ms: TimestampMs) -> Result<EnqueueOutcome, MuError> {
        let _guard = self.append_lock.lock().unwrap();
        if let Some(existing_id) = self.by_dedupe_key.read().unwrap().get(&dedupe_key).cloned() {
            let record = self.by_id.read().unwrap().get(&existing_id).cloned().unwrap();
            return Ok(EnqueueOutcome {
                record,
                dedupe_kind: DedupeKind::Existing,
            });
        }

        let record = OutboxRecord {
            outbox_id: format!("ob-{}", uuid::Uuid::new_v4()),
            dedupe_key: dedupe_key.clone(),
            envelope,
            state: OutboxState::Pending,
            attempt: 0,
            next_attempt_at_ms: now_ms,
            last_error: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };
        self.journal.append(&record)?;
        self.by_dedupe_key.write().unwrap().insert(dedupe_key, record.outbox_id.clone());
        self.by_id.write().unwrap().insert(record.outbox_id.clone(), record.clone());
        Ok(EnqueueOutcome {
            record,
            dedupe_kind: DedupeKind::New,
        })
    }

    /// The oldest `pending | retried` record due for delivery, if any
    /// (spec.md §4.7 "pulls oldest ... record with next_attempt_at_ms <=
    /// now").
    pub fn next_due(&self, now_ms: TimestampMs) -> Option<OutboxRecord> {
        let by_id = self.by_id.read().unwrap();
        by_id
            .values()
            .filter(|r| matches!(r.state, OutboxState::Pending | OutboxState::Retried))
            .filter(|r| r.next_attempt_at_ms <= now_ms)
            .min_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then_with(|| a.outbox_id.cmp(&b.outbox_id)))
            .cloned()
    }

    pub fn mark_delivered(&self, outbox_id: &str, now_ms: TimestampMs) -> Result<OutboxRecord, MuError> {
        self.transition(outbox_id, now_ms, |r| {
            r.state = OutboxState::Delivered;
            r.last_error = None;
        })
    }

    /// Transition to `retried` with exponential backoff, or to
    /// `dead_letter` after `max_attempts` failures (spec.md §4.7).
    pub fn mark_failed(&self, outbox_id: &str, error: String, max_attempts: u32, now_ms: TimestampMs) -> Result<OutboxRecord, MuError> {
        self.transition(outbox_id, now_ms, |r| {
            r.attempt += 1;
            r.last_error = Some(error.clone());
            if r.attempt >= max_attempts {
                r.state = OutboxState::DeadLetter;
            } else {
                r.state = OutboxState::Retried;
                r.next_attempt_at_ms = now_ms + backoff_ms(r.attempt);
            }
        })
    }

    fn transition(&self, outbox_id: &str, now_ms: TimestampMs, mutate: impl FnOnce(&mut OutboxRecord)) -> Result<OutboxRecord, MuError> {
        let _guard = self.append_lock.lock().unwrap();
        let mut record = self
            .by_id
            .read()
            .unwrap()
            .get(outbox_id)
            .cloned()
            .ok_or_else(|| MuError::OutboxNotFound {
                outbox_id: outbox_id.to_string(),
            })?;
        mutate(&mut record);
        record.updated_at_ms = now_ms;
        self.journal.append(&record)?;
        self.by_id.write().unwrap().insert(outbox_id.to_string(), record.clone());
        Ok(record)
    }

    pub fn get(&self, outbox_id: &str) -> Option<OutboxRecord> {
        self.by_id.read().unwrap().get(outbox_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mu_types::Channel;
    use tempfile::tempdir;

    fn envelope() -> OutboundEnvelope {
        OutboundEnvelope {
            channel: Channel::Slack,
            channel_conversation_id: "C1".to_string(),
            correlation_command_id: None,
            text: "hello".to_string(),
            data: None,
            ts_ms: 1000,
        }
    }

    #[test]
    fn repeated_enqueue_with_same_dedupe_key_is_idempotent() {
        let dir = tempdir().unwrap();
        let outbox = Outbox::open(dir.path().join("outbox.jsonl")).unwrap();
        let first = outbox.enqueue("k1".to_string(), envelope(), 1000).unwrap();
        let second = outbox.enqueue("k1".to_string(), envelope(), 2000).unwrap();
        assert_eq!(first.dedupe_kind, DedupeKind::New);
        assert_eq!(second.dedupe_kind, DedupeKind::Existing);
        assert_eq!(first.record.outbox_id, second.record.outbox_id);
    }

    #[test]
    fn failure_below_max_attempts_retries_with_backoff() {
        let dir = tempdir().unwrap();
        let outbox = Outbox::open(dir.path().join("outbox.jsonl")).unwrap();
        let enqueued = outbox.enqueue("k1".to_string(), envelope(), 1000).unwrap().record;
        let retried = outbox
            .mark_failed(&enqueued.outbox_id, "timeout".to_string(), 3, 1000)
            .unwrap();
        assert_eq!(retried.state, OutboxState::Retried);
        assert!(retried.next_attempt_at_ms > 1000);
    }

    #[test]
    fn failure_at_max_attempts_dead_letters() {
        let dir = tempdir().unwrap();
        let outbox = Outbox::open(dir.path().join("outbox.jsonl")).unwrap();
        let enqueued = outbox.enqueue("k1".to_string(), envelope(), 1000).unwrap().record;
        for _ in 0..2 {
            outbox.mark_failed(&enqueued.outbox_id, "timeout".to_string(), 3, 1000).unwrap();
        }
        let dead = outbox.mark_failed(&enqueued.outbox_id, "timeout".to_string(), 3, 1000).unwrap();
        assert_eq!(dead.state, OutboxState::DeadLetter);
    }

    #[test]
    fn next_due_respects_next_attempt_at_ms() {
        let dir = tempdir().unwrap();
        let outbox = Outbox::open(dir.path().join("outbox.jsonl")).unwrap();
        let enqueued = outbox.enqueue("k1".to_string(), envelope(), 5000).unwrap().record;
        assert!(outbox.next_due(1000).is_none());
        let due = outbox.next_due(5000).unwrap();
        assert_eq!(due.outbox_id, enqueued.outbox_id);
    }
}
