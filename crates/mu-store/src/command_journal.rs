//! Command Journal: append-only `commands.jsonl`, replayed into an
//! in-memory index keyed by `command_id` (spec.md §4.3, §6).

use crate::jsonl::JsonlStore;
use mu_types::command::{CommandLifecycleEntry, CommandRecord, CommandState};
use mu_types::error::MuError;
use mu_types::CommandId;
use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

pub struct CommandJournal {
    journal: JsonlStore,
    append_lock: Mutex<()>,
    by_id: RwLock<BTreeMap<CommandId, CommandRecord>>,
}

impl CommandJournal {
    /// Replay every lifecycle entry in order, keeping the latest record
    /// per `command_id` (spec.md §8 - "replaying a journal from scratch
    /// yields byte-identical listing").
    pub fn open(journal_path: impl Into<std::path::PathBuf>) -> Result<Self, MuError> {
        let journal = JsonlStore::new(journal_path);
        let entries: Vec<CommandLifecycleEntry> = journal.stream()?;
        let mut by_id = BTreeMap::new();
        for entry in entries {
            by_id.insert(entry.command.command_id.clone(), entry.command);
        }
        Ok(Self {
            journal,
            append_lock: Mutex::new(()),
            by_id: RwLock::new(by_id),
        })
    }

    /// Insert a brand new command, already in its initial `Accepted`
    /// state, journaling before the index is updated.
    pub fn insert(&self, record: CommandRecord, now_ms: i64) -> Result<(), MuError> {
        let _guard = self.append_lock.lock().unwrap();
        let entry = CommandLifecycleEntry::new(record.clone(), now_ms);
        self.journal.append(&entry)?;
        self.by_id
            .write()
            .unwrap()
            .insert(record.command_id.clone(), record);
        Ok(())
    }

    /// Transition an existing command, enforcing the FSM table before
    /// journaling the new state (spec.md §4.5 step 7).
    pub fn transition(
        &self,
        command_id: &CommandId,
        to: CommandState,
        now_ms: i64,
    ) -> Result<CommandRecord, MuError> {
        self.transition_with(command_id, to, now_ms, |_| {})
    }

    /// Same as [`Self::transition`], but lets the caller set additional
    /// fields (e.g. `confirmation_expires_at_ms`, `result`, `error_code`)
    /// atomically with the state change, in the same journal line.
    pub fn transition_with(
        &self,
        command_id: &CommandId,
        to: CommandState,
        now_ms: i64,
        mutate: impl FnOnce(&mut CommandRecord),
    ) -> Result<CommandRecord, MuError> {
        let _guard = self.append_lock.lock().unwrap();
        let mut record = {
            let index = self.by_id.read().unwrap();
            index
                .get(command_id)
                .cloned()
                .ok_or_else(|| MuError::CommandNotFound {
                    command_id: command_id.to_string(),
                })?
        };
        record
            .transition(to, now_ms)
            .map_err(|e| MuError::InvalidCommandTransition {
                command_id: e.command_id.to_string(),
                from: e.from.as_str().to_string(),
                to: e.to.as_str().to_string(),
            })?;
        mutate(&mut record);
        let entry = CommandLifecycleEntry::new(record.clone(), now_ms);
        self.journal.append(&entry)?;
        self.by_id
            .write()
            .unwrap()
            .insert(command_id.clone(), record.clone());
        Ok(record)
    }

    pub fn get(&self, command_id: &CommandId) -> Option<CommandRecord> {
        self.by_id.read().unwrap().get(command_id).cloned()
    }

    /// All commands currently in a non-terminal state, sorted by
    /// `created_at_ms` then `command_id` (useful for the confirmation
    /// expiry sweeper and the outbox worker's command lookups).
    pub fn list_active(&self) -> Vec<CommandRecord> {
        let index = self.by_id.read().unwrap();
        let mut records: Vec<CommandRecord> = index
            .values()
            .filter(|r| !r.state.is_terminal())
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.command_id.cmp(&b.command_id))
        });
        records
    }
}
