//! AdapterAuditLog: append-only `adapter_audit.jsonl` (SPEC_FULL.md §11).
//!
//! Write-mostly; adapters append a row per ingress outcome and nothing
//! else reads it back except operator tooling, so this wraps
//! `JsonlStore` directly without an in-memory index.

use crate::jsonl::JsonlStore;
use mu_types::adapter_audit::AdapterAuditEntry;
use mu_types::error::MuError;
use std::sync::Mutex;

pub struct AdapterAuditLog {
    journal: JsonlStore,
    append_lock: Mutex<()>,
}

impl AdapterAuditLog {
    pub fn open(journal_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            journal: JsonlStore::new(journal_path),
            append_lock: Mutex::new(()),
        }
    }

    pub fn record(&self, entry: AdapterAuditEntry) -> Result<(), MuError> {
        let _guard = self.append_lock.lock().unwrap();
        self.journal.append(&entry)
    }

    pub fn all(&self) -> Result<Vec<AdapterAuditEntry>, MuError> {
        self.journal.stream()
    }
}
