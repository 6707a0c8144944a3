//! IssueStore: append-only `issues.jsonl`, replayed into an in-memory
//! index keyed by `id`, following the same pattern as
//! `mu_store::command_journal::CommandJournal` and
//! `mu_store::identity_store::IdentityStore`. Lives in this crate rather
//! than `mu-store` because `mu_pipeline::issue_dag` only ever needs a
//! `&[Issue]` snapshot, not a particular storage backend.

use mu_store::jsonl::JsonlStore;
use mu_types::error::MuError;
use mu_types::issue::{Dep, Issue, IssueOutcome, IssueStatus};
use mu_types::TimestampMs;
use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

/// A single line of `issues.jsonl`: the full issue as it stood after the
/// write, not a diff, mirroring `CommandLifecycleEntry`'s shape.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct IssueEntry {
    kind: String,
    ts_ms: TimestampMs,
    issue: Issue,
}

pub struct IssueStore {
    journal: JsonlStore,
    append_lock: Mutex<()>,
    by_id: RwLock<BTreeMap<String, Issue>>,
}

impl IssueStore {
    pub fn open(journal_path: impl Into<std::path::PathBuf>) -> Result<Self, MuError> {
        let journal = JsonlStore::new(journal_path);
        let entries: Vec<IssueEntry> = journal.stream()?;
        let mut by_id = BTreeMap::new();
        for entry in entries {
            by_id.insert(entry.issue.id.clone(), entry.issue);
        }
        Ok(Self {
            journal,
            append_lock: Mutex::new(()),
            by_id: RwLock::new(by_id),
        })
    }

    fn append(&self, issue: Issue, now_ms: TimestampMs) -> Result<Issue, MuError> {
        let entry = IssueEntry {
            kind: "issue.snapshot".to_string(),
            ts_ms: now_ms,
            issue: issue.clone(),
        };
        self.journal.append(&entry)?;
        self.by_id.write().unwrap().insert(issue.id.clone(), issue.clone());
        Ok(issue)
    }

    pub fn create(
        &self,
        id: String,
        title: String,
        body: String,
        tags: Vec<String>,
        deps: Vec<Dep>,
        priority: Option<i64>,
        now_ms: TimestampMs,
    ) -> Result<Issue, MuError> {
        let _guard = self.append_lock.lock().unwrap();
        if self.by_id.read().unwrap().contains_key(&id) {
            return Err(MuError::invalid_input("id", "issue already exists"));
        }
        let issue = Issue {
            id,
            title,
            body,
            status: IssueStatus::Open,
            outcome: None,
            tags,
            deps,
            priority: priority.unwrap_or(Issue::DEFAULT_PRIORITY),
            created_at: now_ms,
            updated_at: now_ms,
        };
        self.append(issue, now_ms)
    }

    /// Apply a caller-supplied mutation to an existing issue, then
    /// journal and re-index the result.
    pub fn update(
        &self,
        id: &str,
        now_ms: TimestampMs,
        mutate: impl FnOnce(&mut Issue),
    ) -> Result<Issue, MuError> {
        let _guard = self.append_lock.lock().unwrap();
        let mut issue = self
            .by_id
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| MuError::invalid_input("id", "issue not found"))?;
        mutate(&mut issue);
        issue.updated_at = now_ms;
        self.append(issue, now_ms)
    }

    /// `status -> in_progress`, the "claim" verb (spec.md-adjacent
    /// issue-DAG vocabulary; no separate claimant field is tracked here,
    /// only the status transition).
    pub fn claim(&self, id: &str, now_ms: TimestampMs) -> Result<Issue, MuError> {
        self.update(id, now_ms, |issue| issue.status = IssueStatus::InProgress)
    }

    /// Close an issue with a terminal `outcome`, preserving the
    /// `closed iff outcome` invariant (spec.md §3).
    pub fn close(&self, id: &str, outcome: IssueOutcome, now_ms: TimestampMs) -> Result<Issue, MuError> {
        self.update(id, now_ms, |issue| {
            issue.status = IssueStatus::Closed;
            issue.outcome = Some(outcome);
        })
    }

    pub fn add_dep(&self, id: &str, dep: Dep, now_ms: TimestampMs) -> Result<Issue, MuError> {
        self.update(id, now_ms, |issue| {
            if !issue.deps.contains(&dep) {
                issue.deps.push(dep);
            }
        })
    }

    pub fn remove_dep(&self, id: &str, dep: &Dep, now_ms: TimestampMs) -> Result<Issue, MuError> {
        self.update(id, now_ms, |issue| issue.deps.retain(|d| d != dep))
    }

    pub fn get(&self, id: &str) -> Option<Issue> {
        self.by_id.read().unwrap().get(id).cloned()
    }

    /// A snapshot of every issue, for the pure `issue_dag` functions to
    /// run over.
    pub fn snapshot(&self) -> Vec<Issue> {
        self.by_id.read().unwrap().values().cloned().collect()
    }
}
