//! The `Issue` work-item graph (spec.md §3, §4.6).

use crate::TimestampMs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueOutcome {
    Success,
    Failure,
    NeedsWork,
    Expanded,
    Skipped,
    Refine,
}

impl IssueOutcome {
    /// Outcomes treated as terminal for `collapsible` (spec.md §4.6).
    pub fn is_collapsible_terminal(self) -> bool {
        matches!(
            self,
            IssueOutcome::Success | IssueOutcome::Skipped | IssueOutcome::Refine
        )
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, IssueOutcome::Failure | IssueOutcome::NeedsWork)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepType {
    Blocks,
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dep {
    #[serde(rename = "type")]
    pub dep_type: DepType,
    pub target: String,
}

/// A work item in the issue DAG (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub body: String,
    pub status: IssueStatus,
    pub outcome: Option<IssueOutcome>,
    pub tags: Vec<String>,
    pub deps: Vec<Dep>,
    pub priority: i64,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

impl Issue {
    /// Default priority when unset, per spec.md §4.6 ordering rule.
    pub const DEFAULT_PRIORITY: i64 = 3;

    pub fn is_closed(&self) -> bool {
        matches!(self.status, IssueStatus::Closed)
    }

    /// Invariant: an issue is `closed` iff `outcome != null` (spec.md §3).
    pub fn invariant_closed_iff_outcome(&self) -> bool {
        self.is_closed() == self.outcome.is_some()
    }

    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.deps
            .iter()
            .filter(|d| d.dep_type == DepType::Parent)
            .map(|d| d.target.as_str())
    }

    pub fn blockers(&self) -> impl Iterator<Item = &str> {
        self.deps
            .iter()
            .filter(|d| d.dep_type == DepType::Blocks)
            .map(|d| d.target.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_issue(outcome: Option<IssueOutcome>) -> Issue {
        Issue {
            id: "a".into(),
            title: String::new(),
            body: String::new(),
            status: if outcome.is_some() {
                IssueStatus::Closed
            } else {
                IssueStatus::Open
            },
            outcome,
            tags: vec![],
            deps: vec![],
            priority: Issue::DEFAULT_PRIORITY,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn closed_requires_outcome() {
        assert!(closed_issue(Some(IssueOutcome::Success)).invariant_closed_iff_outcome());
        assert!(closed_issue(None).invariant_closed_iff_outcome());
    }
}
