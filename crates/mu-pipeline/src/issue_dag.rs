//! Issue DAG Engine (spec.md §4.6).
//!
//! Pure functions over a snapshot of issues: no I/O, no mutation. Purity
//! and determinism are testable invariants - running a function twice on
//! the same snapshot must yield identical output, including ordering.

use mu_types::issue::{Issue, IssueOutcome, IssueStatus};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

fn by_id(issues: &[Issue]) -> HashMap<&str, &Issue> {
    issues.iter().map(|i| (i.id.as_str(), i)).collect()
}

/// BFS over `dep.type == "parent"` reverse edges: the root plus every
/// descendant. Cycles are impossible by invariant; the visited set
/// guards against ill-formed input anyway.
pub fn subtree_ids(issues: &[Issue], root_id: &str) -> BTreeSet<String> {
    let mut children_of: HashMap<&str, Vec<&str>> = HashMap::new();
    for issue in issues {
        for parent in issue.parents() {
            children_of.entry(parent).or_default().push(issue.id.as_str());
        }
    }

    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(root_id.to_string());
    visited.insert(root_id.to_string());
    while let Some(current) = queue.pop_front() {
        if let Some(children) = children_of.get(current.as_str()) {
            for &child in children {
                if visited.insert(child.to_string()) {
                    queue.push_back(child.to_string());
                }
            }
        }
    }
    visited
}

fn sort_ready(mut candidates: Vec<&Issue>) -> Vec<&Issue> {
    candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
    candidates
}

/// An issue is blocked iff any `blocks` dep targets it from an issue
/// that is not closed-with-non-`expanded` outcome.
fn is_blocked(issue: &Issue, index: &HashMap<&str, &Issue>) -> bool {
    issue.blockers().any(|target| match index.get(target) {
        None => false,
        Some(blocker) => match (blocker.status, blocker.outcome) {
            (IssueStatus::Closed, Some(outcome)) => outcome == IssueOutcome::Expanded,
            (IssueStatus::Closed, None) => false,
            _ => true,
        },
    })
}

fn has_open_children(issue_id: &str, issues: &[Issue]) -> bool {
    issues
        .iter()
        .any(|i| i.parents().any(|p| p == issue_id) && !i.is_closed())
}

/// `readyLeaves` (spec.md §4.6): open, unblocked, childless, tag-matching
/// issues, ascending by `priority` then `id` (a hard ordering contract -
/// reconcile replay depends on it).
pub fn ready_leaves<'a>(
    issues: &'a [Issue],
    root_id: Option<&str>,
    tags: &[String],
) -> Vec<&'a Issue> {
    let scope: Option<BTreeSet<String>> = root_id.map(|r| subtree_ids(issues, r));
    let index = by_id(issues);
    let required_tags: HashSet<&str> = tags.iter().map(String::as_str).collect();

    let candidates: Vec<&Issue> = issues
        .iter()
        .filter(|issue| scope.as_ref().map_or(true, |s| s.contains(&issue.id)))
        .filter(|issue| issue.status == IssueStatus::Open)
        .filter(|issue| !is_blocked(issue, &index))
        .filter(|issue| !has_open_children(&issue.id, issues))
        .filter(|issue| {
            required_tags.is_empty()
                || required_tags
                    .iter()
                    .all(|t| issue.tags.iter().any(|tag| tag == t))
        })
        .collect();

    sort_ready(candidates)
}

/// `retryableDagCandidates` (spec.md §4.6): closed issues whose outcome
/// is `failure`/`needs_work` (or `expanded` with zero children) and
/// whose attempt count is below `max_attempts`.
pub fn retryable_dag_candidates<'a>(
    issues: &'a [Issue],
    root_id: &str,
    attempts_by_issue_id: &HashMap<String, u32>,
    max_attempts: u32,
) -> Vec<&'a Issue> {
    let scope = subtree_ids(issues, root_id);
    let candidates: Vec<&Issue> = issues
        .iter()
        .filter(|issue| scope.contains(&issue.id))
        .filter(|issue| issue.is_closed())
        .filter(|issue| match issue.outcome {
            Some(outcome) if outcome.is_retryable() => true,
            Some(IssueOutcome::Expanded) => !has_any_children(&issue.id, issues),
            _ => false,
        })
        .filter(|issue| {
            attempts_by_issue_id.get(&issue.id).copied().unwrap_or(0) < max_attempts
        })
        .collect();
    sort_ready(candidates)
}

fn has_any_children(issue_id: &str, issues: &[Issue]) -> bool {
    issues.iter().any(|i| i.parents().any(|p| p == issue_id))
}

/// `collapsible` (spec.md §4.6): closed `outcome=expanded` nodes whose
/// children are all terminal (`success | skipped | refine`) - signals
/// safe to collapse the subtree.
pub fn collapsible<'a>(issues: &'a [Issue], root_id: &str) -> Vec<&'a Issue> {
    let scope = subtree_ids(issues, root_id);
    let candidates: Vec<&Issue> = issues
        .iter()
        .filter(|issue| scope.contains(&issue.id))
        .filter(|issue| issue.outcome == Some(IssueOutcome::Expanded))
        .filter(|issue| {
            let children: Vec<&Issue> = issues
                .iter()
                .filter(|c| c.parents().any(|p| p == issue.id))
                .collect();
            !children.is_empty()
                && children
                    .iter()
                    .all(|c| c.is_closed() && c.outcome.is_some_and(IssueOutcome::is_collapsible_terminal))
        })
        .collect();
    sort_ready(candidates)
}

/// Why the DAG rooted at `root_id` is, or isn't, final (spec.md §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagValidation {
    pub is_final: bool,
    pub reason: String,
}

/// `validateDag` (spec.md §4.6).
pub fn validate_dag(issues: &[Issue], root_id: &str) -> DagValidation {
    let scope = subtree_ids(issues, root_id);
    let descendants: Vec<&Issue> = issues
        .iter()
        .filter(|i| scope.contains(&i.id) && i.id != root_id)
        .collect();

    let needs_work = descendants
        .iter()
        .find(|i| i.is_closed() && matches!(i.outcome, Some(IssueOutcome::Failure) | Some(IssueOutcome::NeedsWork)));
    if let Some(issue) = needs_work {
        return DagValidation {
            is_final: false,
            reason: format!("needs work: {}", issue.id),
        };
    }

    let expanded_without_children = descendants.iter().find(|i| {
        i.outcome == Some(IssueOutcome::Expanded) && !has_any_children(&i.id, issues)
    });
    if let Some(issue) = expanded_without_children {
        return DagValidation {
            is_final: false,
            reason: format!("expanded without children: {}", issue.id),
        };
    }

    let all_descendants_closed = descendants.iter().all(|i| i.is_closed());
    let root = issues.iter().find(|i| i.id == root_id);

    if all_descendants_closed {
        match root {
            Some(root) if root.is_closed() => {
                return DagValidation {
                    is_final: true,
                    reason: "all work completed".to_string(),
                };
            }
            Some(root) if !descendants.is_empty() => {
                let _ = root;
                return DagValidation {
                    is_final: false,
                    reason: "all children closed, root still open".to_string(),
                };
            }
            _ => {
                return DagValidation {
                    is_final: true,
                    reason: "all work completed".to_string(),
                };
            }
        }
    }

    DagValidation {
        is_final: false,
        reason: "in progress".to_string(),
    }
}
