//! Dispatches parsed `issue.*` verbs against the local [`IssueStore`] and
//! the pure `mu_pipeline::issue_dag` functions (spec.md §4.5 step 6,
//! §4.6). Also supplies the narrow `OperatorBackend` stub for Telegram's
//! conversational fallback, never implemented beyond a static reply
//! (mu_pipeline::executor "out of scope per spec.md §1").

use crate::issue_store::IssueStore;
use mu_pipeline::executor::{CommandExecutor, ExecutorOutcome, OperatorBackend};
use mu_pipeline::issue_dag;
use mu_types::command::CommandResult;
use mu_types::envelope::InboundEnvelope;
use mu_types::issue::{Dep, DepType, IssueOutcome};
use std::sync::Arc;

pub struct IssueCommandExecutor {
    issues: Arc<IssueStore>,
}

impl IssueCommandExecutor {
    pub fn new(issues: Arc<IssueStore>) -> Self {
        Self { issues }
    }

    fn now_ms(&self) -> i64 {
        mu_types::now_ms()
    }

    fn ready(&self, args: &[String]) -> ExecutorOutcome {
        let snapshot = self.issues.snapshot();
        let root_id = args.first().map(String::as_str);
        let tags: Vec<String> = args.iter().skip(1).cloned().collect();
        let ready = issue_dag::ready_leaves(&snapshot, root_id, &tags);
        let data = serde_json::json!({ "ids": ready.iter().map(|i| i.id.clone()).collect::<Vec<_>>() });
        ExecutorOutcome::Completed(CommandResult {
            summary: Some(format!("{} ready issue(s)", ready.len())),
            data: Some(data),
        })
    }

    fn get(&self, args: &[String]) -> ExecutorOutcome {
        let Some(id) = args.first() else {
            return ExecutorOutcome::Failed {
                error_code: "invalid_input".to_string(),
            };
        };
        match self.issues.get(id) {
            Some(issue) => ExecutorOutcome::Completed(CommandResult {
                summary: Some(format!("issue {id}")),
                data: Some(serde_json::to_value(issue).unwrap_or_default()),
            }),
            None => ExecutorOutcome::Failed {
                error_code: "not_found".to_string(),
            },
        }
    }

    fn create(&self, args: &[String], target: &InboundEnvelope) -> ExecutorOutcome {
        let id = args.first().cloned().unwrap_or_else(|| target.idempotency_key.clone());
        let title = args.get(1).cloned().unwrap_or_default();
        match self.issues.create(id.clone(), title, String::new(), Vec::new(), Vec::new(), None, self.now_ms()) {
            Ok(issue) => ExecutorOutcome::Completed(CommandResult {
                summary: Some(format!("created {}", issue.id)),
                data: Some(serde_json::to_value(issue).unwrap_or_default()),
            }),
            Err(e) => ExecutorOutcome::Failed {
                error_code: e.error_code().to_string(),
            },
        }
    }

    fn update(&self, args: &[String]) -> ExecutorOutcome {
        let Some(id) = args.first() else {
            return ExecutorOutcome::Failed {
                error_code: "invalid_input".to_string(),
            };
        };
        let title = args.get(1).cloned();
        match self.issues.update(id, self.now_ms(), |issue| {
            if let Some(title) = title {
                issue.title = title;
            }
        }) {
            Ok(issue) => ExecutorOutcome::Completed(CommandResult {
                summary: Some(format!("updated {}", issue.id)),
                data: Some(serde_json::to_value(issue).unwrap_or_default()),
            }),
            Err(e) => ExecutorOutcome::Failed {
                error_code: e.error_code().to_string(),
            },
        }
    }

    fn claim(&self, args: &[String]) -> ExecutorOutcome {
        let Some(id) = args.first() else {
            return ExecutorOutcome::Failed {
                error_code: "invalid_input".to_string(),
            };
        };
        match self.issues.claim(id, self.now_ms()) {
            Ok(issue) => ExecutorOutcome::Completed(CommandResult {
                summary: Some(format!("claimed {}", issue.id)),
                data: Some(serde_json::to_value(issue).unwrap_or_default()),
            }),
            Err(e) => ExecutorOutcome::Failed {
                error_code: e.error_code().to_string(),
            },
        }
    }

    fn close(&self, args: &[String]) -> ExecutorOutcome {
        let Some(id) = args.first() else {
            return ExecutorOutcome::Failed {
                error_code: "invalid_input".to_string(),
            };
        };
        let outcome = match args.get(1).map(String::as_str) {
            Some("failure") => IssueOutcome::Failure,
            Some("needs_work") => IssueOutcome::NeedsWork,
            Some("expanded") => IssueOutcome::Expanded,
            Some("skipped") => IssueOutcome::Skipped,
            Some("refine") => IssueOutcome::Refine,
            _ => IssueOutcome::Success,
        };
        match self.issues.close(id, outcome, self.now_ms()) {
            Ok(issue) => ExecutorOutcome::Completed(CommandResult {
                summary: Some(format!("closed {}", issue.id)),
                data: Some(serde_json::to_value(issue).unwrap_or_default()),
            }),
            Err(e) => ExecutorOutcome::Failed {
                error_code: e.error_code().to_string(),
            },
        }
    }

    fn dep(&self, args: &[String], remove: bool) -> ExecutorOutcome {
        let (Some(id), Some(target)) = (args.first(), args.get(1)) else {
            return ExecutorOutcome::Failed {
                error_code: "invalid_input".to_string(),
            };
        };
        let dep_type = match args.get(2).map(String::as_str) {
            Some("blocks") => DepType::Blocks,
            _ => DepType::Parent,
        };
        let dep = Dep {
            dep_type,
            target: target.clone(),
        };
        let result = if remove {
            self.issues.remove_dep(id, &dep, self.now_ms())
        } else {
            self.issues.add_dep(id, dep, self.now_ms())
        };
        match result {
            Ok(issue) => ExecutorOutcome::Completed(CommandResult {
                summary: Some(format!("updated deps for {}", issue.id)),
                data: Some(serde_json::to_value(issue).unwrap_or_default()),
            }),
            Err(e) => ExecutorOutcome::Failed {
                error_code: e.error_code().to_string(),
            },
        }
    }

    fn validate(&self, args: &[String]) -> ExecutorOutcome {
        let Some(root_id) = args.first() else {
            return ExecutorOutcome::Failed {
                error_code: "invalid_input".to_string(),
            };
        };
        let snapshot = self.issues.snapshot();
        let validation = issue_dag::validate_dag(&snapshot, root_id);
        ExecutorOutcome::Completed(CommandResult {
            summary: Some(validation.reason.clone()),
            data: Some(serde_json::json!({ "is_final": validation.is_final })),
        })
    }
}

impl CommandExecutor for IssueCommandExecutor {
    fn execute(&self, command_kind: &str, args: &[String], envelope: &InboundEnvelope) -> ExecutorOutcome {
        match command_kind {
            "issue.ready" => self.ready(args),
            "issue.get" => self.get(args),
            "issue.create" => self.create(args, envelope),
            "issue.update" => self.update(args),
            "issue.claim" => self.claim(args),
            "issue.close" => self.close(args),
            "issue.dep" => self.dep(args, false),
            "issue.undep" => self.dep(args, true),
            "issue.validate" => self.validate(args),
            "status" => ExecutorOutcome::Completed(CommandResult {
                summary: Some("mu control plane is running".to_string()),
                data: None,
            }),
            other => ExecutorOutcome::Failed {
                error_code: format!("unknown_command_kind:{other}"),
            },
        }
    }
}

/// The Telegram conversational fallback is explicitly out of scope
/// (operator LLM internals, spec.md §1); this is the only thing an
/// `OperatorBackend` is allowed to do.
pub struct NoopOperatorBackend;

impl OperatorBackend for NoopOperatorBackend {
    fn respond(&self, _envelope: &InboundEnvelope) -> String {
        "the operator chat surface isn't available here - try a /mu command instead".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mu_types::channel::Channel;
    use mu_types::envelope::CommandTarget;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn envelope() -> InboundEnvelope {
        InboundEnvelope {
            version: 1,
            received_at_ms: 1000,
            request_id: "r1".to_string(),
            delivery_id: "d1".to_string(),
            channel: Channel::Terminal,
            channel_tenant_id: "t".to_string(),
            channel_conversation_id: "c".to_string(),
            channel_actor_id: "a".to_string(),
            actor_id: "a".to_string(),
            actor_binding_id: None,
            assurance_tier: Channel::Terminal.assurance_tier(),
            repo_root: "/repo".to_string(),
            command_text: "/mu create i1 Title".to_string(),
            required_scope: None,
            effective_scope: Vec::new(),
            target: CommandTarget::default(),
            idempotency_key: "idem-1".to_string(),
            fingerprint: "fp".to_string(),
            attachments: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn create_then_ready_round_trips() {
        let dir = tempdir().unwrap();
        let store = Arc::new(IssueStore::open(dir.path().join("issues.jsonl")).unwrap());
        let executor = IssueCommandExecutor::new(store);
        let outcome = executor.execute("issue.create", &["i1".to_string(), "Title".to_string()], &envelope());
        assert!(matches!(outcome, ExecutorOutcome::Completed(_)));

        let outcome = executor.execute("issue.ready", &[], &envelope());
        match outcome {
            ExecutorOutcome::Completed(result) => {
                assert_eq!(result.data.unwrap()["ids"], serde_json::json!(["i1"]));
            }
            _ => panic!("expected completion"),
        }
    }

    #[test]
    fn get_of_unknown_issue_fails() {
        let dir = tempdir().unwrap();
        let store = Arc::new(IssueStore::open(dir.path().join("issues.jsonl")).unwrap());
        let executor = IssueCommandExecutor::new(store);
        let outcome = executor.execute("issue.get", &["missing".to_string()], &envelope());
        assert!(matches!(outcome, ExecutorOutcome::Failed { .. }));
    }
}
