//! Execution dispatch (spec.md §4.5 step 6).
//!
//! `OperatorBackend` and `CliInvoker` are the narrow stub interfaces
//! called for the explicitly out-of-scope collaborators (operator LLM
//! internals, CLI invocation) named in spec.md §1 and carried forward in
//! SPEC_FULL.md §12 Non-goals: this crate calls through them but never
//! implements them.

use mu_types::command::{CliInvocationMeta, CommandResult};
use mu_types::envelope::InboundEnvelope;
use mu_types::TimestampMs;

/// What an executor decided for a `queued -> in_progress` dispatch
/// (spec.md §4.5 step 6).
pub enum ExecutorOutcome {
    Completed(CommandResult),
    Failed { error_code: String },
    Deferred { retry_at_ms: TimestampMs },
}

/// Dispatches a parsed command kind to whatever backs it: issue DAG
/// mutators, a CLI invocation, or another synchronous collaborator.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command_kind: &str, args: &[String], envelope: &InboundEnvelope) -> ExecutorOutcome;
}

/// Stub for the operator chat fallback (Telegram conversational routing,
/// spec.md §4.5 step 1). Out of scope per spec.md §1 "operator LLM
/// internals"; the pipeline only calls through this interface.
pub trait OperatorBackend: Send + Sync {
    fn respond(&self, envelope: &InboundEnvelope) -> String;
}

/// Stub for long-running CLI invocation (spec.md §1 "on-disk JSONL
/// append primitives" sibling out-of-scope collaborator; CLI process
/// management itself). A `CommandExecutor` implementation may delegate
/// to this for commands carrying `cli_invocation` metadata.
pub trait CliInvoker: Send + Sync {
    fn invoke(&self, meta: &CliInvocationMeta) -> ExecutorOutcome;
}
