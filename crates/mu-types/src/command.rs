//! `CommandRecord` and its finite state machine (spec.md §3, §4.5).

use crate::channel::Channel;
use crate::identity::BindingId;
use crate::TimestampMs;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for a command invocation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub String);

impl CommandId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("cmd-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CommandId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CommandId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The durable lifecycle states a `CommandRecord` can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    Accepted,
    AwaitingConfirmation,
    Queued,
    InProgress,
    Deferred,
    Completed,
    Failed,
    Cancelled,
    Expired,
    DeadLetter,
}

impl CommandState {
    /// Terminal set (spec.md §3): no outgoing edges.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommandState::Completed
                | CommandState::Failed
                | CommandState::Cancelled
                | CommandState::Expired
                | CommandState::DeadLetter
        )
    }

    /// The exhaustive allowed-transition table from spec.md §3. Anything
    /// not listed here is an `InvalidCommandTransitionError`.
    pub fn can_transition_to(self, to: CommandState) -> bool {
        use CommandState::*;
        match self {
            Accepted => matches!(to, AwaitingConfirmation | Queued | Cancelled | Failed | DeadLetter),
            AwaitingConfirmation => matches!(to, Queued | Cancelled | Expired | DeadLetter),
            Queued => matches!(to, InProgress | Cancelled | Failed | DeadLetter),
            InProgress => matches!(to, Completed | Failed | Deferred | Cancelled | DeadLetter),
            Deferred => matches!(to, Queued | Failed | Cancelled | DeadLetter),
            // terminal states have no outgoing edges
            Completed | Failed | Cancelled | Expired | DeadLetter => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandState::Accepted => "accepted",
            CommandState::AwaitingConfirmation => "awaiting_confirmation",
            CommandState::Queued => "queued",
            CommandState::InProgress => "in_progress",
            CommandState::Deferred => "deferred",
            CommandState::Completed => "completed",
            CommandState::Failed => "failed",
            CommandState::Cancelled => "cancelled",
            CommandState::Expired => "expired",
            CommandState::DeadLetter => "dead_letter",
        }
    }

    /// `event_type` written to the command journal for a transition into
    /// this state (spec.md §4.5 step 7).
    pub fn lifecycle_event(self) -> String {
        format!("command.{}", self.as_str())
    }
}

/// Correlation tuple identifying the conversation/request a command came
/// from (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub channel: Channel,
    pub channel_tenant_id: String,
    pub channel_conversation_id: String,
    pub request_id: String,
    pub actor_binding_id: BindingId,
}

/// CLI invocation metadata, carried opaquely for executors that dispatch
/// to a subprocess (spec.md §3, §5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliInvocationMeta {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_ms: i64,
}

/// Structured result payload attached to a command once it has a result
/// to report, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommandResult {
    pub summary: Option<String>,
    pub data: Option<serde_json::Value>,
}

/// The durable lifecycle entity (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command_id: CommandId,
    pub correlation: Correlation,
    pub state: CommandState,
    pub command_text: String,
    pub idempotency_key: String,
    pub fingerprint: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub attempt: u32,
    pub confirmation_expires_at_ms: Option<TimestampMs>,
    pub retry_at_ms: Option<TimestampMs>,
    pub error_code: Option<String>,
    pub operator_session_id: Option<String>,
    pub operator_turn_id: Option<String>,
    pub cli_invocation: Option<CliInvocationMeta>,
    pub result: Option<CommandResult>,
    pub created_at_ms: TimestampMs,
    pub updated_at_ms: TimestampMs,
}

impl CommandRecord {
    /// Attempt a transition, enforcing the allowed-transition table.
    /// Returns the previous state on success.
    pub fn transition(
        &mut self,
        to: CommandState,
        now_ms: TimestampMs,
    ) -> Result<CommandState, InvalidCommandTransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(InvalidCommandTransitionError {
                command_id: self.command_id.clone(),
                from: self.state,
                to,
            });
        }
        let from = self.state;
        self.state = to;
        self.updated_at_ms = now_ms;
        Ok(from)
    }
}

/// A single line of the `commands.jsonl` journal: `{kind:
/// "command.lifecycle", ts_ms, event_type, command}` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLifecycleEntry {
    pub kind: String,
    pub ts_ms: TimestampMs,
    pub event_type: String,
    pub command: CommandRecord,
}

impl CommandLifecycleEntry {
    pub fn new(command: CommandRecord, now_ms: TimestampMs) -> Self {
        let event_type = command.state.lifecycle_event();
        Self {
            kind: "command.lifecycle".to_string(),
            ts_ms: now_ms,
            event_type,
            command,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid transition for command {command_id}: {from:?} -> {to:?}")]
pub struct InvalidCommandTransitionError {
    pub command_id: CommandId,
    pub from: CommandState,
    pub to: CommandState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for s in [
            CommandState::Completed,
            CommandState::Failed,
            CommandState::Cancelled,
            CommandState::Expired,
            CommandState::DeadLetter,
        ] {
            assert!(s.is_terminal());
            for t in [CommandState::Queued, CommandState::InProgress] {
                assert!(!s.can_transition_to(t));
            }
        }
    }

    #[test]
    fn accepted_allows_exactly_the_documented_targets() {
        let allowed = [
            CommandState::AwaitingConfirmation,
            CommandState::Queued,
            CommandState::Cancelled,
            CommandState::Failed,
            CommandState::DeadLetter,
        ];
        for t in allowed {
            assert!(CommandState::Accepted.can_transition_to(t));
        }
        assert!(!CommandState::Accepted.can_transition_to(CommandState::Completed));
        assert!(!CommandState::Accepted.can_transition_to(CommandState::InProgress));
    }
}
