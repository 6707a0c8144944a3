//! `OutboxRecord` - durable outbound queue entries (spec.md §3, §4.7).

use crate::channel::Channel;
use crate::command::CommandId;
use crate::TimestampMs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxState {
    Pending,
    Delivered,
    Retried,
    DeadLetter,
}

/// The envelope handed to a channel's delivery callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub channel: Channel,
    pub channel_conversation_id: String,
    pub correlation_command_id: Option<CommandId>,
    pub text: String,
    pub data: Option<serde_json::Value>,
    pub ts_ms: TimestampMs,
}

/// `{outbox_id, dedupe_key, envelope, state, attempt, next_attempt_at_ms,
/// last_error}` (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub outbox_id: String,
    pub dedupe_key: String,
    pub envelope: OutboundEnvelope,
    pub state: OutboxState,
    pub attempt: u32,
    pub next_attempt_at_ms: TimestampMs,
    pub last_error: Option<String>,
    pub created_at_ms: TimestampMs,
    pub updated_at_ms: TimestampMs,
}

impl OutboxRecord {
    /// Dedupe key for a command lifecycle message (spec.md §3).
    pub fn dedupe_key_for_command_result(
        command_id: &CommandId,
        pipeline_result_kind: &str,
        state: &str,
    ) -> String {
        format!("cmd:{}:{}:{}", command_id, pipeline_result_kind, state)
    }

    /// Dedupe key for a wake fan-out message (spec.md §3).
    pub fn dedupe_key_for_wake(wake_id: &str, binding_id: &str) -> String {
        format!("wake:{}:{}", wake_id, binding_id)
    }
}
