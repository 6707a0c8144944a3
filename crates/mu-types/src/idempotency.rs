//! `IdempotencyEntry` (spec.md §3).

use crate::channel::Channel;
use crate::command::CommandState;
use crate::TimestampMs;
use serde::{Deserialize, Serialize};

/// `(idempotency_key -> {fingerprint, command_id, created_at_ms,
/// state})`. Carries `channel`/`tenant`/`conversation` so the index can
/// enforce the bounded-window eviction policy decided in SPEC_FULL.md
/// (10,000 entries per `(channel, tenant, conversation)`, oldest first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyEntry {
    pub idempotency_key: String,
    pub channel: Channel,
    pub channel_tenant_id: String,
    pub channel_conversation_id: String,
    pub fingerprint: String,
    pub command_id: String,
    pub created_at_ms: TimestampMs,
    pub state: CommandState,
}
