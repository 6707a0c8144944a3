//! `AdapterAuditEntry` - the adapter audit trail (SPEC_FULL.md §11).
//!
//! Every verification failure, ignored event, and unsupported-command
//! case an adapter encounters is appended here as a typed row, so the
//! propagation policy (spec.md §7) is inspectable after the fact instead
//! of only visible in logs.

use crate::channel::Channel;
use crate::TimestampMs;
use serde::{Deserialize, Serialize};

/// Why an inbound delivery was recorded without producing a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterAuditOutcome {
    SignatureInvalid,
    PayloadMalformed,
    UnsupportedCommand,
    Ignored,
    Accepted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterAuditEntry {
    pub kind: String,
    pub ts_ms: TimestampMs,
    pub channel: Channel,
    pub delivery_id: Option<String>,
    pub outcome: AdapterAuditOutcome,
    pub detail: String,
}

impl AdapterAuditEntry {
    pub fn new(
        channel: Channel,
        delivery_id: Option<String>,
        outcome: AdapterAuditOutcome,
        detail: impl Into<String>,
        now_ms: TimestampMs,
    ) -> Self {
        Self {
            kind: "adapter.audit".to_string(),
            ts_ms: now_ms,
            channel,
            delivery_id,
            outcome,
            detail: detail.into(),
        }
    }
}
