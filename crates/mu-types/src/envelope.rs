//! `InboundEnvelope` - the normalized ingress message (spec.md §3, §4.4).

use crate::channel::{AssuranceTier, Channel};
use crate::identity::BindingId;
use crate::TimestampMs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A target the command acts on (e.g. an issue), if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommandTarget {
    pub target_type: Option<String>,
    pub target_id: Option<String>,
}

/// An attachment reference carried by the envelope (e.g. a Slack file
/// share); the download itself is out of scope (spec.md §1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub content_type: Option<String>,
}

/// The normalized ingress message every adapter produces (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub version: u32,
    pub received_at_ms: TimestampMs,
    pub request_id: String,
    pub delivery_id: String,
    pub channel: Channel,
    pub channel_tenant_id: String,
    pub channel_conversation_id: String,
    pub channel_actor_id: String,
    pub actor_id: String,
    pub actor_binding_id: Option<BindingId>,
    pub assurance_tier: AssuranceTier,
    pub repo_root: String,
    pub command_text: String,
    pub required_scope: Option<String>,
    pub effective_scope: Vec<String>,
    pub target: CommandTarget,
    pub idempotency_key: String,
    pub fingerprint: String,
    pub attachments: Vec<Attachment>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl InboundEnvelope {
    /// `fingerprint` depends only on the lowercased normalized command
    /// text (spec.md §3 invariant).
    pub fn fingerprint_for(channel: Channel, command_text: &str) -> String {
        use sha2::{Digest, Sha256};
        let normalized = command_text.trim().to_lowercase();
        let digest = Sha256::digest(normalized.as_bytes());
        format!("{}-fp-{}", channel.as_str(), hex::encode(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_case_insensitive_and_whitespace_trimmed() {
        let a = InboundEnvelope::fingerprint_for(Channel::Slack, "/mu status");
        let b = InboundEnvelope::fingerprint_for(Channel::Slack, "  /MU Status  ");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_is_channel_scoped() {
        let a = InboundEnvelope::fingerprint_for(Channel::Slack, "/mu status");
        let b = InboundEnvelope::fingerprint_for(Channel::Discord, "/mu status");
        assert_ne!(a, b);
    }
}
