//! The `ChannelAdapter` contract: verification, payload normalization,
//! and ack formatting for Slack, Discord, Telegram and terminal ingress
//! (spec.md §4.4).

pub mod discord;
pub mod slack;
pub mod spec;
pub mod telegram;
pub mod terminal;
pub mod verify;

pub use discord::DiscordAdapter;
pub use slack::SlackAdapter;
pub use spec::{AckResponse, AdapterSpec, IngressPayload, RawRequest, Verification};
pub use telegram::TelegramAdapter;
pub use terminal::TerminalAdapter;
pub use verify::VerificationFailure;

use mu_types::adapter_audit::{AdapterAuditEntry, AdapterAuditOutcome};
use mu_types::channel::Channel;
use mu_types::envelope::InboundEnvelope;

/// `AdapterIngressResult` (spec.md §4.4); `pipelineResult`/`outboxRecord`
/// are produced downstream by the server once it hands `inbound` to the
/// pipeline, so they are not part of this crate's return type.
pub struct AdapterIngressResult {
    pub channel: Channel,
    pub accepted: bool,
    pub reason: Option<String>,
    pub response: AckResponse,
    pub inbound: Option<InboundEnvelope>,
    pub audit_entry: Option<AdapterAuditEntry>,
}

impl AdapterIngressResult {
    pub fn rejected(channel: Channel, response: AckResponse, reason: impl Into<String>, delivery_id: Option<String>, outcome: AdapterAuditOutcome, detail: String, now_ms: i64) -> Self {
        let reason = reason.into();
        tracing::warn!(%channel, %reason, ?outcome, %detail, "adapter ingress rejected");
        Self {
            channel,
            accepted: false,
            reason: Some(reason),
            audit_entry: Some(AdapterAuditEntry::new(channel, delivery_id, outcome, detail, now_ms)),
            response,
            inbound: None,
        }
    }

    pub fn accepted(channel: Channel, response: AckResponse, inbound: InboundEnvelope) -> Self {
        Self {
            channel,
            accepted: true,
            reason: None,
            response,
            inbound: Some(inbound),
            audit_entry: None,
        }
    }
}

/// Implemented once per channel; `mu-server` registers one adapter per
/// route (spec.md §4.4, §6).
pub trait ChannelAdapter: Send + Sync {
    fn adapter_spec(&self) -> &AdapterSpec;

    /// `ingest(request) -> AdapterIngressResult` (spec.md §4.4). `now_ms`
    /// and `request_id` are supplied by the caller so this stays a pure
    /// function of its inputs.
    fn ingest(&self, request: &RawRequest, now_ms: i64, request_id: String) -> AdapterIngressResult;
}
