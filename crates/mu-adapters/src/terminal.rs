//! Local terminal ingress (spec.md §4.4, §6 `/api/commands/submit`) —
//! "same envelope shape" as the chat adapters but the caller already
//! speaks JSON in the control plane's own vocabulary, since it's a
//! trusted local CLI rather than a third-party webhook format.

use crate::spec::{AckFormat, AdapterSpec, IngressPayload, RawRequest, Verification};
use crate::verify::verify;
use crate::{AdapterIngressResult, ChannelAdapter};
use mu_types::adapter_audit::AdapterAuditOutcome;
use mu_types::channel::Channel;
use mu_types::envelope::{CommandTarget, InboundEnvelope};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct TerminalSubmission {
    channel_tenant_id: String,
    channel_conversation_id: String,
    channel_actor_id: String,
    command_text: String,
    #[serde(default)]
    delivery_id: Option<String>,
}

pub struct TerminalAdapter {
    spec: AdapterSpec,
    repo_root: String,
}

impl TerminalAdapter {
    pub fn new(shared_secret: String, repo_root: String) -> Self {
        Self {
            spec: AdapterSpec {
                channel: Channel::Terminal,
                route: "/api/commands/submit".to_string(),
                ingress_payload: IngressPayload::Json,
                verification: Verification::SharedSecretHeader {
                    secret: shared_secret,
                    secret_header: "x-mu-shared-secret".to_string(),
                },
                ack_format: AckFormat::PlainJson,
                deferred_delivery: false,
            },
            repo_root,
        }
    }

    /// Payload-shaped acks, distinct from `AckResponse::verification_error`:
    /// accepted or malformed-but-understood requests both get HTTP 200
    /// (spec.md §7 "payload errors ... HTTP 200 with ack noting the
    /// reason"); only verification failures get 401.
    fn ack(accepted: bool, message: impl Into<String>) -> crate::spec::AckResponse {
        crate::spec::AckResponse::json(200, serde_json::json!({ "ok": accepted, "message": message.into() }))
    }
}

impl ChannelAdapter for TerminalAdapter {
    fn adapter_spec(&self) -> &AdapterSpec {
        &self.spec
    }

    fn ingest(&self, request: &RawRequest, now_ms: i64, request_id: String) -> AdapterIngressResult {
        if let Err(failure) = verify(&self.spec, request, now_ms / 1000) {
            let reason = failure.reason_code(Channel::Terminal);
            return AdapterIngressResult::rejected(
                Channel::Terminal,
                crate::spec::AckResponse::verification_error(&reason),
                reason,
                None,
                AdapterAuditOutcome::SignatureInvalid,
                format!("terminal verification failed: {:?}", failure),
                now_ms,
            );
        }

        let submission: TerminalSubmission = match serde_json::from_slice(&request.body) {
            Ok(v) => v,
            Err(e) => {
                return AdapterIngressResult::rejected(
                    Channel::Terminal,
                    Self::ack(false, "malformed request"),
                    "payload_malformed",
                    None,
                    AdapterAuditOutcome::PayloadMalformed,
                    format!("terminal json parse failed: {e}"),
                    now_ms,
                )
            }
        };

        let command_text = submission.command_text.trim().to_string();
        let delivery_id = submission.delivery_id.clone().unwrap_or_else(|| {
            let stable = format!(
                "{}:{}:{}:{}",
                submission.channel_tenant_id, submission.channel_conversation_id, submission.channel_actor_id, command_text
            );
            hex::encode(Sha256::digest(stable.as_bytes()))
        });

        let fingerprint = InboundEnvelope::fingerprint_for(Channel::Terminal, &command_text);
        let envelope = InboundEnvelope {
            version: 1,
            received_at_ms: now_ms,
            request_id,
            delivery_id: delivery_id.clone(),
            channel: Channel::Terminal,
            channel_tenant_id: submission.channel_tenant_id,
            channel_conversation_id: submission.channel_conversation_id,
            channel_actor_id: submission.channel_actor_id.clone(),
            actor_id: submission.channel_actor_id,
            actor_binding_id: None,
            assurance_tier: Channel::Terminal.assurance_tier(),
            repo_root: self.repo_root.clone(),
            command_text,
            required_scope: None,
            effective_scope: Vec::new(),
            target: CommandTarget::default(),
            idempotency_key: format!("terminal-idem-{delivery_id}"),
            fingerprint,
            attachments: Vec::new(),
            metadata: BTreeMap::new(),
        };

        AdapterIngressResult::accepted(Channel::Terminal, Self::ack(true, "accepted"), envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(secret: &str, body: &str) -> RawRequest {
        let mut headers = BTreeMap::new();
        headers.insert("x-mu-shared-secret".to_string(), secret.to_string());
        RawRequest {
            method: "POST".to_string(),
            headers,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn valid_submission_produces_envelope() {
        let adapter = TerminalAdapter::new("topsecret".to_string(), "/repo".to_string());
        let body = r#"{"channel_tenant_id":"local","channel_conversation_id":"session-1","channel_actor_id":"dev","command_text":"/mu ready"}"#;
        let result = adapter.ingest(&request("topsecret", body), 1_700_000_000_000, "req-1".to_string());
        assert!(result.accepted);
        assert_eq!(result.inbound.unwrap().command_text, "/mu ready");
    }

    #[test]
    fn wrong_shared_secret_is_rejected() {
        let adapter = TerminalAdapter::new("topsecret".to_string(), "/repo".to_string());
        let body = r#"{"channel_tenant_id":"local","channel_conversation_id":"session-1","channel_actor_id":"dev","command_text":"/mu ready"}"#;
        let result = adapter.ingest(&request("nope", body), 1_700_000_000_000, "req-2".to_string());
        assert!(!result.accepted);
    }

    #[test]
    fn repeated_submission_with_explicit_delivery_id_is_stable() {
        let adapter = TerminalAdapter::new("topsecret".to_string(), "/repo".to_string());
        let body = r#"{"channel_tenant_id":"local","channel_conversation_id":"session-1","channel_actor_id":"dev","command_text":"/mu ready","delivery_id":"fixed-1"}"#;
        let first = adapter.ingest(&request("topsecret", body), 1_700_000_000_000, "req-3".to_string());
        let second = adapter.ingest(&request("topsecret", body), 1_700_000_001_000, "req-4".to_string());
        assert_eq!(
            first.inbound.unwrap().idempotency_key,
            second.inbound.unwrap().idempotency_key
        );
    }
}
