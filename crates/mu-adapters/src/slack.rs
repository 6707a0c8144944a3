//! Slack slash-command and interactive-button ingress (spec.md §4.4,
//! §6 `/webhooks/slack`).

use crate::spec::{AckFormat, AdapterSpec, IngressPayload, RawRequest, Verification};
use crate::verify::verify;
use crate::{AdapterIngressResult, ChannelAdapter};
use mu_types::adapter_audit::AdapterAuditOutcome;
use mu_types::channel::Channel;
use mu_types::envelope::{CommandTarget, InboundEnvelope};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize, Default)]
struct SlashCommandForm {
    #[serde(default)]
    team_id: String,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    command: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    trigger_id: String,
}

pub struct SlackAdapter {
    spec: AdapterSpec,
    repo_root: String,
}

impl SlackAdapter {
    pub fn new(signing_secret: String, repo_root: String) -> Self {
        Self {
            spec: AdapterSpec {
                channel: Channel::Slack,
                route: "/webhooks/slack".to_string(),
                ingress_payload: IngressPayload::FormUrlEncoded,
                verification: Verification::HmacSha256 {
                    secret: signing_secret,
                    signature_header: "x-slack-signature".to_string(),
                    timestamp_header: Some("x-slack-request-timestamp".to_string()),
                    signature_prefix: "v0".to_string(),
                    max_clock_skew_sec: 300,
                },
                ack_format: AckFormat::SlackEphemeral,
                deferred_delivery: false,
            },
            repo_root,
        }
    }

    fn idempotency_key(request: &RawRequest, form: &SlashCommandForm) -> String {
        if let Some(request_id) = request.header("x-slack-request-id") {
            return format!("slack-idem-{request_id}");
        }
        let stable = format!("{}:{}:{}:{}:{}", form.team_id, form.channel_id, form.user_id, form.trigger_id, form.text);
        let digest = Sha256::digest(stable.as_bytes());
        format!("slack-idem-{}", hex::encode(digest))
    }

    fn ack(text: impl Into<String>) -> crate::spec::AckResponse {
        crate::spec::AckResponse::json(
            200,
            serde_json::json!({ "response_type": "ephemeral", "text": text.into() }),
        )
    }
}

impl ChannelAdapter for SlackAdapter {
    fn adapter_spec(&self) -> &AdapterSpec {
        &self.spec
    }

    fn ingest(&self, request: &RawRequest, now_ms: i64, request_id: String) -> AdapterIngressResult {
        let delivery_id = request.header("x-slack-request-id").map(str::to_string);

        if let Err(failure) = verify(&self.spec, request, now_ms / 1000) {
            let reason = failure.reason_code(Channel::Slack);
            return AdapterIngressResult::rejected(
                Channel::Slack,
                crate::spec::AckResponse::verification_error(&reason),
                reason,
                delivery_id,
                AdapterAuditOutcome::SignatureInvalid,
                format!("slack verification failed: {:?}", failure),
                now_ms,
            );
        }

        let form: SlashCommandForm = match serde_urlencoded::from_bytes(&request.body) {
            Ok(form) => form,
            Err(e) => {
                return AdapterIngressResult::rejected(
                    Channel::Slack,
                    Self::ack("malformed request"),
                    "payload_malformed",
                    delivery_id,
                    AdapterAuditOutcome::PayloadMalformed,
                    format!("slack form parse failed: {e}"),
                    now_ms,
                )
            }
        };

        // Slash commands pass the command text through as-is; Slack
        // strips the leading `/mu` into `command` and leaves the rest in
        // `text`.
        let command_text = if form.command == "/mu" {
            format!("/mu {}", form.text).trim().to_string()
        } else {
            format!("{} {}", form.command, form.text).trim().to_string()
        };

        let idempotency_key = Self::idempotency_key(request, &form);
        let fingerprint = InboundEnvelope::fingerprint_for(Channel::Slack, &command_text);

        let envelope = InboundEnvelope {
            version: 1,
            received_at_ms: now_ms,
            request_id,
            delivery_id: delivery_id.unwrap_or_else(|| idempotency_key.clone()),
            channel: Channel::Slack,
            channel_tenant_id: form.team_id.clone(),
            channel_conversation_id: form.channel_id.clone(),
            channel_actor_id: form.user_id.clone(),
            actor_id: form.user_id.clone(),
            actor_binding_id: None,
            assurance_tier: Channel::Slack.assurance_tier(),
            repo_root: self.repo_root.clone(),
            command_text,
            required_scope: None,
            effective_scope: Vec::new(),
            target: CommandTarget::default(),
            idempotency_key,
            fingerprint,
            attachments: Vec::new(),
            metadata: BTreeMap::new(),
        };

        AdapterIngressResult::accepted(Channel::Slack, Self::ack("on it"), envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};

    fn sign(secret: &str, ts: i64, body: &str) -> String {
        let message = format!("v0:{ts}:{body}");
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        format!("v0={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_slash_command_produces_normalized_envelope() {
        let adapter = SlackAdapter::new("shh".to_string(), "/repo".to_string());
        let body = "team_id=T1&channel_id=C1&user_id=U1&command=%2Fmu&text=status&trigger_id=trig1";
        let ts = 1_700_000_000;
        let signature = sign("shh", ts, body);
        let mut headers = BTreeMap::new();
        headers.insert("x-slack-signature".to_string(), signature);
        headers.insert("x-slack-request-timestamp".to_string(), ts.to_string());
        let request = RawRequest {
            method: "POST".to_string(),
            headers,
            body: body.as_bytes().to_vec(),
        };

        let result = adapter.ingest(&request, ts * 1000, "req-1".to_string());
        assert!(result.accepted);
        let envelope = result.inbound.unwrap();
        assert_eq!(envelope.command_text, "/mu status");
        assert_eq!(envelope.channel_tenant_id, "T1");
    }

    #[test]
    fn invalid_signature_is_rejected_with_audit_entry() {
        let adapter = SlackAdapter::new("shh".to_string(), "/repo".to_string());
        let body = "team_id=T1&channel_id=C1&user_id=U1&command=%2Fmu&text=status&trigger_id=trig1";
        let mut headers = BTreeMap::new();
        headers.insert("x-slack-signature".to_string(), "v0=deadbeef".to_string());
        headers.insert("x-slack-request-timestamp".to_string(), "1700000000".to_string());
        let request = RawRequest {
            method: "POST".to_string(),
            headers,
            body: body.as_bytes().to_vec(),
        };

        let result = adapter.ingest(&request, 1_700_000_000_000, "req-2".to_string());
        assert!(!result.accepted);
        assert!(result.audit_entry.is_some());
        assert_eq!(result.audit_entry.unwrap().outcome, AdapterAuditOutcome::SignatureInvalid);
    }
}
