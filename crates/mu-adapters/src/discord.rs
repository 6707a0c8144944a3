//! Discord interaction ingress (spec.md §4.4, §6 `/webhooks/discord`).

use crate::spec::{AckFormat, AdapterSpec, IngressPayload, RawRequest, Verification};
use crate::verify::verify;
use crate::{AdapterIngressResult, ChannelAdapter};
use mu_types::adapter_audit::AdapterAuditOutcome;
use mu_types::channel::Channel;
use mu_types::envelope::{CommandTarget, InboundEnvelope};
use serde::Deserialize;
use std::collections::BTreeMap;

const INTERACTION_PING: u8 = 1;
const INTERACTION_APPLICATION_COMMAND: u8 = 2;
const INTERACTION_MESSAGE_COMPONENT: u8 = 3;

#[derive(Debug, Deserialize)]
struct CommandOption {
    #[serde(default)]
    value: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct InteractionData {
    #[serde(default)]
    name: String,
    #[serde(default)]
    custom_id: String,
    #[serde(default)]
    options: Vec<CommandOption>,
}

#[derive(Debug, Deserialize)]
struct InteractionUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct InteractionMember {
    user: InteractionUser,
}

#[derive(Debug, Deserialize)]
struct Interaction {
    id: String,
    #[serde(rename = "type")]
    interaction_type: u8,
    #[serde(default)]
    data: Option<InteractionData>,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    member: Option<InteractionMember>,
}

pub struct DiscordAdapter {
    spec: AdapterSpec,
    repo_root: String,
}

impl DiscordAdapter {
    pub fn new(public_key_hex_as_secret: String, repo_root: String) -> Self {
        Self {
            spec: AdapterSpec {
                channel: Channel::Discord,
                route: "/webhooks/discord".to_string(),
                ingress_payload: IngressPayload::Json,
                verification: Verification::HmacSha256 {
                    secret: public_key_hex_as_secret,
                    signature_header: "x-discord-signature".to_string(),
                    timestamp_header: Some("x-discord-request-timestamp".to_string()),
                    signature_prefix: "v1".to_string(),
                    max_clock_skew_sec: 300,
                },
                ack_format: AckFormat::DiscordInteraction,
                deferred_delivery: false,
            },
            repo_root,
        }
    }

    fn ack(content: impl Into<String>) -> crate::spec::AckResponse {
        crate::spec::AckResponse::json(
            200,
            serde_json::json!({ "type": 4, "data": { "content": content.into(), "flags": 64 } }),
        )
    }

    fn pong() -> crate::spec::AckResponse {
        crate::spec::AckResponse::json(200, serde_json::json!({ "type": 1 }))
    }

    fn command_text(data: &InteractionData) -> String {
        if !data.custom_id.is_empty() {
            if let Some(command_id) = data.custom_id.strip_prefix("confirm:") {
                return format!("/mu confirm {command_id}");
            }
            if let Some(command_id) = data.custom_id.strip_prefix("cancel:") {
                return format!("/mu cancel {command_id}");
            }
        }
        let args: Vec<String> = data
            .options
            .iter()
            .filter_map(|opt| opt.value.as_ref())
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        format!("/mu {} {}", data.name, args.join(" ")).trim().to_string()
    }
}

impl ChannelAdapter for DiscordAdapter {
    fn adapter_spec(&self) -> &AdapterSpec {
        &self.spec
    }

    fn ingest(&self, request: &RawRequest, now_ms: i64, request_id: String) -> AdapterIngressResult {
        if let Err(failure) = verify(&self.spec, request, now_ms / 1000) {
            let reason = failure.reason_code(Channel::Discord);
            return AdapterIngressResult::rejected(
                Channel::Discord,
                crate::spec::AckResponse::verification_error(&reason),
                reason,
                None,
                AdapterAuditOutcome::SignatureInvalid,
                format!("discord verification failed: {:?}", failure),
                now_ms,
            );
        }

        let interaction: Interaction = match serde_json::from_slice(&request.body) {
            Ok(v) => v,
            Err(e) => {
                return AdapterIngressResult::rejected(
                    Channel::Discord,
                    Self::ack("malformed request"),
                    "payload_malformed",
                    None,
                    AdapterAuditOutcome::PayloadMalformed,
                    format!("discord json parse failed: {e}"),
                    now_ms,
                )
            }
        };

        if interaction.interaction_type == INTERACTION_PING {
            return AdapterIngressResult {
                channel: Channel::Discord,
                accepted: false,
                reason: Some("ping".to_string()),
                response: Self::pong(),
                inbound: None,
                audit_entry: None,
            };
        }

        if interaction.interaction_type != INTERACTION_APPLICATION_COMMAND
            && interaction.interaction_type != INTERACTION_MESSAGE_COMPONENT
        {
            return AdapterIngressResult::rejected(
                Channel::Discord,
                Self::ack("unsupported interaction"),
                "unsupported_interaction_type",
                Some(interaction.id.clone()),
                AdapterAuditOutcome::UnsupportedCommand,
                format!("discord interaction type {} not supported", interaction.interaction_type),
                now_ms,
            );
        }

        let data = interaction.data.unwrap_or_default();
        let command_text = Self::command_text(&data);
        let user_id = interaction
            .member
            .map(|m| m.user.id)
            .unwrap_or_else(|| "unknown".to_string());
        let tenant_id = interaction.guild_id.unwrap_or_default();
        let conversation_id = interaction.channel_id.unwrap_or_default();
        let fingerprint = InboundEnvelope::fingerprint_for(Channel::Discord, &command_text);

        let envelope = InboundEnvelope {
            version: 1,
            received_at_ms: now_ms,
            request_id,
            delivery_id: interaction.id.clone(),
            channel: Channel::Discord,
            channel_tenant_id: tenant_id,
            channel_conversation_id: conversation_id,
            channel_actor_id: user_id.clone(),
            actor_id: user_id,
            actor_binding_id: None,
            assurance_tier: Channel::Discord.assurance_tier(),
            repo_root: self.repo_root.clone(),
            command_text,
            required_scope: None,
            effective_scope: Vec::new(),
            target: CommandTarget::default(),
            idempotency_key: format!("discord-idem-{}", interaction.id),
            fingerprint,
            attachments: Vec::new(),
            metadata: BTreeMap::new(),
        };

        AdapterIngressResult::accepted(Channel::Discord, Self::ack("on it"), envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn sign(secret: &str, ts: i64, body: &str) -> String {
        let message = format!("v1:{ts}:{body}");
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        format!("v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_request(secret: &str, ts: i64, body: &str) -> RawRequest {
        let signature = sign(secret, ts, body);
        let mut headers = BTreeMap::new();
        headers.insert("x-discord-signature".to_string(), signature);
        headers.insert("x-discord-request-timestamp".to_string(), ts.to_string());
        RawRequest {
            method: "POST".to_string(),
            headers,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn ping_is_acknowledged_without_producing_an_envelope() {
        let adapter = DiscordAdapter::new("shh".to_string(), "/repo".to_string());
        let ts = 1_700_000_000;
        let body = r#"{"id":"i1","type":1}"#;
        let request = signed_request("shh", ts, body);
        let result = adapter.ingest(&request, ts * 1000, "req-1".to_string());
        assert!(!result.accepted);
        assert!(result.inbound.is_none());
        assert_eq!(result.response.body, r#"{"type":1}"#);
    }

    #[test]
    fn slash_command_interaction_produces_envelope() {
        let adapter = DiscordAdapter::new("shh".to_string(), "/repo".to_string());
        let ts = 1_700_000_000;
        let body = r#"{"id":"i2","type":2,"guild_id":"g1","channel_id":"c1","member":{"user":{"id":"u1"}},"data":{"name":"status","options":[]}}"#;
        let request = signed_request("shh", ts, body);
        let result = adapter.ingest(&request, ts * 1000, "req-2".to_string());
        assert!(result.accepted);
        let envelope = result.inbound.unwrap();
        assert_eq!(envelope.command_text, "/mu status");
        assert_eq!(envelope.idempotency_key, "discord-idem-i2");
    }

    #[test]
    fn button_callback_maps_to_confirm_command() {
        let adapter = DiscordAdapter::new("shh".to_string(), "/repo".to_string());
        let ts = 1_700_000_000;
        let body = r#"{"id":"i3","type":3,"guild_id":"g1","channel_id":"c1","member":{"user":{"id":"u1"}},"data":{"custom_id":"confirm:cmd-9"}}"#;
        let request = signed_request("shh", ts, body);
        let result = adapter.ingest(&request, ts * 1000, "req-3".to_string());
        assert!(result.accepted);
        assert_eq!(result.inbound.unwrap().command_text, "/mu confirm cmd-9");
    }
}
