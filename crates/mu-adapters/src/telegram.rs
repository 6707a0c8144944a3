//! Telegram bot update ingress (spec.md §4.4, §6 `/webhooks/telegram`).
//!
//! Telegram is the one channel at `tier_b` (spec.md §3); the pipeline,
//! not this adapter, decides what that assurance tier is allowed to do.

use crate::spec::{AckFormat, AdapterSpec, IngressPayload, RawRequest, Verification};
use crate::verify::verify;
use crate::{AdapterIngressResult, ChannelAdapter};
use mu_types::adapter_audit::AdapterAuditOutcome;
use mu_types::channel::Channel;
use mu_types::envelope::{CommandTarget, InboundEnvelope};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    message: Message,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

pub struct TelegramAdapter {
    spec: AdapterSpec,
    repo_root: String,
    bot_username: String,
}

impl TelegramAdapter {
    pub fn new(secret_token: String, repo_root: String, bot_username: String) -> Self {
        Self {
            spec: AdapterSpec {
                channel: Channel::Telegram,
                route: "/webhooks/telegram".to_string(),
                ingress_payload: IngressPayload::Json,
                verification: Verification::SharedSecretHeader {
                    secret: secret_token,
                    secret_header: "x-telegram-bot-api-secret-token".to_string(),
                },
                ack_format: AckFormat::TelegramResult,
                deferred_delivery: false,
            },
            repo_root,
            bot_username,
        }
    }

    fn ack(result_text: impl Into<String>) -> crate::spec::AckResponse {
        crate::spec::AckResponse::json(200, serde_json::json!({ "ok": true, "result": result_text.into() }))
    }

    /// `/mu@botname ...` is accepted only when the bot name matches
    /// (spec.md §4.4); bare `/mu ...` is always accepted; anything else is
    /// passed through as-is so the pipeline's operator fallback for
    /// Telegram (spec.md §4.5 step 1) actually sees it.
    fn normalize_text(&self, text: &str) -> TelegramText {
        let text = text.trim();
        if let Some(rest) = text.strip_prefix("/mu@") {
            let (mentioned_bot, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if mentioned_bot != self.bot_username {
                return TelegramText::NotForThisBot;
            }
            return TelegramText::Command(format!("/mu {}", tail.trim()).trim().to_string());
        }
        TelegramText::Command(text.to_string())
    }
}

/// Result of matching a raw Telegram message against this bot's identity.
enum TelegramText {
    /// Either a `/mu` command or ordinary chat text, both handed to the
    /// pipeline - the pipeline decides what to do with non-command text.
    Command(String),
    /// Explicitly addressed to a different bot via `/mu@other_bot`; never
    /// handed to the pipeline.
    NotForThisBot,
}

impl ChannelAdapter for TelegramAdapter {
    fn adapter_spec(&self) -> &AdapterSpec {
        &self.spec
    }

    fn ingest(&self, request: &RawRequest, now_ms: i64, request_id: String) -> AdapterIngressResult {
        if let Err(failure) = verify(&self.spec, request, now_ms / 1000) {
            let reason = failure.reason_code(Channel::Telegram);
            return AdapterIngressResult::rejected(
                Channel::Telegram,
                crate::spec::AckResponse::verification_error(&reason),
                reason,
                None,
                AdapterAuditOutcome::SignatureInvalid,
                format!("telegram verification failed: {:?}", failure),
                now_ms,
            );
        }

        let update: Update = match serde_json::from_slice(&request.body) {
            Ok(v) => v,
            Err(e) => {
                return AdapterIngressResult::rejected(
                    Channel::Telegram,
                    Self::ack("malformed request"),
                    "payload_malformed",
                    None,
                    AdapterAuditOutcome::PayloadMalformed,
                    format!("telegram json parse failed: {e}"),
                    now_ms,
                )
            }
        };

        if let Some(callback) = update.callback_query {
            let command_text = match &callback.data {
                Some(data) if data.starts_with("confirm:") => format!("/mu confirm {}", &data["confirm:".len()..]),
                Some(data) if data.starts_with("cancel:") => format!("/mu cancel {}", &data["cancel:".len()..]),
                _ => {
                    return AdapterIngressResult::rejected(
                        Channel::Telegram,
                        Self::ack("ignored"),
                        "unsupported_callback_data",
                        Some(callback.id.clone()),
                        AdapterAuditOutcome::Ignored,
                        "telegram callback_query data was not a confirm/cancel action".to_string(),
                        now_ms,
                    )
                }
            };
            return self.build_result(
                request_id,
                now_ms,
                format!("telegram-idem-{}", callback.id),
                callback.message.chat.id.to_string(),
                callback.from.id.to_string(),
                command_text,
            );
        }

        let message = match update.message {
            Some(m) => m,
            None => {
                return AdapterIngressResult::rejected(
                    Channel::Telegram,
                    Self::ack("ignored"),
                    "unsupported_update",
                    None,
                    AdapterAuditOutcome::Ignored,
                    "telegram update had neither message nor callback_query".to_string(),
                    now_ms,
                )
            }
        };

        let text = message.text.clone().unwrap_or_default();
        let command_text = match self.normalize_text(&text) {
            TelegramText::Command(t) => t,
            TelegramText::NotForThisBot => {
                return AdapterIngressResult::rejected(
                    Channel::Telegram,
                    Self::ack("ignored"),
                    "not_command",
                    None,
                    AdapterAuditOutcome::Ignored,
                    "telegram message was addressed to a different bot".to_string(),
                    now_ms,
                )
            }
        };

        let actor_id = message.from.map(|u| u.id.to_string()).unwrap_or_else(|| "unknown".to_string());
        self.build_result(
            request_id,
            now_ms,
            format!("telegram-idem-{}", update.update_id),
            message.chat.id.to_string(),
            actor_id,
            command_text,
        )
    }
}

impl TelegramAdapter {
    #[allow(clippy::too_many_arguments)]
    fn build_result(
        &self,
        request_id: String,
        now_ms: i64,
        idempotency_key: String,
        chat_id: String,
        actor_id: String,
        command_text: String,
    ) -> AdapterIngressResult {
        let fingerprint = InboundEnvelope::fingerprint_for(Channel::Telegram, &command_text);
        let envelope = InboundEnvelope {
            version: 1,
            received_at_ms: now_ms,
            request_id,
            delivery_id: idempotency_key.clone(),
            channel: Channel::Telegram,
            channel_tenant_id: chat_id.clone(),
            channel_conversation_id: chat_id,
            channel_actor_id: actor_id.clone(),
            actor_id,
            actor_binding_id: None,
            assurance_tier: Channel::Telegram.assurance_tier(),
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
        AdapterIngressResult::accepted(Channel::Telegram, Self::ack("queued"), envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(secret: &str, body: &str) -> RawRequest {
        let mut headers = BTreeMap::new();
        headers.insert("x-telegram-bot-api-secret-token".to_string(), secret.to_string());
        RawRequest {
            method: "POST".to_string(),
            headers,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn bare_mu_command_is_accepted() {
        let adapter = TelegramAdapter::new("shh".to_string(), "/repo".to_string(), "mu_bot".to_string());
        let body = r#"{"update_id":1,"message":{"chat":{"id":5},"from":{"id":9},"text":"/mu status"}}"#;
        let result = adapter.ingest(&request("shh", body), 1_700_000_000_000, "req-1".to_string());
        assert!(result.accepted);
        assert_eq!(result.inbound.unwrap().command_text, "/mu status");
    }

    #[test]
    fn mu_mention_with_wrong_bot_name_is_ignored() {
        let adapter = TelegramAdapter::new("shh".to_string(), "/repo".to_string(), "mu_bot".to_string());
        let body = r#"{"update_id":2,"message":{"chat":{"id":5},"from":{"id":9},"text":"/mu@other_bot status"}}"#;
        let result = adapter.ingest(&request("shh", body), 1_700_000_000_000, "req-2".to_string());
        assert!(!result.accepted);
        assert_eq!(result.reason.unwrap(), "not_command");
    }

    #[test]
    fn mu_mention_with_matching_bot_name_is_accepted() {
        let adapter = TelegramAdapter::new("shh".to_string(), "/repo".to_string(), "mu_bot".to_string());
        let body = r#"{"update_id":3,"message":{"chat":{"id":5},"from":{"id":9},"text":"/mu@mu_bot status"}}"#;
        let result = adapter.ingest(&request("shh", body), 1_700_000_000_000, "req-3".to_string());
        assert!(result.accepted);
        assert_eq!(result.inbound.unwrap().command_text, "/mu status");
    }

    #[test]
    fn plain_chat_text_still_produces_an_envelope_for_operator_fallback() {
        let adapter = TelegramAdapter::new("shh".to_string(), "/repo".to_string(), "mu_bot".to_string());
        let body = r#"{"update_id":5,"message":{"chat":{"id":5},"from":{"id":9},"text":"what's the status of issue 12?"}}"#;
        let result = adapter.ingest(&request("shh", body), 1_700_000_000_000, "req-5".to_string());
        assert!(result.accepted);
        assert_eq!(result.inbound.unwrap().command_text, "what's the status of issue 12?");
    }

    #[test]
    fn confirm_button_callback_maps_to_confirm_command() {
        let adapter = TelegramAdapter::new("shh".to_string(), "/repo".to_string(), "mu_bot".to_string());
        let body = r#"{"update_id":4,"callback_query":{"id":"cb1","from":{"id":9},"message":{"chat":{"id":5}},"data":"confirm:cmd-3"}}"#;
        let result = adapter.ingest(&request("shh", body), 1_700_000_000_000, "req-4".to_string());
        assert!(result.accepted);
        assert_eq!(result.inbound.unwrap().command_text, "/mu confirm cmd-3");
    }

    #[test]
    fn wrong_secret_token_is_rejected() {
        let adapter = TelegramAdapter::new("shh".to_string(), "/repo".to_string(), "mu_bot".to_string());
        let body = r#"{"update_id":1,"message":{"chat":{"id":5},"from":{"id":9},"text":"/mu status"}}"#;
        let result = adapter.ingest(&request("wrong", body), 1_700_000_000_000, "req-5".to_string());
        assert!(!result.accepted);
    }
}
