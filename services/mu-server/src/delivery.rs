//! `ChannelDelivery` implementations: posting an `OutboundEnvelope` back
//! out to the channel it came from (spec.md §4.7). Each one is a thin
//! `reqwest` client against the channel's native send-message API,
//! following `openibank_cli::client::PlaygroundClient`'s plain
//! `reqwest::Client` + base-URL wrapper shape.

use async_trait::async_trait;
use mu_outbox::ChannelDelivery;
use mu_types::outbox::OutboundEnvelope;

pub struct SlackDelivery {
    client: reqwest::Client,
    bot_token: String,
}

impl SlackDelivery {
    pub fn new(bot_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
        }
    }
}

#[async_trait]
impl ChannelDelivery for SlackDelivery {
    async fn deliver(&self, envelope: &OutboundEnvelope) -> Result<(), String> {
        let response = self
            .client
            .post("https://slack.com/api/chat.postMessage")
            .bearer_auth(&self.bot_token)
            .json(&serde_json::json!({
                "channel": envelope.channel_conversation_id,
                "text": envelope.text,
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        ack_or_error(response).await
    }
}

pub struct DiscordDelivery {
    client: reqwest::Client,
    bot_token: String,
}

impl DiscordDelivery {
    pub fn new(bot_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
        }
    }
}

#[async_trait]
impl ChannelDelivery for DiscordDelivery {
    async fn deliver(&self, envelope: &OutboundEnvelope) -> Result<(), String> {
        let url = format!(
            "https://discord.com/api/v10/channels/{}/messages",
            envelope.channel_conversation_id
        );
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&serde_json::json!({ "content": envelope.text }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        ack_or_error(response).await
    }
}

pub struct TelegramDelivery {
    client: reqwest::Client,
    bot_token: String,
}

impl TelegramDelivery {
    pub fn new(bot_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
        }
    }
}

#[async_trait]
impl ChannelDelivery for TelegramDelivery {
    async fn deliver(&self, envelope: &OutboundEnvelope) -> Result<(), String> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "chat_id": envelope.channel_conversation_id,
                "text": envelope.text,
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        ack_or_error(response).await
    }
}

/// Terminal ingress is request/response; the ack already carries the
/// immediate reply, so there is nothing left to deliver out-of-band for
/// follow-up lifecycle messages beyond logging them.
pub struct TerminalDelivery;

#[async_trait]
impl ChannelDelivery for TerminalDelivery {
    async fn deliver(&self, envelope: &OutboundEnvelope) -> Result<(), String> {
        tracing::info!(conversation = %envelope.channel_conversation_id, text = %envelope.text, "terminal outbound message");
        Ok(())
    }
}

async fn ack_or_error(response: reqwest::Response) -> Result<(), String> {
    if response.status().is_success() {
        Ok(())
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(format!("delivery request failed: {status} {body}"))
    }
}
