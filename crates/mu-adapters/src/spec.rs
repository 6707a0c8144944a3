//! `AdapterSpec` and the shared ingress/verification vocabulary
//! (spec.md §4.4).

use mu_types::channel::Channel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressPayload {
    FormUrlEncoded,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckFormat {
    SlackEphemeral,
    DiscordInteraction,
    TelegramResult,
    PlainJson,
}

/// `verification` (spec.md §4.4). Secrets are carried here so `verify`
/// is a pure function of `(spec, request, now_ms)`; `/api/control-plane/
/// channels` must redact this field before advertising specs.
#[derive(Debug, Clone)]
pub enum Verification {
    HmacSha256 {
        secret: String,
        signature_header: String,
        timestamp_header: Option<String>,
        signature_prefix: String,
        max_clock_skew_sec: i64,
    },
    SharedSecretHeader {
        secret: String,
        secret_header: String,
    },
}

#[derive(Debug, Clone)]
pub struct AdapterSpec {
    pub channel: Channel,
    pub route: String,
    pub ingress_payload: IngressPayload,
    pub verification: Verification,
    pub ack_format: AckFormat,
    pub deferred_delivery: bool,
}

impl AdapterSpec {
    /// `delivery_semantics` is fixed at `at_least_once` for every
    /// adapter (spec.md §4.4).
    pub fn delivery_semantics(&self) -> &'static str {
        "at_least_once"
    }
}

/// A raw HTTP request as the adapter sees it, independent of whichever
/// web framework `mu-server` uses.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: String,
    /// Header names are lowercased by the caller before construction.
    pub headers: std::collections::BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl RawRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }
}

/// The HTTP response returned directly to the calling channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AckResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl AckResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    /// The error envelope (spec.md §6, §7): verification failures are
    /// always HTTP 401 with `{ok:false, error:"<reason_code>"}`, never the
    /// channel's own ack shape.
    pub fn verification_error(reason_code: &str) -> Self {
        Self::json(401, serde_json::json!({ "ok": false, "error": reason_code }))
    }
}
