//! Common verification steps applied in order, first failure wins
//! (spec.md §4.4).

use crate::spec::{AdapterSpec, RawRequest, Verification};
use hmac::{Hmac, Mac};
use mu_types::channel::Channel;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    MethodNotAllowed,
    MissingSignature,
    MissingTimestamp,
    MissingSecretToken,
    MalformedTimestamp,
    StaleTimestamp,
    InvalidSignature,
    InvalidSecretToken,
}

impl VerificationFailure {
    /// The `reason` code surfaced in `AdapterIngressResult` and the
    /// audit log, named per channel (spec.md §4.4, §7: `missing_*_signature`,
    /// `invalid_*_signature`, `stale_*_timestamp`, `invalid_*_secret_token`).
    pub fn reason_code(&self, channel: Channel) -> String {
        let channel = channel.as_str();
        match self {
            VerificationFailure::MethodNotAllowed => "method_not_allowed".to_string(),
            VerificationFailure::MissingSignature => format!("missing_{channel}_signature"),
            VerificationFailure::MissingTimestamp => format!("missing_{channel}_timestamp"),
            VerificationFailure::MissingSecretToken => format!("missing_{channel}_secret_token"),
            VerificationFailure::MalformedTimestamp => format!("malformed_{channel}_timestamp"),
            VerificationFailure::StaleTimestamp => format!("stale_{channel}_timestamp"),
            VerificationFailure::InvalidSignature => format!("invalid_{channel}_signature"),
            VerificationFailure::InvalidSecretToken => format!("invalid_{channel}_secret_token"),
        }
    }
}

/// Steps 1-4 of spec.md §4.4's common verification sequence.
pub fn verify(spec: &AdapterSpec, request: &RawRequest, now_sec: i64) -> Result<(), VerificationFailure> {
    if request.method != "POST" {
        return Err(VerificationFailure::MethodNotAllowed);
    }

    match &spec.verification {
        Verification::HmacSha256 {
            secret,
            signature_header,
            timestamp_header,
            signature_prefix,
            max_clock_skew_sec,
        } => {
            let timestamp = match timestamp_header {
                Some(header_name) => {
                    let raw = request
                        .header(header_name)
                        .ok_or(VerificationFailure::MissingTimestamp)?;
                    let ts: i64 = raw.parse().map_err(|_| VerificationFailure::MalformedTimestamp)?;
                    if (now_sec - ts).abs() > *max_clock_skew_sec {
                        return Err(VerificationFailure::StaleTimestamp);
                    }
                    Some(ts)
                }
                None => None,
            };

            let signature_value = request
                .header(signature_header)
                .ok_or(VerificationFailure::MissingSignature)?;

            let message = match timestamp {
                Some(ts) => format!("{}:{}:{}", signature_prefix, ts, String::from_utf8_lossy(&request.body)),
                None => format!("{}:{}", signature_prefix, String::from_utf8_lossy(&request.body)),
            };
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
            mac.update(message.as_bytes());
            let expected = hex::encode(mac.finalize().into_bytes());
            let expected_header = format!("{signature_prefix}={expected}");

            if !constant_time_eq(expected_header.as_bytes(), signature_value.as_bytes()) {
                return Err(VerificationFailure::InvalidSignature);
            }
            Ok(())
        }
        Verification::SharedSecretHeader { secret, secret_header } => {
            let provided = request
                .header(secret_header)
                .ok_or(VerificationFailure::MissingSecretToken)?;
            if !constant_time_eq(secret.as_bytes(), provided.as_bytes()) {
                return Err(VerificationFailure::InvalidSecretToken);
            }
            Ok(())
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::IngressPayload;
    use mu_types::channel::Channel;
    use std::collections::BTreeMap;

    fn hmac_spec() -> AdapterSpec {
        AdapterSpec {
            channel: Channel::Slack,
            route: "/webhooks/slack".to_string(),
            ingress_payload: IngressPayload::FormUrlEncoded,
            verification: Verification::HmacSha256 {
                secret: "shh".to_string(),
                signature_header: "x-slack-signature".to_string(),
                timestamp_header: Some("x-slack-request-timestamp".to_string()),
                signature_prefix: "v0".to_string(),
                max_clock_skew_sec: 300,
            },
            ack_format: crate::spec::AckFormat::SlackEphemeral,
            deferred_delivery: false,
        }
    }

    fn sign(secret: &str, prefix: &str, ts: i64, body: &str) -> String {
        let message = format!("{prefix}:{ts}:{body}");
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        format!("{prefix}={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_and_fresh_timestamp_passes() {
        let spec = hmac_spec();
        let body = "command=/mu+status";
        let ts = 1_700_000_000;
        let signature = sign("shh", "v0", ts, body);
        let mut headers = BTreeMap::new();
        headers.insert("x-slack-signature".to_string(), signature);
        headers.insert("x-slack-request-timestamp".to_string(), ts.to_string());
        let request = RawRequest {
            method: "POST".to_string(),
            headers,
            body: body.as_bytes().to_vec(),
        };
        assert!(verify(&spec, &request, ts).is_ok());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let spec = hmac_spec();
        let body = "command=/mu+status";
        let ts = 1_700_000_000;
        let signature = sign("shh", "v0", ts, body);
        let mut headers = BTreeMap::new();
        headers.insert("x-slack-signature".to_string(), signature);
        headers.insert("x-slack-request-timestamp".to_string(), ts.to_string());
        let request = RawRequest {
            method: "POST".to_string(),
            headers,
            body: body.as_bytes().to_vec(),
        };
        let err = verify(&spec, &request, ts + 1000).unwrap_err();
        assert_eq!(err, VerificationFailure::StaleTimestamp);
    }

    #[test]
    fn tampered_body_fails_signature_check() {
        let spec = hmac_spec();
        let ts = 1_700_000_000;
        let signature = sign("shh", "v0", ts, "command=/mu+status");
        let mut headers = BTreeMap::new();
        headers.insert("x-slack-signature".to_string(), signature);
        headers.insert("x-slack-request-timestamp".to_string(), ts.to_string());
        let request = RawRequest {
            method: "POST".to_string(),
            headers,
            body: b"command=/mu+destroy".to_vec(),
        };
        let err = verify(&spec, &request, ts).unwrap_err();
        assert_eq!(err, VerificationFailure::InvalidSignature);
    }

    #[test]
    fn shared_secret_header_must_match_exactly() {
        let spec = AdapterSpec {
            channel: Channel::Terminal,
            route: "/api/commands/submit".to_string(),
            ingress_payload: IngressPayload::Json,
            verification: Verification::SharedSecretHeader {
                secret: "topsecret".to_string(),
                secret_header: "x-mu-secret".to_string(),
            },
            ack_format: crate::spec::AckFormat::PlainJson,
            deferred_delivery: false,
        };
        let mut headers = BTreeMap::new();
        headers.insert("x-mu-secret".to_string(), "wrong".to_string());
        let request = RawRequest {
            method: "POST".to_string(),
            headers,
            body: b"{}".to_vec(),
        };
        assert!(verify(&spec, &request, 0).is_err());
    }

    #[test]
    fn reason_code_is_named_per_channel() {
        assert_eq!(VerificationFailure::StaleTimestamp.reason_code(Channel::Slack), "stale_slack_timestamp");
        assert_eq!(VerificationFailure::InvalidSignature.reason_code(Channel::Discord), "invalid_discord_signature");
        assert_eq!(VerificationFailure::InvalidSecretToken.reason_code(Channel::Terminal), "invalid_terminal_secret_token");
    }

    #[test]
    fn non_post_method_is_rejected_before_verification() {
        let spec = hmac_spec();
        let request = RawRequest {
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        };
        assert_eq!(verify(&spec, &request, 0).unwrap_err(), VerificationFailure::MethodNotAllowed);
    }
}
