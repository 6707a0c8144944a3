//! Drives the real HTTP surface end-to-end, mirroring
//! `openibank_api`'s `api_integration_tests.rs` router-level style but
//! against a live, tempdir-backed `AppState` rather than a mock DB.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use clap::Parser;
use hmac::{Hmac, Mac};
use mu_server::config::Args;
use mu_server::routes;
use mu_server::state::AppState;
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

const SLACK_SECRET: &str = "slack-test-secret";
const TERMINAL_SECRET: &str = "terminal-test-secret";

fn now_sec() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

fn slack_signature(secret: &str, ts: i64, body: &str) -> String {
    let message = format!("v0:{ts}:{body}");
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(message.as_bytes());
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

async fn test_app() -> Arc<AppState> {
    let dir = tempfile::tempdir().unwrap();
    let args = Args::parse_from([
        "mu-server",
        "--repo-root",
        dir.path().to_str().unwrap(),
        "--slack-signing-secret",
        SLACK_SECRET,
        "--terminal-shared-secret",
        TERMINAL_SECRET,
    ]);
    std::mem::forget(dir);
    let state = AppState::bootstrap(args, 1_700_000_000_000).unwrap();
    Arc::new(state)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

#[tokio::test]
async fn terminal_status_command_completes_synchronously() {
    let state = test_app().await;
    let app = routes::routes().with_state(state);

    let body = json!({
        "channel_tenant_id": "local",
        "channel_conversation_id": "session-1",
        "channel_actor_id": "dev",
        "command_text": "/mu status"
    });
    let request = Request::builder()
        .method("POST")
        .uri("/api/commands/submit")
        .header("content-type", "application/json")
        .header("x-mu-shared-secret", TERMINAL_SECRET)
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["ok"], json!(true));
}

#[tokio::test]
async fn terminal_submission_with_wrong_secret_is_rejected() {
    let state = test_app().await;
    let app = routes::routes().with_state(state);

    let body = json!({
        "channel_tenant_id": "local",
        "channel_conversation_id": "session-1",
        "channel_actor_id": "dev",
        "command_text": "/mu status"
    });
    let request = Request::builder()
        .method("POST")
        .uri("/api/commands/submit")
        .header("content-type", "application/json")
        .header("x-mu-shared-secret", "wrong-secret")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error"], json!("invalid_terminal_secret_token"));
}

#[tokio::test]
async fn slack_slash_command_happy_path_acks_ephemeral() {
    let state = test_app().await;
    let app = routes::routes().with_state(state);

    let body = "team_id=T1&channel_id=C1&user_id=U1&command=%2Fmu&text=status&trigger_id=trig1";
    let ts = now_sec();
    let signature = slack_signature(SLACK_SECRET, ts, body);

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/slack")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-slack-signature", signature)
        .header("x-slack-request-timestamp", ts.to_string())
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["response_type"], json!("ephemeral"));
}

#[tokio::test]
async fn slack_tampered_signature_is_rejected() {
    let state = test_app().await;
    let app = routes::routes().with_state(state);

    let body = "team_id=T1&channel_id=C1&user_id=U1&command=%2Fmu&text=status&trigger_id=trig1";
    let ts = now_sec();

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/slack")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-slack-signature", "v0=deadbeef")
        .header("x-slack-request-timestamp", ts.to_string())
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error"], json!("invalid_slack_signature"));
}

#[tokio::test]
async fn slack_replayed_signature_outside_clock_skew_is_stale() {
    let state = test_app().await;
    let app = routes::routes().with_state(state);

    let body = "team_id=T1&channel_id=C1&user_id=U1&command=%2Fmu&text=status&trigger_id=trig1";
    let ts = now_sec() - 600;
    let signature = slack_signature(SLACK_SECRET, ts, body);

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/slack")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-slack-signature", signature)
        .header("x-slack-request-timestamp", ts.to_string())
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error"], json!("stale_slack_timestamp"));
}

#[tokio::test]
async fn control_plane_channels_advertises_four_adapters() {
    let state = test_app().await;
    let app = routes::routes().with_state(state);

    let request = Request::builder()
        .method("GET")
        .uri("/api/control-plane/channels")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn identities_link_then_terminal_command_resolves_scope() {
    let state = test_app().await;
    let app = routes::routes().with_state(state);

    let link_body = json!({
        "binding_id": "b1",
        "operator_id": "op1",
        "channel": "terminal",
        "channel_tenant_id": "local",
        "channel_actor_id": "dev",
        "scopes": ["issue.write"]
    });
    let request = Request::builder()
        .method("POST")
        .uri("/api/control-plane/identities/link")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&link_body).unwrap()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], json!("active"));
}

#[tokio::test]
async fn control_plane_reload_reports_success() {
    let state = test_app().await;
    let app = routes::routes().with_state(state);

    let request = Request::builder()
        .method("POST")
        .uri("/api/control-plane/reload")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&json!({ "reason": "test" })).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["ok"], json!(true));
}
