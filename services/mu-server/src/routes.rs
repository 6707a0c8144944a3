//! HTTP route registration and handlers (spec.md §6), following
//! `openibank_api::routes`'s `Router<Arc<AppState>>` shape and
//! `handlers::auth::login`'s `State`/`Json` extractor convention.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use mu_adapters::{AckResponse, ChannelAdapter, RawRequest};
use mu_pipeline::CommandPipelineResult;
use mu_types::channel::Channel;
use mu_types::envelope::InboundEnvelope;
use mu_types::identity::{BindingId, OperatorId};
use mu_types::outbox::{OutboundEnvelope, OutboxRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhooks/slack", post(webhook_slack))
        .route("/webhooks/discord", post(webhook_discord))
        .route("/webhooks/telegram", post(webhook_telegram))
        .route("/api/commands/submit", post(commands_submit))
        .route("/api/control-plane/reload", post(control_plane_reload))
        .route("/api/control-plane/channels", axum::routing::get(control_plane_channels))
        .route("/api/control-plane/identities/link", post(control_plane_identities_link))
        .route("/api/control-plane/turn", post(control_plane_turn))
}

fn raw_request(headers: &HeaderMap, body: axum::body::Bytes) -> RawRequest {
    let mut map = std::collections::BTreeMap::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            map.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }
    RawRequest {
        method: "POST".to_string(),
        headers: map,
        body: body.to_vec(),
    }
}

fn ack_response(ack: AckResponse) -> Response {
    let status = StatusCode::from_u16(ack.status).unwrap_or(StatusCode::OK);
    (status, [(axum::http::header::CONTENT_TYPE, ack.content_type)], ack.body).into_response()
}

/// Run an `AdapterIngressResult` through audit logging, the command
/// pipeline, and outbound enqueue, returning the adapter's own ack.
async fn process_ingress(state: &AppState, adapter: &dyn ChannelAdapter, request: &RawRequest, request_id: String) -> Response {
    let now_ms = mu_types::now_ms();
    let result = adapter.ingest(request, now_ms, request_id);

    if let Some(entry) = result.audit_entry.clone() {
        if let Err(e) = state.adapter_audit.record(entry) {
            tracing::error!(error = %e, "failed to append adapter audit entry");
        }
    }

    if let Some(inbound) = result.inbound {
        let pipeline_result = state.pipeline.handle_inbound(&inbound, now_ms);
        enqueue_lifecycle_message(state, &inbound, &pipeline_result, now_ms);
    }

    ack_response(result.response)
}

fn lifecycle_text(result: &CommandPipelineResult) -> String {
    match result {
        CommandPipelineResult::Noop { reason } => format!("no-op: {reason}"),
        CommandPipelineResult::Invalid { reason } => format!("invalid command: {reason}"),
        CommandPipelineResult::OperatorResponse { message } => message.clone(),
        CommandPipelineResult::Denied { reason } => format!("denied: {reason}"),
        CommandPipelineResult::AwaitingConfirmation { command } => {
            format!("confirm {} to proceed", command.command_id)
        }
        CommandPipelineResult::Completed { command } => command
            .result
            .as_ref()
            .and_then(|r| r.summary.clone())
            .unwrap_or_else(|| format!("{} completed", command.command_id)),
        CommandPipelineResult::Cancelled { command } => format!("{} cancelled", command.command_id),
        CommandPipelineResult::Expired { command } => format!("{} expired", command.command_id),
        CommandPipelineResult::Deferred { command } => format!("{} deferred", command.command_id),
        CommandPipelineResult::Failed { command, reason } => format!("{} failed: {reason}", command.command_id),
    }
}

fn enqueue_lifecycle_message(state: &AppState, inbound: &InboundEnvelope, result: &CommandPipelineResult, now_ms: i64) {
    let dedupe_key = match result.command() {
        Some(command) => OutboxRecord::dedupe_key_for_command_result(&command.command_id, result.kind(), command.state.as_str()),
        None => format!("req:{}:{}", inbound.request_id, result.kind()),
    };
    let envelope = OutboundEnvelope {
        channel: inbound.channel,
        channel_conversation_id: inbound.channel_conversation_id.clone(),
        correlation_command_id: result.command().map(|c| c.command_id.clone()),
        text: lifecycle_text(result),
        data: None,
        ts_ms: now_ms,
    };
    if let Err(e) = state.outbox.enqueue(dedupe_key, envelope, now_ms) {
        tracing::error!(error = %e, "failed to enqueue outbound lifecycle message");
    }
}

async fn webhook_slack(State(state): State<Arc<AppState>>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    let request = raw_request(&headers, body);
    let request_id = format!("req-{}", uuid::Uuid::new_v4());
    process_ingress(&state, state.slack.as_ref(), &request, request_id).await
}

async fn webhook_discord(State(state): State<Arc<AppState>>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    let request = raw_request(&headers, body);
    let request_id = format!("req-{}", uuid::Uuid::new_v4());
    process_ingress(&state, state.discord.as_ref(), &request, request_id).await
}

async fn webhook_telegram(State(state): State<Arc<AppState>>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    let request = raw_request(&headers, body);
    let request_id = format!("req-{}", uuid::Uuid::new_v4());
    process_ingress(&state, state.telegram.as_ref(), &request, request_id).await
}

async fn commands_submit(State(state): State<Arc<AppState>>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    let request = raw_request(&headers, body);
    let request_id = format!("req-{}", uuid::Uuid::new_v4());
    process_ingress(&state, state.terminal.as_ref(), &request, request_id).await
}

#[derive(Deserialize)]
struct ReloadRequest {
    reason: String,
}

async fn control_plane_reload(State(state): State<Arc<AppState>>, Json(req): Json<ReloadRequest>) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .reload
        .reload(req.reason, mu_types::now_ms)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "coalesced": result.coalesced,
        "attempt": result.attempt,
    })))
}

#[derive(Serialize)]
struct ChannelCapability {
    channel: Channel,
    route: String,
    ingress_payload: mu_adapters::IngressPayload,
    ack_format: mu_adapters::spec::AckFormat,
    delivery_semantics: &'static str,
    deferred_delivery: bool,
}

async fn control_plane_channels(State(state): State<Arc<AppState>>) -> Json<Vec<ChannelCapability>> {
    let adapters: Vec<&dyn ChannelAdapter> = vec![
        state.slack.as_ref(),
        state.discord.as_ref(),
        state.telegram.as_ref(),
        state.terminal.as_ref(),
    ];
    let capabilities = adapters
        .into_iter()
        .map(|adapter| {
            let spec = adapter.adapter_spec();
            ChannelCapability {
                channel: spec.channel,
                route: spec.route.clone(),
                ingress_payload: spec.ingress_payload,
                ack_format: spec.ack_format,
                delivery_semantics: spec.delivery_semantics(),
                deferred_delivery: spec.deferred_delivery,
            }
        })
        .collect();
    Json(capabilities)
}

#[derive(Deserialize)]
struct LinkRequest {
    binding_id: String,
    operator_id: String,
    channel: Channel,
    channel_tenant_id: String,
    channel_actor_id: String,
    #[serde(default)]
    scopes: BTreeSet<String>,
}

async fn control_plane_identities_link(State(state): State<Arc<AppState>>, Json(req): Json<LinkRequest>) -> Result<impl IntoResponse, ApiError> {
    let binding = state
        .identity_store
        .link(
            mu_store::identity_store::LinkOptions {
                binding_id: BindingId::new(req.binding_id),
                operator_id: OperatorId::new(req.operator_id),
                channel: req.channel,
                channel_tenant_id: req.channel_tenant_id,
                channel_actor_id: req.channel_actor_id,
                scopes: req.scopes,
            },
            mu_types::now_ms(),
        )
        .map_err(ApiError::from)?;
    Ok(Json(binding))
}

#[derive(Deserialize)]
struct TurnRequest {
    channel: Channel,
    channel_tenant_id: String,
}

#[derive(Serialize)]
struct TurnResponse {
    operator_turn_id: String,
    channel: Channel,
}

/// The operator conversational surface is out of scope beyond a stable
/// turn id a caller can correlate against (`NoopOperatorBackend`); this
/// route exists only to hand one out.
async fn control_plane_turn(Json(req): Json<TurnRequest>) -> Json<TurnResponse> {
    let _ = req.channel_tenant_id;
    Json(TurnResponse {
        operator_turn_id: format!("turn-{}", uuid::Uuid::new_v4()),
        channel: req.channel,
    })
}
