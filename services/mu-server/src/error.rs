//! `{ok:false, error, recovery?}` error envelope (spec.md §6, §7),
//! following `openibank_api::error::ApiError`'s `IntoResponse` pattern.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mu_types::error::MuError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub ok: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<Vec<String>>,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>, recovery: Option<Vec<String>>) -> Self {
        Self {
            ok: false,
            error: error.into(),
            recovery,
            status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

impl From<MuError> for ApiError {
    fn from(err: MuError) -> Self {
        let status = status_for(&err);
        let recovery = recovery_for(&err);
        ApiError::new(status, err.error_code(), recovery)
    }
}

/// HTTP status per error class (spec.md §7's propagation policy: scope
/// and idempotency errors are surfaced but acked 200 at the adapter
/// layer, so this mapping only applies to the control-plane API routes
/// that return the error straight to the caller).
fn status_for(err: &MuError) -> StatusCode {
    match err {
        MuError::BindingNotFound { .. } | MuError::CommandNotFound { .. } | MuError::OutboxNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        MuError::InvalidActor { .. } | MuError::MissingScope { .. } => StatusCode::FORBIDDEN,
        MuError::BindingExists { .. }
        | MuError::PrincipalAlreadyLinked { .. }
        | MuError::AlreadyInactive { .. }
        | MuError::IdempotencyConflict { .. }
        | MuError::InvalidCommandTransition { .. } => StatusCode::CONFLICT,
        MuError::InvalidInput { .. } | MuError::IdentityNotLinked => StatusCode::BAD_REQUEST,
        MuError::WriterLockBusy { .. } => StatusCode::SERVICE_UNAVAILABLE,
        MuError::CliTimeout { .. } | MuError::ReloadFailed { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn recovery_for(err: &MuError) -> Option<Vec<String>> {
    match err {
        MuError::WriterLockBusy { pid, hostname, .. } => Some(vec![format!(
            "another mu-server instance (pid {pid} on {hostname}) already holds the writer lock for this repo"
        )]),
        MuError::MissingScope { scope } => Some(vec![format!("link an identity with the \"{scope}\" scope")]),
        MuError::IdentityNotLinked => Some(vec!["link your channel identity before retrying this command".to_string()]),
        _ => None,
    }
}
