//! Error types shared across the control plane.
//!
//! All errors are explicit: every failure mode that can cross a crate
//! boundary has its own variant and a stable `error_code()` for the
//! HTTP/CLI error envelope (spec.md §6).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MuError>;

#[derive(Error, Debug)]
pub enum MuError {
    // -- identity / scope ---------------------------------------------
    #[error("binding already exists: {binding_id}")]
    BindingExists { binding_id: String },

    #[error("principal already linked to binding {binding_id}")]
    PrincipalAlreadyLinked { binding_id: String },

    #[error("binding not found: {binding_id}")]
    BindingNotFound { binding_id: String },

    #[error("actor {actor_binding_id} is not the binding owner")]
    InvalidActor { actor_binding_id: String },

    #[error("binding {binding_id} is already inactive")]
    AlreadyInactive { binding_id: String },

    #[error("identity not linked for this principal")]
    IdentityNotLinked,

    #[error("missing required scope: {scope}")]
    MissingScope { scope: String },

    // -- idempotency -----------------------------------------------------
    #[error("idempotency key {key} conflicts with a different fingerprint")]
    IdempotencyConflict { key: String },

    // -- command FSM -------------------------------------------------------
    #[error("invalid transition for command {command_id}: {from} -> {to}")]
    InvalidCommandTransition {
        command_id: String,
        from: String,
        to: String,
    },

    #[error("command not found: {command_id}")]
    CommandNotFound { command_id: String },

    // -- outbox --------------------------------------------------------
    #[error("outbox record not found: {outbox_id}")]
    OutboxNotFound { outbox_id: String },

    // -- execution -----------------------------------------------------
    #[error("failed to spawn CLI invocation: {message}")]
    CliSpawnFailed { message: String },

    #[error("CLI invocation timed out after {timeout_ms}ms")]
    CliTimeout { timeout_ms: i64 },

    #[error("CLI invocation exited non-zero: {code}")]
    CliNonZero { code: i32 },

    // -- writer lock ------------------------------------------------------
    #[error("writer lock busy: held by pid {pid} on host {hostname} since {acquired_at_ms}")]
    WriterLockBusy {
        pid: u32,
        hostname: String,
        acquired_at_ms: i64,
    },

    // -- storage -----------------------------------------------------------
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed journal line at {path}:{line_number}: {raw}")]
    JournalParseError {
        path: String,
        line_number: usize,
        raw: String,
    },

    #[error("unknown identity journal entry kind at replay")]
    UnknownJournalEntryKind,

    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    // -- reload --------------------------------------------------------
    #[error("reload failed during {stage}: {message}")]
    ReloadFailed { stage: String, message: String },

    // -- general -------------------------------------------------------
    #[error("invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl MuError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable reason code for the `{ok:false, error, recovery?}` envelope
    /// (spec.md §6, §7).
    pub fn error_code(&self) -> &'static str {
        match self {
            MuError::BindingExists { .. } => "binding_exists",
            MuError::PrincipalAlreadyLinked { .. } => "principal_already_linked",
            MuError::BindingNotFound { .. } => "not_found",
            MuError::InvalidActor { .. } => "invalid_actor",
            MuError::AlreadyInactive { .. } => "already_inactive",
            MuError::IdentityNotLinked => "identity_not_linked",
            MuError::MissingScope { .. } => "missing_scope",
            MuError::IdempotencyConflict { .. } => "idempotency_conflict",
            MuError::InvalidCommandTransition { .. } => "invalid_transition",
            MuError::CommandNotFound { .. } => "not_found",
            MuError::OutboxNotFound { .. } => "not_found",
            MuError::CliSpawnFailed { .. } => "cli_spawn_failed",
            MuError::CliTimeout { .. } => "cli_timeout",
            MuError::CliNonZero { .. } => "cli_nonzero",
            MuError::WriterLockBusy { .. } => "writer_lock_busy",
            MuError::Io(_) => "io_error",
            MuError::JournalParseError { .. } => "journal_parse_error",
            MuError::UnknownJournalEntryKind => "unknown_journal_entry_kind",
            MuError::Serde(_) => "serde_error",
            MuError::ReloadFailed { .. } => "reload_failed",
            MuError::InvalidInput { .. } => "invalid_input",
            MuError::Internal { .. } => "internal_error",
        }
    }

    /// Whether an executor may retry after this error (spec.md §7).
    pub fn is_retriable(&self) -> bool {
        matches!(self, MuError::Internal { .. } | MuError::CliTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable_strings() {
        let err = MuError::IdentityNotLinked;
        assert_eq!(err.error_code(), "identity_not_linked");
    }
}
