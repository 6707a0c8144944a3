//! The Command Pipeline (spec.md §4.5): `handleInbound(envelope) ->
//! CommandPipelineResult`, the single entry point tying identity
//! resolution, scope checks, idempotency, confirmation gating, and
//! execution dispatch together.

use crate::command_parser::{self, ParsedCommand};
use crate::executor::{CommandExecutor, ExecutorOutcome, OperatorBackend};
use mu_store::idempotency::{IdempotencyIndex, Probe};
use mu_store::{CommandJournal, IdentityStore};
use mu_types::command::{CliInvocationMeta, CommandId, CommandRecord, CommandResult, CommandState, Correlation};
use mu_types::envelope::InboundEnvelope;
use mu_types::error::MuError;
use mu_types::idempotency::IdempotencyEntry;
use mu_types::policy::Policy;
use mu_types::{Channel, TimestampMs};
use std::sync::{Arc, RwLock};

/// The tagged-union pipeline result (spec.md §4.5). One variant per
/// `kind`; callers must match exhaustively.
#[derive(Debug, Clone)]
pub enum CommandPipelineResult {
    Noop { reason: String },
    Invalid { reason: String },
    OperatorResponse { message: String },
    Denied { reason: String },
    AwaitingConfirmation { command: CommandRecord },
    Completed { command: CommandRecord },
    Cancelled { command: CommandRecord },
    Expired { command: CommandRecord },
    Deferred { command: CommandRecord },
    Failed { command: CommandRecord, reason: String },
}

impl CommandPipelineResult {
    /// The `pipeline_result_kind` half of an outbox dedupe key (spec.md
    /// §3 "deterministic function of (command_id, pipeline_result_kind,
    /// state)").
    pub fn kind(&self) -> &'static str {
        match self {
            CommandPipelineResult::Noop { .. } => "noop",
            CommandPipelineResult::Invalid { .. } => "invalid",
            CommandPipelineResult::OperatorResponse { .. } => "operator_response",
            CommandPipelineResult::Denied { .. } => "denied",
            CommandPipelineResult::AwaitingConfirmation { .. } => "awaiting_confirmation",
            CommandPipelineResult::Completed { .. } => "completed",
            CommandPipelineResult::Cancelled { .. } => "cancelled",
            CommandPipelineResult::Expired { .. } => "expired",
            CommandPipelineResult::Deferred { .. } => "deferred",
            CommandPipelineResult::Failed { .. } => "failed",
        }
    }

    pub fn command(&self) -> Option<&CommandRecord> {
        match self {
            CommandPipelineResult::AwaitingConfirmation { command }
            | CommandPipelineResult::Completed { command }
            | CommandPipelineResult::Cancelled { command }
            | CommandPipelineResult::Expired { command }
            | CommandPipelineResult::Deferred { command }
            | CommandPipelineResult::Failed { command, .. } => Some(command),
            _ => None,
        }
    }
}

fn result_for_terminal(record: CommandRecord) -> CommandPipelineResult {
    match record.state {
        CommandState::Completed => CommandPipelineResult::Completed { command: record },
        CommandState::Cancelled => CommandPipelineResult::Cancelled { command: record },
        CommandState::Expired => CommandPipelineResult::Expired { command: record },
        CommandState::Failed | CommandState::DeadLetter => {
            let reason = record.error_code.clone().unwrap_or_else(|| "failed".to_string());
            CommandPipelineResult::Failed { command: record, reason }
        }
        non_terminal => CommandPipelineResult::Noop {
            reason: format!("duplicate_delivery_in_state_{}", non_terminal.as_str()),
        },
    }
}

pub struct CommandPipeline {
    identity_store: Arc<IdentityStore>,
    idempotency: Arc<IdempotencyIndex>,
    commands: Arc<CommandJournal>,
    policy: Arc<RwLock<Policy>>,
    executor: Arc<dyn CommandExecutor>,
    operator: Arc<dyn OperatorBackend>,
}

impl CommandPipeline {
    pub fn new(
        identity_store: Arc<IdentityStore>,
        idempotency: Arc<IdempotencyIndex>,
        commands: Arc<CommandJournal>,
        policy: Arc<RwLock<Policy>>,
        executor: Arc<dyn CommandExecutor>,
        operator: Arc<dyn OperatorBackend>,
    ) -> Self {
        Self {
            identity_store,
            idempotency,
            commands,
            policy,
            executor,
            operator,
        }
    }

    fn policy(&self) -> Policy {
        self.policy.read().unwrap().clone()
    }

    /// `handleInbound` (spec.md §4.5).
    pub fn handle_inbound(&self, envelope: &InboundEnvelope, now_ms: TimestampMs) -> CommandPipelineResult {
        match command_parser::parse(&envelope.command_text) {
            ParsedCommand::Empty => CommandPipelineResult::Noop {
                reason: "empty_input".to_string(),
            },
            ParsedCommand::NotCommand => {
                if envelope.channel == Channel::Telegram {
                    CommandPipelineResult::OperatorResponse {
                        message: self.operator.respond(envelope),
                    }
                } else {
                    CommandPipelineResult::Noop {
                        reason: "not_command".to_string(),
                    }
                }
            }
            ParsedCommand::Confirm { command_id } => self.handle_confirm(envelope, &command_id, now_ms),
            ParsedCommand::Cancel { command_id } => self.handle_cancel(envelope, &command_id, now_ms),
            ParsedCommand::Verb { kind, args } => self.handle_verb(envelope, &kind, &args, now_ms),
        }
    }

    fn resolve_identity(&self, envelope: &InboundEnvelope, kind: &str) -> Result<Option<mu_types::identity::IdentityBinding>, CommandPipelineResult> {
        let binding = self.identity_store.resolve_active(
            envelope.channel,
            &envelope.channel_tenant_id,
            &envelope.channel_actor_id,
        );
        if binding.is_none() && self.policy().requires_identity(kind) {
            return Err(CommandPipelineResult::Denied {
                reason: "identity_not_linked".to_string(),
            });
        }
        Ok(binding)
    }

    fn handle_verb(
        &self,
        envelope: &InboundEnvelope,
        kind: &str,
        args: &[String],
        now_ms: TimestampMs,
    ) -> CommandPipelineResult {
        let binding = match self.resolve_identity(envelope, kind) {
            Ok(b) => b,
            Err(denied) => return denied,
        };

        let policy = self.policy();
        if let Some(required) = policy.required_scope(kind) {
            let has_scope = binding.as_ref().is_some_and(|b| b.scopes.contains(required));
            if !has_scope {
                return CommandPipelineResult::Denied {
                    reason: "missing_scope".to_string(),
                };
            }
        }

        match self.idempotency.probe(&envelope.idempotency_key, &envelope.fingerprint) {
            Probe::Conflict(_) => {
                return CommandPipelineResult::Denied {
                    reason: "idempotency_conflict".to_string(),
                };
            }
            Probe::Match(existing) => {
                let command_id = CommandId::new(existing.command_id.clone());
                if let Some(record) = self.commands.get(&command_id) {
                    if record.state.is_terminal() {
                        return result_for_terminal(record);
                    }
                }
                return CommandPipelineResult::Noop {
                    reason: "duplicate_delivery".to_string(),
                };
            }
            Probe::Fresh => {}
        }

        let actor_binding_id = binding
            .as_ref()
            .map(|b| b.binding_id.clone())
            .unwrap_or_else(|| mu_types::identity::BindingId::new("unlinked"));

        let record = CommandRecord {
            command_id: CommandId::generate(),
            correlation: Correlation {
                channel: envelope.channel,
                channel_tenant_id: envelope.channel_tenant_id.clone(),
                channel_conversation_id: envelope.channel_conversation_id.clone(),
                request_id: envelope.request_id.clone(),
                actor_binding_id,
            },
            state: CommandState::Accepted,
            command_text: envelope.command_text.clone(),
            idempotency_key: envelope.idempotency_key.clone(),
            fingerprint: envelope.fingerprint.clone(),
            target_type: envelope.target.target_type.clone(),
            target_id: envelope.target.target_id.clone(),
            attempt: 0,
            confirmation_expires_at_ms: None,
            retry_at_ms: None,
            error_code: None,
            operator_session_id: None,
            operator_turn_id: None,
            cli_invocation: None,
            result: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };

        if let Err(e) = self.commands.insert(record.clone(), now_ms) {
            tracing::error!(error = %e, "failed to insert command record");
            return CommandPipelineResult::Invalid {
                reason: "internal_error".to_string(),
            };
        }
        if let Err(e) = self.idempotency.record(IdempotencyEntry {
            idempotency_key: envelope.idempotency_key.clone(),
            channel: envelope.channel,
            channel_tenant_id: envelope.channel_tenant_id.clone(),
            channel_conversation_id: envelope.channel_conversation_id.clone(),
            fingerprint: envelope.fingerprint.clone(),
            command_id: record.command_id.to_string(),
            created_at_ms: now_ms,
            state: CommandState::Accepted,
        }) {
            tracing::error!(error = %e, "failed to record idempotency entry");
        }

        if policy.requires_confirmation(kind) {
            return self.enter_confirmation(&record.command_id, &policy, now_ms);
        }

        self.queue_and_dispatch(&record.command_id, kind, args, envelope, now_ms)
    }

    fn enter_confirmation(&self, command_id: &CommandId, policy: &Policy, now_ms: TimestampMs) -> CommandPipelineResult {
        let expires_at = now_ms + policy.confirm_ttl_ms;
        match self.commands.transition_with(command_id, CommandState::AwaitingConfirmation, now_ms, |r| {
            r.confirmation_expires_at_ms = Some(expires_at);
        }) {
            Ok(command) => {
                self.touch_idempotency(&command);
                CommandPipelineResult::AwaitingConfirmation { command }
            }
            Err(e) => self.fsm_error(command_id, e),
        }
    }

    fn handle_confirm(&self, envelope: &InboundEnvelope, command_id: &str, now_ms: TimestampMs) -> CommandPipelineResult {
        let command_id = CommandId::new(command_id);
        let record = match self.commands.get(&command_id) {
            Some(r) => r,
            None => {
                return CommandPipelineResult::Denied {
                    reason: "command_not_found".to_string(),
                }
            }
        };
        if !self.same_actor(&record, envelope) {
            return CommandPipelineResult::Denied {
                reason: "invalid_actor".to_string(),
            };
        }
        match self.commands.transition(&command_id, CommandState::Queued, now_ms) {
            Ok(_) => self.dispatch_queued(&command_id, &record.command_text, now_ms),
            Err(e) => self.fsm_error(&command_id, e),
        }
    }

    fn handle_cancel(&self, envelope: &InboundEnvelope, command_id: &str, now_ms: TimestampMs) -> CommandPipelineResult {
        let command_id = CommandId::new(command_id);
        let record = match self.commands.get(&command_id) {
            Some(r) => r,
            None => {
                return CommandPipelineResult::Denied {
                    reason: "command_not_found".to_string(),
                }
            }
        };
        if !self.same_actor(&record, envelope) {
            return CommandPipelineResult::Denied {
                reason: "invalid_actor".to_string(),
            };
        }
        match self.commands.transition(&command_id, CommandState::Cancelled, now_ms) {
            Ok(command) => {
                self.touch_idempotency(&command);
                CommandPipelineResult::Cancelled { command }
            }
            Err(e) => self.fsm_error(&command_id, e),
        }
    }

    fn same_actor(&self, record: &CommandRecord, envelope: &InboundEnvelope) -> bool {
        match self.identity_store.resolve_active(
            envelope.channel,
            &envelope.channel_tenant_id,
            &envelope.channel_actor_id,
        ) {
            Some(binding) => binding.binding_id == record.correlation.actor_binding_id,
            None => false,
        }
    }

    fn queue_and_dispatch(
        &self,
        command_id: &CommandId,
        kind: &str,
        args: &[String],
        envelope: &InboundEnvelope,
        now_ms: TimestampMs,
    ) -> CommandPipelineResult {
        match self.commands.transition(command_id, CommandState::Queued, now_ms) {
            Ok(_) => self.dispatch(command_id, kind, args, envelope, now_ms),
            Err(e) => self.fsm_error(command_id, e),
        }
    }

    /// Re-parses the command text for a confirmed command so the
    /// executor sees the same verb/args it would have on first ingress.
    fn dispatch_queued(&self, command_id: &CommandId, command_text: &str, now_ms: TimestampMs) -> CommandPipelineResult {
        let envelope_stub = InboundEnvelope {
            version: 1,
            received_at_ms: now_ms,
            request_id: String::new(),
            delivery_id: String::new(),
            channel: Channel::Terminal,
            channel_tenant_id: String::new(),
            channel_conversation_id: String::new(),
            channel_actor_id: String::new(),
            actor_id: String::new(),
            actor_binding_id: None,
            assurance_tier: mu_types::AssuranceTier::TierC,
            repo_root: String::new(),
            command_text: command_text.to_string(),
            required_scope: None,
            effective_scope: Vec::new(),
            target: mu_types::envelope::CommandTarget::default(),
            idempotency_key: String::new(),
            fingerprint: String::new(),
            attachments: Vec::new(),
            metadata: Default::default(),
        };
        match command_parser::parse(command_text) {
            ParsedCommand::Verb { kind, args } => self.dispatch(command_id, &kind, &args, &envelope_stub, now_ms),
            _ => self.dispatch(command_id, "status", &[], &envelope_stub, now_ms),
        }
    }

    fn dispatch(
        &self,
        command_id: &CommandId,
        kind: &str,
        args: &[String],
        envelope: &InboundEnvelope,
        now_ms: TimestampMs,
    ) -> CommandPipelineResult {
        if let Err(e) = self.commands.transition(command_id, CommandState::InProgress, now_ms) {
            return self.fsm_error(command_id, e);
        }

        match self.executor.execute(kind, args, envelope) {
            ExecutorOutcome::Completed(result) => {
                match self.commands.transition_with(command_id, CommandState::Completed, now_ms, |r| {
                    r.result = Some(result);
                }) {
                    Ok(command) => {
                        self.touch_idempotency(&command);
                        CommandPipelineResult::Completed { command }
                    }
                    Err(e) => self.fsm_error(command_id, e),
                }
            }
            ExecutorOutcome::Failed { error_code } => {
                match self.commands.transition_with(command_id, CommandState::Failed, now_ms, |r| {
                    r.error_code = Some(error_code.clone());
                }) {
                    Ok(command) => {
                        self.touch_idempotency(&command);
                        CommandPipelineResult::Failed {
                            command,
                            reason: error_code,
                        }
                    }
                    Err(e) => self.fsm_error(command_id, e),
                }
            }
            ExecutorOutcome::Deferred { retry_at_ms } => {
                match self.commands.transition_with(command_id, CommandState::Deferred, now_ms, |r| {
                    r.retry_at_ms = Some(retry_at_ms);
                }) {
                    Ok(command) => {
                        self.touch_idempotency(&command);
                        CommandPipelineResult::Deferred { command }
                    }
                    Err(e) => self.fsm_error(command_id, e),
                }
            }
        }
    }

    /// Resume a `deferred` command once its `retry_at_ms` has passed.
    /// The `attempt` counter increments here - on `deferred -> queued`,
    /// never on the initial `queued -> in_progress` (SPEC_FULL.md open
    /// question decision).
    pub fn retry_deferred(&self, command_id: &CommandId, now_ms: TimestampMs) -> CommandPipelineResult {
        let record = match self.commands.get(command_id) {
            Some(r) => r,
            None => {
                return CommandPipelineResult::Denied {
                    reason: "command_not_found".to_string(),
                }
            }
        };
        match self.commands.transition_with(command_id, CommandState::Queued, now_ms, |r| {
            r.attempt += 1;
        }) {
            Ok(_) => self.dispatch_queued(command_id, &record.command_text, now_ms),
            Err(e) => self.fsm_error(command_id, e),
        }
    }

    /// Mark an overdue `awaiting_confirmation` command `expired`
    /// (spec.md §4.5 step 5, SPEC_FULL.md §11 confirmation sweeper).
    pub fn expire(&self, command_id: &CommandId, now_ms: TimestampMs) -> Result<CommandRecord, MuError> {
        self.commands.transition(command_id, CommandState::Expired, now_ms)
    }

    fn touch_idempotency(&self, command: &CommandRecord) {
        if let Err(e) = self.idempotency.update_state(&command.idempotency_key, command.state) {
            tracing::warn!(error = %e, command_id = %command.command_id, "failed to update idempotency state");
        }
    }

    fn fsm_error(&self, command_id: &CommandId, e: MuError) -> CommandPipelineResult {
        tracing::error!(error = %e, command_id = %command_id, "invalid command transition");
        match self.commands.get(command_id) {
            Some(command) => CommandPipelineResult::Failed {
                command,
                reason: "invalid_transition".to_string(),
            },
            None => CommandPipelineResult::Invalid {
                reason: "invalid_transition".to_string(),
            },
        }
    }
}

/// CLI invocation metadata builder used by executors that dispatch a
/// subprocess (spec.md §3, §5).
pub fn cli_invocation(program: impl Into<String>, args: Vec<String>, timeout_ms: i64) -> CliInvocationMeta {
    CliInvocationMeta {
        program: program.into(),
        args,
        timeout_ms,
    }
}
