//! Confirmation-expiry sweeper (SPEC_FULL.md §11): a pure helper that
//! scans a snapshot of commands and picks the ones overdue for
//! expiration (spec.md §4.5 step 5 "a scheduler sweep marks overdue
//! confirmations `expired`"). The actual FSM transition goes through
//! [`crate::pipeline::CommandPipeline::expire`]; this module only
//! decides *which* commands qualify, so the policy is independently
//! testable.

use mu_types::command::{CommandRecord, CommandState};
use mu_types::TimestampMs;

/// Commands in `awaiting_confirmation` whose `confirmation_expires_at_ms`
/// has passed, ordered by expiry then `command_id` for deterministic
/// sweep order.
pub fn overdue_confirmations(commands: &[CommandRecord], now_ms: TimestampMs) -> Vec<&CommandRecord> {
    let mut overdue: Vec<&CommandRecord> = commands
        .iter()
        .filter(|c| c.state == CommandState::AwaitingConfirmation)
        .filter(|c| c.confirmation_expires_at_ms.is_some_and(|expiry| expiry <= now_ms))
        .collect();
    overdue.sort_by(|a, b| {
        a.confirmation_expires_at_ms
            .cmp(&b.confirmation_expires_at_ms)
            .then_with(|| a.command_id.cmp(&b.command_id))
    });
    overdue
}

#[cfg(test)]
mod tests {
    use super::*;
    use mu_types::command::Correlation;
    use mu_types::identity::BindingId;
    use mu_types::Channel;

    fn record(id: &str, state: CommandState, expires_at: Option<TimestampMs>) -> CommandRecord {
        CommandRecord {
            command_id: mu_types::command::CommandId::new(id),
            correlation: Correlation {
                channel: Channel::Slack,
                channel_tenant_id: "T".to_string(),
                channel_conversation_id: "C".to_string(),
                request_id: "r".to_string(),
                actor_binding_id: BindingId::new("b1"),
            },
            state,
            command_text: "/mu close x".to_string(),
            idempotency_key: "k".to_string(),
            fingerprint: "fp".to_string(),
            target_type: None,
            target_id: None,
            attempt: 0,
            confirmation_expires_at_ms: expires_at,
            retry_at_ms: None,
            error_code: None,
            operator_session_id: None,
            operator_turn_id: None,
            cli_invocation: None,
            result: None,
            created_at_ms: 0,
            updated_at_ms: 0,
        }
    }

    #[test]
    fn only_overdue_awaiting_confirmation_commands_are_selected() {
        let commands = vec![
            record("a", CommandState::AwaitingConfirmation, Some(1000)),
            record("b", CommandState::AwaitingConfirmation, Some(5000)),
            record("c", CommandState::Queued, Some(500)),
        ];
        let overdue = overdue_confirmations(&commands, 2000);
        let ids: Vec<&str> = overdue.iter().map(|c| c.command_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }
}
