//! Parses a normalized `"/mu …"` command string into a verb and its
//! arguments (spec.md §4.4, §4.5 step 1/6). Adapters own turning
//! channel-specific payloads into this normalized form; this module only
//! tokenizes what the pipeline receives.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    /// `/mu confirm <command_id>`.
    Confirm { command_id: String },
    /// `/mu cancel <command_id>`.
    Cancel { command_id: String },
    /// Any other recognized verb, e.g. `issue.ready`, `issue.create`.
    Verb { kind: String, args: Vec<String> },
    /// Empty input (spec.md §4.5 step 1).
    Empty,
    /// Non-empty text that does not start with `/mu`.
    NotCommand,
}

/// The fixed set of issue DAG mutator verbs dispatched synchronously
/// (spec.md §4.5 step 6).
pub const ISSUE_VERBS: &[&str] = &[
    "ready", "get", "create", "update", "claim", "close", "dep", "undep", "validate",
];

pub fn parse(command_text: &str) -> ParsedCommand {
    let trimmed = command_text.trim();
    if trimmed.is_empty() {
        return ParsedCommand::Empty;
    }
    if !trimmed.starts_with("/mu") {
        return ParsedCommand::NotCommand;
    }
    let rest = trimmed[3..].trim();
    let mut tokens = rest.split_whitespace();
    let verb = match tokens.next() {
        Some(v) => v,
        None => return ParsedCommand::Verb {
            kind: "status".to_string(),
            args: Vec::new(),
        },
    };
    let args: Vec<String> = tokens.map(str::to_string).collect();
    match verb {
        "confirm" => ParsedCommand::Confirm {
            command_id: args.first().cloned().unwrap_or_default(),
        },
        "cancel" => ParsedCommand::Cancel {
            command_id: args.first().cloned().unwrap_or_default(),
        },
        other => {
            let kind = if ISSUE_VERBS.contains(&other) {
                format!("issue.{other}")
            } else {
                other.to_string()
            };
            ParsedCommand::Verb { kind, args }
        }
    }
}
