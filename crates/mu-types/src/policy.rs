//! Command policy: `command_kind -> required_scope` map and the
//! confirmation-required list (spec.md §4.4, §4.5 step 3/5; SPEC_FULL.md
//! §10.4 "`policy.json` ... loaded from disk at startup ... is
//! hot-reloadable").

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Policy {
    pub scopes_by_command: BTreeMap<String, String>,
    pub confirmation_required: BTreeSet<String>,
    /// Commands that skip identity resolution (spec.md §4.5 step 2: "if
    /// none and the command requires a linked identity"). Empty by
    /// default - everything requires a linked identity.
    pub identity_optional: BTreeSet<String>,
    pub confirm_ttl_ms: i64,
}

impl Policy {
    /// Scope required for `command_kind`, if the policy names one
    /// (spec.md §4.5 step 3).
    pub fn required_scope(&self, command_kind: &str) -> Option<&str> {
        self.scopes_by_command.get(command_kind).map(String::as_str)
    }

    /// Whether `command_kind` must pass through `awaiting_confirmation`
    /// (spec.md §4.5 step 5).
    pub fn requires_confirmation(&self, command_kind: &str) -> bool {
        self.confirmation_required.contains(command_kind)
    }

    /// Whether `command_kind` requires a resolved identity binding
    /// before it may proceed (spec.md §4.5 step 2).
    pub fn requires_identity(&self, command_kind: &str) -> bool {
        !self.identity_optional.contains(command_kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_requires_no_scope_and_no_confirmation() {
        let policy = Policy::default();
        assert_eq!(policy.required_scope("issue.ready"), None);
        assert!(!policy.requires_confirmation("issue.ready"));
    }
}
