//! Identity binding types (spec.md §3 "IdentityBinding", "IdentityStoreEntry").

use crate::channel::{AssuranceTier, Channel};
use crate::TimestampMs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Macro to generate newtype string ids with common implementations.
///
/// Ids in this system are caller-supplied or adapter-derived stable
/// strings (`"b1"`, `"cmd-abc"`, `slack-idem-<hash>`) rather than opaque
/// UUIDs, so the wrapper is a thin `String` newtype rather than a UUID
/// wrapper.
macro_rules! define_string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_string_id!(BindingId, "Stable identifier for an identity binding");
define_string_id!(OperatorId, "Stable identifier for a control-plane operator identity");

/// Lifecycle status of a binding. Monotone: `Active -> Unlinked|Revoked`,
/// never back (spec.md §3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingStatus {
    Active,
    Unlinked,
    Revoked,
}

/// One row per `(channel, tenant, actor)` principal (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityBinding {
    pub binding_id: BindingId,
    pub operator_id: OperatorId,
    pub channel: Channel,
    pub channel_tenant_id: String,
    pub channel_actor_id: String,
    pub assurance_tier: AssuranceTier,
    pub scopes: BTreeSet<String>,
    pub status: BindingStatus,
    pub linked_at_ms: TimestampMs,
    pub updated_at_ms: TimestampMs,
    pub unlinked_at_ms: Option<TimestampMs>,
    pub revoked_at_ms: Option<TimestampMs>,
    pub revoked_by_binding_id: Option<BindingId>,
    pub revoked_reason: Option<String>,
}

impl IdentityBinding {
    pub fn principal_key(&self) -> (Channel, String, String) {
        (
            self.channel,
            self.channel_tenant_id.clone(),
            self.channel_actor_id.clone(),
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, BindingStatus::Active)
    }
}

/// A replayable append-only journal entry. The journal is the source of
/// truth; `IdentityStore`'s in-memory index is rebuilt by replaying these
/// in order (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentityStoreEntry {
    Link {
        ts_ms: TimestampMs,
        binding_id: BindingId,
        operator_id: OperatorId,
        channel: Channel,
        channel_tenant_id: String,
        channel_actor_id: String,
        assurance_tier: AssuranceTier,
        scopes: BTreeSet<String>,
    },
    Unlink {
        ts_ms: TimestampMs,
        binding_id: BindingId,
        actor_binding_id: BindingId,
        reason: Option<String>,
    },
    Revoke {
        ts_ms: TimestampMs,
        binding_id: BindingId,
        actor_binding_id: BindingId,
        reason: Option<String>,
    },
}

impl IdentityStoreEntry {
    pub fn binding_id(&self) -> &BindingId {
        match self {
            IdentityStoreEntry::Link { binding_id, .. } => binding_id,
            IdentityStoreEntry::Unlink { binding_id, .. } => binding_id,
            IdentityStoreEntry::Revoke { binding_id, .. } => binding_id,
        }
    }

    pub fn ts_ms(&self) -> TimestampMs {
        match self {
            IdentityStoreEntry::Link { ts_ms, .. } => *ts_ms,
            IdentityStoreEntry::Unlink { ts_ms, .. } => *ts_ms,
            IdentityStoreEntry::Revoke { ts_ms, .. } => *ts_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_id_round_trips_as_plain_string() {
        let id = BindingId::new("b1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"b1\"");
        let back: BindingId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
