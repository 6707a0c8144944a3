//! IdentityStore: append-only binding journal + in-memory index
//! (spec.md §4.3).

use crate::jsonl::JsonlStore;
use mu_types::channel::Channel;
use mu_types::error::MuError;
use mu_types::identity::{BindingId, BindingStatus, IdentityBinding, IdentityStoreEntry, OperatorId};
use std::collections::BTreeMap;
use std::sync::RwLock;

type Principal = (Channel, String, String);

struct Index {
    by_binding_id: BTreeMap<BindingId, IdentityBinding>,
    active_by_principal: BTreeMap<Principal, BindingId>,
}

impl Index {
    fn empty() -> Self {
        Self {
            by_binding_id: BTreeMap::new(),
            active_by_principal: BTreeMap::new(),
        }
    }

    /// Re-derive state by replaying entries in journal order, rejecting
    /// unknown entry kinds or references (spec.md §4.3 "Replay must
    /// reject...").
    fn replay(entries: &[IdentityStoreEntry]) -> Result<Self, MuError> {
        let mut index = Index::empty();
        for entry in entries {
            match entry {
                IdentityStoreEntry::Link {
                    ts_ms,
                    binding_id,
                    operator_id,
                    channel,
                    channel_tenant_id,
                    channel_actor_id,
                    assurance_tier,
                    scopes,
                } => {
                    // tierForChannel invariant re-asserted during load.
                    debug_assert_eq!(*assurance_tier, channel.assurance_tier());
                    let binding = IdentityBinding {
                        binding_id: binding_id.clone(),
                        operator_id: operator_id.clone(),
                        channel: *channel,
                        channel_tenant_id: channel_tenant_id.clone(),
                        channel_actor_id: channel_actor_id.clone(),
                        assurance_tier: channel.assurance_tier(),
                        scopes: scopes.clone(),
                        status: BindingStatus::Active,
                        linked_at_ms: *ts_ms,
                        updated_at_ms: *ts_ms,
                        unlinked_at_ms: None,
                        revoked_at_ms: None,
                        revoked_by_binding_id: None,
                        revoked_reason: None,
                    };
                    let key = binding.principal_key();
                    index.active_by_principal.insert(key, binding_id.clone());
                    index.by_binding_id.insert(binding_id.clone(), binding);
                }
                IdentityStoreEntry::Unlink {
                    ts_ms,
                    binding_id,
                    reason,
                    ..
                } => {
                    let binding = index
                        .by_binding_id
                        .get_mut(binding_id)
                        .ok_or(MuError::UnknownJournalEntryKind)?;
                    binding.status = BindingStatus::Unlinked;
                    binding.unlinked_at_ms = Some(*ts_ms);
                    binding.updated_at_ms = *ts_ms;
                    binding.revoked_reason = reason.clone();
                    index.active_by_principal.remove(&binding.principal_key());
                }
                IdentityStoreEntry::Revoke {
                    ts_ms,
                    binding_id,
                    actor_binding_id,
                    reason,
                } => {
                    let binding = index
                        .by_binding_id
                        .get_mut(binding_id)
                        .ok_or(MuError::UnknownJournalEntryKind)?;
                    binding.status = BindingStatus::Revoked;
                    binding.revoked_at_ms = Some(*ts_ms);
                    binding.updated_at_ms = *ts_ms;
                    binding.revoked_by_binding_id = Some(actor_binding_id.clone());
                    binding.revoked_reason = reason.clone();
                    index.active_by_principal.remove(&binding.principal_key());
                }
            }
        }
        Ok(index)
    }
}

/// Options for [`IdentityStore::link`].
pub struct LinkOptions {
    pub binding_id: BindingId,
    pub operator_id: OperatorId,
    pub channel: Channel,
    pub channel_tenant_id: String,
    pub channel_actor_id: String,
    pub scopes: std::collections::BTreeSet<String>,
}

/// The durable identity binding store (spec.md §4.3).
pub struct IdentityStore {
    journal: JsonlStore,
    append_lock: std::sync::Mutex<()>,
    index: RwLock<Index>,
}

impl IdentityStore {
    /// Load by replaying the journal (spec.md §4.3).
    pub fn open(journal_path: impl Into<std::path::PathBuf>) -> Result<Self, MuError> {
        let journal = JsonlStore::new(journal_path);
        let entries: Vec<IdentityStoreEntry> = journal.stream()?;
        let index = Index::replay(&entries)?;
        Ok(Self {
            journal,
            append_lock: std::sync::Mutex::new(()),
            index: RwLock::new(index),
        })
    }

    pub fn link(&self, opts: LinkOptions, now_ms: i64) -> Result<IdentityBinding, MuError> {
        let _guard = self.append_lock.lock().unwrap();
        {
            let index = self.index.read().unwrap();
            if index.by_binding_id.contains_key(&opts.binding_id) {
                return Err(MuError::BindingExists {
                    binding_id: opts.binding_id.to_string(),
                });
            }
            let principal = (
                opts.channel,
                opts.channel_tenant_id.clone(),
                opts.channel_actor_id.clone(),
            );
            if index.active_by_principal.contains_key(&principal) {
                let existing_id = index.active_by_principal.get(&principal).unwrap();
                return Err(MuError::PrincipalAlreadyLinked {
                    binding_id: existing_id.to_string(),
                });
            }
        }

        let assurance_tier = opts.channel.assurance_tier();
        let entry = IdentityStoreEntry::Link {
            ts_ms: now_ms,
            binding_id: opts.binding_id.clone(),
            operator_id: opts.operator_id.clone(),
            channel: opts.channel,
            channel_tenant_id: opts.channel_tenant_id.clone(),
            channel_actor_id: opts.channel_actor_id.clone(),
            assurance_tier,
            scopes: opts.scopes.clone(),
        };
        self.journal.append(&entry)?;

        let binding = IdentityBinding {
            binding_id: opts.binding_id.clone(),
            operator_id: opts.operator_id,
            channel: opts.channel,
            channel_tenant_id: opts.channel_tenant_id,
            channel_actor_id: opts.channel_actor_id,
            assurance_tier,
            scopes: opts.scopes,
            status: BindingStatus::Active,
            linked_at_ms: now_ms,
            updated_at_ms: now_ms,
            unlinked_at_ms: None,
            revoked_at_ms: None,
            revoked_by_binding_id: None,
            revoked_reason: None,
        };
        let mut index = self.index.write().unwrap();
        index
            .active_by_principal
            .insert(binding.principal_key(), binding.binding_id.clone());
        index
            .by_binding_id
            .insert(binding.binding_id.clone(), binding.clone());
        Ok(binding)
    }

    pub fn unlink_self(
        &self,
        binding_id: &BindingId,
        actor_binding_id: &BindingId,
        reason: Option<String>,
        now_ms: i64,
    ) -> Result<IdentityBinding, MuError> {
        let _guard = self.append_lock.lock().unwrap();
        {
            let index = self.index.read().unwrap();
            let binding = index
                .by_binding_id
                .get(binding_id)
                .ok_or_else(|| MuError::BindingNotFound {
                    binding_id: binding_id.to_string(),
                })?;
            if binding_id != actor_binding_id {
                return Err(MuError::InvalidActor {
                    actor_binding_id: actor_binding_id.to_string(),
                });
            }
            if !binding.is_active() {
                return Err(MuError::AlreadyInactive {
                    binding_id: binding_id.to_string(),
                });
            }
        }

        let entry = IdentityStoreEntry::Unlink {
            ts_ms: now_ms,
            binding_id: binding_id.clone(),
            actor_binding_id: actor_binding_id.clone(),
            reason,
        };
        self.journal.append(&entry)?;

        let mut index = self.index.write().unwrap();
        let binding = index.by_binding_id.get_mut(binding_id).unwrap();
        binding.status = BindingStatus::Unlinked;
        binding.unlinked_at_ms = Some(now_ms);
        binding.updated_at_ms = now_ms;
        let principal_key = binding.principal_key();
        let result = binding.clone();
        index.active_by_principal.remove(&principal_key);
        Ok(result)
    }

    pub fn revoke(
        &self,
        binding_id: &BindingId,
        actor_binding_id: &BindingId,
        reason: Option<String>,
        now_ms: i64,
    ) -> Result<IdentityBinding, MuError> {
        let _guard = self.append_lock.lock().unwrap();
        {
            let index = self.index.read().unwrap();
            let binding = index
                .by_binding_id
                .get(binding_id)
                .ok_or_else(|| MuError::BindingNotFound {
                    binding_id: binding_id.to_string(),
                })?;
            if !binding.is_active() {
                return Err(MuError::AlreadyInactive {
                    binding_id: binding_id.to_string(),
                });
            }
        }

        let entry = IdentityStoreEntry::Revoke {
            ts_ms: now_ms,
            binding_id: binding_id.clone(),
            actor_binding_id: actor_binding_id.clone(),
            reason,
        };
        self.journal.append(&entry)?;

        let mut index = self.index.write().unwrap();
        let binding = index.by_binding_id.get_mut(binding_id).unwrap();
        binding.status = BindingStatus::Revoked;
        binding.revoked_at_ms = Some(now_ms);
        binding.updated_at_ms = now_ms;
        binding.revoked_by_binding_id = Some(actor_binding_id.clone());
        let principal_key = binding.principal_key();
        let result = binding.clone();
        index.active_by_principal.remove(&principal_key);
        Ok(result)
    }

    /// O(1) lookup; `None` if no active binding (spec.md §4.3).
    pub fn resolve_active(
        &self,
        channel: Channel,
        tenant: &str,
        actor: &str,
    ) -> Option<IdentityBinding> {
        let index = self.index.read().unwrap();
        let key = (channel, tenant.to_string(), actor.to_string());
        let binding_id = index.active_by_principal.get(&key)?;
        index.by_binding_id.get(binding_id).cloned()
    }

    pub fn get(&self, binding_id: &BindingId) -> Option<IdentityBinding> {
        self.index.read().unwrap().by_binding_id.get(binding_id).cloned()
    }

    /// Sorted deterministically by `(linked_at_ms, binding_id)`
    /// (spec.md §4.3).
    pub fn list_bindings(&self, include_inactive: bool) -> Vec<IdentityBinding> {
        let index = self.index.read().unwrap();
        let mut bindings: Vec<IdentityBinding> = index
            .by_binding_id
            .values()
            .filter(|b| include_inactive || b.is_active())
            .cloned()
            .collect();
        bindings.sort_by(|a, b| {
            a.linked_at_ms
                .cmp(&b.linked_at_ms)
                .then_with(|| a.binding_id.cmp(&b.binding_id))
        });
        bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn opts(binding_id: &str, actor: &str) -> LinkOptions {
        LinkOptions {
            binding_id: BindingId::new(binding_id),
            operator_id: OperatorId::new("op-1"),
            channel: Channel::Slack,
            channel_tenant_id: "T".to_string(),
            channel_actor_id: actor.to_string(),
            scopes: BTreeSet::from(["issues:read".to_string()]),
        }
    }

    #[test]
    fn second_link_for_same_principal_is_rejected() {
        let dir = tempdir().unwrap();
        let store = IdentityStore::open(dir.path().join("identities.jsonl")).unwrap();
        let first = store.link(opts("b1", "U"), 1000).unwrap();
        assert_eq!(first.binding_id, BindingId::new("b1"));

        let second = store.link(opts("b2", "U"), 2000);
        match second {
            Err(MuError::PrincipalAlreadyLinked { binding_id }) => {
                assert_eq!(binding_id, "b1");
            }
            other => panic!("expected PrincipalAlreadyLinked, got {other:?}"),
        }
    }

    #[test]
    fn unlink_self_requires_matching_actor() {
        let dir = tempdir().unwrap();
        let store = IdentityStore::open(dir.path().join("identities.jsonl")).unwrap();
        store.link(opts("b1", "U"), 1000).unwrap();
        let wrong_actor = store.unlink_self(&BindingId::new("b1"), &BindingId::new("b2"), None, 2000);
        assert!(matches!(wrong_actor, Err(MuError::InvalidActor { .. })));

        let ok = store.unlink_self(&BindingId::new("b1"), &BindingId::new("b1"), None, 2000);
        assert!(ok.is_ok());
        assert!(store
            .resolve_active(Channel::Slack, "T", "U")
            .is_none());
    }

    #[test]
    fn replay_twice_yields_byte_identical_listing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identities.jsonl");
        {
            let store = IdentityStore::open(&path).unwrap();
            store.link(opts("b1", "U1"), 1000).unwrap();
            store.link(opts("b2", "U2"), 2000).unwrap();
            store
                .revoke(&BindingId::new("b1"), &BindingId::new("b2"), None, 3000)
                .unwrap();
        }
        let reopened_a = IdentityStore::open(&path).unwrap();
        let reopened_b = IdentityStore::open(&path).unwrap();
        let a = serde_json::to_string(&reopened_a.list_bindings(true)).unwrap();
        let b = serde_json::to_string(&reopened_b.list_bindings(true)).unwrap();
        assert_eq!(a, b);
    }
}
