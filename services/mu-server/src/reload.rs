//! Policy hot-reload, wired through the same `ReloadManager` machinery
//! used for any other swap (SPEC_FULL.md §11: "policy.json changes are
//! picked up by the same ReloadManager machinery, treated as a
//! degenerate single-adapter swap").

use mu_reload::Reloader;
use mu_types::policy::Policy;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

pub struct PolicyReloader {
    policy_path: PathBuf,
    shared: Arc<RwLock<Policy>>,
}

impl PolicyReloader {
    pub fn new(policy_path: PathBuf, shared: Arc<RwLock<Policy>>) -> Self {
        Self { policy_path, shared }
    }
}

impl Reloader for PolicyReloader {
    type Handle = Policy;

    fn warmup(&self) -> Result<Self::Handle, String> {
        mu_store::policy_store::load(&self.policy_path).map_err(|e| e.to_string())
    }

    fn cutover(&self, handle: &Self::Handle) -> Result<(), String> {
        *self.shared.write().unwrap() = handle.clone();
        Ok(())
    }

    fn drain(&self, _handle: &Self::Handle) -> Result<(), String> {
        Ok(())
    }
}
