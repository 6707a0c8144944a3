//! Load/store `policy.json` (spec.md §4.1, §6; SPEC_FULL.md §10.4/§11
//! "policy hot-reload").

use mu_types::error::MuError;
use mu_types::policy::Policy;
use std::fs;
use std::path::Path;

pub fn load(path: impl AsRef<Path>) -> Result<Policy, MuError> {
    let path = path.as_ref();
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Policy::default()),
        Err(e) => Err(MuError::Io(e)),
    }
}

/// Atomic replace via a same-directory temp file + `rename`, matching
/// `JsonlStore::write` (spec.md §4.2).
pub fn save(path: impl AsRef<Path>, policy: &Policy) -> Result<(), MuError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    let tmp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), nonce));
    fs::write(&tmp_path, serde_json::to_vec_pretty(policy)?)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_policy_file_yields_default() {
        let dir = tempdir().unwrap();
        let policy = load(dir.path().join("policy.json")).unwrap();
        assert_eq!(policy, Policy::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let mut policy = Policy::default();
        policy
            .scopes_by_command
            .insert("issue.create".to_string(), "issues:write".to_string());
        policy.confirmation_required.insert("issue.close".to_string());
        policy.confirm_ttl_ms = 120_000;
        save(&path, &policy).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, policy);
    }
}
