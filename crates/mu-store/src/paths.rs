//! Paths & Writer Lock: repo-scoped path resolution (spec.md §4.1, §6).

use std::path::{Path, PathBuf};

/// Fixed, repo-scoped paths under `<repo_root>/.mu/control-plane/`.
#[derive(Debug, Clone)]
pub struct ControlPlanePaths {
    pub repo_root: PathBuf,
    pub control_plane_dir: PathBuf,
    pub commands_jsonl: PathBuf,
    pub idempotency_jsonl: PathBuf,
    pub identities_jsonl: PathBuf,
    pub policy_json: PathBuf,
    pub outbox_jsonl: PathBuf,
    pub adapter_audit_jsonl: PathBuf,
    pub writer_lock: PathBuf,
    pub server_json: PathBuf,
}

impl ControlPlanePaths {
    /// Derive the fixed path set for a given `repo_root` (spec.md §4.1).
    pub fn new(repo_root: impl AsRef<Path>) -> Self {
        let repo_root = repo_root.as_ref().to_path_buf();
        let control_plane_dir = repo_root.join(".mu").join("control-plane");
        Self {
            commands_jsonl: control_plane_dir.join("commands.jsonl"),
            idempotency_jsonl: control_plane_dir.join("idempotency.jsonl"),
            identities_jsonl: control_plane_dir.join("identities.jsonl"),
            policy_json: control_plane_dir.join("policy.json"),
            outbox_jsonl: control_plane_dir.join("outbox.jsonl"),
            adapter_audit_jsonl: control_plane_dir.join("adapter_audit.jsonl"),
            writer_lock: control_plane_dir.join("writer.lock"),
            server_json: control_plane_dir.join("server.json"),
            control_plane_dir,
            repo_root,
        }
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.control_plane_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_scoped_under_dot_mu() {
        let paths = ControlPlanePaths::new("/tmp/example-repo");
        assert_eq!(
            paths.commands_jsonl,
            PathBuf::from("/tmp/example-repo/.mu/control-plane/commands.jsonl")
        );
        assert_eq!(
            paths.writer_lock,
            PathBuf::from("/tmp/example-repo/.mu/control-plane/writer.lock")
        );
    }
}
