//! Exclusive writer lock with owner metadata (spec.md §4.1).
//!
//! Acquisition uses `O_CREAT|O_EXCL` create-new semantics so a second
//! acquirer fails immediately rather than blocking; this is deliberately
//! not an advisory `flock` because the spec wants a structured
//! `writer_lock_busy` error carrying the existing owner's metadata, not a
//! blocking wait.

use mu_types::error::MuError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// JSON metadata written into `writer.lock` on acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterLockOwner {
    pub owner_id: String,
    pub pid: u32,
    pub hostname: String,
    pub repo_root: String,
    pub acquired_at_ms: i64,
}

/// A held writer lock. Dropping it releases the lock (best-effort); call
/// [`WriterLock::release`] explicitly to observe I/O errors.
#[derive(Debug)]
pub struct WriterLock {
    path: PathBuf,
    released: bool,
}

impl WriterLock {
    /// Acquire the lock at `path`, or return `WriterLockBusy` with the
    /// existing owner's metadata if it is already held.
    pub fn acquire(
        path: impl AsRef<Path>,
        owner_id: &str,
        repo_root: &str,
        now_ms: i64,
    ) -> Result<Self, MuError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let owner = WriterLockOwner {
            owner_id: owner_id.to_string(),
            pid: std::process::id(),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
            repo_root: repo_root.to_string(),
            acquired_at_ms: now_ms,
        };

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                let body = serde_json::to_string(&owner)?;
                file.write_all(body.as_bytes())?;
                Ok(Self {
                    path,
                    released: false,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let existing = Self::read_owner(&path).unwrap_or(WriterLockOwner {
                    owner_id: "unknown".to_string(),
                    pid: 0,
                    hostname: "unknown".to_string(),
                    repo_root: repo_root.to_string(),
                    acquired_at_ms: 0,
                });
                Err(MuError::WriterLockBusy {
                    pid: existing.pid,
                    hostname: existing.hostname,
                    acquired_at_ms: existing.acquired_at_ms,
                })
            }
            Err(e) => Err(MuError::Io(e)),
        }
    }

    fn read_owner(path: &Path) -> Option<WriterLockOwner> {
        let mut body = String::new();
        fs::File::open(path).ok()?.read_to_string(&mut body).ok()?;
        serde_json::from_str(&body).ok()
    }

    /// Release the lock. Idempotent: releasing an already-released lock
    /// is a no-op (spec.md §4.1).
    pub fn release(&mut self) -> std::io::Result<()> {
        if self.released {
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                self.released = true;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.released = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquisition_fails_with_owner_metadata() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("writer.lock");

        let _first = WriterLock::acquire(&lock_path, "owner-a", "/repo", 1000).unwrap();
        let second = WriterLock::acquire(&lock_path, "owner-b", "/repo", 2000);

        match second {
            Err(MuError::WriterLockBusy { acquired_at_ms, .. }) => {
                assert_eq!(acquired_at_ms, 1000);
            }
            other => panic!("expected WriterLockBusy, got {other:?}"),
        }
    }

    #[test]
    fn release_is_idempotent() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("writer.lock");
        let mut lock = WriterLock::acquire(&lock_path, "owner-a", "/repo", 1000).unwrap();
        lock.release().unwrap();
        lock.release().unwrap();
        assert!(!lock_path.exists());
    }

    #[test]
    fn release_then_reacquire_succeeds() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("writer.lock");
        let mut first = WriterLock::acquire(&lock_path, "owner-a", "/repo", 1000).unwrap();
        first.release().unwrap();
        let _second = WriterLock::acquire(&lock_path, "owner-b", "/repo", 2000).unwrap();
    }
}
