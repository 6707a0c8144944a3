//! ServerInfo: the `server.json` discovery file (SPEC_FULL.md §11).
//!
//! Written atomically on startup so terminal CLI clients can find the
//! running server without a fixed, well-known port.

use mu_types::error::MuError;
use mu_types::TimestampMs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub pid: u32,
    pub port: u16,
    pub url: String,
    pub started_at_ms: TimestampMs,
    pub generation_id: u64,
}

impl ServerInfo {
    pub fn new(port: u16, started_at_ms: TimestampMs, generation_id: u64) -> Self {
        Self {
            pid: std::process::id(),
            port,
            url: format!("http://127.0.0.1:{port}"),
            started_at_ms,
            generation_id,
        }
    }

    /// Atomically write `server.json` via a same-directory temp file +
    /// `rename` (the same primitive `JsonlStore::write` uses).
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), MuError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let tmp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), nonce));
        fs::write(&tmp_path, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Option<Self>, MuError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MuError::Io(e)),
        }
    }

    /// Remove `server.json` on clean shutdown; missing file is not an
    /// error.
    pub fn remove(path: impl AsRef<Path>) -> Result<(), MuError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MuError::Io(e)),
        }
    }
}
