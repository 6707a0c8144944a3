//! JSONL Append Store (spec.md §4.2).
//!
//! Two primitives: `append` (a single `O_APPEND` write so concurrent
//! appenders can't interleave partial lines) and `write` (atomic
//! replace-on-write via a same-directory temp file + `rename`).
//! `stream` yields parsed rows one line at a time, tagging malformed
//! lines with their path and line number.

use mu_types::error::MuError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A handle to one JSONL file. Stateless beyond the path; callers are
/// responsible for serializing concurrent writers (spec.md §5 - "journal
/// appends are serialized per journal via a mutex").
#[derive(Debug, Clone)]
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Append one row as a single `O_APPEND` write of `JSON(row) + "\n"`.
    pub fn append<T: Serialize>(&self, row: &T) -> Result<(), MuError> {
        self.ensure_parent_dir()?;
        let mut line = serde_json::to_string(row)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Atomically replace the file's contents with `rows`: write to a
    /// same-directory `*.tmp.<pid>.<nonce>` then `rename`.
    pub fn write<T: Serialize>(&self, rows: &[T]) -> Result<(), MuError> {
        self.ensure_parent_dir()?;
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let tmp_path = self.path.with_extension(format!(
            "tmp.{}.{}",
            std::process::id(),
            nonce
        ));
        {
            let mut tmp = File::create(&tmp_path)?;
            for row in rows {
                let mut line = serde_json::to_string(row)?;
                line.push('\n');
                tmp.write_all(line.as_bytes())?;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Stream parsed rows one line at a time. Returns an empty vec if the
    /// file doesn't exist yet (a journal with no entries is valid).
    pub fn stream<T: DeserializeOwned>(&self) -> Result<Vec<T>, MuError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MuError::Io(e)),
        };
        let reader = BufReader::new(file);
        let mut rows = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row: T = serde_json::from_str(&line).map_err(|_| MuError::JournalParseError {
                path: self.path.display().to_string(),
                line_number: idx + 1,
                raw: line.clone(),
            })?;
            rows.push(row);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        n: u32,
    }

    #[test]
    fn append_then_stream_round_trips() {
        let dir = tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("log.jsonl"));
        store.append(&Row { n: 1 }).unwrap();
        store.append(&Row { n: 2 }).unwrap();
        let rows: Vec<Row> = store.stream().unwrap();
        assert_eq!(rows, vec![Row { n: 1 }, Row { n: 2 }]);
    }

    #[test]
    fn stream_of_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("missing.jsonl"));
        let rows: Vec<Row> = store.stream().unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn malformed_line_is_tagged_with_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        fs::write(&path, "{\"n\":1}\nnot json\n").unwrap();
        let store = JsonlStore::new(path);
        let err = store.stream::<Row>().unwrap_err();
        match err {
            MuError::JournalParseError { line_number, .. } => assert_eq!(line_number, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn write_atomically_replaces_contents() {
        let dir = tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("log.jsonl"));
        store.append(&Row { n: 1 }).unwrap();
        store.write(&[Row { n: 9 }, Row { n: 10 }]).unwrap();
        let rows: Vec<Row> = store.stream().unwrap();
        assert_eq!(rows, vec![Row { n: 9 }, Row { n: 10 }]);
    }
}
