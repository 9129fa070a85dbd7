//! store::file_store
//!
//! JSON file snapshot storage (`<data_dir>/sites.json`).
//!
//! - Writes go to a sibling temp file, are synced, then renamed over the
//!   target, so a crash mid-write leaves the old snapshot intact
//! - Output is pretty-printed with keys sorted by address
//! - Reads only require a JSON object; entries are not interpreted here

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::traits::{RawSnapshot, Snapshot, SnapshotStore, StoreError};

/// Snapshot store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Create a store at `path`. Nothing is touched until the first access.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn read(&self) -> Result<RawSnapshot, StoreError> {
        if !self.path.exists() {
            return Ok(RawSnapshot::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            StoreError::ReadError(format!("cannot read {}: {}", self.path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            StoreError::ParseError(format!("cannot parse {}: {}", self.path.display(), e))
        })
    }

    fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::WriteError(format!("cannot create directory: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| StoreError::WriteError(format!("cannot serialize snapshot: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| StoreError::WriteError(format!("cannot create temp file: {}", e)))?;

            file.write_all(content.as_bytes())
                .map_err(|e| StoreError::WriteError(format!("cannot write snapshot: {}", e)))?;

            file.sync_all()
                .map_err(|e| StoreError::WriteError(format!("cannot sync to disk: {}", e)))?;
        }

        fs::rename(&temp_path, &self.path)
            .map_err(|e| StoreError::WriteError(format!("cannot rename temp file: {}", e)))?;

        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
