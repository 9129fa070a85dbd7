//! store::traits
//!
//! Snapshot store trait definition.
//!
//! # Design
//!
//! The registry persists one document: a mapping from address to settings.
//! A store reads and replaces that document as a whole. Implementations
//! must make `write` atomic: readers see either the previous snapshot or
//! the new one, never a mix.
//!
//! Reads hand back each entry as raw JSON. One malformed entry must not
//! hide the others, so settings are parsed per site by the registry.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::core::settings::SiteSettings;

/// Persisted registry contents, keyed by address as written on disk.
///
/// Keys are plain strings because a snapshot may contain entries written
/// by older clients; the registry validates them when loading.
pub type Snapshot = BTreeMap<String, SiteSettings>;

/// Snapshot as read back, with each entry's settings still unparsed.
pub type RawSnapshot = BTreeMap<String, Value>;

/// Errors from snapshot storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to read the snapshot.
    #[error("failed to read snapshot: {0}")]
    ReadError(String),

    /// The snapshot exists but is not a JSON object.
    #[error("failed to parse snapshot: {0}")]
    ParseError(String),

    /// Failed to write the snapshot.
    #[error("failed to write snapshot: {0}")]
    WriteError(String),
}

/// Storage for the registry snapshot.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait SnapshotStore: Send + Sync {
    /// Read the current snapshot.
    ///
    /// A store that has never been written returns an empty snapshot.
    fn read(&self) -> Result<RawSnapshot, StoreError>;

    /// Atomically replace the snapshot.
    fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Human-readable location, for log messages.
    fn describe(&self) -> String;
}
