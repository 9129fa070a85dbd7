//! site::manifest
//!
//! Content manifest (`content.json`) model.
//!
//! Only the fields needed for size accounting and include discovery are
//! typed; signatures and everything else are kept as raw JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One file listed in a manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
}

/// A parsed content manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<f64>,

    /// Required files, keyed by path relative to the manifest
    #[serde(default)]
    pub files: BTreeMap<String, FileEntry>,

    /// Optional files, downloaded on demand
    #[serde(default)]
    pub files_optional: BTreeMap<String, FileEntry>,

    /// Sub-manifests, keyed by path relative to this manifest
    #[serde(default)]
    pub includes: BTreeMap<String, Value>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ContentManifest {
    /// Parse manifest JSON.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Sum of required file sizes, saturating at `u64::MAX`.
    pub fn files_size(&self) -> u64 {
        saturating_total(self.files.values())
    }

    /// Sum of optional file sizes, saturating at `u64::MAX`.
    pub fn optional_size(&self) -> u64 {
        saturating_total(self.files_optional.values())
    }
}

// Sizes come from peer-supplied manifests.
fn saturating_total<'a>(files: impl Iterator<Item = &'a FileEntry>) -> u64 {
    files.fold(0u64, |total, f| total.saturating_add(f.size))
}

/// Directory part of an inner path, with a trailing slash (or empty).
///
/// ```
/// use sitekeeper::site::manifest::inner_dir;
///
/// assert_eq!(inner_dir("content.json"), "");
/// assert_eq!(inner_dir("data/users/content.json"), "data/users/");
/// ```
pub fn inner_dir(inner_path: &str) -> &str {
    match inner_path.rfind('/') {
        Some(idx) => &inner_path[..=idx],
        None => "",
    }
}
