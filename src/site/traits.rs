//! site::traits
//!
//! Site handle and factory traits.
//!
//! # Design
//!
//! A site handle owns one site's runtime state: its content manifests,
//! size metrics and download machinery. The registry creates handles
//! through a [`SiteFactory`] and never reaches into their internals, so a
//! network-capable implementation can replace the local one without
//! touching the registry.
//!
//! Handle methods are async because they involve file or network I/O.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::manifest::ContentManifest;
use crate::core::address::Address;
use crate::core::settings::SiteSettings;

/// Errors from site handle operations.
#[derive(Debug, Error)]
pub enum SiteError {
    /// The root manifest is not present locally.
    #[error("content manifest not found: {0}")]
    ManifestMissing(PathBuf),

    /// A manifest exists but could not be read.
    #[error("cannot read {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A manifest was read but is not valid.
    #[error("invalid manifest {path}: {message}")]
    ManifestParse { path: PathBuf, message: String },

    /// Download could not be started or failed.
    #[error("download failed for {address}: {message}")]
    Download { address: String, message: String },
}

/// Runtime state of one site.
#[async_trait]
pub trait SiteHandle: Send + Sync + fmt::Debug {
    /// Address this handle serves.
    fn address(&self) -> &Address;

    /// Root content manifest, loaded on first access and cached.
    async fn root_manifest(&self) -> Result<Arc<ContentManifest>, SiteError>;

    /// `(size, size_optional)` over every manifest the site holds.
    async fn total_size(&self) -> Result<(u64, u64), SiteError>;

    /// Fetch the site's content.
    ///
    /// `check_size` enforces size limits before fetching files;
    /// `blind_includes` also fetches sub-manifests the root does not
    /// declare yet. Returns whether a root manifest is available afterwards.
    async fn download(&self, check_size: bool, blind_includes: bool) -> Result<bool, SiteError>;
}

/// Creates site handles for the registry.
pub trait SiteFactory: Send + Sync {
    /// Whether content for `address` already exists locally.
    fn has_local_content(&self, address: &Address) -> bool;

    /// Construct a handle for `address`.
    fn open(
        &self,
        address: &Address,
        settings: &SiteSettings,
        use_db_storage: bool,
    ) -> Result<Arc<dyn SiteHandle>, SiteError>;
}
