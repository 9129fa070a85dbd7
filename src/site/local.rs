//! site::local
//!
//! Site handles backed by the data directory.
//!
//! `LocalSite` reads manifests from `<data_dir>/<address>/`. It has no peer
//! transport of its own: `download` prepares the site directory and
//! reports whether content is present, leaving the transfer to whatever
//! populates the directory.
//!
//! Only directory storage is supported. A site flagged `use_db_storage`
//! keeps its manifests in the content database, which these handles do not
//! read: unless a `content.json` copy exists on disk, its root manifest is
//! missing and the registry skips it during load.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use super::manifest::{inner_dir, ContentManifest};
use super::traits::{SiteError, SiteFactory, SiteHandle};
use crate::core::address::Address;
use crate::core::paths::{DataPaths, ROOT_MANIFEST};
use crate::core::settings::SiteSettings;

/// A site whose content lives in the data directory.
#[derive(Debug)]
pub struct LocalSite {
    address: Address,
    paths: DataPaths,
    root: OnceCell<Arc<ContentManifest>>,
}

impl LocalSite {
    /// Create a handle. No I/O happens until a manifest is requested.
    pub fn new(address: Address, paths: DataPaths) -> Self {
        Self {
            address,
            paths,
            root: OnceCell::new(),
        }
    }


    /// Read one manifest, returning it with its size in bytes.
    async fn read_manifest(&self, inner_path: &str) -> Result<(ContentManifest, u64), SiteError> {
        let path = self.paths.site_file(&self.address, inner_path);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SiteError::ManifestMissing(path));
            }
            Err(e) => return Err(SiteError::ManifestRead { path, source: e }),
        };
        let manifest = ContentManifest::parse(&bytes).map_err(|e| SiteError::ManifestParse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok((manifest, bytes.len() as u64))
    }
}

#[async_trait]
impl SiteHandle for LocalSite {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn root_manifest(&self) -> Result<Arc<ContentManifest>, SiteError> {
        self.root
            .get_or_try_init(|| async {
                let (manifest, _) = self.read_manifest(ROOT_MANIFEST).await?;
                Ok(Arc::new(manifest))
            })
            .await
            .map(Arc::clone)
    }

    /// Walks the root manifest and every include reachable from it. Each
    /// manifest contributes its own byte size plus its listed files.
    async fn total_size(&self) -> Result<(u64, u64), SiteError> {
        let mut size = 0u64;
        let mut size_optional = 0u64;
        let mut seen = HashSet::new();
        let mut queue = vec![ROOT_MANIFEST.to_string()];

        while let Some(inner_path) = queue.pop() {
            if !seen.insert(inner_path.clone()) {
                continue;
            }
            let (manifest, bytes) = match self.read_manifest(&inner_path).await {
                Ok(found) => found,
                // Includes may legitimately not be downloaded yet.
                Err(SiteError::ManifestMissing(_)) if inner_path != ROOT_MANIFEST => continue,
                Err(e) => return Err(e),
            };

            size = size
                .saturating_add(bytes)
                .saturating_add(manifest.files_size());
            size_optional = size_optional.saturating_add(manifest.optional_size());

            let dir = inner_dir(&inner_path);
            for include in manifest.includes.keys() {
                queue.push(format!("{}{}", dir, include));
            }
        }

        Ok((size, size_optional))
    }

    async fn download(&self, check_size: bool, blind_includes: bool) -> Result<bool, SiteError> {
        let dir = self.paths.site_dir(&self.address);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SiteError::Download {
                address: self.address.to_string(),
                message: format!("cannot create {}: {}", dir.display(), e),
            })?;

        let present = self.paths.root_manifest(&self.address).is_file();
        debug!(
            address = %self.address,
            check_size,
            blind_includes,
            present,
            "local download pass"
        );

        if present && check_size {
            let (size, size_optional) = self.total_size().await?;
            debug!(address = %self.address, size, size_optional, "site size");
        }
        Ok(present)
    }
}

/// Factory producing [`LocalSite`] handles for one data directory.
///
/// The `use_db_storage` flag is accepted but does not change where
/// manifests are read from.
#[derive(Debug, Clone)]
pub struct LocalSiteFactory {
    paths: DataPaths,
}

impl LocalSiteFactory {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }
}

impl SiteFactory for LocalSiteFactory {
    fn has_local_content(&self, address: &Address) -> bool {
        self.paths.root_manifest(address).is_file()
    }

    fn open(
        &self,
        address: &Address,
        _settings: &SiteSettings,
        _use_db_storage: bool,
    ) -> Result<Arc<dyn SiteHandle>, SiteError> {
        Ok(Arc::new(LocalSite::new(address.clone(), self.paths.clone())))
    }
}
