//! Registry session shared by the site actions.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::{debug, warn};

use crate::cli::Context;
use crate::content_db::SqliteContentDb;
use crate::core::bootstrap::{self, Bootstrap};
use crate::core::paths::DataPaths;
use crate::registry::{LoadReport, RegistryService, SiteRegistry};
use crate::site::LocalSiteFactory;
use crate::store::FileSnapshotStore;

/// A running registry for the duration of one action.
pub struct Session {
    paths: DataPaths,
    bootstrap: Bootstrap,
    service: RegistryService,
}

impl Session {
    /// Prepare the data directory and start the registry service.
    ///
    /// The content index is optional: if it cannot be opened, the registry
    /// runs without orphan cleanup.
    pub fn open(ctx: &Context) -> Result<Self> {
        let paths = DataPaths::new(ctx.config.data_dir());
        let bootstrap = bootstrap::init_dirs(&paths).context("failed to prepare data directory")?;

        let store = Arc::new(FileSnapshotStore::new(paths.sites_json()));
        let factory = Arc::new(LocalSiteFactory::new(paths.clone()));
        let mut builder = SiteRegistry::builder(store, factory)
            .domain_cache_ttl(ctx.config.domain_cache_ttl())
            .save_delay(ctx.config.save_delay());

        match SqliteContentDb::open(paths.content_db()) {
            Ok(db) => builder = builder.content_index(Arc::new(db)),
            Err(e) => warn!(error = %e, "content index unavailable, orphan cleanup disabled"),
        }

        let service = RegistryService::start(builder.build(), ctx.config.save_interval());
        debug!(data_dir = %paths.data_dir().display(), "session opened");

        Ok(Self {
            paths,
            bootstrap,
            service,
        })
    }

    /// Load every known site, including ones listed in `sites.json` that
    /// have no local content yet, so that the final save keeps them.
    pub async fn load_all(&self) -> LoadReport {
        let report = self.registry().load(true, true).await;
        self.registry().wait_for_acquisitions().await;
        report
    }

    pub fn registry(&self) -> &Arc<SiteRegistry> {
        self.service.registry()
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn bootstrap(&self) -> &Bootstrap {
        &self.bootstrap
    }

    /// Shut the registry down, then report the action's own result first.
    pub async fn close(self, result: Result<()>) -> Result<()> {
        let saved = self.service.shutdown().await;
        result?;
        saved.context("failed to save sites")?;
        Ok(())
    }
}
