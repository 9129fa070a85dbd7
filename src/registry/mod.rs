//! registry
//!
//! The site registry: the authoritative in-memory index of known sites.
//!
//! # Lifecycle
//!
//! The registry starts empty and unloaded. The first lookup (or an explicit
//! [`SiteRegistry::load`]) reads the persisted snapshot, opens every site
//! whose content is already on disk and, when `cleanup` is set, drops
//! entries and content-index rows that no longer belong to any known site.
//!
//! Saving writes every resident site's settings back through the
//! [`SnapshotStore`]. A save is refused while the registry is unloaded or
//! empty so that a partial view can never clobber the snapshot; the one
//! exception is [`SiteRegistry::delete`] removing the last site.
//!
//! # Concurrency
//!
//! - Only one load runs at a time. Overlapping callers await the load in
//!   flight and receive its [`LoadReport`].
//! - Saves are serialized; the store sees one writer at a time.
//! - Background work (startup acquisitions, downloads, delayed saves) runs
//!   in spawned tasks whose failures are logged and contained.
//!
//! Methods taking `self: &Arc<Self>` may spawn tasks and must be called
//! from within a Tokio runtime.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sitekeeper::registry::{AddOptions, SiteRegistry};
//!
//! let registry = SiteRegistry::builder(store, factory).build();
//! let site = registry.need("1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D", AddOptions::default()).await?;
//! println!("serving: {}", site.settings().serving);
//! ```

pub mod domain;
mod rate_limit;
mod service;

pub use rate_limit::{Admission, RateLimiter};
pub use service::RegistryService;

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::content_db::ContentIndex;
use crate::core::address::{Address, AddressError};
use crate::core::config::{DEFAULT_DOMAIN_CACHE_TTL, DEFAULT_SAVE_DELAY};
use crate::core::settings::SiteSettings;
use crate::site::{SiteError, SiteFactory, SiteHandle};
use crate::store::{RawSnapshot, Snapshot, SnapshotStore, StoreError};
use domain::{CachedResolver, DomainResolver, NoDomains};

/// Errors reported to registry callers.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    #[error("site not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Site(#[from] SiteError),
}

/// Result of a save request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The snapshot was replaced with this many sites.
    Saved { sites: usize },
    /// Nothing resident; the snapshot was left alone.
    SkippedEmpty,
    /// No load has completed; the snapshot was left alone.
    SkippedNotLoaded,
}

/// What one load pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Sites opened from local content and made resident.
    pub loaded: Vec<Address>,
    /// Sites without local content handed to background acquisition.
    pub queued: Vec<Address>,
    /// Snapshot keys that were skipped (invalid key, unreadable settings,
    /// or failed to open).
    pub failed: Vec<String>,
    /// Resident sites dropped because the snapshot no longer lists them.
    pub removed: Vec<String>,
    /// Orphaned content-index rows that were deleted.
    pub orphans: Vec<String>,
}

impl LoadReport {
    /// Sites picked up by this pass, resident or queued.
    pub fn added(&self) -> usize {
        self.loaded.len() + self.queued.len()
    }
}

/// Options for [`SiteRegistry::add`] and [`SiteRegistry::need`].
#[derive(Debug, Clone)]
pub struct AddOptions {
    /// Start a full download (including blind includes) after adding.
    pub download_all_files: bool,
    /// Initial settings; fresh defaults when `None`.
    pub settings: Option<SiteSettings>,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            download_all_files: true,
            settings: None,
        }
    }
}

/// One registered site.
#[derive(Debug)]
pub struct SiteEntry {
    address: Address,
    settings: Mutex<SiteSettings>,
    handle: Arc<dyn SiteHandle>,
}

impl SiteEntry {
    fn new(address: Address, settings: SiteSettings, handle: Arc<dyn SiteHandle>) -> Self {
        Self {
            address,
            settings: Mutex::new(settings),
            handle,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Copy of the current settings.
    pub fn settings(&self) -> SiteSettings {
        lock(&self.settings).clone()
    }

    /// Mutate settings in place. Not persisted until the next save.
    pub fn update_settings<R>(&self, f: impl FnOnce(&mut SiteSettings) -> R) -> R {
        f(&mut lock(&self.settings))
    }

    pub fn handle(&self) -> &Arc<dyn SiteHandle> {
        &self.handle
    }
}

#[derive(Debug)]
struct RegistryState {
    /// Keyed by address in the casing it was registered under
    sites: BTreeMap<String, Arc<SiteEntry>>,
    loaded: bool,
    last_changed: DateTime<Utc>,
}

impl RegistryState {
    /// Exact match first, then any case variant.
    fn find(&self, address: &str) -> Option<&Arc<SiteEntry>> {
        self.sites.get(address).or_else(|| {
            self.sites
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(address))
                .map(|(_, entry)| entry)
        })
    }
}

type LoadFuture = Shared<BoxFuture<'static, LoadReport>>;

/// Builder for [`SiteRegistry`].
pub struct RegistryBuilder {
    store: Arc<dyn SnapshotStore>,
    factory: Arc<dyn SiteFactory>,
    index: Option<Arc<dyn ContentIndex>>,
    resolver: Arc<dyn DomainResolver>,
    domain_cache_ttl: Duration,
    save_delay: Duration,
}

impl RegistryBuilder {
    /// Content index reconciled during cleanup loads.
    pub fn content_index(mut self, index: Arc<dyn ContentIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn domain_resolver(mut self, resolver: Arc<dyn DomainResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn domain_cache_ttl(mut self, ttl: Duration) -> Self {
        self.domain_cache_ttl = ttl;
        self
    }

    /// Coalescing window for [`SiteRegistry::save_delayed`].
    pub fn save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    pub fn build(self) -> Arc<SiteRegistry> {
        Arc::new(SiteRegistry {
            store: self.store,
            factory: self.factory,
            index: self.index,
            domains: CachedResolver::new(self.resolver, self.domain_cache_ttl),
            state: tokio::sync::RwLock::new(RegistryState {
                sites: BTreeMap::new(),
                loaded: false,
                last_changed: Utc::now(),
            }),
            loading: Mutex::new(None),
            save_lock: tokio::sync::Mutex::new(()),
            save_limiter: RateLimiter::new(self.save_delay),
            acquisitions: Mutex::new(Vec::new()),
            load_runs: AtomicUsize::new(0),
        })
    }
}

/// Registry of known sites. Shared as `Arc<SiteRegistry>`.
pub struct SiteRegistry {
    store: Arc<dyn SnapshotStore>,
    factory: Arc<dyn SiteFactory>,
    index: Option<Arc<dyn ContentIndex>>,
    domains: CachedResolver,
    state: tokio::sync::RwLock<RegistryState>,
    /// Load in flight, if any
    loading: Mutex<Option<LoadFuture>>,
    save_lock: tokio::sync::Mutex<()>,
    save_limiter: RateLimiter,
    /// Startup acquisitions not yet awaited
    acquisitions: Mutex<Vec<JoinHandle<()>>>,
    load_runs: AtomicUsize,
}

/// Clears the in-flight load slot when the load task ends, even by panic.
struct LoadSlot(Arc<SiteRegistry>);

impl Drop for LoadSlot {
    fn drop(&mut self) {
        lock(&self.0.loading).take();
    }
}

impl SiteRegistry {
    pub fn builder(store: Arc<dyn SnapshotStore>, factory: Arc<dyn SiteFactory>) -> RegistryBuilder {
        RegistryBuilder {
            store,
            factory,
            index: None,
            resolver: Arc::new(NoDomains),
            domain_cache_ttl: DEFAULT_DOMAIN_CACHE_TTL,
            save_delay: DEFAULT_SAVE_DELAY,
        }
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Load sites from the snapshot.
    ///
    /// With `cleanup`, resident sites missing from the snapshot are dropped
    /// and orphaned content-index rows are deleted. With `startup`, sites
    /// that have no local content yet are acquired in the background.
    ///
    /// Never fails: unreadable snapshots and sites that cannot be opened
    /// are logged and skipped. If a load is already running, the returned
    /// future resolves with that load's report instead of starting another.
    pub fn load(self: &Arc<Self>, cleanup: bool, startup: bool) -> BoxFuture<'static, LoadReport> {
        let pending = {
            let mut slot = lock(&self.loading);
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!(cleanup, startup, "load already in progress, waiting");
                    in_flight.clone()
                }
                None => {
                    let this = Arc::clone(self);
                    let task = tokio::spawn(async move {
                        let _slot = LoadSlot(Arc::clone(&this));
                        this.load_sites(cleanup, startup).await
                    });
                    let shared = async move {
                        task.await.unwrap_or_else(|e| {
                            error!(error = %e, "site load task failed");
                            LoadReport::default()
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = Some(shared.clone());
                    shared
                }
            }
        };
        pending.boxed()
    }

    async fn load_sites(self: &Arc<Self>, cleanup: bool, startup: bool) -> LoadReport {
        self.load_runs.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        info!(cleanup, startup, "loading sites");
        self.state.write().await.loaded = false;

        let snapshot = self.store.read().unwrap_or_else(|e| {
            error!(store = %self.store.describe(), error = %e, "unable to load site snapshot");
            RawSnapshot::new()
        });

        let resident: Vec<String> = self.state.read().await.sites.keys().cloned().collect();
        let mut report = LoadReport::default();
        let mut found: HashSet<String> = HashSet::new();
        let mut opened: Vec<Arc<SiteEntry>> = Vec::new();
        let mut queued: Vec<(Address, SiteSettings)> = Vec::new();

        for (key, raw) in snapshot {
            found.insert(key.to_ascii_lowercase());
            if resident.iter().any(|r| r.eq_ignore_ascii_case(&key)) {
                continue;
            }

            let address = match Address::new(key.as_str()) {
                Ok(address) => address,
                Err(e) => {
                    warn!(error = %e, "skipping snapshot entry");
                    report.failed.push(key);
                    continue;
                }
            };
            let settings: SiteSettings = match serde_json::from_value(raw) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(address = %address, error = %e, "skipping snapshot entry with invalid settings");
                    report.failed.push(key);
                    continue;
                }
            };
            let seen_variant = opened.iter().any(|e| e.address.same_site(&key))
                || queued.iter().any(|(a, _)| a.same_site(&key));
            if seen_variant {
                warn!(address = %address, "skipping case variant of a site already in the snapshot");
                continue;
            }

            if settings.use_db_storage || self.factory.has_local_content(&address) {
                let site_started = Instant::now();
                match self.open_site(&address, settings).await {
                    Ok(entry) => {
                        debug!(
                            address = %address,
                            elapsed_ms = site_started.elapsed().as_millis() as u64,
                            "loaded site"
                        );
                        opened.push(entry);
                    }
                    Err(e) => {
                        debug!(address = %address, error = %e, "error loading site");
                        report.failed.push(key);
                    }
                }
            } else if startup {
                debug!(address = %address, "found new site in snapshot");
                queued.push((address, settings));
            }
        }

        {
            let mut state = self.state.write().await;
            for entry in opened {
                // Added through `add` while this load was reading.
                if state.find(entry.address.as_str()).is_some() {
                    continue;
                }
                report.loaded.push(entry.address.clone());
                state.sites.insert(entry.address.to_string(), entry);
            }

            if cleanup {
                for key in &resident {
                    if !found.contains(&key.to_ascii_lowercase()) && state.sites.remove(key).is_some() {
                        debug!(address = %key, "removed site");
                        report.removed.push(key.clone());
                    }
                }
                if !report.removed.is_empty() {
                    state.last_changed = Utc::now();
                }
            }
        }

        if cleanup {
            if let Some(index) = &self.index {
                let tracked: HashSet<String> = self
                    .state
                    .read()
                    .await
                    .sites
                    .keys()
                    .map(|k| k.to_ascii_lowercase())
                    .collect();
                report.orphans = delete_orphans(index.as_ref(), &tracked, &found);
            }
        }

        self.state.write().await.loaded = true;

        let mut acquisitions = Vec::with_capacity(queued.len());
        for (address, settings) in queued {
            report.queued.push(address.clone());
            let this = Arc::clone(self);
            acquisitions.push(tokio::spawn(async move {
                let options = AddOptions {
                    settings: Some(settings),
                    ..AddOptions::default()
                };
                if let Err(e) = this.need(address.as_str(), options).await {
                    warn!(address = %address, error = %e, "startup acquisition failed");
                }
            }));
        }
        lock(&self.acquisitions).extend(acquisitions);

        if report.added() > 0 {
            info!(
                added = report.added(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "added sites"
            );
        }
        report
    }

    async fn open_site(
        &self,
        address: &Address,
        settings: SiteSettings,
    ) -> Result<Arc<SiteEntry>, SiteError> {
        let handle = self.factory.open(address, &settings, settings.use_db_storage)?;
        handle.root_manifest().await?;
        Ok(Arc::new(SiteEntry::new(address.clone(), settings, handle)))
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Write every resident site's settings to the snapshot store.
    ///
    /// With `recalculate_size`, size metrics are refreshed from each site
    /// first. The per-site `cache` is never written and is cleared once the
    /// snapshot has been replaced.
    pub async fn save(&self, recalculate_size: bool) -> Result<SaveOutcome, RegistryError> {
        self.write_snapshot(recalculate_size, false).await
    }

    async fn write_snapshot(
        &self,
        recalculate_size: bool,
        allow_empty: bool,
    ) -> Result<SaveOutcome, RegistryError> {
        let _writer = self.save_lock.lock().await;

        let entries: Vec<Arc<SiteEntry>> = {
            let state = self.state.read().await;
            if state.sites.is_empty() && !allow_empty {
                debug!("save skipped: no sites found");
                return Ok(SaveOutcome::SkippedEmpty);
            }
            if !state.loaded {
                debug!("save skipped: not loaded");
                return Ok(SaveOutcome::SkippedNotLoaded);
            }
            state.sites.values().cloned().collect()
        };

        let started = Instant::now();
        let mut snapshot = Snapshot::new();
        for entry in &entries {
            if recalculate_size {
                match entry.handle.total_size().await {
                    Ok(sizes) => entry.update_settings(|s| s.set_sizes(sizes)),
                    Err(e) => {
                        debug!(address = %entry.address, error = %e, "keeping previous size")
                    }
                }
            }
            let mut settings = entry.settings();
            settings.cache.clear();
            snapshot.insert(entry.address.to_string(), settings);
        }
        let generate_ms = started.elapsed().as_millis() as u64;

        let write_started = Instant::now();
        self.store.write(&snapshot)?;
        let write_ms = write_started.elapsed().as_millis() as u64;

        for entry in &entries {
            entry.update_settings(|s| s.cache.clear());
        }

        debug!(sites = entries.len(), generate_ms, write_ms, "saved sites");
        Ok(SaveOutcome::Saved {
            sites: entries.len(),
        })
    }

    /// Request a save, coalescing bursts into one save per window.
    ///
    /// The first request in a quiet window saves immediately; requests
    /// inside the window share one trailing save.
    pub fn save_delayed(self: &Arc<Self>) {
        let delay = match self.save_limiter.admit() {
            Admission::Now => None,
            Admission::After(wait) => Some(wait),
            Admission::Coalesced => {
                debug!("delayed save already scheduled");
                return;
            }
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(wait) = delay {
                tokio::time::sleep(wait).await;
                this.save_limiter.mark_ran();
            }
            if let Err(e) = this.save(false).await {
                warn!(error = %e, "delayed save failed");
            }
        });
    }

    // =========================================================================
    // Lookup and creation
    // =========================================================================

    /// Resident site for `address` (or a domain resolving to one).
    ///
    /// Loads the registry first if no load has completed yet.
    pub async fn get(self: &Arc<Self>, address: &str) -> Option<Arc<SiteEntry>> {
        let address = self.domains.lookup(address);
        if !self.is_loaded().await {
            debug!(address = %address, "loading sites before lookup");
            self.load(true, false).await;
        }
        self.state.read().await.find(&address).cloned()
    }

    /// Register a new site.
    ///
    /// If a site with the same address in any casing already exists, that
    /// entry is returned and `options` are ignored. New sites are always
    /// marked as serving and persisted before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidAddress`] for a malformed address,
    /// leaving the registry untouched.
    pub async fn add(
        self: &Arc<Self>,
        address: &str,
        options: AddOptions,
    ) -> Result<Arc<SiteEntry>, RegistryError> {
        // No resident key can match an invalid string, even ignoring case.
        let address = Address::new(address)?;
        if !self.is_loaded().await {
            self.load(true, false).await;
        }
        {
            let mut state = self.state.write().await;
            if let Some(existing) = state.find(address.as_str()).cloned() {
                state.last_changed = Utc::now();
                debug!(address = %address, existing = %existing.address, "site already registered");
                return Ok(existing);
            }
        }

        let mut settings = options.settings.unwrap_or_else(SiteSettings::new_site);
        settings.serving = true;
        if settings.added.is_none() {
            settings.added = Some(Utc::now().timestamp());
        }
        let handle = self
            .factory
            .open(&address, &settings, settings.use_db_storage)?;
        let entry = Arc::new(SiteEntry::new(address.clone(), settings, handle));

        {
            let mut state = self.state.write().await;
            if let Some(existing) = state.find(address.as_str()) {
                return Ok(Arc::clone(existing));
            }
            state.sites.insert(address.to_string(), Arc::clone(&entry));
            state.last_changed = Utc::now();
        }
        debug!(address = %address, "added new site");

        if let Err(e) = self.save(false).await {
            warn!(address = %address, error = %e, "new site not persisted");
        }
        if options.download_all_files {
            spawn_download(&entry);
        }
        Ok(entry)
    }

    /// Existing site for `address`, or a newly added one.
    pub async fn need(
        self: &Arc<Self>,
        address: &str,
        options: AddOptions,
    ) -> Result<Arc<SiteEntry>, RegistryError> {
        let address = self.domains.lookup(address);
        if let Some(entry) = self.get(&address).await {
            return Ok(entry);
        }
        self.add(&address, options).await
    }

    /// Remove a resident site and persist the removal immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the site is not resident, or
    /// a store error if the removal could not be persisted.
    pub async fn delete(&self, address: &str) -> Result<(), RegistryError> {
        {
            let mut state = self.state.write().await;
            let key = state
                .find(address)
                .map(|entry| entry.address.to_string())
                .ok_or_else(|| RegistryError::NotFound(address.to_string()))?;
            state.sites.remove(&key);
            state.last_changed = Utc::now();
        }
        debug!(address, "deleted site");
        self.write_snapshot(false, true).await?;
        Ok(())
    }

    /// Mutate one site's settings and schedule a delayed save.
    pub async fn update_settings(
        self: &Arc<Self>,
        address: &str,
        f: impl FnOnce(&mut SiteSettings),
    ) -> Result<SiteSettings, RegistryError> {
        let entry = self
            .get(address)
            .await
            .ok_or_else(|| RegistryError::NotFound(address.to_string()))?;
        entry.update_settings(f);
        self.save_delayed();
        Ok(entry.settings())
    }

    /// Every resident site, keyed by address.
    ///
    /// Runs a startup load first if no load has completed yet. The map is
    /// a snapshot; entries are shared with the registry.
    pub async fn list(self: &Arc<Self>) -> BTreeMap<String, Arc<SiteEntry>> {
        if !self.is_loaded().await {
            debug!("sites not loaded yet");
            self.load(true, true).await;
        }
        self.state.read().await.sites.clone()
    }

    /// Wait for the acquisitions queued by startup loads so far.
    ///
    /// Only registration is awaited; downloads started by it keep running
    /// in the background.
    pub async fn wait_for_acquisitions(&self) {
        let pending: Vec<JoinHandle<()>> = lock(&self.acquisitions).drain(..).collect();
        for task in pending {
            if let Err(e) = task.await {
                error!(error = %e, "acquisition task failed");
            }
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.loaded
    }

    /// Time of the last add, delete or cleanup removal.
    pub async fn last_changed(&self) -> DateTime<Utc> {
        self.state.read().await.last_changed
    }

    /// Number of load passes that have actually run.
    pub fn load_runs(&self) -> usize {
        self.load_runs.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn spawn_download(entry: &Arc<SiteEntry>) {
    let handle = Arc::clone(&entry.handle);
    tokio::spawn(async move {
        match handle.download(true, true).await {
            Ok(present) => debug!(address = %handle.address(), present, "download finished"),
            Err(e) => warn!(address = %handle.address(), error = %e, "download failed"),
        }
    });
}

/// Delete index rows for addresses neither tracked nor in the snapshot.
fn delete_orphans(
    index: &dyn ContentIndex,
    tracked: &HashSet<String>,
    found: &HashSet<String>,
) -> Vec<String> {
    let rows = match index.site_addresses() {
        Ok(rows) => rows,
        Err(e) => {
            error!(error = %e, "cannot list content index sites");
            return Vec::new();
        }
    };

    let mut orphans = Vec::new();
    for address in rows {
        let canonical = address.to_ascii_lowercase();
        if tracked.contains(&canonical) || found.contains(&canonical) {
            continue;
        }
        info!(address = %address, "deleting orphan site from content index");
        if let Err(e) = index.delete_site(&address) {
            error!(address = %address, error = %e, "can't delete site from content index");
        }
        index.forget(&address);
        orphans.push(address);
    }
    orphans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_db::SqliteContentDb;
    use crate::site::ContentManifest;
    use crate::store::MemorySnapshotStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::PathBuf;
    use tokio::sync::Notify;

    const A: &str = "1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D";
    const B: &str = "1BLogC9LN4oPDcruNz3qo1ysa133E9AGg8";

    #[derive(Debug)]
    struct FakeSite {
        address: Address,
        broken: bool,
        downloads: Arc<AtomicUsize>,
        downloaded: Arc<Notify>,
    }

    #[async_trait]
    impl SiteHandle for FakeSite {
        fn address(&self) -> &Address {
            &self.address
        }

        async fn root_manifest(&self) -> Result<Arc<ContentManifest>, SiteError> {
            if self.broken {
                return Err(SiteError::ManifestMissing(PathBuf::from("content.json")));
            }
            Ok(Arc::new(ContentManifest::default()))
        }

        async fn total_size(&self) -> Result<(u64, u64), SiteError> {
            Ok((100, 20))
        }

        async fn download(&self, _check_size: bool, _blind: bool) -> Result<bool, SiteError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            self.downloaded.notify_one();
            Ok(true)
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        local: Mutex<HashSet<String>>,
        broken: Mutex<HashSet<String>>,
        downloads: Arc<AtomicUsize>,
        downloaded: Arc<Notify>,
    }

    impl FakeFactory {
        fn with_local(addresses: &[&str]) -> Self {
            let factory = Self::default();
            lock(&factory.local).extend(addresses.iter().map(|a| a.to_string()));
            factory
        }
    }

    impl SiteFactory for FakeFactory {
        fn has_local_content(&self, address: &Address) -> bool {
            lock(&self.local).contains(address.as_str())
        }

        fn open(
            &self,
            address: &Address,
            _settings: &SiteSettings,
            _use_db_storage: bool,
        ) -> Result<Arc<dyn SiteHandle>, SiteError> {
            Ok(Arc::new(FakeSite {
                address: address.clone(),
                broken: lock(&self.broken).contains(address.as_str()),
                downloads: Arc::clone(&self.downloads),
                downloaded: Arc::clone(&self.downloaded),
            }))
        }
    }

    fn snapshot(value: serde_json::Value) -> Snapshot {
        serde_json::from_value(value).unwrap()
    }

    fn no_download() -> AddOptions {
        AddOptions {
            download_all_files: false,
            settings: None,
        }
    }

    fn registry(store: &Arc<MemorySnapshotStore>, factory: &Arc<FakeFactory>) -> Arc<SiteRegistry> {
        SiteRegistry::builder(store.clone(), factory.clone()).build()
    }

    #[tokio::test]
    async fn add_then_get_returns_one_entry() {
        let store = Arc::new(MemorySnapshotStore::new());
        let factory = Arc::new(FakeFactory::default());
        let registry = registry(&store, &factory);

        let added = registry.add(A, no_download()).await.unwrap();
        let again = registry.add(A, no_download()).await.unwrap();
        let variant = registry.add(&A.to_lowercase(), no_download()).await.unwrap();
        let got = registry.get(A).await.unwrap();

        assert!(Arc::ptr_eq(&added, &again));
        assert!(Arc::ptr_eq(&added, &variant));
        assert!(Arc::ptr_eq(&added, &got));
        assert_eq!(registry.list().await.len(), 1);
        assert!(added.settings().serving);
        assert!(store.current().unwrap().contains_key(A));
    }

    #[tokio::test]
    async fn case_variants_keep_first_casing() {
        let store = Arc::new(MemorySnapshotStore::new());
        let registry = registry(&store, &Arc::new(FakeFactory::default()));

        let lower = A.to_lowercase();
        registry.add(&lower, no_download()).await.unwrap();
        let second = registry.add(A, no_download()).await.unwrap();

        assert_eq!(second.address().as_str(), lower);
        let keys: Vec<String> = registry.list().await.into_keys().collect();
        assert_eq!(keys, vec![lower]);
    }

    #[tokio::test]
    async fn duplicate_add_ignores_new_settings() {
        let store = Arc::new(MemorySnapshotStore::new());
        let registry = registry(&store, &Arc::new(FakeFactory::default()));
        registry.add(A, no_download()).await.unwrap();

        let mut settings = SiteSettings::new_site();
        settings.own = true;
        let entry = registry
            .add(
                A,
                AddOptions {
                    download_all_files: false,
                    settings: Some(settings),
                },
            )
            .await
            .unwrap();

        assert!(!entry.settings().own);
    }

    #[tokio::test]
    async fn invalid_address_leaves_registry_untouched() {
        let store = Arc::new(MemorySnapshotStore::new());
        let registry = registry(&store, &Arc::new(FakeFactory::default()));
        registry.load(true, false).await;
        let changed = registry.last_changed().await;

        for bad in ["short", "1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3-", ""] {
            let result = registry.add(bad, no_download()).await;
            assert!(matches!(result, Err(RegistryError::InvalidAddress(_))));
        }

        assert!(registry.list().await.is_empty());
        assert_eq!(store.writes(), 0);
        assert_eq!(registry.last_changed().await, changed);
    }

    #[tokio::test]
    async fn add_starts_download_when_requested() {
        let store = Arc::new(MemorySnapshotStore::new());
        let factory = Arc::new(FakeFactory::default());
        let registry = registry(&store, &factory);

        registry.add(A, AddOptions::default()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), factory.downloaded.notified())
            .await
            .unwrap();

        assert_eq!(factory.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn need_is_get_or_create() {
        let store = Arc::new(MemorySnapshotStore::new());
        let registry = registry(&store, &Arc::new(FakeFactory::default()));

        let first = registry.need(A, no_download()).await.unwrap();
        let second = registry.need(A, no_download()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn concurrent_loads_run_once() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot(json!({
            A: {"serving": true},
            B: {"serving": true}
        }))));
        let factory = Arc::new(FakeFactory::with_local(&[A, B]));
        let registry = registry(&store, &factory);

        let reports =
            futures::future::join_all((0..5).map(|_| registry.load(true, false))).await;

        assert_eq!(registry.load_runs(), 1);
        assert!(reports.iter().all(|r| r.loaded.len() == 2));
        assert!(registry.is_loaded().await);
        assert_eq!(registry.list().await.len(), 2);
    }

    #[tokio::test]
    async fn lookups_load_only_once() {
        let store = Arc::new(MemorySnapshotStore::new());
        let registry = registry(&store, &Arc::new(FakeFactory::default()));

        assert!(registry.get(A).await.is_none());
        assert!(registry.get(B).await.is_none());
        registry.list().await;

        assert_eq!(registry.load_runs(), 1);
    }

    #[tokio::test]
    async fn load_skips_sites_that_fail_to_open() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot(json!({
            A: {"serving": true},
            B: {"serving": true},
            "not-an-address": {"serving": true}
        }))));
        let factory = Arc::new(FakeFactory::with_local(&[A, B]));
        lock(&factory.broken).insert(B.to_string());
        let registry = registry(&store, &factory);

        let report = registry.load(true, false).await;

        assert_eq!(report.loaded, vec![Address::new(A).unwrap()]);
        assert!(report.failed.contains(&B.to_string()));
        assert!(report.failed.contains(&"not-an-address".to_string()));
        assert!(registry.get(B).await.is_none());
    }

    #[tokio::test]
    async fn badly_typed_entry_is_skipped_alone() {
        let store = Arc::new(MemorySnapshotStore::with_raw(
            [
                (A.to_string(), json!({"serving": true, "size": 100})),
                (B.to_string(), json!({"serving": true, "size": null})),
            ]
            .into_iter()
            .collect(),
        ));
        let factory = Arc::new(FakeFactory::with_local(&[A, B]));
        let registry = registry(&store, &factory);

        let report = registry.load(true, false).await;

        assert_eq!(report.loaded, vec![Address::new(A).unwrap()]);
        assert_eq!(report.failed, vec![B.to_string()]);

        let c = "1Name2NXVi1RDPDgf5617UoW7xA6YrhM9F";
        registry.add(c, no_download()).await.unwrap();
        let saved = store.current().unwrap();
        assert!(saved.contains_key(A));
        assert!(saved.contains_key(c));
    }

    #[tokio::test]
    async fn invalid_add_does_not_trigger_load() {
        let store = Arc::new(MemorySnapshotStore::new());
        let registry = registry(&store, &Arc::new(FakeFactory::default()));

        let result = registry.add("not-an-address", no_download()).await;

        assert!(matches!(result, Err(RegistryError::InvalidAddress(_))));
        assert_eq!(registry.load_runs(), 0);
        assert!(!registry.is_loaded().await);
    }

    #[tokio::test]
    async fn load_tolerates_unreadable_snapshot() {
        let store = Arc::new(MemorySnapshotStore::new());
        store.set_fail_reads(true);
        let registry = registry(&store, &Arc::new(FakeFactory::default()));

        let report = registry.load(true, true).await;

        assert_eq!(report, LoadReport::default());
        assert!(registry.is_loaded().await);
    }

    #[tokio::test]
    async fn use_db_storage_opens_without_local_files() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot(json!({
            A: {"serving": true, "use_db_storage": true}
        }))));
        let registry = registry(&store, &Arc::new(FakeFactory::default()));

        let report = registry.load(true, false).await;
        assert_eq!(report.loaded.len(), 1);
    }

    #[tokio::test]
    async fn undownloaded_site_is_ignored_outside_startup() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot(json!({
            A: {"serving": true}
        }))));
        let factory = Arc::new(FakeFactory::default());
        let registry = registry(&store, &factory);

        let report = registry.load(true, false).await;

        assert!(report.queued.is_empty());
        assert!(report.loaded.is_empty());
        assert_eq!(factory.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn startup_load_queues_acquisition() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot(json!({
            A: {"serving": true, "own": true}
        }))));
        let factory = Arc::new(FakeFactory::default());
        let registry = registry(&store, &factory);

        let report = registry.load(true, true).await;

        assert_eq!(report.queued, vec![Address::new(A).unwrap()]);
        assert!(report.loaded.is_empty());
        assert!(registry.is_loaded().await);

        registry.wait_for_acquisitions().await;
        let entry = registry.get(A).await.unwrap();
        // Acquisition keeps the settings found in the snapshot.
        assert!(entry.settings().own);
        assert!(store.current().unwrap().contains_key(A));

        tokio::time::timeout(Duration::from_secs(5), factory.downloaded.notified())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cleanup_drops_sites_missing_from_snapshot() {
        let store = Arc::new(MemorySnapshotStore::new());
        let factory = Arc::new(FakeFactory::with_local(&[A, B]));
        let registry = registry(&store, &factory);
        registry.add(A, no_download()).await.unwrap();
        registry.add(B, no_download()).await.unwrap();

        store
            .write(&snapshot(json!({ A: {"serving": true} })))
            .unwrap();

        let report = registry.load(false, false).await;
        assert!(report.removed.is_empty());
        assert_eq!(registry.list().await.len(), 2);

        let report = registry.load(true, false).await;
        assert_eq!(report.removed, vec![B.to_string()]);
        assert!(registry.get(B).await.is_none());
        assert!(registry.get(A).await.is_some());
    }

    #[tokio::test]
    async fn save_recalculates_sizes_and_strips_cache() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot(json!({
            A: {"serving": true}
        }))));
        let registry = registry(&store, &Arc::new(FakeFactory::with_local(&[A])));
        registry.load(true, false).await;

        let entry = registry.get(A).await.unwrap();
        entry.update_settings(|s| {
            s.cache.insert("bad_files".into(), json!({"index.html": 1}));
        });

        let outcome = registry.save(true).await.unwrap();

        assert_eq!(outcome, SaveOutcome::Saved { sites: 1 });
        let saved = store.current().unwrap();
        assert_eq!(saved[A].size, 100);
        assert_eq!(saved[A].size_optional, 20);
        assert!(saved[A].cache.is_empty());
        assert!(serde_json::to_value(&saved).unwrap()[A].get("cache").is_none());
        assert!(entry.settings().cache.is_empty());
    }

    #[tokio::test]
    async fn save_round_trips_through_fresh_registry() {
        let store = Arc::new(MemorySnapshotStore::new());
        let factory = Arc::new(FakeFactory::with_local(&[A, B]));
        let first = registry(&store, &factory);
        first.add(A, no_download()).await.unwrap();
        first.add(B, no_download()).await.unwrap();
        first.save(true).await.unwrap();

        let second = registry(&store, &factory);
        second.load(true, false).await;

        let before: BTreeMap<String, SiteSettings> = first
            .list()
            .await
            .into_iter()
            .map(|(k, e)| (k, e.settings()))
            .collect();
        let after: BTreeMap<String, SiteSettings> = second
            .list()
            .await
            .into_iter()
            .map(|(k, e)| (k, e.settings()))
            .collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn save_refused_before_load_or_when_empty() {
        let store = Arc::new(MemorySnapshotStore::new());
        let registry = registry(&store, &Arc::new(FakeFactory::default()));

        assert_eq!(registry.save(false).await.unwrap(), SaveOutcome::SkippedEmpty);
        registry.load(true, false).await;
        assert_eq!(registry.save(true).await.unwrap(), SaveOutcome::SkippedEmpty);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn save_surfaces_store_errors() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot(json!({
            A: {"serving": true}
        }))));
        let registry = registry(&store, &Arc::new(FakeFactory::with_local(&[A])));
        registry.load(true, false).await;
        store.set_fail_writes(true);

        assert!(matches!(
            registry.save(false).await,
            Err(RegistryError::Store(_))
        ));
    }

    #[tokio::test]
    async fn delete_persists_and_orphan_cleanup_follows() {
        let store = Arc::new(MemorySnapshotStore::new());
        let index = Arc::new(SqliteContentDb::open_in_memory().unwrap());
        let registry = SiteRegistry::builder(store.clone(), Arc::new(FakeFactory::default()))
            .content_index(index.clone())
            .build();

        registry.add(A, no_download()).await.unwrap();
        index.record_content(A, "content.json", 10).unwrap();
        let before = registry.last_changed().await;

        registry.delete(A).await.unwrap();

        assert!(registry.get(A).await.is_none());
        assert!(store.current().unwrap().is_empty());
        assert!(registry.last_changed().await >= before);

        let report = registry.load(true, false).await;
        assert_eq!(report.orphans, vec![A.to_string()]);
        assert!(registry.get(A).await.is_none());
        assert!(index.site_addresses().unwrap().is_empty());
        assert!(!index.is_cached(A));
    }

    #[tokio::test]
    async fn cleanup_keeps_index_rows_of_known_sites() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot(json!({
            A: {"serving": true}
        }))));
        let index = Arc::new(SqliteContentDb::open_in_memory().unwrap());
        index.ensure_site(A).unwrap();
        index.ensure_site(B).unwrap();
        let registry = SiteRegistry::builder(store, Arc::new(FakeFactory::default()))
            .content_index(index.clone())
            .build();

        let report = registry.load(true, false).await;

        // A is only in the snapshot (not downloaded) but still known.
        assert_eq!(report.orphans, vec![B.to_string()]);
        assert_eq!(index.site_addresses().unwrap(), vec![A.to_string()]);
    }

    #[tokio::test]
    async fn delete_unknown_site_is_not_found() {
        let store = Arc::new(MemorySnapshotStore::new());
        let registry = registry(&store, &Arc::new(FakeFactory::default()));
        registry.load(true, false).await;

        assert!(matches!(
            registry.delete(A).await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn domains_resolve_before_lookup() {
        struct Bit;
        impl DomainResolver for Bit {
            fn is_domain(&self, query: &str) -> bool {
                query.ends_with(".bit")
            }
            fn resolve_domain(&self, domain: &str) -> Option<String> {
                (domain == "hello.bit").then(|| A.to_string())
            }
        }

        let store = Arc::new(MemorySnapshotStore::new());
        let registry = SiteRegistry::builder(store, Arc::new(FakeFactory::default()))
            .domain_resolver(Arc::new(Bit))
            .build();
        registry.add(A, no_download()).await.unwrap();

        let site = registry.get("hello.bit").await.unwrap();
        assert_eq!(site.address().as_str(), A);
        let needed = registry.need("hello.bit", no_download()).await.unwrap();
        assert!(Arc::ptr_eq(&site, &needed));
    }

    #[tokio::test]
    async fn delayed_saves_coalesce() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot(json!({
            A: {"serving": true}
        }))));
        let registry = SiteRegistry::builder(store.clone(), Arc::new(FakeFactory::with_local(&[A])))
            .save_delay(Duration::from_millis(100))
            .build();
        registry.load(true, false).await;

        for _ in 0..4 {
            registry.save_delayed();
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        // One immediate save plus one trailing save for the burst.
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn update_settings_schedules_save() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot(json!({
            A: {"serving": true}
        }))));
        let registry = registry(&store, &Arc::new(FakeFactory::with_local(&[A])));

        let settings = registry
            .update_settings(A, |s| s.serving = false)
            .await
            .unwrap();
        assert!(!settings.serving);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!store.current().unwrap()[A].serving);
    }
}
