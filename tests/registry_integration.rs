//! Registry integration tests against a real data directory.
//!
//! These use the on-disk snapshot store, local site handles reading
//! `content.json` files, and an in-memory SQLite content index.

use std::fs;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use sitekeeper::content_db::{ContentIndex, SqliteContentDb};
use sitekeeper::core::address::Address;
use sitekeeper::core::paths::DataPaths;
use sitekeeper::registry::{AddOptions, SaveOutcome, SiteRegistry};
use sitekeeper::site::LocalSiteFactory;
use sitekeeper::store::{FileSnapshotStore, SnapshotStore};

const A: &str = "1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D";
const B: &str = "1Name2NXVi1RDPDgf5617UoW7xA6YrhM9F";

struct DataDir {
    _dir: TempDir,
    paths: DataPaths,
    index: Arc<SqliteContentDb>,
}

impl DataDir {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path().join("data"));
        fs::create_dir_all(paths.data_dir()).unwrap();
        Self {
            _dir: dir,
            paths,
            index: Arc::new(SqliteContentDb::open_in_memory().unwrap()),
        }
    }

    fn registry(&self) -> Arc<SiteRegistry> {
        let store = Arc::new(FileSnapshotStore::new(self.paths.sites_json()));
        let factory = Arc::new(LocalSiteFactory::new(self.paths.clone()));
        SiteRegistry::builder(store, factory)
            .content_index(self.index.clone())
            .build()
    }

    fn store(&self) -> FileSnapshotStore {
        FileSnapshotStore::new(self.paths.sites_json())
    }

    /// Write a manifest and return its size in bytes.
    fn write_manifest(&self, address: &str, inner_path: &str, manifest: serde_json::Value) -> u64 {
        let address = Address::new(address).unwrap();
        let path = self.paths.site_file(&address, inner_path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let bytes = serde_json::to_vec_pretty(&manifest).unwrap();
        fs::write(&path, &bytes).unwrap();
        bytes.len() as u64
    }

    fn write_simple_site(&self, address: &str) -> u64 {
        self.write_manifest(
            address,
            "content.json",
            json!({
                "address": address,
                "files": {"index.html": {"size": 100}},
            }),
        )
    }
}

#[tokio::test]
async fn sites_survive_a_restart() {
    let data = DataDir::new();
    data.write_simple_site(A);

    let registry = data.registry();
    registry.add(A, AddOptions::default()).await.unwrap();
    registry
        .update_settings(A, |s| {
            s.own = true;
        })
        .await
        .unwrap();
    assert_eq!(
        registry.save(false).await.unwrap(),
        SaveOutcome::Saved { sites: 1 }
    );

    let restarted = data.registry();
    let entry = restarted.get(A).await.unwrap();
    let settings = entry.settings();
    assert!(settings.serving);
    assert!(settings.own);
    assert!(settings.added.is_some());
}

#[tokio::test]
async fn deleted_site_stays_deleted() {
    let data = DataDir::new();
    data.write_simple_site(A);

    let registry = data.registry();
    registry.add(A, AddOptions::default()).await.unwrap();
    registry.save(false).await.unwrap();
    registry.delete(A).await.unwrap();

    assert!(data.store().read().unwrap().is_empty());

    let restarted = data.registry();
    assert!(restarted.get(A).await.is_none());
    assert!(restarted.list().await.is_empty());
}

#[tokio::test]
async fn save_records_sizes_over_root_and_includes() {
    let data = DataDir::new();
    let root_bytes = data.write_manifest(
        A,
        "content.json",
        json!({
            "files": {"index.html": {"size": 100}, "js/all.js": {"size": 400}},
            "files_optional": {"video.mp4": {"size": 20}},
            "includes": {"data/users/content.json": {}},
        }),
    );
    let include_bytes = data.write_manifest(
        A,
        "data/users/content.json",
        json!({
            "files": {"list.json": {"size": 50}},
            "files_optional": {"avatar.png": {"size": 7}},
        }),
    );

    let registry = data.registry();
    registry.add(A, AddOptions::default()).await.unwrap();
    registry.save(true).await.unwrap();

    let snapshot = data.store().read().unwrap();
    let settings = &snapshot[A];
    assert_eq!(settings["size"], root_bytes + 500 + include_bytes + 50);
    assert_eq!(settings["size_optional"], 27);
}

#[tokio::test]
async fn missing_include_is_not_counted() {
    let data = DataDir::new();
    let root_bytes = data.write_manifest(
        A,
        "content.json",
        json!({
            "files": {"index.html": {"size": 100}},
            "includes": {"data/content.json": {}},
        }),
    );

    let registry = data.registry();
    registry.add(A, AddOptions::default()).await.unwrap();
    registry.save(true).await.unwrap();

    assert_eq!(data.store().read().unwrap()[A]["size"], root_bytes + 100);
}

#[tokio::test]
async fn oversized_manifest_saves_saturated_size() {
    let data = DataDir::new();
    data.write_manifest(
        A,
        "content.json",
        json!({
            "files": {"a": {"size": u64::MAX}, "b": {"size": 1}},
            "files_optional": {"c": {"size": u64::MAX}, "d": {"size": 1}},
        }),
    );

    let registry = data.registry();
    registry.add(A, AddOptions::default()).await.unwrap();
    registry.save(true).await.unwrap();

    let snapshot = data.store().read().unwrap();
    assert_eq!(snapshot[A]["size"], u64::MAX);
    assert_eq!(snapshot[A]["size_optional"], u64::MAX);
}

#[tokio::test]
async fn cache_is_never_written_to_disk() {
    let data = DataDir::new();
    data.write_simple_site(A);

    let registry = data.registry();
    let entry = registry.add(A, AddOptions::default()).await.unwrap();
    entry.update_settings(|s| {
        s.cache.insert("bad_files".into(), json!({"index.html": 1}));
    });
    registry.save(false).await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(data.paths.sites_json()).unwrap()).unwrap();
    assert!(raw[A].get("cache").is_none());
    assert!(entry.settings().cache.is_empty());
}

#[tokio::test]
async fn unknown_settings_are_preserved() {
    let data = DataDir::new();
    data.write_simple_site(A);
    fs::write(
        data.paths.sites_json(),
        serde_json::to_vec(&json!({A: {"serving": false, "permissions": ["ADMIN"]}})).unwrap(),
    )
    .unwrap();

    let registry = data.registry();
    assert!(!registry.get(A).await.unwrap().settings().serving);
    registry.save(false).await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(data.paths.sites_json()).unwrap()).unwrap();
    assert_eq!(raw[A]["permissions"], json!(["ADMIN"]));
}

#[tokio::test]
async fn corrupt_snapshot_is_tolerated_and_not_overwritten_empty() {
    let data = DataDir::new();
    fs::write(data.paths.sites_json(), "{not json").unwrap();

    let registry = data.registry();
    let report = registry.load(true, false).await;
    assert_eq!(report.added(), 0);
    assert!(registry.is_loaded().await);
    assert_eq!(registry.save(false).await.unwrap(), SaveOutcome::SkippedEmpty);
    assert_eq!(
        fs::read_to_string(data.paths.sites_json()).unwrap(),
        "{not json"
    );
}

#[tokio::test]
async fn badly_typed_entry_does_not_wipe_other_sites() {
    let data = DataDir::new();
    data.write_simple_site(A);
    fs::write(
        data.paths.sites_json(),
        serde_json::to_vec(&json!({
            A: {"serving": true, "size": 100},
            B: {"serving": true, "size": null},
        }))
        .unwrap(),
    )
    .unwrap();

    let registry = data.registry();
    let report = registry.load(true, false).await;
    assert_eq!(report.loaded, vec![Address::new(A).unwrap()]);
    assert_eq!(report.failed, vec![B.to_string()]);

    let c = "1BLogC9LN4oPDcruNz3qo1ysa133E9AGg8";
    data.write_simple_site(c);
    registry.add(c, AddOptions::default()).await.unwrap();

    let snapshot = data.store().read().unwrap();
    assert!(snapshot.contains_key(A));
    assert!(snapshot.contains_key(c));
    assert_eq!(snapshot[A]["size"], 100);
}

#[tokio::test]
async fn cleanup_removes_orphaned_index_rows() {
    let data = DataDir::new();
    data.write_simple_site(A);

    let registry = data.registry();
    registry.add(A, AddOptions::default()).await.unwrap();
    registry.save(false).await.unwrap();

    data.index.record_content(A, "content.json", 10).unwrap();
    data.index.record_content(B, "content.json", 10).unwrap();

    let restarted = data.registry();
    let report = restarted.load(true, false).await;

    assert_eq!(report.orphans, vec![B.to_string()]);
    assert_eq!(data.index.site_addresses().unwrap(), vec![A.to_string()]);
    assert!(!data.index.is_cached(B));
}

#[tokio::test]
async fn undownloaded_site_is_acquired_on_startup() {
    let data = DataDir::new();
    fs::write(
        data.paths.sites_json(),
        serde_json::to_vec(&json!({A: {"serving": true, "own": true}})).unwrap(),
    )
    .unwrap();

    let registry = data.registry();
    let report = registry.load(true, true).await;
    assert_eq!(report.queued.len(), 1);
    registry.wait_for_acquisitions().await;

    let entry = registry.get(A).await.unwrap();
    assert!(entry.settings().own);

    // Acquisition prepares the site directory.
    let address = Address::new(A).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !data.paths.site_dir(&address).is_dir() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
