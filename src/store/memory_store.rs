//! store::memory_store
//!
//! In-memory snapshot storage.
//!
//! Used by embedders that do not want a file on disk and by tests, which
//! can count writes, seed raw snapshots and inject failures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::traits::{RawSnapshot, Snapshot, SnapshotStore, StoreError};

/// Snapshot store that keeps the document in memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<RawSnapshot>>,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `snapshot`.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let raw = to_raw(&snapshot).unwrap_or_default();
        Self::with_raw(raw)
    }

    /// Create a store holding entries exactly as given, valid or not.
    pub fn with_raw(raw: RawSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(raw)),
            ..Self::default()
        }
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current contents as settings, if anything was ever stored.
    /// Entries that do not parse are left out.
    pub fn current(&self) -> Option<Snapshot> {
        self.lock().as_ref().map(|raw| {
            raw.iter()
                .filter_map(|(k, v)| {
                    serde_json::from_value(v.clone()).ok().map(|s| (k.clone(), s))
                })
                .collect()
        })
    }

    /// Make subsequent reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<RawSnapshot>> {
        // Only plain data is behind the lock; a poisoned guard is still valid.
        self.snapshot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn read(&self) -> Result<RawSnapshot, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::ReadError("injected read failure".into()));
        }
        Ok(self.lock().clone().unwrap_or_default())
    }

    fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteError("injected write failure".into()));
        }
        let raw = to_raw(snapshot).map_err(|e| StoreError::WriteError(e.to_string()))?;
        *self.lock() = Some(raw);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

fn to_raw(snapshot: &Snapshot) -> Result<RawSnapshot, serde_json::Error> {
    snapshot
        .iter()
        .map(|(k, v)| Ok((k.clone(), serde_json::to_value(v)?)))
        .collect()
}
