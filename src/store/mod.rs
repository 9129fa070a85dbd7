//! store
//!
//! Persistence for the site registry snapshot.
//!
//! # Architecture
//!
//! The registry talks to a [`SnapshotStore`], which has two
//! implementations:
//!
//! - [`FileSnapshotStore`]: `<data_dir>/sites.json` (default)
//! - [`MemorySnapshotStore`]: in-process only
//!
//! All writes replace the whole document atomically.
//!
//! # Example
//!
//! ```ignore
//! use sitekeeper::store::{FileSnapshotStore, SnapshotStore};
//!
//! let store = FileSnapshotStore::new("data/sites.json");
//! let raw = store.read()?;
//! for (address, settings) in raw {
//!     println!("{}: {}", address, settings);
//! }
//! ```

mod file_store;
mod memory_store;
mod traits;

pub use file_store::FileSnapshotStore;
pub use memory_store::MemorySnapshotStore;
pub use traits::{RawSnapshot, Snapshot, SnapshotStore, StoreError};
