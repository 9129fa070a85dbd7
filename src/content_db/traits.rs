//! content_db::traits
//!
//! Content index trait definition.
//!
//! # Design
//!
//! The content index keeps one row per site plus per-file metadata keyed by
//! that row. The registry only needs enough of it to find and remove rows
//! for sites it no longer tracks, and to invalidate the index's in-process
//! lookup caches (`site_ids` and `sites`) for those addresses.

use thiserror::Error;

/// Errors from content index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Failed to open or initialize the index.
    #[error("failed to open content index: {0}")]
    OpenError(String),

    /// A query against the index failed.
    #[error("content index query failed: {0}")]
    QueryError(String),
}

/// Queryable store of per-site rows.
///
/// Implementations must be thread-safe (Send + Sync). Deletions are
/// best-effort from the registry's point of view: a failure leaves a stale
/// row for a later cleanup pass.
pub trait ContentIndex: Send + Sync {
    /// Addresses of every site row in the index.
    fn site_addresses(&self) -> Result<Vec<String>, IndexError>;

    /// Delete the site row for `address` (and anything hanging off it).
    fn delete_site(&self, address: &str) -> Result<(), IndexError>;

    /// Drop `address` from the lookup caches.
    fn forget(&self, address: &str);
}
