//! content_db::sqlite
//!
//! SQLite-backed content index (`<data_dir>/content.db`).
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE site (
//!     site_id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     address TEXT NOT NULL UNIQUE
//! );
//! CREATE TABLE content (
//!     content_id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     site_id INTEGER NOT NULL REFERENCES site (site_id) ON DELETE CASCADE,
//!     inner_path TEXT NOT NULL,
//!     size INTEGER NOT NULL DEFAULT 0,
//!     UNIQUE (site_id, inner_path)
//! );
//! ```
//!
//! Deleting a site row cascades to its content rows.
//!
//! The registry only reads and prunes this index through [`ContentIndex`].
//! Rows are written by the component that stores downloaded content, via
//! [`SqliteContentDb::record_content`]; nothing in this crate populates it.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::traits::{ContentIndex, IndexError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS site (
        site_id INTEGER PRIMARY KEY AUTOINCREMENT,
        address TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS content (
        content_id INTEGER PRIMARY KEY AUTOINCREMENT,
        site_id INTEGER NOT NULL REFERENCES site (site_id) ON DELETE CASCADE,
        inner_path TEXT NOT NULL,
        size INTEGER NOT NULL DEFAULT 0,
        UNIQUE (site_id, inner_path)
    );
";

fn query_err(e: rusqlite::Error) -> IndexError {
    IndexError::QueryError(e.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Content index stored in SQLite.
#[derive(Debug)]
pub struct SqliteContentDb {
    conn: Mutex<Connection>,
    /// address -> site_id
    site_ids: Mutex<HashMap<String, i64>>,
    /// Addresses with content recorded during this process
    sites: Mutex<HashSet<String>>,
}

impl SqliteContentDb {
    /// Open (creating if needed) the index at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let conn =
            Connection::open(path.as_ref()).map_err(|e| IndexError::OpenError(e.to_string()))?;
        Self::init(conn)
    }

    /// Open an in-memory index.
    pub fn open_in_memory() -> Result<Self, IndexError> {
        let conn = Connection::open_in_memory().map_err(|e| IndexError::OpenError(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, IndexError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| IndexError::OpenError(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| IndexError::OpenError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            site_ids: Mutex::new(HashMap::new()),
            sites: Mutex::new(HashSet::new()),
        })
    }

    /// Row id for `address`, inserting a site row if there is none.
    pub fn ensure_site(&self, address: &str) -> Result<i64, IndexError> {
        if let Some(id) = lock(&self.site_ids).get(address) {
            return Ok(*id);
        }

        let conn = lock(&self.conn);
        conn.execute(
            "INSERT OR IGNORE INTO site (address) VALUES (?1)",
            params![address],
        )
        .map_err(query_err)?;
        let id: i64 = conn
            .query_row(
                "SELECT site_id FROM site WHERE address = ?1",
                params![address],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        drop(conn);

        lock(&self.site_ids).insert(address.to_string(), id);
        Ok(id)
    }

    /// Row id for `address` if it is indexed.
    pub fn site_id(&self, address: &str) -> Result<Option<i64>, IndexError> {
        if let Some(id) = lock(&self.site_ids).get(address) {
            return Ok(Some(*id));
        }
        let id = lock(&self.conn)
            .query_row(
                "SELECT site_id FROM site WHERE address = ?1",
                params![address],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?;
        if let Some(id) = id {
            lock(&self.site_ids).insert(address.to_string(), id);
        }
        Ok(id)
    }

    /// Record one content manifest of a site.
    pub fn record_content(
        &self,
        address: &str,
        inner_path: &str,
        size: u64,
    ) -> Result<(), IndexError> {
        let site_id = self.ensure_site(address)?;
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        lock(&self.conn)
            .execute(
                "INSERT INTO content (site_id, inner_path, size) VALUES (?1, ?2, ?3)
                 ON CONFLICT (site_id, inner_path) DO UPDATE SET size = excluded.size",
                params![site_id, inner_path, size],
            )
            .map_err(query_err)?;
        lock(&self.sites).insert(address.to_string());
        Ok(())
    }

    /// Number of content rows recorded for `address`.
    pub fn content_count(&self, address: &str) -> Result<u64, IndexError> {
        let count: i64 = lock(&self.conn)
            .query_row(
                "SELECT COUNT(*) FROM content JOIN site USING (site_id) WHERE site.address = ?1",
                params![address],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Whether `address` is held in either lookup cache.
    pub fn is_cached(&self, address: &str) -> bool {
        lock(&self.site_ids).contains_key(address) || lock(&self.sites).contains(address)
    }
}

impl ContentIndex for SqliteContentDb {
    fn site_addresses(&self) -> Result<Vec<String>, IndexError> {
        let conn = lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT address FROM site ORDER BY site_id")
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn delete_site(&self, address: &str) -> Result<(), IndexError> {
        let deleted = lock(&self.conn)
            .execute("DELETE FROM site WHERE address = ?1", params![address])
            .map_err(query_err)?;
        debug!(address, deleted, "deleted site rows from content index");
        Ok(())
    }

    fn forget(&self, address: &str) {
        lock(&self.site_ids).remove(address);
        lock(&self.sites).remove(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const A: &str = "1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D";
    const B: &str = "1BlogAddressxxxxxxxxxxxxxxxxxxxx";

    #[test]
    fn ensure_site_is_idempotent() {
        let db = SqliteContentDb::open_in_memory().unwrap();
        let first = db.ensure_site(A).unwrap();
        let second = db.ensure_site(A).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.site_addresses().unwrap(), vec![A.to_string()]);
    }

    #[test]
    fn site_addresses_in_insertion_order() {
        let db = SqliteContentDb::open_in_memory().unwrap();
        db.ensure_site(B).unwrap();
        db.ensure_site(A).unwrap();
        assert_eq!(db.site_addresses().unwrap(), vec![B.to_string(), A.to_string()]);
    }

    #[test]
    fn delete_cascades_to_content() {
        let db = SqliteContentDb::open_in_memory().unwrap();
        db.record_content(A, "content.json", 120).unwrap();
        db.record_content(A, "data/users/content.json", 80).unwrap();
        db.record_content(B, "content.json", 10).unwrap();
        assert_eq!(db.content_count(A).unwrap(), 2);

        db.delete_site(A).unwrap();

        assert_eq!(db.site_addresses().unwrap(), vec![B.to_string()]);
        assert_eq!(db.content_count(A).unwrap(), 0);
        assert_eq!(db.content_count(B).unwrap(), 1);
    }

    #[test]
    fn forget_clears_both_caches() {
        let db = SqliteContentDb::open_in_memory().unwrap();
        db.record_content(A, "content.json", 1).unwrap();
        assert!(db.is_cached(A));

        db.forget(A);
        assert!(!db.is_cached(A));
        // The row itself is untouched.
        assert!(db.site_id(A).unwrap().is_some());
    }

    #[test]
    fn delete_missing_site_is_ok() {
        let db = SqliteContentDb::open_in_memory().unwrap();
        assert!(db.delete_site(A).is_ok());
    }

    #[test]
    fn record_content_updates_size() {
        let db = SqliteContentDb::open_in_memory().unwrap();
        db.record_content(A, "content.json", 1).unwrap();
        db.record_content(A, "content.json", 2).unwrap();
        assert_eq!(db.content_count(A).unwrap(), 1);
    }

    #[test]
    fn persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("content.db");
        {
            let db = SqliteContentDb::open(&path).unwrap();
            db.ensure_site(A).unwrap();
        }
        let db = SqliteContentDb::open(&path).unwrap();
        assert_eq!(db.site_addresses().unwrap(), vec![A.to_string()]);
        assert!(db.site_id(A).unwrap().is_some());
    }
}
