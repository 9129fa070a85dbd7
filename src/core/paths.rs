//! core::paths
//!
//! Centralized path routing for the data directory.
//!
//! # Storage Layout
//!
//! Everything lives under `<data_dir>/`:
//! - `sites.json` - Persisted site registry snapshot
//! - `users.json` - User keys and per-site user data
//! - `content.db` - Content index database
//! - `<address>/content.json` - Root content manifest of a downloaded site
//!
//! No code outside this module should join these names onto the data
//! directory by hand.
//!
//! # Example
//!
//! ```
//! use sitekeeper::core::paths::DataPaths;
//! use std::path::PathBuf;
//!
//! let paths = DataPaths::new("/var/lib/sitekeeper");
//! assert_eq!(
//!     paths.sites_json(),
//!     PathBuf::from("/var/lib/sitekeeper/sites.json")
//! );
//! ```

use std::path::{Path, PathBuf};

use crate::core::address::Address;

/// File name of the root content manifest inside a site directory.
pub const ROOT_MANIFEST: &str = "content.json";

/// Path routing for one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    data_dir: PathBuf,
}

impl DataPaths {
    /// Create path routing rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// The data directory itself.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Persisted registry snapshot.
    pub fn sites_json(&self) -> PathBuf {
        self.data_dir.join("sites.json")
    }

    /// User data file.
    pub fn users_json(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    /// Content index database.
    pub fn content_db(&self) -> PathBuf {
        self.data_dir.join("content.db")
    }

    /// Directory holding a site's files.
    pub fn site_dir(&self, address: &Address) -> PathBuf {
        self.data_dir.join(address.as_str())
    }

    /// A file inside a site directory, addressed by its inner path.
    ///
    /// `.` and `..` components are dropped so the result never leaves the
    /// site directory.
    pub fn site_file(&self, address: &Address, inner_path: &str) -> PathBuf {
        let mut path = self.site_dir(address);
        for part in inner_path
            .split('/')
            .filter(|p| !p.is_empty() && *p != "." && *p != "..")
        {
            path.push(part);
        }
        path
    }

    /// Root content manifest of a site.
    pub fn root_manifest(&self, address: &Address) -> PathBuf {
        self.site_file(address, ROOT_MANIFEST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Address {
        Address::new("1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D").unwrap()
    }

    #[test]
    fn data_files_live_under_data_dir() {
        let paths = DataPaths::new("/data");
        assert_eq!(paths.data_dir(), Path::new("/data"));
        assert_eq!(paths.sites_json(), PathBuf::from("/data/sites.json"));
        assert_eq!(paths.users_json(), PathBuf::from("/data/users.json"));
        assert_eq!(paths.content_db(), PathBuf::from("/data/content.db"));
    }

    #[test]
    fn site_paths() {
        let paths = DataPaths::new("/data");
        let a = addr();
        assert_eq!(
            paths.site_dir(&a),
            PathBuf::from("/data/1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D")
        );
        assert_eq!(
            paths.root_manifest(&a),
            PathBuf::from("/data/1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D/content.json")
        );
        assert_eq!(
            paths.site_file(&a, "data/users/content.json"),
            PathBuf::from("/data/1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D/data/users/content.json")
        );
    }

    #[test]
    fn site_file_stays_inside_site_dir() {
        let paths = DataPaths::new("/data");
        let a = addr();
        assert_eq!(
            paths.site_file(&a, "../../etc/passwd"),
            PathBuf::from("/data/1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D/etc/passwd")
        );
    }
}
