//! core::settings
//!
//! Per-site settings as stored in `sites.json`.
//!
//! # Persistence
//!
//! Known options have typed fields. Anything else found in the snapshot is
//! kept in [`SiteSettings::extra`] and written back untouched, so settings
//! owned by other components survive a load/save cycle.
//!
//! The `cache` object is in-memory only. It is accepted when reading (older
//! snapshots may contain one) but never serialized.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Settings associated with one site address.
///
/// # Example
///
/// ```
/// use sitekeeper::core::settings::SiteSettings;
///
/// let mut settings = SiteSettings::new_site();
/// settings.cache.insert("bad_files".into(), serde_json::json!({}));
///
/// let json = serde_json::to_value(&settings).unwrap();
/// assert_eq!(json["serving"], true);
/// assert!(json.get("cache").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
    /// Whether the site is served to peers
    #[serde(default)]
    pub serving: bool,

    /// Total size of required files in bytes
    #[serde(default)]
    pub size: u64,

    /// Total size of optional files in bytes
    #[serde(default)]
    pub size_optional: u64,

    /// Content lives in the database instead of the site directory
    #[serde(default, skip_serializing_if = "is_false")]
    pub use_db_storage: bool,

    /// Site was created locally and we hold its key
    #[serde(default, skip_serializing_if = "is_false")]
    pub own: bool,

    /// Unix timestamp when the site was first added
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added: Option<i64>,

    /// Volatile per-site cache, cleared after every save
    #[serde(default, skip_serializing)]
    pub cache: Map<String, Value>,

    /// Options not modeled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SiteSettings {
    /// Settings for a site that is being added for the first time.
    pub fn new_site() -> Self {
        Self {
            serving: true,
            added: Some(Utc::now().timestamp()),
            ..Self::default()
        }
    }

    /// Record freshly computed size metrics.
    pub fn set_sizes(&mut self, (size, size_optional): (u64, u64)) {
        self.size = size;
        self.size_optional = size_optional;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_is_read_but_never_written() {
        let settings: SiteSettings = serde_json::from_value(json!({
            "serving": true,
            "cache": {"bad_files": {"index.html": 1}}
        }))
        .unwrap();
        assert_eq!(settings.cache["bad_files"], json!({"index.html": 1}));
        assert!(settings.extra.is_empty());

        let written = serde_json::to_value(&settings).unwrap();
        assert!(written.get("cache").is_none());
    }

    #[test]
    fn unknown_keys_round_trip() {
        let input = json!({
            "serving": false,
            "size": 12,
            "size_optional": 3,
            "permissions": ["ADMIN"],
            "wrapper_key": "abc"
        });
        let settings: SiteSettings = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(settings.extra["wrapper_key"], json!("abc"));
        assert_eq!(serde_json::to_value(&settings).unwrap(), input);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let settings: SiteSettings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings, SiteSettings::default());
    }

    #[test]
    fn new_site_is_serving() {
        let settings = SiteSettings::new_site();
        assert!(settings.serving);
        assert!(settings.added.is_some());
    }

    #[test]
    fn set_sizes_updates_both() {
        let mut settings = SiteSettings::default();
        settings.set_sizes((100, 20));
        assert_eq!((settings.size, settings.size_optional), (100, 20));
    }
}
