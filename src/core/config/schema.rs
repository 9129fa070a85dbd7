//! core::config::schema
//!
//! Configuration file schema.
//!
//! # Example
//!
//! ```toml
//! data_dir = "/var/lib/sitekeeper"
//!
//! [registry]
//! save_interval_secs = 600
//! save_delay_secs = 5
//! domain_cache_ttl_secs = 10
//!
//! [logging]
//! format = "json"
//! level = "info"
//! ```
//!
//! # Validation
//!
//! Values are checked after parsing: intervals must be non-zero and the log
//! format must be one of the known formats.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Valid values for `logging.format`.
pub const LOG_FORMATS: [&str; 2] = ["text", "json"];

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Data directory (sites.json, users.json, site content)
    pub data_dir: Option<PathBuf>,

    /// Site registry tuning
    pub registry: Option<RegistrySection>,

    /// Logging output
    pub logging: Option<LoggingSection>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(registry) = &self.registry {
            registry.validate()?;
        }
        if let Some(logging) = &self.logging {
            logging.validate()?;
        }
        Ok(())
    }
}

/// `[registry]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySection {
    /// Seconds between periodic size-recalculating saves
    pub save_interval_secs: Option<u64>,

    /// Window in which delayed save requests are coalesced
    pub save_delay_secs: Option<u64>,

    /// Lifetime of memoized domain lookups
    pub domain_cache_ttl_secs: Option<u64>,
}

impl RegistrySection {
    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("registry.save_interval_secs", self.save_interval_secs),
            ("registry.save_delay_secs", self.save_delay_secs),
            ("registry.domain_cache_ttl_secs", self.domain_cache_ttl_secs),
        ];
        for (name, value) in fields {
            if value == Some(0) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// "text" or "json"
    pub format: Option<String>,

    /// Default filter directive when RUST_LOG is unset
    pub level: Option<String>,
}

impl LoggingSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(format) = &self.format {
            if !LOG_FORMATS.contains(&format.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid log format '{}', must be one of: {}",
                    format,
                    LOG_FORMATS.join(", ")
                )));
            }
        }
        Ok(())
    }
}
