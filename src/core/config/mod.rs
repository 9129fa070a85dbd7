//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. CLI flags (applied by the caller through the `with_*` methods)
//!
//! # Config Locations
//!
//! Searched in order, first existing file wins:
//! 1. Explicit path passed by the caller (`--config`)
//! 2. `$SITEKEEPER_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/sitekeeper/config.toml`
//! 4. `~/.sitekeeper/config.toml`
//!
//! An explicit path that does not exist is an error; missing files at the
//! default locations are not.
//!
//! # Example
//!
//! ```no_run
//! use sitekeeper::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("Data dir: {}", config.data_dir().display());
//! println!("Save every {:?}", config.save_interval());
//! ```

pub mod schema;

pub use schema::{FileConfig, LoggingSection, RegistrySection};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default interval between periodic recalculating saves (10 minutes).
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Default window for coalescing delayed saves.
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_secs(5);

/// Default lifetime of memoized domain lookups.
pub const DEFAULT_DOMAIN_CACHE_TTL: Duration = Duration::from_secs(10);

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SITEKEEPER_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Parse a format name as accepted in the config file.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidValue(format!(
                "invalid log format '{}', must be one of: {}",
                other,
                schema::LOG_FORMATS.join(", ")
            ))),
        }
    }
}

/// Effective configuration: file values plus overrides, with defaults
/// applied by the accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    file: FileConfig,
    loaded_from: Option<PathBuf>,
    data_dir_override: Option<PathBuf>,
    log_format_override: Option<LogFormat>,
}

/// Serializable view of the effective configuration.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub config_file: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub save_interval_secs: u64,
    pub save_delay_secs: u64,
    pub domain_cache_ttl_secs: u64,
    pub log_format: LogFormat,
    pub log_level: String,
    pub version: &'static str,
}

impl Config {
    /// Load configuration from `explicit` or the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if `explicit` does not exist, or if a config file
    /// exists but cannot be read, parsed or validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = Self::locate(explicit)? else {
            return Ok(Self::default());
        };
        let file = Self::read_file(&path)?;
        file.validate()?;
        Ok(Self {
            file,
            loaded_from: Some(path),
            ..Self::default()
        })
    }

    /// Build a config directly from parsed file contents.
    pub fn from_file_config(file: FileConfig) -> Result<Self, ConfigError> {
        file.validate()?;
        Ok(Self {
            file,
            ..Self::default()
        })
    }

    fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            return Ok(Some(path.to_path_buf()));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(Some(path));
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("sitekeeper/config.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".sitekeeper/config.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Override the data directory (CLI `--data-dir`).
    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        if data_dir.is_some() {
            self.data_dir_override = data_dir;
        }
        self
    }

    /// Override the log format (CLI `--log-format`).
    pub fn with_log_format(mut self, format: Option<LogFormat>) -> Self {
        if format.is_some() {
            self.log_format_override = format;
        }
        self
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Data directory.
    ///
    /// Defaults to `data` in the working directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir_override
            .clone()
            .or_else(|| self.file.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    fn registry_secs(&self, pick: fn(&RegistrySection) -> Option<u64>) -> Option<Duration> {
        self.file
            .registry
            .as_ref()
            .and_then(pick)
            .map(Duration::from_secs)
    }

    /// Interval between periodic recalculating saves.
    pub fn save_interval(&self) -> Duration {
        self.registry_secs(|r| r.save_interval_secs)
            .unwrap_or(DEFAULT_SAVE_INTERVAL)
    }

    /// Coalescing window for delayed saves.
    pub fn save_delay(&self) -> Duration {
        self.registry_secs(|r| r.save_delay_secs)
            .unwrap_or(DEFAULT_SAVE_DELAY)
    }

    /// Lifetime of memoized domain lookups.
    pub fn domain_cache_ttl(&self) -> Duration {
        self.registry_secs(|r| r.domain_cache_ttl_secs)
            .unwrap_or(DEFAULT_DOMAIN_CACHE_TTL)
    }

    /// Log output format. Defaults to text.
    pub fn log_format(&self) -> LogFormat {
        if let Some(format) = self.log_format_override {
            return format;
        }
        self.file
            .logging
            .as_ref()
            .and_then(|l| l.format.as_deref())
            .and_then(|f| LogFormat::parse(f).ok())
            .unwrap_or(LogFormat::Text)
    }

    /// Default log filter. Defaults to `info`.
    pub fn log_level(&self) -> &str {
        self.file
            .logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or("info")
    }

    /// Path of the file this config was loaded from, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }

    /// Snapshot of every effective value, for display.
    pub fn effective(&self) -> EffectiveConfig {
        EffectiveConfig {
            config_file: self.loaded_from.clone(),
            data_dir: self.data_dir(),
            save_interval_secs: self.save_interval().as_secs(),
            save_delay_secs: self.save_delay().as_secs(),
            domain_cache_ttl_secs: self.domain_cache_ttl().as_secs(),
            log_format: self.log_format(),
            log_level: self.log_level().to_string(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
