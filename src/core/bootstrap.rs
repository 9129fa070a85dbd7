//! core::bootstrap
//!
//! Data directory setup performed before anything else touches it.
//!
//! # Behavior
//!
//! - Creates the data directory if missing and, on Unix, restricts it to
//!   the owner (`0700`). Failing to change permissions is a startup error,
//!   not a fatal one.
//! - Seeds `sites.json` and `users.json` with `{}` when absent so later
//!   readers never see a missing file on a fresh install.
//!
//! Startup errors are collected and handed back to the caller, which
//! reports them once the client is up.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use thiserror::Error;
use tracing::{debug, info};

use crate::core::paths::DataPaths;

/// Errors that prevent the data directory from being usable at all.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("cannot create data directory '{path}': {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("cannot create '{path}': {source}")]
    SeedFile { path: PathBuf, source: io::Error },
}

/// Outcome of [`init_dirs`].
#[derive(Debug, Default)]
pub struct Bootstrap {
    /// The data directory did not exist and was created.
    pub created_data_dir: bool,
    /// Seed files written during this run.
    pub seeded: Vec<PathBuf>,
    /// Non-fatal problems to report after startup.
    pub startup_errors: Vec<String>,
}

/// Prepare the data directory.
///
/// # Errors
///
/// Returns an error if the directory or a seed file cannot be created.
pub fn init_dirs(paths: &DataPaths) -> Result<Bootstrap, BootstrapError> {
    let mut report = Bootstrap::default();
    let data_dir = paths.data_dir();

    if !data_dir.is_dir() {
        fs::create_dir_all(data_dir).map_err(|e| BootstrapError::CreateDir {
            path: data_dir.to_path_buf(),
            source: e,
        })?;
        report.created_data_dir = true;
        info!(path = %data_dir.display(), "created data directory");

        if let Err(e) = restrict_permissions(data_dir) {
            report.startup_errors.push(format!(
                "Can't change permission of {}: {}",
                data_dir.display(),
                e
            ));
        }
    }

    for path in [paths.sites_json(), paths.users_json()] {
        if seed_json(&path)? {
            debug!(path = %path.display(), "seeded empty json file");
            report.seeded.push(path);
        }
    }

    Ok(report)
}

#[cfg(unix)]
fn restrict_permissions(dir: &Path) -> io::Result<()> {
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn restrict_permissions(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Write `{}` to `path` unless a file is already there.
fn seed_json(path: &Path) -> Result<bool, BootstrapError> {
    if path.is_file() {
        return Ok(false);
    }
    fs::write(path, "{}").map_err(|e| BootstrapError::SeedFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(true)
}
