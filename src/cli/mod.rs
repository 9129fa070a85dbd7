//! cli
//!
//! Command-line interface layer for Sitekeeper.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and initialize logging
//! - Dispatch the chosen action on a Tokio runtime
//!
//! # Architecture
//!
//! The CLI layer is thin. Actions get the registry from a
//! [`commands::Session`], which owns the registry service and performs the
//! final save however the action ends.

pub mod args;
pub mod commands;

pub use args::{Cli, Command, Shell};

use anyhow::{Context as _, Result};

use crate::core::config::Config;
use crate::core::logging;
use crate::ui::output::Verbosity;

/// Settings shared by every action.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub verbosity: Verbosity,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let verbosity = cli.verbosity();

    let config = Config::load(cli.config.as_deref())
        .context("failed to load configuration")?
        .with_data_dir(cli.data_dir.clone())
        .with_log_format(cli.log_format.map(Into::into));

    logging::init(config.log_format(), verbosity, config.log_level());

    let ctx = Context { config, verbosity };
    let command = cli.command.unwrap_or(Command::Main);

    // Tasks interleave only at await points, one thread at a time.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(commands::dispatch(command, &ctx))
}
