//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--data-dir <path>`: Data directory (overrides the config file)
//! - `--config <path>`: Explicit config file
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output
//! - `--log-format text|json`: Log line format

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::config::LogFormat;
use crate::ui::output::Verbosity;

/// Sitekeeper - registry and client for peer-to-peer sites
#[derive(Parser, Debug)]
#[command(name = "sitekeeper")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Data directory holding sites.json, content.db and site content
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Config file to use instead of the default locations
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, value_name = "FORMAT")]
    pub log_format: Option<LogFormatArg>,

    /// Action to run (defaults to `main`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Output verbosity implied by `--quiet` and `--debug`.
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.debug)
    }
}

/// Available actions.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the client: load all sites and keep them until interrupted
    #[command(
        name = "main",
        long_about = "Run the client.\n\n\
            Prepares the data directory, loads every known site and starts \
            acquiring sites listed in sites.json that have no local content yet. \
            Site settings are saved periodically and once more on Ctrl-C."
    )]
    Main,

    /// List registered sites
    #[command(name = "site-list")]
    SiteList,

    /// Register a site if it is not known yet
    #[command(
        name = "site-need",
        after_help = "\
EXAMPLES:
    # Register a site and check for its content
    sitekeeper site-need 1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D

    # Register only
    sitekeeper site-need 1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D --no-download"
    )]
    SiteNeed {
        /// Site address
        address: String,

        /// Do not start downloading the site's files
        #[arg(long)]
        no_download: bool,
    },

    /// Remove a site from the registry
    #[command(name = "site-delete")]
    SiteDelete {
        /// Site address
        address: String,
    },

    /// Show a site's settings as JSON
    #[command(name = "site-info")]
    SiteInfo {
        /// Site address
        address: String,
    },

    /// Show the effective configuration as JSON
    #[command(name = "get-config")]
    GetConfig,

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
EXAMPLES:
    # Bash
    sitekeeper completion bash > ~/.local/share/bash-completion/completions/sitekeeper

    # Zsh
    sitekeeper completion zsh > ~/.zfunc/_sitekeeper

    # Fish
    sitekeeper completion fish > ~/.config/fish/completions/sitekeeper.fish"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Command {
    /// Action name as typed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Main => "main",
            Command::SiteList => "site-list",
            Command::SiteNeed { .. } => "site-need",
            Command::SiteDelete { .. } => "site-delete",
            Command::SiteInfo { .. } => "site-info",
            Command::GetConfig => "get-config",
            Command::Completion { .. } => "completion",
        }
    }
}

/// Log formats accepted by `--log-format`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Supported shells for completion
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}
