//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! Action results go to stdout and respect the quiet flag. Errors and
//! warnings go to stderr. Diagnostics are not printed here; they go
//! through `tracing`.

use std::fmt::Display;

use serde::Serialize;

use crate::core::settings::SiteSettings;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - minimal output
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

/// Print a value as pretty JSON (always shown; it is the action's result).
pub fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format a byte count for display.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// One line of the site listing.
pub fn format_site_row(address: &str, settings: &SiteSettings) -> String {
    format!(
        "{:<35}  {:<7}  {:>10}  {:>10}",
        address,
        if settings.serving { "serving" } else { "paused" },
        format_size(settings.size),
        format_size(settings.size_optional),
    )
}

/// Format a list of items.
pub fn format_list<T: Display>(items: &[T], prefix: &str) -> String {
    items
        .iter()
        .map(|item| format!("{}{}", prefix, item))
        .collect::<Vec<_>>()
        .join("\n")
}
