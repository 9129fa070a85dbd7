//! core::logging
//!
//! Single initialization point for `tracing` output.
//!
//! The filter comes from `RUST_LOG` when set. Otherwise it is derived from
//! the CLI verbosity flags, falling back to the configured level.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

use crate::core::config::LogFormat;
use crate::ui::output::Verbosity;

static INIT_ONCE: Once = Once::new();

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(verbosity: Verbosity, configured: &str) -> String {
    match verbosity {
        Verbosity::Debug => "debug".to_string(),
        Verbosity::Quiet => "warn".to_string(),
        Verbosity::Normal => configured.to_string(),
    }
}

/// Install the global subscriber. Later calls are no-ops.
///
/// Logs go to stderr so that action output on stdout stays parseable.
pub fn init(format: LogFormat, verbosity: Verbosity, configured_level: &str) {
    INIT_ONCE.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(default_directive(verbosity, configured_level))
        });

        let result = match format {
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
        };

        // A subscriber installed by an embedding application or a test
        // harness takes precedence.
        if let Err(e) = result {
            eprintln!("warning: logging already initialized: {}", e);
        }
    });
}
