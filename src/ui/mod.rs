//! ui
//!
//! User-facing output.
//!
//! # Modules
//!
//! - [`output`] - Output formatting and display
//!
//! # Design
//!
//! Action handlers print through this module so that quiet mode and the
//! stdout/stderr split are handled in one place.

pub mod output;
