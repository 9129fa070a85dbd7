//! core
//!
//! Core domain types and process plumbing for Sitekeeper.
//!
//! # Modules
//!
//! - [`address`] - Validated site addresses
//! - [`settings`] - Per-site settings as persisted in `sites.json`
//! - [`paths`] - Centralized path routing inside the data directory
//! - [`config`] - Configuration schema and loading
//! - [`logging`] - `tracing` subscriber setup
//! - [`bootstrap`] - Data directory preparation
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid addresses from entering the registry
//! - Persisted schemas tolerate unknown fields and keep them

pub mod address;
pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod paths;
pub mod settings;
