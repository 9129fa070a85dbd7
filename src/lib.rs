//! Sitekeeper - site registry and client for peer-to-peer content sites
//!
//! A site is a content bundle identified by an address derived from a
//! cryptographic key. Sitekeeper tracks which sites the local client
//! knows, persists their settings to `sites.json`, and keeps that index
//! consistent with the content on disk and in the content database.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, dispatches actions)
//! - [`registry`] - The site registry: load, save, lookup, creation, deletion
//! - [`site`] - Site handles and content manifests
//! - [`store`] - Persistence of the registry snapshot
//! - [`content_db`] - Content index consulted during orphan cleanup
//! - [`core`] - Addresses, settings, paths, config, logging, bootstrap
//! - [`ui`] - User-facing output
//!
//! # Correctness Invariants
//!
//! 1. Every registered site has a valid address, and no two differ only in case
//! 2. The snapshot is replaced atomically and never with a partial view
//! 3. Volatile per-site cache data is never persisted
//! 4. A deleted site does not come back on the next load

pub mod cli;
pub mod content_db;
pub mod core;
pub mod registry;
pub mod site;
pub mod store;
pub mod ui;
