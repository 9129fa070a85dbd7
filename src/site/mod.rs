//! site
//!
//! Site handles: the per-site runtime state the registry owns.
//!
//! # Architecture
//!
//! - [`SiteHandle`]: manifest access, size metrics, download trigger
//! - [`SiteFactory`]: how the registry constructs handles
//! - [`LocalSite`] / [`LocalSiteFactory`]: handles backed by the data
//!   directory (default)
//! - [`manifest`]: the `content.json` model

pub mod manifest;

mod local;
mod traits;

pub use local::{LocalSite, LocalSiteFactory};
pub use manifest::ContentManifest;
pub use traits::{SiteError, SiteFactory, SiteHandle};
