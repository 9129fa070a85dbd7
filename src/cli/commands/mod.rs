//! cli::commands
//!
//! Action dispatch and handlers.
//!
//! # Architecture
//!
//! Each site action:
//! 1. Opens a [`Session`] (data directory setup plus registry service)
//! 2. Runs against the registry
//! 3. Closes the session, which performs the final save even when the
//!    action failed
//!
//! `get-config` and `completion` do not touch the data directory.

mod completion;
mod get_config;
mod main_cmd;
mod session;
mod site_delete;
mod site_info;
mod site_list;
mod site_need;

pub use completion::completion;
pub use get_config::get_config;
pub use main_cmd::main;
pub use session::Session;
pub use site_delete::site_delete;
pub use site_info::site_info;
pub use site_list::site_list;
pub use site_need::site_need;

use anyhow::Result;
use tracing::debug;

use crate::cli::args::Command;
use crate::cli::Context;

/// Dispatch an action to its handler.
pub async fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    debug!(
        version = env!("CARGO_PKG_VERSION"),
        action = command.name(),
        "sitekeeper"
    );

    match command {
        Command::Main => main_cmd::main(ctx).await,
        Command::SiteList => site_list::site_list(ctx).await,
        Command::SiteNeed {
            address,
            no_download,
        } => site_need::site_need(ctx, &address, no_download).await,
        Command::SiteDelete { address } => site_delete::site_delete(ctx, &address).await,
        Command::SiteInfo { address } => site_info::site_info(ctx, &address).await,
        Command::GetConfig => get_config::get_config(ctx),
        Command::Completion { shell } => completion::completion(shell),
    }
}
