//! site-need command - Register a site if it is not known yet
//!
//! Unlike `main`, the download is awaited here rather than left to a
//! background task, because the process exits as soon as the action ends.

use anyhow::{Context as _, Result};

use super::session::Session;
use crate::cli::Context;
use crate::registry::AddOptions;
use crate::ui::output;

/// Get or create the site at `address`.
pub async fn site_need(ctx: &Context, address: &str, no_download: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    let result = need(&session, ctx, address, no_download).await;
    session.close(result).await
}

async fn need(session: &Session, ctx: &Context, address: &str, no_download: bool) -> Result<()> {
    session.load_all().await;
    let registry = session.registry();
    let existed = registry.get(address).await.is_some();

    let options = AddOptions {
        download_all_files: false,
        settings: None,
    };
    let entry = registry
        .need(address, options)
        .await
        .with_context(|| format!("cannot add site '{}'", address))?;

    if existed {
        output::print(format!("Site {} already registered", entry.address()), ctx.verbosity);
    } else {
        output::print(format!("Added site {}", entry.address()), ctx.verbosity);
    }

    if !no_download {
        let present = entry
            .handle()
            .download(true, true)
            .await
            .with_context(|| format!("download failed for {}", entry.address()))?;
        if present {
            output::print("Content present", ctx.verbosity);
        } else {
            output::print("Waiting for content", ctx.verbosity);
        }
    }
    Ok(())
}
