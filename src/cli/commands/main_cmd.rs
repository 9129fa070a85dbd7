//! main command - Run the client until interrupted
//!
//! Loads every known site in startup mode, which also queues acquisition
//! of sites that are listed in `sites.json` but not downloaded yet, then
//! waits for Ctrl-C. The session performs the final save on the way out.

use anyhow::{Context as _, Result};
use tracing::{error, info};

use super::session::Session;
use crate::cli::Context;
use crate::ui::output;

/// Run the client.
pub async fn main(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let result = serve(&session, ctx).await;
    session.close(result).await
}

async fn serve(session: &Session, ctx: &Context) -> Result<()> {
    let sites = session.registry().list().await;

    for message in &session.bootstrap().startup_errors {
        error!(message = %message, "startup error");
        output::warn(message, ctx.verbosity);
    }

    info!(
        sites = sites.len(),
        data_dir = %session.paths().data_dir().display(),
        "client started"
    );
    output::print(
        format!(
            "Serving {} site(s) from {}. Press Ctrl-C to stop.",
            sites.len(),
            session.paths().data_dir().display()
        ),
        ctx.verbosity,
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutting down");
    Ok(())
}
