//! site-delete command - Remove a site from the registry

use anyhow::{bail, Result};

use super::session::Session;
use crate::cli::Context;
use crate::ui::output;

/// Delete the site at `address`. The removal is saved before returning.
pub async fn site_delete(ctx: &Context, address: &str) -> Result<()> {
    let session = Session::open(ctx)?;
    let result = delete(&session, ctx, address).await;
    session.close(result).await
}

async fn delete(session: &Session, ctx: &Context, address: &str) -> Result<()> {
    session.load_all().await;
    let registry = session.registry();
    let Some(entry) = registry.get(address).await else {
        bail!("site not found: {}", address);
    };

    registry.delete(entry.address().as_str()).await?;
    output::print(format!("Deleted site {}", entry.address()), ctx.verbosity);
    Ok(())
}
