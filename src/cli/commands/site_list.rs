//! site-list command - List registered sites

use anyhow::Result;

use super::session::Session;
use crate::cli::Context;
use crate::ui::output;

/// Print one row per resident site.
pub async fn site_list(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let result = list(&session, ctx).await;
    session.close(result).await
}

async fn list(session: &Session, ctx: &Context) -> Result<()> {
    session.load_all().await;
    let sites = session.registry().list().await;
    if sites.is_empty() {
        output::print("No sites.", ctx.verbosity);
        return Ok(());
    }

    for (address, entry) in &sites {
        output::print(
            output::format_site_row(address, &entry.settings()),
            ctx.verbosity,
        );
    }
    Ok(())
}
