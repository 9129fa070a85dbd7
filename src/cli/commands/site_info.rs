//! site-info command - Show a site's settings

use anyhow::{bail, Result};

use super::session::Session;
use crate::cli::Context;
use crate::ui::output;

pub async fn site_info(ctx: &Context, address: &str) -> Result<()> {
    let session = Session::open(ctx)?;
    let result = info(&session, address).await;
    session.close(result).await
}

async fn info(session: &Session, address: &str) -> Result<()> {
    session.load_all().await;
    let Some(entry) = session.registry().get(address).await else {
        bail!("site not found: {}", address);
    };
    output::print_json(&entry.settings())?;
    Ok(())
}
