//! get-config command - Show the effective configuration

use anyhow::Result;

use crate::cli::Context;
use crate::ui::output;

pub fn get_config(ctx: &Context) -> Result<()> {
    output::print_json(&ctx.config.effective())?;
    Ok(())
}
