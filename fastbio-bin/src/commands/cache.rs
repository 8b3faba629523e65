use std::io::Write;

use anyhow::Result;
use log::info;

use crate::{
    ExitCode,
    client::{cache_dir, create_session},
    options::{CacheCommand, Config},
};

/// Run a `cache` subcommand
pub(crate) fn cache(cfg: &Config, command: CacheCommand, out: &mut impl Write) -> Result<ExitCode> {
    match command {
        CacheCommand::Path => writeln!(out, "{}", cache_dir(cfg).display())?,
        CacheCommand::Clear => {
            let session = create_session(cfg)?;
            let removed = session.clear_cache()?;
            info!("Removed {removed} cached responses");
            writeln!(out, "{removed}")?;
        }
    }
    Ok(ExitCode::Success)
}
