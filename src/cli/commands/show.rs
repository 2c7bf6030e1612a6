//! cli::commands::show
//!
//! Print a file's current content on a branch.

use std::io::Write;

use anyhow::{bail, Context as _, Result};

use super::setup;
use crate::cli::Context;
use crate::store::ObjectStore;

/// Write the raw file bytes to stdout.
pub fn show(ctx: &Context, path: &str, branch: Option<&str>) -> Result<()> {
    let config = setup::load_config(ctx)?;
    let store = setup::connect(ctx, &config)?;
    let branch = setup::target_branch(&config, branch)?;

    let rt = tokio::runtime::Runtime::new()?;
    let content = rt
        .block_on(store.get_file(path, &branch))
        .with_context(|| format!("Failed to read '{}' on '{}'", path, branch))?;

    match content {
        Some(bytes) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
            Ok(())
        }
        None => bail!("'{}' does not exist on '{}'", path, branch),
    }
}
