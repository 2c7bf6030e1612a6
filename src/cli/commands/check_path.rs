//! cli::commands::check_path
//!
//! Run paths through the publish path policy without publishing anything.

use anyhow::{bail, Result};

use super::setup;
use crate::cli::Context;
use crate::ui::output;

/// Check each path; fails if any is rejected.
///
/// Rejections are printed even in quiet mode.
pub fn check_path(ctx: &Context, paths: &[String]) -> Result<()> {
    let verbosity = ctx.verbosity();
    let policy = setup::load_config(ctx)?.path_policy();

    let mut rejected = 0;
    for path in paths {
        match policy.check(path) {
            Ok(()) => output::print(format!("ok        {}", path), verbosity),
            Err(reason) => {
                rejected += 1;
                println!("rejected  {}: {}", path, reason);
            }
        }
    }

    if rejected > 0 {
        bail!(
            "{} of {} path{} rejected",
            rejected,
            paths.len(),
            if paths.len() == 1 { "" } else { "s" }
        );
    }
    Ok(())
}
