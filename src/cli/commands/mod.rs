//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Async Commands
//!
//! Commands that talk to the remote (publish, show) are async internally.
//! Each handler builds a tokio runtime and blocks on its async body, so the
//! dispatch surface stays synchronous.

mod auth;
mod check_path;
mod completion;
mod publish;
mod setup;
mod show;

pub use auth::auth;
pub use check_path::check_path;
pub use completion::completion;
pub use publish::publish;
pub use show::show;

use anyhow::Result;

use super::args::Command;
use super::Context;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Publish {
            changes,
            branch,
            message,
            concurrency,
            no_check_actions,
            json,
        } => publish::publish(
            ctx,
            &changes,
            branch.as_deref(),
            message.as_deref(),
            concurrency,
            !no_check_actions,
            json,
        ),
        Command::CheckPath { paths } => check_path::check_path(ctx, &paths),
        Command::Show { path, branch } => show::show(ctx, &path, branch.as_deref()),
        Command::Auth {
            token,
            status,
            logout,
        } => auth::auth(ctx, token.as_deref(), status, logout),
        Command::Completion { shell } => completion::completion(shell),
    }
}
