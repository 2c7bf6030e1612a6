//! cli::commands::publish
//!
//! Publish a change set document as one commit.
//!
//! Ctrl-C cancels the run while it is still preparing objects. Once the
//! branch update has been sent, the command waits for its answer.

use std::io::Read;
use std::path::Path;

use anyhow::{Context as _, Result};
use tokio_util::sync::CancellationToken;

use super::setup;
use crate::cli::Context;
use crate::core::change_set::ChangeSet;
use crate::core::types::BranchName;
use crate::publish::{CommitResult, PublishError, PublishOptions, Publisher};
use crate::ui::output::{self, Verbosity};

/// Run the publish command.
pub fn publish(
    ctx: &Context,
    changes: &Path,
    branch: Option<&str>,
    message: Option<&str>,
    concurrency: Option<usize>,
    check_actions: bool,
    json: bool,
) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(publish_async(
        ctx,
        changes,
        branch,
        message,
        concurrency,
        check_actions,
        json,
    ))
}

async fn publish_async(
    ctx: &Context,
    changes: &Path,
    branch: Option<&str>,
    message: Option<&str>,
    concurrency: Option<usize>,
    check_actions: bool,
    json: bool,
) -> Result<()> {
    let verbosity = ctx.verbosity();
    let config = setup::load_config(ctx)?;

    let mut change_set = read_change_set(changes)?;
    if let Some(message) = message {
        change_set = change_set.with_message(message);
    }

    let store = setup::connect(ctx, &config)?;
    let branch = setup::target_branch(&config, branch)?;
    let options = PublishOptions {
        blob_concurrency: concurrency.unwrap_or_else(|| config.blob_concurrency()),
        check_actions: check_actions && config.check_actions(),
        policy: config.path_policy(),
    };

    output::debug(
        format!(
            "publishing {} file(s) to {}/{}@{} ({} uploads in flight)",
            change_set.len(),
            store.owner(),
            store.repo(),
            branch,
            options.blob_concurrency
        ),
        verbosity,
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = Publisher::new(&store, options)
        .with_cancellation(cancel)
        .publish(&branch, &change_set)
        .await;

    match outcome {
        Ok(result) => report(&result, &branch, json, ctx.quiet, verbosity),
        Err(err) => {
            explain(&err, &branch, verbosity);
            Err(err.into())
        }
    }
}

/// Read and parse a change set document; `-` reads stdin.
fn read_change_set(path: &Path) -> Result<ChangeSet> {
    let raw = if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read change set from stdin")?;
        raw
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read change set {}", path.display()))?
    };

    ChangeSet::from_json(&raw).with_context(|| format!("Invalid change set {}", path.display()))
}

fn report(
    result: &CommitResult,
    branch: &BranchName,
    json: bool,
    quiet: bool,
    verbosity: Verbosity,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    if quiet {
        println!("{}", result.commit_id);
        return Ok(());
    }

    output::success(
        format!(
            "Published {} file{} to '{}' as {} (parent {}).",
            result.files_changed,
            if result.files_changed == 1 { "" } else { "s" },
            branch,
            result.commit_id.short(12),
            result.parent_id.short(12)
        ),
        verbosity,
    );
    if let Some(url) = &result.url {
        output::print(url, verbosity);
    }
    Ok(())
}

/// Tell the user what state the branch is in after a failure.
fn explain(err: &PublishError, branch: &BranchName, verbosity: Verbosity) {
    match err {
        PublishError::Conflict { .. } => output::hint(
            format!(
                "'{}' was updated by someone else. Nothing was published; re-run to publish on top of the new tip.",
                branch
            ),
            verbosity,
        ),
        PublishError::AmbiguousPublish { commit, .. } => output::hint(
            format!(
                "The update may or may not have been applied. Check whether '{}' points at {} before retrying.",
                branch, commit
            ),
            verbosity,
        ),
        err if err.is_retryable() => output::hint(
            format!("'{}' was not changed; it is safe to retry.", branch),
            verbosity,
        ),
        _ => {}
    }
}
