//! cli::commands::setup
//!
//! Configuration, credentials, and store construction shared by commands.

use anyhow::{anyhow, bail, Context as _, Result};

use crate::cli::Context;
use crate::core::config::{Config, PROJECT_CONFIG_FILE};
use crate::core::types::BranchName;
use crate::secrets;
use crate::store::github::{parse_repo_slug, GitHubStore, DEFAULT_API_BASE};

/// Load global and project configuration for this invocation.
pub(crate) fn load_config(ctx: &Context) -> Result<Config> {
    let dir = ctx.project_dir()?;
    Config::load(Some(&dir)).context("Failed to load configuration")
}

/// Build the GitHub store for the target repository.
///
/// `--repo` wins over `[repository]` in the project config.
pub(crate) fn connect(ctx: &Context, config: &Config) -> Result<GitHubStore> {
    let (owner, repo) = match &ctx.repo {
        Some(slug) => parse_repo_slug(slug)
            .ok_or_else(|| anyhow!("Invalid --repo '{}': expected OWNER/REPO", slug))?,
        None => match (config.owner(), config.repo()) {
            (Some(owner), Some(repo)) => (owner.to_string(), repo.to_string()),
            _ => bail!(
                "No repository configured. Pass --repo OWNER/REPO or set [repository] owner and repo in {}.",
                PROJECT_CONFIG_FILE
            ),
        },
    };

    let secret_store = secrets::create_store(config.secrets_provider())
        .context("Failed to initialize secret store")?;
    let (token, source) = secrets::resolve_token(secret_store.as_ref())?
        .ok_or_else(|| anyhow!("Not authenticated. Run 'gitpress auth' or set GITPRESS_TOKEN."))?;

    let api_base = config.api_base().unwrap_or(DEFAULT_API_BASE);
    tracing::debug!(%owner, %repo, %api_base, token_source = %source, "connecting");

    Ok(GitHubStore::with_api_base(token, owner, repo, api_base))
}

/// The branch named on the command line, else the configured one.
pub(crate) fn target_branch(config: &Config, arg: Option<&str>) -> Result<BranchName> {
    let name = arg.unwrap_or_else(|| config.branch());
    BranchName::new(name).with_context(|| format!("Invalid branch name '{}'", name))
}
