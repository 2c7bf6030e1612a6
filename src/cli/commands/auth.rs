//! cli::commands::auth
//!
//! Store, inspect, or remove the access token.
//!
//! # Design
//!
//! - Tokens are stored via [`SecretStore`] under `github.token`
//! - Tokens are NEVER printed to stdout/stderr
//! - `--status` reports where the token would come from, not its value
//!
//! # Example
//!
//! ```bash
//! # Interactive (prompts for token)
//! gitpress auth
//!
//! # Non-interactive
//! gitpress auth --token ghp_xxxx
//!
//! # Check status
//! gitpress auth --status
//!
//! # Remove stored token
//! gitpress auth --logout
//! ```

use std::io::{self, Write};

use anyhow::{bail, Context as _, Result};

use super::setup;
use crate::cli::Context;
use crate::secrets::{self, SecretStore, TokenSource, TOKEN_ENV_VARS, TOKEN_KEY};

/// Run the auth command.
pub fn auth(ctx: &Context, token: Option<&str>, status: bool, logout: bool) -> Result<()> {
    let config = setup::load_config(ctx)?;
    let store = secrets::create_store(config.secrets_provider())
        .context("Failed to initialize secret store")?;

    if status {
        return show_status(store.as_ref(), ctx.quiet);
    }

    if logout {
        return do_logout(store.as_ref(), ctx.quiet);
    }

    let token_value = get_token(ctx, token)?;
    validate_token(&token_value)?;

    store
        .set(TOKEN_KEY, &token_value)
        .context("Failed to store token")?;

    if !ctx.quiet {
        println!("Token stored.");
        if let Some(name) = env_override() {
            println!("Note: ${} is set and takes precedence over the stored token.", name);
        }
    }

    Ok(())
}

fn show_status(store: &dyn SecretStore, quiet: bool) -> Result<()> {
    let resolved = secrets::resolve_token(store)?;

    match (resolved, quiet) {
        (Some(_), true) => println!("authenticated"),
        (None, true) => println!("not_authenticated"),
        (Some((_, source)), false) => println!("Authenticated via {}.", source),
        (None, false) => {
            println!("Not authenticated.");
            println!("Run 'gitpress auth' or set GITPRESS_TOKEN.");
        }
    }

    Ok(())
}

fn do_logout(store: &dyn SecretStore, quiet: bool) -> Result<()> {
    store
        .delete(TOKEN_KEY)
        .context("Failed to remove stored token")?;

    if !quiet {
        println!("Stored token removed.");
        if let Some(name) = env_override() {
            println!(
                "Note: {} still provides a token.",
                TokenSource::Env(name)
            );
        }
    }

    Ok(())
}

/// The first token environment variable that is set.
fn env_override() -> Option<&'static str> {
    TOKEN_ENV_VARS.iter().copied().find(|name| {
        std::env::var(name)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    })
}

/// Get token from argument or interactive prompt.
fn get_token(ctx: &Context, token_arg: Option<&str>) -> Result<String> {
    if let Some(t) = token_arg {
        return Ok(t.trim().to_string());
    }

    if !ctx.interactive {
        bail!("Token required. Use --token <TOKEN> or run interactively.");
    }

    print!("GitHub token: ");
    io::stdout().flush()?;

    let token = rpassword::read_password().context("Failed to read token")?;
    Ok(token.trim().to_string())
}

/// Basic format checks; the token is not verified against the API.
fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() {
        bail!("Token cannot be empty.");
    }

    if token.len() < 10 {
        bail!("Token appears to be too short.");
    }

    if token.chars().any(char::is_whitespace) {
        bail!("Token should not contain whitespace.");
    }

    Ok(())
}
