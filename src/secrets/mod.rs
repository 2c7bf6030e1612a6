//! secrets
//!
//! Credential storage and access-token resolution.
//!
//! # Token resolution
//!
//! The first non-empty source wins:
//!
//! 1. `GITPRESS_TOKEN`
//! 2. `GITHUB_TOKEN`
//! 3. the secret store key `github.token` (written by `gitpress auth`)
//!
//! # Security
//!
//! - Secrets are **never** logged or included in error messages
//! - The file store uses 0600 permissions on Unix
//! - All writes are atomic (temp file + rename)

mod file_store;
mod traits;

pub use file_store::FileSecretStore;
pub use traits::{SecretError, SecretStore};

/// The default secret store provider name.
pub const DEFAULT_PROVIDER: &str = "file";

/// Secret store key holding the GitHub token.
pub const TOKEN_KEY: &str = "github.token";

/// Environment variables consulted for a token, in order.
pub const TOKEN_ENV_VARS: &[&str] = &["GITPRESS_TOKEN", "GITHUB_TOKEN"];

/// Create a secret store for the configured provider.
pub fn create_store(provider: &str) -> Result<Box<dyn SecretStore>, SecretError> {
    match provider {
        "file" => Ok(Box::new(FileSecretStore::new()?)),
        other => Err(SecretError::ProviderNotAvailable(format!(
            "unknown secret provider: '{}' (valid: file)",
            other
        ))),
    }
}

/// Where a resolved token came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// An environment variable, by name
    Env(&'static str),
    /// The secret store
    Store,
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Env(name) => write!(f, "${}", name),
            TokenSource::Store => write!(f, "secret store ({})", TOKEN_KEY),
        }
    }
}

/// Resolve the access token from the process environment, then `store`.
pub fn resolve_token(
    store: &dyn SecretStore,
) -> Result<Option<(String, TokenSource)>, SecretError> {
    resolve_token_with(|name| std::env::var(name).ok(), store)
}

/// Resolve the access token using `env` to read environment variables.
pub fn resolve_token_with(
    env: impl Fn(&str) -> Option<String>,
    store: &dyn SecretStore,
) -> Result<Option<(String, TokenSource)>, SecretError> {
    for &name in TOKEN_ENV_VARS {
        if let Some(token) = env(name).filter(|t| !t.trim().is_empty()) {
            tracing::debug!(source = %name, "using token from environment");
            return Ok(Some((token.trim().to_string(), TokenSource::Env(name))));
        }
    }

    match store.get(TOKEN_KEY)? {
        Some(token) if !token.trim().is_empty() => {
            tracing::debug!("using token from secret store");
            Ok(Some((token.trim().to_string(), TokenSource::Store)))
        }
        _ => Ok(None),
    }
}
