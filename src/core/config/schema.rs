//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$GITPRESS_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/gitpress/config.toml`
//! 3. `~/.gitpress/config.toml` (canonical write location)
//!
//! # Project Config
//!
//! Located at `gitpress.toml` in the working directory.
//!
//! # Validation
//!
//! Config values are validated after parsing so that a bad value fails
//! at load time rather than halfway through a publish.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::BranchName;

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// [publish]
/// blob_concurrency = 4
/// check_actions = true
///
/// [secrets]
/// provider = "file"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Publish defaults
    pub publish: Option<PublishDefaults>,

    /// Secret storage settings
    pub secrets: Option<SecretsConfig>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(publish) = &self.publish {
            publish.validate()?;
        }
        if let Some(secrets) = &self.secrets {
            secrets.validate()?;
        }
        Ok(())
    }
}

/// Project configuration.
///
/// # Example
///
/// ```toml
/// [repository]
/// owner = "myorg"
/// repo = "site-content"
/// branch = "main"
///
/// [paths]
/// denied_dirs = ["vendor", "target"]
///
/// [publish]
/// blob_concurrency = 8
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Remote repository identification
    pub repository: Option<RepositoryConfig>,

    /// Path gate extensions
    pub paths: Option<PathsConfig>,

    /// Publish overrides
    pub publish: Option<PublishDefaults>,
}

impl ProjectConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(repository) = &self.repository {
            repository.validate()?;
        }
        if let Some(publish) = &self.publish {
            publish.validate()?;
        }
        Ok(())
    }
}

/// Remote repository identification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Owner or organization
    pub owner: Option<String>,

    /// Repository name
    pub repo: Option<String>,

    /// Branch to publish to (default: "main")
    pub branch: Option<String>,

    /// API base URL (for GitHub Enterprise)
    pub api_base: Option<String>,
}

impl RepositoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("owner", &self.owner), ("repo", &self.repo)] {
            if let Some(value) = value {
                if value.trim().is_empty() || value.contains('/') {
                    return Err(ConfigError::InvalidValue(format!(
                        "repository {field} must be a non-empty name without '/'"
                    )));
                }
            }
        }

        if let Some(branch) = &self.branch {
            BranchName::new(branch).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid repository branch: {}", e))
            })?;
        }

        if let Some(api_base) = &self.api_base {
            if !api_base.starts_with("https://") && !api_base.starts_with("http://") {
                return Err(ConfigError::InvalidValue(format!(
                    "api_base must be an http(s) URL, got '{}'",
                    api_base
                )));
            }
        }

        Ok(())
    }
}

/// Path gate extensions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Extra dependency directories to reject
    pub denied_dirs: Option<Vec<String>>,
}

/// Publish defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PublishDefaults {
    /// Maximum blob uploads in flight
    pub blob_concurrency: Option<usize>,

    /// Compare create/modify against the base tree and warn on mismatch
    pub check_actions: Option<bool>,
}

impl PublishDefaults {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blob_concurrency == Some(0) {
            return Err(ConfigError::InvalidValue(
                "blob_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Secrets configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsConfig {
    /// Provider to use ("file")
    pub provider: Option<String>,
}

impl SecretsConfig {
    /// Valid secret providers.
    pub const VALID_PROVIDERS: &'static [&'static str] = &["file"];

    /// Validate the secrets configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(provider) = &self.provider {
            if !Self::VALID_PROVIDERS.contains(&provider.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid secrets provider '{}', must be one of: {}",
                    provider,
                    Self::VALID_PROVIDERS.join(", ")
                )));
            }
        }
        Ok(())
    }
}
