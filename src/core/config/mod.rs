//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! gitpress has two configuration scopes:
//! - **Global**: User-level settings (publish defaults, secrets provider)
//! - **Project**: `gitpress.toml` next to the content being published
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Project config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$GITPRESS_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/gitpress/config.toml`
//! 3. `~/.gitpress/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use gitpress::core::config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Some(Path::new("."))).unwrap();
//! println!("Publishing to branch {}", config.branch());
//! println!("Blob concurrency: {}", config.blob_concurrency());
//! ```

pub mod schema;

pub use schema::{GlobalConfig, ProjectConfig};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::path_policy::PathPolicy;

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "gitpress.toml";

/// Default branch when none is configured.
pub const DEFAULT_BRANCH: &str = "main";

/// Default number of concurrent blob uploads.
pub const DEFAULT_BLOB_CONCURRENCY: usize = 4;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence rules: project config overrides global
/// config, which overrides built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: GlobalConfig,
    /// Project configuration (if a `gitpress.toml` was found)
    pub project: Option<ProjectConfig>,
    global_path: Option<PathBuf>,
    project_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `project_dir` is provided, also loads `gitpress.toml` from it.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed or
    /// contain invalid values. Missing files are not an error.
    pub fn load(project_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let global_path = Self::find_global();
        Self::load_from(global_path.as_deref(), project_dir)
    }

    /// Load from an explicit global config path.
    pub fn load_from(
        global_path: Option<&Path>,
        project_dir: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let (global, global_path) = match global_path {
            Some(path) if path.exists() => (read_toml::<GlobalConfig>(path)?, Some(path.to_path_buf())),
            _ => (GlobalConfig::default(), None),
        };

        let (project, project_path) = match project_dir.map(|d| d.join(PROJECT_CONFIG_FILE)) {
            Some(path) if path.exists() => (Some(read_toml::<ProjectConfig>(&path)?), Some(path)),
            _ => (None, None),
        };

        global.validate()?;
        if let Some(ref p) = project {
            p.validate()?;
        }

        tracing::debug!(
            global = ?global_path,
            project = ?project_path,
            "configuration loaded"
        );

        Ok(Config {
            global,
            project,
            global_path,
            project_path,
        })
    }

    /// Locate the global config file, if one exists.
    fn find_global() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GITPRESS_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("gitpress/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".gitpress/config.toml"))
            .filter(|path| path.exists())
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    fn repository(&self) -> Option<&schema::RepositoryConfig> {
        self.project.as_ref().and_then(|p| p.repository.as_ref())
    }

    fn publish_setting<T>(&self, pick: impl Fn(&schema::PublishDefaults) -> Option<T>) -> Option<T> {
        self.project
            .as_ref()
            .and_then(|p| p.publish.as_ref())
            .and_then(&pick)
            .or_else(|| self.global.publish.as_ref().and_then(&pick))
    }

    /// Repository owner, if configured.
    pub fn owner(&self) -> Option<&str> {
        self.repository().and_then(|r| r.owner.as_deref())
    }

    /// Repository name, if configured.
    pub fn repo(&self) -> Option<&str> {
        self.repository().and_then(|r| r.repo.as_deref())
    }

    /// Branch to publish to.
    ///
    /// Defaults to "main" if not configured.
    pub fn branch(&self) -> &str {
        self.repository()
            .and_then(|r| r.branch.as_deref())
            .unwrap_or(DEFAULT_BRANCH)
    }

    /// Custom API base URL, if configured.
    pub fn api_base(&self) -> Option<&str> {
        self.repository().and_then(|r| r.api_base.as_deref())
    }

    /// Maximum concurrent blob uploads.
    ///
    /// Defaults to 4 if not configured.
    pub fn blob_concurrency(&self) -> usize {
        self.publish_setting(|p| p.blob_concurrency)
            .unwrap_or(DEFAULT_BLOB_CONCURRENCY)
    }

    /// Whether create/modify expectations are checked against the base tree.
    ///
    /// Defaults to `true` if not configured.
    pub fn check_actions(&self) -> bool {
        self.publish_setting(|p| p.check_actions).unwrap_or(true)
    }

    /// Get the secrets provider.
    ///
    /// Defaults to "file" if not configured.
    pub fn secrets_provider(&self) -> &str {
        self.global
            .secrets
            .as_ref()
            .and_then(|s| s.provider.as_deref())
            .unwrap_or("file")
    }

    /// The path gate with any project-configured denied directories.
    pub fn path_policy(&self) -> PathPolicy {
        let extra = self
            .project
            .as_ref()
            .and_then(|p| p.paths.as_ref())
            .and_then(|p| p.denied_dirs.clone())
            .unwrap_or_default();
        PathPolicy::with_denied_dirs(extra)
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded project config file.
    pub fn project_config_loaded_from(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
