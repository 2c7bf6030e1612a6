//! cli
//!
//! Command-line interface layer for gitpress.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and credentials
//! - Delegate to [`crate::publish`] and format the outcome
//!
//! The CLI never talks to a store implementation beyond constructing it;
//! all publishing goes through [`crate::publish::Publisher`].

pub mod args;
pub mod commands;

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context as _, Result};

pub use args::{Cli, Command};

use crate::ui::output::Verbosity;

/// Per-invocation settings derived from global flags.
#[derive(Debug, Clone)]
pub struct Context {
    /// Directory to treat as the working directory
    pub cwd: Option<PathBuf>,
    /// Debug output enabled
    pub debug: bool,
    /// Minimal output
    pub quiet: bool,
    /// Prompts allowed (stdin is a terminal and not quiet)
    pub interactive: bool,
    /// `--repo` override
    pub repo: Option<String>,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            cwd: cli.cwd.clone(),
            debug: cli.debug,
            quiet: cli.quiet,
            interactive: !cli.quiet && std::io::stdin().is_terminal(),
            repo: cli.repo.clone(),
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.debug)
    }

    /// The directory `gitpress.toml` is read from.
    pub fn project_dir(&self) -> Result<PathBuf> {
        match &self.cwd {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("Failed to determine current directory"),
        }
    }
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run(cli: Cli) -> Result<()> {
    let ctx = Context::from_cli(&cli);
    commands::dispatch(cli.command, &ctx)
}
