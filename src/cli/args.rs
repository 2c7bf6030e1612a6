//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--cwd <path>`: Run as if in that directory (where `gitpress.toml` is read)
//! - `--repo <OWNER/REPO>`: Target repository, overriding `gitpress.toml`
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// gitpress - publish multi-file change sets as one atomic commit
#[derive(Parser, Debug)]
#[command(name = "gitpress")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if gitpress was started in this directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Target repository as OWNER/REPO (overrides gitpress.toml)
    #[arg(long, global = true, value_name = "OWNER/REPO")]
    pub repo: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Publish a change set as one commit
    #[command(
        name = "publish",
        long_about = "Publish a change set as a single commit on a branch.\n\n\
            Every path is checked before anything is sent to the remote. The file \
            contents are uploaded, a tree is built on top of the branch's current \
            tree, and the branch is moved only if nobody else moved it in the \
            meantime. Either every file lands or none does.",
        after_help = "\
CHANGE SET FORMAT:
    {
      \"files\": [
        { \"path\": \"docs/intro.md\", \"content\": \"# Intro\", \"action\": \"create\" },
        { \"path\": \"img/logo.png\", \"content\": \"iVBOR...\", \"encoding\": \"base64\" }
      ],
      \"commitMessage\": \"Add intro\"
    }

WORKFLOW EXAMPLES:
    # Publish to the configured branch
    gitpress publish changes.json

    # Publish to another branch with an explicit message
    gitpress publish changes.json --branch drafts -m \"Draft intro\"

    # Read the change set from stdin and print the result as JSON
    generate-changes | gitpress publish - --json"
    )]
    Publish {
        /// Change set JSON file ('-' reads stdin)
        #[arg(value_name = "CHANGES")]
        changes: PathBuf,

        /// Branch to publish to (default: repository branch from config, else main)
        #[arg(short, long)]
        branch: Option<String>,

        /// Commit message (overrides the change set's message)
        #[arg(short, long)]
        message: Option<String>,

        /// Maximum blob uploads in flight
        #[arg(long, value_name = "N", value_parser = parse_concurrency)]
        concurrency: Option<usize>,

        /// Skip comparing create/modify against the current tree
        #[arg(long)]
        no_check_actions: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check paths against the publish path policy
    #[command(
        name = "check-path",
        after_help = "\
EXAMPLES:
    gitpress check-path docs/intro.md
    gitpress check-path ../secrets .env node_modules/pkg/index.js"
    )]
    CheckPath {
        /// Repository-relative paths to check
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Print a file's current content on a branch
    Show {
        /// Repository-relative path
        path: String,

        /// Branch to read from (default: repository branch from config, else main)
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Store or inspect the access token
    Auth {
        /// Token to store (prompted for when omitted)
        #[arg(long)]
        token: Option<String>,

        /// Show where the token would be read from
        #[arg(long, conflicts_with = "logout")]
        status: bool,

        /// Remove the stored token
        #[arg(long)]
        logout: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_concurrency(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("concurrency must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
