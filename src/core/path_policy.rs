//! core::path_policy
//!
//! Deny-list gate over repository-relative paths.
//!
//! # Design
//!
//! Every path in a change set passes through [`PathPolicy::check`] before a
//! single request reaches the object store. The policy is a deny-list:
//! anything not matched by a rule is allowed. Callers that need a hard
//! sandbox should layer an allow-list on top.
//!
//! Matching runs on a normalized form of the candidate so that
//! `%2e%2e/`, `..%2f`, and `..\` are caught the same way as `../`:
//!
//! 1. Percent-encoded bytes are decoded until the string stops changing
//! 2. Backslashes are treated as separators
//! 3. The result is split into segments and each segment is checked
//!
//! # Example
//!
//! ```
//! use gitpress::core::path_policy::{is_allowed, PathPolicy, PathRejection};
//!
//! assert!(is_allowed("data/json/articles.json"));
//! assert!(!is_allowed("../../etc/passwd"));
//!
//! let policy = PathPolicy::default();
//! assert_eq!(policy.check(".env"), Err(PathRejection::SecretFile));
//! ```

use thiserror::Error;

/// Dependency directories rejected by default.
pub const DEFAULT_DENIED_DIRS: &[&str] = &["node_modules"];

/// Environment file templates that are safe to publish.
const ENV_TEMPLATES: &[&str] = &[".env.example", ".env.sample", ".env.template"];

/// Upper bound on percent-decoding passes.
const MAX_DECODE_PASSES: usize = 4;

/// Why a path was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathRejection {
    #[error("path is empty")]
    Empty,

    #[error("path must be relative to the repository root")]
    Absolute,

    #[error("path contains a control character")]
    ControlCharacter,

    #[error("path contains an empty or '.' segment")]
    MalformedSegment,

    #[error("path escapes the repository with '..'")]
    ParentTraversal,

    #[error("path names an environment secrets file")]
    SecretFile,

    #[error("path is inside version-control metadata")]
    VcsMetadata,

    #[error("path is inside dependency directory '{0}'")]
    DependencyDir(String),
}

/// The path gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPolicy {
    denied_dirs: Vec<String>,
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self {
            denied_dirs: DEFAULT_DENIED_DIRS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl PathPolicy {
    /// Default policy extended with additional denied directory names.
    ///
    /// Names are compared case-insensitively against individual segments.
    pub fn with_denied_dirs<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut policy = Self::default();
        for dir in extra {
            let dir = dir.into().trim_matches('/').to_string();
            if !dir.is_empty() && !policy.denied_dirs.iter().any(|d| d.eq_ignore_ascii_case(&dir))
            {
                policy.denied_dirs.push(dir);
            }
        }
        policy
    }

    /// Denied dependency directory names.
    pub fn denied_dirs(&self) -> &[String] {
        &self.denied_dirs
    }

    /// Check a path, returning the first rule it violates.
    pub fn check(&self, path: &str) -> Result<(), PathRejection> {
        if path.is_empty() {
            return Err(PathRejection::Empty);
        }

        let normalized = percent_decode_fully(path).replace('\\', "/");

        if normalized.chars().any(|c| c.is_control()) {
            return Err(PathRejection::ControlCharacter);
        }
        if normalized.starts_with('/') || has_drive_prefix(&normalized) {
            return Err(PathRejection::Absolute);
        }

        let segments: Vec<&str> = normalized.split('/').collect();

        // Traversal outranks every other finding.
        if segments.iter().any(|s| *s == "..") {
            return Err(PathRejection::ParentTraversal);
        }

        for segment in &segments {
            if segment.is_empty() || *segment == "." {
                return Err(PathRejection::MalformedSegment);
            }
            let canonical = canonical_segment(segment);
            if canonical == ".git" {
                return Err(PathRejection::VcsMetadata);
            }
            if let Some(dir) = self
                .denied_dirs
                .iter()
                .find(|d| d.eq_ignore_ascii_case(&canonical))
            {
                return Err(PathRejection::DependencyDir(dir.clone()));
            }
        }

        if let Some(name) = segments.last() {
            if is_env_secret(&canonical_segment(name)) {
                return Err(PathRejection::SecretFile);
            }
        }

        Ok(())
    }

    /// `true` when [`check`](Self::check) passes.
    pub fn is_allowed(&self, path: &str) -> bool {
        self.check(path).is_ok()
    }
}

/// Check a path against the default policy.
pub fn is_allowed(path: &str) -> bool {
    PathPolicy::default().is_allowed(path)
}

/// Lowercased segment with trailing dots and spaces removed.
///
/// Case-insensitive filesystems treat `.GIT` and `.git. ` as `.git`.
fn canonical_segment(segment: &str) -> String {
    segment
        .trim_end_matches(['.', ' '])
        .to_ascii_lowercase()
}

fn is_env_secret(name: &str) -> bool {
    if ENV_TEMPLATES.contains(&name) {
        return false;
    }
    name == ".env" || name.starts_with(".env.")
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn percent_decode_fully(path: &str) -> String {
    let mut current = path.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        let decoded = percent_decode_once(&current);
        if decoded == current {
            break;
        }
        current = decoded;
    }
    current
}

fn percent_decode_once(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
