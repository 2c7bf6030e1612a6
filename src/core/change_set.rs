//! core::change_set
//!
//! The set of file writes published as a single commit.
//!
//! # Invariants
//!
//! - A change set holds at least one file
//! - No two files share a path (duplicates are rejected, never merged)
//! - No file sits under another file of the same batch
//! - Content is the complete new file body; there are no partial patches
//! - Nothing here deletes files
//!
//! # Wire format
//!
//! Change-generation tools hand over a JSON document:
//!
//! ```json
//! {
//!   "files": [
//!     { "path": "data/md/hello.md", "content": "# Hello", "action": "create" },
//!     { "path": "logo.png", "content": "iVBORw0K...", "action": "modify", "encoding": "base64" }
//!   ],
//!   "commitMessage": "Add hello post"
//! }
//! ```

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use thiserror::Error;

use super::path_policy::{PathPolicy, PathRejection};

/// How many paths the generated commit summary lists before eliding.
const SUMMARY_PATHS: usize = 3;

/// Errors that make a change set unpublishable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChangeSetError {
    #[error("change set contains no files")]
    Empty,

    #[error("duplicate path in change set: {0}")]
    DuplicatePath(String),

    #[error("'{path}' would be inside '{file}', which is also a file in the change set")]
    NestedPath { path: String, file: String },

    #[error("'{path}' collides with '{existing}' on the branch")]
    CollidesWithBase { path: String, existing: String },

    #[error("path '{path}' rejected: {reason}")]
    RejectedPath {
        path: String,
        reason: PathRejection,
    },

    #[error("unsupported action '{action}' for '{path}' (only create and modify are supported)")]
    UnsupportedAction { path: String, action: String },

    #[error("invalid content for '{path}': {message}")]
    InvalidContent { path: String, message: String },

    #[error("malformed change set document: {0}")]
    Malformed(String),
}

/// Whether the file is expected to be new or already present.
///
/// Advisory only: the store overwrites either way, but the orchestrator
/// logs when the expectation does not match the base tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Create,
    Modify,
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileAction::Create => write!(f, "create"),
            FileAction::Modify => write!(f, "modify"),
        }
    }
}

/// One file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    path: String,
    content: Vec<u8>,
    action: FileAction,
}

impl FileChange {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>, action: FileAction) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            action,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn action(&self) -> FileAction {
        self.action
    }
}

/// An ordered, duplicate-free, non-empty batch of file writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    files: Vec<FileChange>,
    message: Option<String>,
}

impl ChangeSet {
    /// Build a change set.
    ///
    /// A blank message is treated as absent.
    ///
    /// # Errors
    ///
    /// - `Empty` if `files` is empty
    /// - `DuplicatePath` on the first repeated path
    /// - `NestedPath` when one file would have to be a directory of another
    pub fn new(files: Vec<FileChange>, message: Option<String>) -> Result<Self, ChangeSetError> {
        if files.is_empty() {
            return Err(ChangeSetError::Empty);
        }

        let mut seen = HashSet::with_capacity(files.len());
        for file in &files {
            if !seen.insert(file.path.as_str()) {
                return Err(ChangeSetError::DuplicatePath(file.path.clone()));
            }
        }
        for file in &files {
            if let Some(parent) = ancestors(&file.path).find(|dir| seen.contains(dir)) {
                return Err(ChangeSetError::NestedPath {
                    path: file.path.clone(),
                    file: parent.to_string(),
                });
            }
        }

        let message = message.filter(|m| !m.trim().is_empty());
        Ok(Self { files, message })
    }

    /// Parse the JSON document produced by a change-generation tool.
    pub fn from_json(json: &str) -> Result<Self, ChangeSetError> {
        let doc: ChangeSetDocument =
            serde_json::from_str(json).map_err(|e| ChangeSetError::Malformed(e.to_string()))?;

        let files = doc
            .files
            .into_iter()
            .map(FileDocument::into_change)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(files, doc.commit_message)
    }

    /// Replace the message; a blank message clears it.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into()).filter(|m| !m.trim().is_empty());
        self
    }

    /// Run the path gate over every file.
    ///
    /// Stops at the first rejected path.
    pub fn validate(&self, policy: &PathPolicy) -> Result<(), ChangeSetError> {
        for file in &self.files {
            policy
                .check(&file.path)
                .map_err(|reason| ChangeSetError::RejectedPath {
                    path: file.path.clone(),
                    reason,
                })?;
        }
        Ok(())
    }

    pub fn files(&self) -> &[FileChange] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The caller-supplied message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The caller message, or a generated summary stamped with `now`.
    pub fn message_or_default(&self, now: DateTime<Utc>) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }

        let count = self.files.len();
        let mut listed: Vec<&str> = self
            .files
            .iter()
            .take(SUMMARY_PATHS)
            .map(|f| f.path.as_str())
            .collect();
        if count > SUMMARY_PATHS {
            listed.push("…");
        }

        format!(
            "Publish {} file{}: {} ({})",
            count,
            if count == 1 { "" } else { "s" },
            listed.join(", "),
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Every proper directory prefix of `path`: `a/b/c` yields `a`, then `a/b`.
pub(crate) fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(at, _)| &path[..at])
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeSetDocument {
    files: Vec<FileDocument>,
    #[serde(default)]
    commit_message: Option<String>,
}

#[derive(Deserialize)]
struct FileDocument {
    path: String,
    content: String,
    #[serde(default = "default_action")]
    action: String,
    #[serde(default)]
    encoding: Option<String>,
}

fn default_action() -> String {
    "modify".to_string()
}

impl FileDocument {
    fn into_change(self) -> Result<FileChange, ChangeSetError> {
        let action = match self.action.to_ascii_lowercase().as_str() {
            "create" => FileAction::Create,
            "modify" => FileAction::Modify,
            other => {
                return Err(ChangeSetError::UnsupportedAction {
                    path: self.path,
                    action: other.to_string(),
                })
            }
        };

        let content = match self.encoding.as_deref() {
            None | Some("utf-8") | Some("utf8") => self.content.into_bytes(),
            Some("base64") => {
                STANDARD
                    .decode(self.content.as_bytes())
                    .map_err(|e| ChangeSetError::InvalidContent {
                        path: self.path.clone(),
                        message: e.to_string(),
                    })?
            }
            Some(other) => {
                return Err(ChangeSetError::InvalidContent {
                    path: self.path,
                    message: format!("unknown encoding '{other}'"),
                })
            }
        };

        Ok(FileChange::new(self.path, content, action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn file(path: &str) -> FileChange {
        FileChange::new(path, format!("content of {path}"), FileAction::Create)
    }

    #[test]
    fn empty_rejected() {
        assert_eq!(ChangeSet::new(vec![], None), Err(ChangeSetError::Empty));
    }

    #[test]
    fn duplicate_paths_rejected() {
        let result = ChangeSet::new(vec![file("a.md"), file("b.md"), file("a.md")], None);
        assert_eq!(result, Err(ChangeSetError::DuplicatePath("a.md".into())));
    }

    #[test]
    fn file_under_another_file_rejected() {
        let result = ChangeSet::new(vec![file("docs/a"), file("docs/a/b.md")], None);
        assert_eq!(
            result,
            Err(ChangeSetError::NestedPath {
                path: "docs/a/b.md".into(),
                file: "docs/a".into(),
            })
        );

        // Order does not matter.
        let result = ChangeSet::new(vec![file("x/y/z.md"), file("x")], None);
        assert!(matches!(result, Err(ChangeSetError::NestedPath { .. })));
    }

    #[test]
    fn shared_prefix_without_separator_allowed() {
        assert!(ChangeSet::new(vec![file("docs/a"), file("docs/ab.md")], None).is_ok());
        assert!(ChangeSet::new(vec![file("docs/a.md"), file("docs/b.md")], None).is_ok());
    }

    #[test]
    fn ancestors_of_nested_path() {
        assert_eq!(ancestors("a/b/c.md").collect::<Vec<_>>(), vec!["a", "a/b"]);
        assert_eq!(ancestors("top.md").count(), 0);
    }

    #[test]
    fn blank_message_treated_as_absent() {
        let set = ChangeSet::new(vec![file("a.md")], Some("   ".into())).unwrap();
        assert!(set.message().is_none());
    }

    #[test]
    fn validate_reports_first_rejection() {
        let set = ChangeSet::new(
            vec![file("ok.md"), file("../../etc/passwd"), file(".env")],
            None,
        )
        .unwrap();

        let err = set.validate(&PathPolicy::default()).unwrap_err();
        assert_eq!(
            err,
            ChangeSetError::RejectedPath {
                path: "../../etc/passwd".into(),
                reason: PathRejection::ParentTraversal,
            }
        );
    }

    #[test]
    fn default_message_summarizes_paths() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap();

        let one = ChangeSet::new(vec![file("a.md")], None).unwrap();
        assert_eq!(
            one.message_or_default(now),
            "Publish 1 file: a.md (2026-10-16T09:30:00Z)"
        );

        let many = ChangeSet::new(
            vec![file("a.md"), file("b.md"), file("c.md"), file("d.md")],
            None,
        )
        .unwrap();
        assert_eq!(
            many.message_or_default(now),
            "Publish 4 files: a.md, b.md, c.md, … (2026-10-16T09:30:00Z)"
        );
    }

    #[test]
    fn with_message_overrides() {
        let set = ChangeSet::new(vec![file("a.md")], Some("generated".into()))
            .unwrap()
            .with_message("edited by hand");
        assert_eq!(set.message(), Some("edited by hand"));
        assert_eq!(set.with_message(" ").message(), None);
    }

    #[test]
    fn explicit_message_wins() {
        let now = Utc::now();
        let set = ChangeSet::new(vec![file("a.md")], Some("add docs".into())).unwrap();
        assert_eq!(set.message_or_default(now), "add docs");
    }

    mod from_json {
        use super::*;

        #[test]
        fn parses_document() {
            let set = ChangeSet::from_json(
                r##"{
                    "files": [
                        { "path": "a.md", "content": "# A", "action": "create" },
                        { "path": "b.bin", "content": "AAEC", "action": "modify", "encoding": "base64" }
                    ],
                    "commitMessage": "add docs"
                }"##,
            )
            .unwrap();

            assert_eq!(set.len(), 2);
            assert_eq!(set.files()[0].content(), b"# A");
            assert_eq!(set.files()[0].action(), FileAction::Create);
            assert_eq!(set.files()[1].content(), &[0u8, 1, 2]);
            assert_eq!(set.files()[1].action(), FileAction::Modify);
            assert_eq!(set.message(), Some("add docs"));
        }

        #[test]
        fn action_defaults_to_modify() {
            let set =
                ChangeSet::from_json(r#"{ "files": [{ "path": "a.md", "content": "x" }] }"#)
                    .unwrap();
            assert_eq!(set.files()[0].action(), FileAction::Modify);
        }

        #[test]
        fn delete_is_unsupported() {
            let err = ChangeSet::from_json(
                r#"{ "files": [{ "path": "a.md", "content": "", "action": "delete" }] }"#,
            )
            .unwrap_err();
            assert!(matches!(err, ChangeSetError::UnsupportedAction { .. }));
        }

        #[test]
        fn bad_base64_rejected() {
            let err = ChangeSet::from_json(
                r#"{ "files": [{ "path": "a", "content": "!!", "encoding": "base64" }] }"#,
            )
            .unwrap_err();
            assert!(matches!(err, ChangeSetError::InvalidContent { .. }));
        }

        #[test]
        fn malformed_document_rejected() {
            assert!(matches!(
                ChangeSet::from_json("{ not json"),
                Err(ChangeSetError::Malformed(_))
            ));
            assert_eq!(
                ChangeSet::from_json(r#"{ "files": [] }"#),
                Err(ChangeSetError::Empty)
            );
        }
    }
}
