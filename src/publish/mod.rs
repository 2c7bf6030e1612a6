//! publish
//!
//! Publishes a [`ChangeSet`] as one new commit on a branch.
//!
//! # Protocol
//!
//! A run walks a fixed sequence of phases, never going back:
//!
//! 1. `ValidatePaths` - path gate over every file; no store calls
//! 2. `ResolveRef` - read the branch tip (the parent commit)
//! 3. `FetchBaseTree` - read the parent's tree and reject changes that would
//!    replace a file with a directory or a directory with a file
//! 4. `CreateBlobs` - upload every file's content, bounded concurrency
//! 5. `BuildTree` - base tree with the changed paths overridden
//! 6. `CreateCommit` - one commit, parent = the resolved tip
//! 7. `UpdateRef` - compare-and-swap the branch to the new commit
//!
//! Phases 1-6 only add unreferenced objects to the store. Phase 7 is the
//! single visible effect, so any failure before it leaves the branch exactly
//! as it was.
//!
//! # Cancellation
//!
//! A [`CancellationToken`] is honored at every phase boundary and while a
//! preparation call is in flight. Once the ref update is issued the run
//! always waits for its response.
//!
//! # Example
//!
//! ```
//! use gitpress::core::change_set::{ChangeSet, FileAction, FileChange};
//! use gitpress::core::types::BranchName;
//! use gitpress::publish::{PublishOptions, Publisher};
//! use gitpress::store::mock::MockStore;
//!
//! # tokio_test::block_on(async {
//! let store = MockStore::with_branch("main", &[("README.md", b"# Site")]);
//! let changes = ChangeSet::new(
//!     vec![FileChange::new("docs/a.md", "# A", FileAction::Create)],
//!     Some("add docs".into()),
//! )
//! .unwrap();
//!
//! let result = Publisher::new(&store, PublishOptions::default())
//!     .publish(&BranchName::new("main").unwrap(), &changes)
//!     .await
//!     .unwrap();
//!
//! assert_eq!(result.files_changed, 1);
//! assert_eq!(store.head("main"), Some(result.commit_id));
//! # });
//! ```

mod error;
mod result;

use std::collections::HashSet;
use std::future::Future;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::change_set::{ancestors, ChangeSet, ChangeSetError, FileAction};
use crate::core::config::DEFAULT_BLOB_CONCURRENCY;
use crate::core::path_policy::PathPolicy;
use crate::core::types::{BranchName, Oid};
use crate::store::{NewCommit, ObjectKind, ObjectStore, StoreError, TreeEntry, TreeOverride};

pub use error::PublishError;
pub use result::CommitResult;

/// A step of the publish protocol, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PublishPhase {
    ValidatePaths,
    ResolveRef,
    FetchBaseTree,
    CreateBlobs,
    BuildTree,
    CreateCommit,
    UpdateRef,
    Completed,
}

impl std::fmt::Display for PublishPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PublishPhase::ValidatePaths => "validate paths",
            PublishPhase::ResolveRef => "resolve ref",
            PublishPhase::FetchBaseTree => "fetch base tree",
            PublishPhase::CreateBlobs => "create blobs",
            PublishPhase::BuildTree => "build tree",
            PublishPhase::CreateCommit => "create commit",
            PublishPhase::UpdateRef => "update ref",
            PublishPhase::Completed => "completed",
        };
        write!(f, "{}", name)
    }
}

/// Tunables for a publish run.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Maximum blob uploads in flight (values below 1 are treated as 1)
    pub blob_concurrency: usize,
    /// Warn when create/modify does not match the base tree
    pub check_actions: bool,
    /// Path gate applied before any store call
    pub policy: PathPolicy,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            blob_concurrency: DEFAULT_BLOB_CONCURRENCY,
            check_actions: true,
            policy: PathPolicy::default(),
        }
    }
}

/// A file whose declared action disagrees with the base tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMismatch {
    pub path: String,
    pub declared: FileAction,
}

/// Drives an [`ObjectStore`] through one publish.
///
/// A publisher holds no state between runs. Concurrent runs against the
/// same branch are not serialized here; the loser gets
/// [`PublishError::Conflict`].
pub struct Publisher<'a> {
    store: &'a dyn ObjectStore,
    options: PublishOptions,
    cancel: Option<CancellationToken>,
}

impl<'a> Publisher<'a> {
    pub fn new(store: &'a dyn ObjectStore, options: PublishOptions) -> Self {
        Self {
            store,
            options,
            cancel: None,
        }
    }

    /// Stop the run when `token` is cancelled, up to the ref update.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn options(&self) -> &PublishOptions {
        &self.options
    }

    /// Publish `changes` as one commit on top of `branch`.
    ///
    /// # Errors
    ///
    /// See [`PublishError`]. Every variant except `Conflict` and
    /// `AmbiguousPublish` guarantees the branch was not moved.
    pub async fn publish(
        &self,
        branch: &BranchName,
        changes: &ChangeSet,
    ) -> Result<CommitResult, PublishError> {
        self.publish_at(branch, changes, Utc::now()).await
    }

    /// Like [`publish`](Self::publish), stamping a generated message with `now`.
    pub async fn publish_at(
        &self,
        branch: &BranchName,
        changes: &ChangeSet,
        now: DateTime<Utc>,
    ) -> Result<CommitResult, PublishError> {
        let span = tracing::info_span!(
            "publish",
            store = self.store.name(),
            branch = %branch,
            files = changes.len()
        );
        self.run(branch, changes, now).instrument(span).await
    }

    async fn run(
        &self,
        branch: &BranchName,
        changes: &ChangeSet,
        now: DateTime<Utc>,
    ) -> Result<CommitResult, PublishError> {
        self.enter(PublishPhase::ValidatePaths)?;
        changes.validate(&self.options.policy)?;

        self.enter(PublishPhase::ResolveRef)?;
        let parent = match self
            .guarded(PublishPhase::ResolveRef, self.store.get_ref(branch))
            .await?
        {
            Ok(id) => id,
            Err(StoreError::NotFound(_)) => {
                return Err(PublishError::NotFound {
                    branch: branch.clone(),
                })
            }
            Err(source) => return Err(transport(PublishPhase::ResolveRef, source)),
        };
        tracing::info!(parent = %parent.short(12), "resolved branch");

        self.enter(PublishPhase::FetchBaseTree)?;
        let base = self
            .guarded(PublishPhase::FetchBaseTree, self.store.get_commit(&parent))
            .await?
            .map_err(|e| transport(PublishPhase::FetchBaseTree, e))?;
        let entries = self
            .guarded(
                PublishPhase::FetchBaseTree,
                self.store.get_tree(&base.tree_id, true),
            )
            .await?
            .map_err(|e| transport(PublishPhase::FetchBaseTree, e))?;
        if let Some(collision) = base_collision(&entries, changes) {
            tracing::warn!(error = %collision, "change set does not fit the base tree");
            return Err(collision.into());
        }
        if self.options.check_actions {
            for mismatch in action_mismatches(&entries, changes) {
                match mismatch.declared {
                    FileAction::Create => tracing::warn!(
                        path = %mismatch.path,
                        "file marked create already exists; it will be overwritten"
                    ),
                    FileAction::Modify => tracing::warn!(
                        path = %mismatch.path,
                        "file marked modify does not exist; it will be created"
                    ),
                }
            }
        }

        self.enter(PublishPhase::CreateBlobs)?;
        let blobs = self.create_blobs(changes).await?;

        self.enter(PublishPhase::BuildTree)?;
        let overrides: Vec<TreeOverride> = changes
            .files()
            .iter()
            .zip(blobs)
            .map(|(file, blob)| TreeOverride::file(file.path(), blob))
            .collect();
        let tree_id = self
            .guarded(
                PublishPhase::BuildTree,
                self.store.create_tree(&base.tree_id, &overrides),
            )
            .await?
            .map_err(|e| transport(PublishPhase::BuildTree, e))?;
        tracing::info!(tree = %tree_id.short(12), "built tree");

        self.enter(PublishPhase::CreateCommit)?;
        let request = NewCommit {
            tree_id: tree_id.clone(),
            parent_ids: vec![parent.clone()],
            message: changes.message_or_default(now),
        };
        let commit = self
            .guarded(
                PublishPhase::CreateCommit,
                self.store.create_commit(&request),
            )
            .await?
            .map_err(|e| transport(PublishPhase::CreateCommit, e))?;
        tracing::info!(commit = %commit.id.short(12), "created commit");

        // Last cancellation point: the update below always runs to completion.
        self.enter(PublishPhase::UpdateRef)?;
        match self.store.update_ref(branch, &parent, &commit.id).await {
            Ok(()) => {}
            Err(StoreError::NotSent(source)) => {
                tracing::warn!(error = %source, "ref update was not sent");
                return Err(transport(PublishPhase::UpdateRef, *source));
            }
            Err(StoreError::Conflict(reason)) => {
                tracing::warn!(%reason, "branch moved during publish");
                return Err(PublishError::Conflict {
                    branch: branch.clone(),
                    expected: parent,
                    commit: commit.id,
                });
            }
            Err(source) => {
                tracing::error!(error = %source, "ref update failed with unknown outcome");
                return Err(PublishError::AmbiguousPublish {
                    branch: branch.clone(),
                    commit: commit.id,
                    source,
                });
            }
        }

        tracing::info!(
            phase = %PublishPhase::Completed,
            commit = %commit.id.short(12),
            "published"
        );
        Ok(CommitResult {
            commit_id: commit.id,
            tree_id,
            parent_id: parent,
            url: commit.url,
            files_changed: changes.len(),
        })
    }

    /// Upload every file's content, returning blob ids in change set order.
    async fn create_blobs(&self, changes: &ChangeSet) -> Result<Vec<Oid>, PublishError> {
        let concurrency = self.options.blob_concurrency.max(1);

        let uploads = stream::iter(changes.files().iter().enumerate())
            .map(|(index, file)| async move {
                let id = self
                    .store
                    .create_blob(file.content())
                    .await
                    .map_err(|e| transport(PublishPhase::CreateBlobs, e))?;
                tracing::debug!(
                    path = file.path(),
                    bytes = file.content().len(),
                    blob = %id.short(12),
                    "created blob"
                );
                Ok::<_, PublishError>((index, id))
            })
            .buffer_unordered(concurrency)
            .try_collect::<Vec<_>>();

        // Dropping the stream on the first error abandons in-flight uploads.
        let mut created = self.guarded(PublishPhase::CreateBlobs, uploads).await??;
        created.sort_by_key(|(index, _)| *index);

        tracing::info!(blobs = created.len(), concurrency, "created blobs");
        Ok(created.into_iter().map(|(_, id)| id).collect())
    }

    fn enter(&self, phase: PublishPhase) -> Result<(), PublishError> {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            tracing::info!(%phase, "publish cancelled");
            return Err(PublishError::Cancelled { phase });
        }
        tracing::debug!(%phase, "entering phase");
        Ok(())
    }

    /// Await `fut` unless the run is cancelled first.
    async fn guarded<F: Future>(
        &self,
        phase: PublishPhase,
        fut: F,
    ) -> Result<F::Output, PublishError> {
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!(%phase, "publish cancelled");
                    Err(PublishError::Cancelled { phase })
                }
                output = fut => Ok(output),
            },
            None => Ok(fut.await),
        }
    }
}

fn transport(phase: PublishPhase, source: StoreError) -> PublishError {
    PublishError::Transport { phase, source }
}

/// The first change that would replace a base file with a directory, or a
/// base directory with a file.
///
/// Trees only ever gain or replace file entries, so either case would drop
/// content from the branch.
pub fn base_collision(base: &[TreeEntry], changes: &ChangeSet) -> Option<ChangeSetError> {
    let mut files = HashSet::new();
    let mut dirs = HashSet::new();
    for entry in base {
        if entry.kind == ObjectKind::Tree {
            dirs.insert(entry.path.as_str());
        } else {
            files.insert(entry.path.as_str());
        }
        dirs.extend(ancestors(&entry.path));
    }

    changes.files().iter().find_map(|file| {
        let path = file.path();
        if let Some(existing) = ancestors(path).find(|dir| files.contains(dir)) {
            return Some(ChangeSetError::CollidesWithBase {
                path: path.to_string(),
                existing: existing.to_string(),
            });
        }
        dirs.contains(path).then(|| ChangeSetError::CollidesWithBase {
            path: path.to_string(),
            existing: format!("{}/", path),
        })
    })
}

/// Files whose declared action disagrees with a recursive base tree listing.
pub fn action_mismatches(base: &[TreeEntry], changes: &ChangeSet) -> Vec<ActionMismatch> {
    let existing: HashSet<&str> = base
        .iter()
        .filter(|e| e.kind == ObjectKind::Blob)
        .map(|e| e.path.as_str())
        .collect();

    changes
        .files()
        .iter()
        .filter(|file| match file.action() {
            FileAction::Create => existing.contains(file.path()),
            FileAction::Modify => !existing.contains(file.path()),
        })
        .map(|file| ActionMismatch {
            path: file.path().to_string(),
            declared: file.action(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::change_set::FileChange;
    use crate::store::EntryMode;

    #[test]
    fn phases_are_ordered() {
        assert!(PublishPhase::ValidatePaths < PublishPhase::ResolveRef);
        assert!(PublishPhase::CreateCommit < PublishPhase::UpdateRef);
        assert!(PublishPhase::UpdateRef < PublishPhase::Completed);
    }

    #[test]
    fn phase_display() {
        assert_eq!(PublishPhase::FetchBaseTree.to_string(), "fetch base tree");
        assert_eq!(PublishPhase::UpdateRef.to_string(), "update ref");
    }

    #[test]
    fn default_options() {
        let options = PublishOptions::default();
        assert_eq!(options.blob_concurrency, 4);
        assert!(options.check_actions);
    }

    fn blob(path: &str) -> TreeEntry {
        TreeEntry {
            path: path.into(),
            mode: EntryMode::File,
            kind: ObjectKind::Blob,
            id: Oid::new("a".repeat(40)).unwrap(),
        }
    }

    fn modifies(paths: &[&str]) -> ChangeSet {
        ChangeSet::new(
            paths
                .iter()
                .map(|p| FileChange::new(*p, "x", FileAction::Modify))
                .collect(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn file_cannot_become_directory() {
        let base = vec![blob("README.md"), blob("docs/intro.md")];
        assert_eq!(
            base_collision(&base, &modifies(&["ok.md", "README.md/x.md"])),
            Some(ChangeSetError::CollidesWithBase {
                path: "README.md/x.md".into(),
                existing: "README.md".into(),
            })
        );
    }

    #[test]
    fn directory_cannot_become_file() {
        let base = vec![blob("docs/guide/intro.md")];
        assert_eq!(
            base_collision(&base, &modifies(&["docs/guide"])),
            Some(ChangeSetError::CollidesWithBase {
                path: "docs/guide".into(),
                existing: "docs/guide/".into(),
            })
        );
        assert!(matches!(
            base_collision(&base, &modifies(&["docs"])),
            Some(ChangeSetError::CollidesWithBase { .. })
        ));
    }

    #[test]
    fn overwrites_and_new_siblings_fit() {
        let base = vec![blob("README.md"), blob("docs/intro.md")];
        let changes = modifies(&["README.md", "docs/intro.md", "docs/new/a.md", "docs.md"]);
        assert_eq!(base_collision(&base, &changes), None);
    }

    #[test]
    fn mismatches_compare_against_blobs_only() {
        let id = Oid::new("a".repeat(40)).unwrap();
        let base = vec![
            TreeEntry {
                path: "existing.md".into(),
                mode: EntryMode::File,
                kind: ObjectKind::Blob,
                id: id.clone(),
            },
            TreeEntry {
                path: "docs".into(),
                mode: EntryMode::Directory,
                kind: ObjectKind::Tree,
                id,
            },
        ];
        let changes = ChangeSet::new(
            vec![
                FileChange::new("existing.md", "x", FileAction::Create),
                FileChange::new("existing.md.bak", "x", FileAction::Create),
                FileChange::new("docs", "x", FileAction::Modify),
            ],
            None,
        )
        .unwrap();

        let mismatches = action_mismatches(&base, &changes);
        assert_eq!(
            mismatches,
            vec![
                ActionMismatch {
                    path: "existing.md".into(),
                    declared: FileAction::Create,
                },
                ActionMismatch {
                    path: "docs".into(),
                    declared: FileAction::Modify,
                },
            ]
        );
    }
}
