//! store::traits
//!
//! The object-graph contract consumed by the publisher.
//!
//! # Design
//!
//! The `ObjectStore` trait is async because every operation is a remote
//! round trip. All methods return `Result` so failures surface as typed
//! [`StoreError`]s rather than panics.
//!
//! Objects are content-addressed and immutable. Creating blobs, trees, and
//! commits has no visible effect until a ref is moved to point at them, so
//! only [`ObjectStore::update_ref`] publishes anything.
//!
//! # Example
//!
//! ```ignore
//! use gitpress::store::{ObjectStore, StoreError, TreeOverride, EntryMode};
//!
//! async fn overwrite(store: &dyn ObjectStore, branch: &BranchName) -> Result<(), StoreError> {
//!     let head = store.get_ref(branch).await?;
//!     let commit = store.get_commit(&head).await?;
//!     let blob = store.create_blob(b"# Hello").await?;
//!     let tree = store
//!         .create_tree(&commit.tree_id, &[TreeOverride::file("hello.md", blob)])
//!         .await?;
//!     // ...create a commit, then update_ref(branch, &head, &new_commit)
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{BranchName, Oid};

/// Errors from object store operations.
///
/// These map to common failure modes of a remote Git hosting API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Authentication is required but not available.
    #[error("authentication required")]
    AuthRequired,

    /// Authentication failed (invalid token, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested object or ref was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A ref update was rejected because the ref no longer matches.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),

    /// A ref update failed before the update request was sent.
    ///
    /// The ref is known to be unchanged.
    #[error("ref update not sent: {0}")]
    NotSent(Box<StoreError>),
}

/// File mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Regular file (`100644`)
    File,
    /// Executable file (`100755`)
    Executable,
    /// Symbolic link (`120000`)
    Symlink,
    /// Subdirectory (`040000`)
    Directory,
    /// Submodule commit (`160000`)
    Submodule,
}

impl EntryMode {
    /// Git's octal mode string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryMode::File => "100644",
            EntryMode::Executable => "100755",
            EntryMode::Symlink => "120000",
            EntryMode::Directory => "040000",
            EntryMode::Submodule => "160000",
        }
    }

    /// Parse an octal mode string.
    ///
    /// Accepts both `040000` and the short `40000` form for directories.
    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "100644" => Some(EntryMode::File),
            "100755" => Some(EntryMode::Executable),
            "120000" => Some(EntryMode::Symlink),
            "040000" | "40000" => Some(EntryMode::Directory),
            "160000" => Some(EntryMode::Submodule),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of object a tree entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Blob => write!(f, "blob"),
            ObjectKind::Tree => write!(f, "tree"),
            ObjectKind::Commit => write!(f, "commit"),
        }
    }
}

/// Commit metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Commit id
    pub id: Oid,
    /// Root tree of the commit
    pub tree_id: Oid,
    /// Parent commits, in order
    pub parent_ids: Vec<Oid>,
    /// Web URL for viewing the commit (if the store has one)
    pub url: Option<String>,
}

/// One entry of a tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Repository-relative path
    pub path: String,
    /// File mode
    pub mode: EntryMode,
    /// Kind of the referenced object
    pub kind: ObjectKind,
    /// Referenced object id
    pub id: Oid,
}

/// A path to set on top of a base tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeOverride {
    /// Repository-relative path
    pub path: String,
    /// File mode
    pub mode: EntryMode,
    /// Blob holding the new content
    pub blob_id: Oid,
}

impl TreeOverride {
    /// Regular file override.
    pub fn file(path: impl Into<String>, blob_id: Oid) -> Self {
        Self {
            path: path.into(),
            mode: EntryMode::File,
            blob_id,
        }
    }
}

/// Request to create a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    /// Root tree
    pub tree_id: Oid,
    /// Parent commits
    pub parent_ids: Vec<Oid>,
    /// Commit message
    pub message: String,
}

/// The object-graph API of a remote version-control backend.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the publisher issues blob
/// uploads concurrently against one shared store.
///
/// # Error Handling
///
/// All methods return `Result<T, StoreError>`. `Conflict` is reserved for
/// [`update_ref`](ObjectStore::update_ref); every other method reports
/// lookups of missing objects as `NotFound`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get the store name (e.g., "github", "memory").
    fn name(&self) -> &'static str;

    /// Resolve the commit a branch currently points at.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the branch does not exist
    async fn get_ref(&self, branch: &BranchName) -> Result<Oid, StoreError>;

    /// Read a commit's tree and parents.
    async fn get_commit(&self, id: &Oid) -> Result<CommitInfo, StoreError>;

    /// List a tree.
    ///
    /// With `recursive`, blob entries of all subtrees are included with
    /// their full paths.
    async fn get_tree(&self, id: &Oid, recursive: bool) -> Result<Vec<TreeEntry>, StoreError>;

    /// Store file content, returning its blob id.
    ///
    /// Idempotent: storing the same bytes twice yields the same or an
    /// equivalent blob.
    async fn create_blob(&self, content: &[u8]) -> Result<Oid, StoreError>;

    /// Create a tree equal to `base` with `overrides` applied.
    ///
    /// Entries of `base` that are not overridden are carried over by
    /// reference. Intermediate directories are created as needed.
    async fn create_tree(&self, base: &Oid, overrides: &[TreeOverride])
        -> Result<Oid, StoreError>;

    /// Create a commit object.
    async fn create_commit(&self, commit: &NewCommit) -> Result<CommitInfo, StoreError>;

    /// Move `branch` from `expected` to `new`.
    ///
    /// This is the only operation with a visible effect.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the branch no longer points at `expected`
    /// - `NotFound` if the branch does not exist
    /// - `NotSent` if a check the store makes before writing fails
    async fn update_ref(
        &self,
        branch: &BranchName,
        expected: &Oid,
        new: &Oid,
    ) -> Result<(), StoreError>;

    /// Read a file's current content on `branch`.
    ///
    /// Returns `Ok(None)` if the path does not exist.
    async fn get_file(&self, path: &str, branch: &BranchName)
        -> Result<Option<Vec<u8>>, StoreError>;
}
