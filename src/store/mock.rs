//! store::mock
//!
//! In-memory object store for deterministic testing.
//!
//! # Design
//!
//! The mock keeps a real content-addressed object graph in memory: blobs,
//! trees, and commits are keyed by the SHA-256 of their serialized form, so
//! identical content yields identical ids just like a Git host. Refs move
//! only through [`ObjectStore::update_ref`] (compare-and-swap) or the
//! [`MockStore::commit_directly`] helper, which simulates another writer.
//!
//! Failure scenarios are configured with [`FailOn`], and every call is
//! recorded as a [`MockOperation`] so tests can assert on exactly which
//! requests were issued.
//!
//! # Example
//!
//! ```
//! use gitpress::core::types::BranchName;
//! use gitpress::store::mock::MockStore;
//! use gitpress::store::ObjectStore;
//!
//! # tokio_test::block_on(async {
//! let store = MockStore::with_branch("main", &[("README.md", b"hello")]);
//! let main = BranchName::new("main").unwrap();
//!
//! let head = store.get_ref(&main).await.unwrap();
//! assert_eq!(store.head("main"), Some(head));
//! assert_eq!(
//!     store.get_file("README.md", &main).await.unwrap(),
//!     Some(b"hello".to_vec())
//! );
//! # });
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::traits::{
    CommitInfo, EntryMode, NewCommit, ObjectKind, ObjectStore, StoreError, TreeEntry,
    TreeOverride,
};
use crate::core::change_set::ancestors;
use crate::core::types::{BranchName, Oid};

/// Flattened tree: full path to (mode, blob id).
type FlatTree = BTreeMap<String, (EntryMode, Oid)>;

/// One-shot callback run just before a ref update is applied.
type RefHook = Box<dyn FnOnce(&MockStore) + Send>;

/// Mock object store for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Clone)]
pub struct MockStore {
    inner: Arc<Mutex<MockStoreInner>>,
    before_update_ref: Arc<Mutex<Option<RefHook>>>,
}

impl std::fmt::Debug for MockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("MockStore")
            .field("refs", &inner.refs)
            .field("blobs", &inner.blobs.len())
            .field("trees", &inner.trees.len())
            .field("commits", &inner.commits.len())
            .finish()
    }
}

#[derive(Debug, Default)]
struct MockStoreInner {
    blobs: HashMap<Oid, Vec<u8>>,
    trees: HashMap<Oid, FlatTree>,
    commits: HashMap<Oid, StoredCommit>,
    refs: HashMap<String, Oid>,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
    blob_calls: usize,
    blob_delay: Option<Duration>,
    blobs_in_flight: usize,
    max_blobs_in_flight: usize,
}

#[derive(Debug, Clone)]
struct StoredCommit {
    info: CommitInfo,
    message: String,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail get_ref with the given error.
    GetRef(StoreError),
    /// Fail get_commit with the given error.
    GetCommit(StoreError),
    /// Fail get_tree with the given error.
    GetTree(StoreError),
    /// Fail every create_blob with the given error.
    CreateBlob(StoreError),
    /// Fail only the nth (1-based) create_blob call.
    NthBlob(usize, StoreError),
    /// Fail create_tree with the given error.
    CreateTree(StoreError),
    /// Fail create_commit with the given error.
    CreateCommit(StoreError),
    /// Fail update_ref with the given error, leaving the ref untouched.
    UpdateRef(StoreError),
    /// Apply the ref update, then report the given error anyway.
    UpdateRefAfterApply(StoreError),
    /// Fail get_file with the given error.
    GetFile(StoreError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    GetRef {
        branch: String,
    },
    GetCommit {
        id: Oid,
    },
    GetTree {
        id: Oid,
        recursive: bool,
    },
    CreateBlob {
        len: usize,
    },
    CreateTree {
        base: Oid,
        paths: Vec<String>,
    },
    CreateCommit {
        tree_id: Oid,
        parent_ids: Vec<Oid>,
        message: String,
    },
    UpdateRef {
        branch: String,
        expected: Oid,
        new: Oid,
    },
    GetFile {
        path: String,
        branch: String,
    },
}

impl MockStore {
    /// Create a new empty mock store (no branches).
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockStoreInner::default())),
            before_update_ref: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a mock store with one branch holding a root commit of `files`.
    pub fn with_branch(branch: &str, files: &[(&str, &[u8])]) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().unwrap();
            inner.write_commit(branch, files, "Initial commit");
        }
        store
    }

    /// Configure the mock to fail on a specific operation.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.inner.lock().unwrap().fail_on = Some(fail_on);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.inner.lock().unwrap().fail_on = None;
    }

    /// Delay each blob upload, so concurrent uploads overlap.
    pub fn with_blob_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().blob_delay = Some(delay);
        self
    }

    /// Run `hook` once, immediately before the next ref update is applied.
    ///
    /// Used to simulate a concurrent writer moving the ref mid-publish.
    pub fn before_update_ref(&self, hook: impl FnOnce(&MockStore) + Send + 'static) {
        *self.before_update_ref.lock().unwrap() = Some(Box::new(hook));
    }

    /// Commit `files` on top of `branch` and move it unconditionally.
    ///
    /// Simulates a writer outside the publisher. Returns the new commit id.
    pub fn commit_directly(&self, branch: &str, files: &[(&str, &[u8])], message: &str) -> Oid {
        self.inner
            .lock()
            .unwrap()
            .write_commit(branch, files, message)
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.inner.lock().unwrap().operations.clear();
    }

    /// Current commit of a branch.
    pub fn head(&self, branch: &str) -> Option<Oid> {
        self.inner.lock().unwrap().refs.get(branch).cloned()
    }

    /// Commit metadata by id.
    pub fn commit(&self, id: &Oid) -> Option<CommitInfo> {
        let inner = self.inner.lock().unwrap();
        inner.commits.get(id).map(|c| c.info.clone())
    }

    /// Commit message by id.
    pub fn commit_message(&self, id: &Oid) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.commits.get(id).map(|c| c.message.clone())
    }

    /// Flattened (path, mode, blob id) listing of a tree.
    pub fn tree_entries(&self, id: &Oid) -> Option<Vec<(String, EntryMode, Oid)>> {
        let inner = self.inner.lock().unwrap();
        inner.trees.get(id).map(|tree| {
            tree.iter()
                .map(|(path, (mode, blob))| (path.clone(), *mode, blob.clone()))
                .collect()
        })
    }

    /// Every file reachable from `branch`, with its content.
    pub fn files_at(&self, branch: &str) -> BTreeMap<String, Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let Some(tree) = inner
            .refs
            .get(branch)
            .and_then(|head| inner.commits.get(head))
            .and_then(|commit| inner.trees.get(&commit.info.tree_id))
        else {
            return BTreeMap::new();
        };

        tree.iter()
            .filter_map(|(path, (_, blob))| {
                inner
                    .blobs
                    .get(blob)
                    .map(|content| (path.clone(), content.clone()))
            })
            .collect()
    }

    /// Number of stored (blobs, trees, commits).
    pub fn object_counts(&self) -> (usize, usize, usize) {
        let inner = self.inner.lock().unwrap();
        (inner.blobs.len(), inner.trees.len(), inner.commits.len())
    }

    /// Highest number of blob uploads observed in flight at once.
    pub fn max_blobs_in_flight(&self) -> usize {
        self.inner.lock().unwrap().max_blobs_in_flight
    }

    fn record(&self, op: MockOperation) {
        self.inner.lock().unwrap().operations.push(op);
    }

    /// Check if we should fail and return the error if so.
    fn check_fail(&self, op: &str) -> Option<StoreError> {
        let inner = self.inner.lock().unwrap();
        match (&inner.fail_on, op) {
            (Some(FailOn::GetRef(e)), "get_ref")
            | (Some(FailOn::GetCommit(e)), "get_commit")
            | (Some(FailOn::GetTree(e)), "get_tree")
            | (Some(FailOn::CreateBlob(e)), "create_blob")
            | (Some(FailOn::CreateTree(e)), "create_tree")
            | (Some(FailOn::CreateCommit(e)), "create_commit")
            | (Some(FailOn::UpdateRef(e)), "update_ref")
            | (Some(FailOn::GetFile(e)), "get_file") => Some(e.clone()),
            (Some(FailOn::NthBlob(n, e)), "create_blob") if *n == inner.blob_calls => {
                Some(e.clone())
            }
            _ => None,
        }
    }

    fn fail_after_apply(&self) -> Option<StoreError> {
        match &self.inner.lock().unwrap().fail_on {
            Some(FailOn::UpdateRefAfterApply(e)) => Some(e.clone()),
            _ => None,
        }
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStoreInner {
    fn put_blob(&mut self, content: &[u8]) -> Oid {
        let id = hash_object("blob", content);
        self.blobs.entry(id.clone()).or_insert_with(|| content.to_vec());
        id
    }

    fn put_tree(&mut self, tree: FlatTree) -> Oid {
        let mut body = Vec::new();
        for (path, (mode, id)) in &tree {
            body.extend_from_slice(format!("{} {}\0{}\n", mode, path, id).as_bytes());
        }
        let id = hash_object("tree", &body);
        self.trees.entry(id.clone()).or_insert(tree);
        id
    }

    fn put_commit(&mut self, tree_id: Oid, parent_ids: Vec<Oid>, message: &str) -> CommitInfo {
        let mut body = format!("tree {}\n", tree_id);
        for parent in &parent_ids {
            body.push_str(&format!("parent {}\n", parent));
        }
        body.push('\n');
        body.push_str(message);

        let id = hash_object("commit", body.as_bytes());
        let info = CommitInfo {
            url: Some(format!("memory://commits/{}", id)),
            id: id.clone(),
            tree_id,
            parent_ids,
        };
        self.commits.entry(id).or_insert_with(|| StoredCommit {
            info: info.clone(),
            message: message.to_string(),
        });
        info
    }

    fn write_commit(&mut self, branch: &str, files: &[(&str, &[u8])], message: &str) -> Oid {
        let parent = self.refs.get(branch).cloned();
        let mut tree = parent
            .as_ref()
            .and_then(|p| self.commits.get(p))
            .and_then(|c| self.trees.get(&c.info.tree_id))
            .cloned()
            .unwrap_or_default();

        for (path, content) in files {
            let blob = self.put_blob(content);
            insert_path(&mut tree, path, EntryMode::File, blob);
        }

        let tree_id = self.put_tree(tree);
        let commit = self.put_commit(tree_id, parent.into_iter().collect(), message);
        self.refs.insert(branch.to_string(), commit.id.clone());
        commit.id
    }

    fn branch_tree(&self, branch: &BranchName) -> Result<&FlatTree, StoreError> {
        let head = self
            .refs
            .get(branch.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("ref {}", branch.qualified())))?;
        let commit = self
            .commits
            .get(head)
            .ok_or_else(|| StoreError::NotFound(format!("commit {}", head)))?;
        self.trees
            .get(&commit.info.tree_id)
            .ok_or_else(|| StoreError::NotFound(format!("tree {}", commit.info.tree_id)))
    }
}

/// The file or directory in `tree` that a file at `path` would have to replace.
fn collision(tree: &FlatTree, path: &str) -> Option<String> {
    if let Some(file) = ancestors(path).find(|dir| tree.contains_key(*dir)) {
        return Some(file.to_string());
    }
    let dir_prefix = format!("{}/", path);
    tree.range(dir_prefix.clone()..)
        .next()
        .filter(|(p, _)| p.starts_with(&dir_prefix))
        .map(|_| dir_prefix)
}

/// Set `path` in a flattened tree, replacing any file/directory it collides with.
///
/// Only used for commits made outside the publisher.
fn insert_path(tree: &mut FlatTree, path: &str, mode: EntryMode, blob: Oid) {
    // A file at any ancestor path becomes a directory.
    let mut prefix = String::new();
    for segment in path.split('/') {
        if !prefix.is_empty() {
            tree.remove(&prefix);
            prefix.push('/');
        }
        prefix.push_str(segment);
    }
    // A directory at this path becomes a file.
    let dir_prefix = format!("{}/", path);
    tree.retain(|p, _| !p.starts_with(&dir_prefix));

    tree.insert(path.to_string(), (mode, blob));
}

fn hash_object(kind: &str, body: &[u8]) -> Oid {
    let mut hasher = Sha256::new();
    hasher.update(format!("{} {}\0", kind, body.len()).as_bytes());
    hasher.update(body);
    Oid::new(hex::encode(hasher.finalize())).expect("sha-256 digest is a valid object id")
}

#[async_trait]
impl ObjectStore for MockStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_ref(&self, branch: &BranchName) -> Result<Oid, StoreError> {
        self.record(MockOperation::GetRef {
            branch: branch.to_string(),
        });

        if let Some(e) = self.check_fail("get_ref") {
            return Err(e);
        }

        let inner = self.inner.lock().unwrap();
        inner
            .refs
            .get(branch.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("ref {}", branch.qualified())))
    }

    async fn get_commit(&self, id: &Oid) -> Result<CommitInfo, StoreError> {
        self.record(MockOperation::GetCommit { id: id.clone() });

        if let Some(e) = self.check_fail("get_commit") {
            return Err(e);
        }

        let inner = self.inner.lock().unwrap();
        inner
            .commits
            .get(id)
            .map(|c| c.info.clone())
            .ok_or_else(|| StoreError::NotFound(format!("commit {}", id)))
    }

    async fn get_tree(&self, id: &Oid, recursive: bool) -> Result<Vec<TreeEntry>, StoreError> {
        self.record(MockOperation::GetTree {
            id: id.clone(),
            recursive,
        });

        if let Some(e) = self.check_fail("get_tree") {
            return Err(e);
        }

        let mut inner = self.inner.lock().unwrap();
        let tree = inner
            .trees
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("tree {}", id)))?;

        if recursive {
            return Ok(tree
                .into_iter()
                .map(|(path, (mode, id))| TreeEntry {
                    path,
                    mode,
                    kind: ObjectKind::Blob,
                    id,
                })
                .collect());
        }

        // Top level only: group nested paths into subtrees.
        let mut entries = Vec::new();
        let mut subtrees: BTreeMap<String, FlatTree> = BTreeMap::new();
        for (path, (mode, blob)) in tree {
            match path.split_once('/') {
                Some((dir, rest)) => {
                    subtrees
                        .entry(dir.to_string())
                        .or_default()
                        .insert(rest.to_string(), (mode, blob));
                }
                None => entries.push(TreeEntry {
                    path,
                    mode,
                    kind: ObjectKind::Blob,
                    id: blob,
                }),
            }
        }
        for (dir, subtree) in subtrees {
            let id = inner.put_tree(subtree);
            entries.push(TreeEntry {
                path: dir,
                mode: EntryMode::Directory,
                kind: ObjectKind::Tree,
                id,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn create_blob(&self, content: &[u8]) -> Result<Oid, StoreError> {
        self.record(MockOperation::CreateBlob { len: content.len() });

        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.blob_calls += 1;
            inner.blob_delay
        };

        if let Some(e) = self.check_fail("create_blob") {
            return Err(e);
        }

        {
            let mut inner = self.inner.lock().unwrap();
            inner.blobs_in_flight += 1;
            inner.max_blobs_in_flight = inner.max_blobs_in_flight.max(inner.blobs_in_flight);
        }

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        inner.blobs_in_flight -= 1;
        Ok(inner.put_blob(content))
    }

    async fn create_tree(
        &self,
        base: &Oid,
        overrides: &[TreeOverride],
    ) -> Result<Oid, StoreError> {
        self.record(MockOperation::CreateTree {
            base: base.clone(),
            paths: overrides.iter().map(|o| o.path.clone()).collect(),
        });

        if let Some(e) = self.check_fail("create_tree") {
            return Err(e);
        }

        let mut inner = self.inner.lock().unwrap();
        let mut tree = inner
            .trees
            .get(base)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("tree {}", base)))?;

        for entry in overrides {
            if !inner.blobs.contains_key(&entry.blob_id) {
                return Err(StoreError::ApiError {
                    status: 422,
                    message: format!("{} is not a valid blob", entry.blob_id),
                });
            }
            if let Some(existing) = collision(&tree, &entry.path) {
                return Err(StoreError::ApiError {
                    status: 422,
                    message: format!("tree path '{}' conflicts with '{}'", entry.path, existing),
                });
            }
            tree.insert(entry.path.clone(), (entry.mode, entry.blob_id.clone()));
        }

        Ok(inner.put_tree(tree))
    }

    async fn create_commit(&self, commit: &NewCommit) -> Result<CommitInfo, StoreError> {
        self.record(MockOperation::CreateCommit {
            tree_id: commit.tree_id.clone(),
            parent_ids: commit.parent_ids.clone(),
            message: commit.message.clone(),
        });

        if let Some(e) = self.check_fail("create_commit") {
            return Err(e);
        }

        let mut inner = self.inner.lock().unwrap();
        if !inner.trees.contains_key(&commit.tree_id) {
            return Err(StoreError::ApiError {
                status: 422,
                message: format!("tree {} does not exist", commit.tree_id),
            });
        }
        if let Some(missing) = commit
            .parent_ids
            .iter()
            .find(|p| !inner.commits.contains_key(*p))
        {
            return Err(StoreError::ApiError {
                status: 422,
                message: format!("parent {} does not exist", missing),
            });
        }

        Ok(inner.put_commit(
            commit.tree_id.clone(),
            commit.parent_ids.clone(),
            &commit.message,
        ))
    }

    async fn update_ref(
        &self,
        branch: &BranchName,
        expected: &Oid,
        new: &Oid,
    ) -> Result<(), StoreError> {
        self.record(MockOperation::UpdateRef {
            branch: branch.to_string(),
            expected: expected.clone(),
            new: new.clone(),
        });

        if let Some(e) = self.check_fail("update_ref") {
            return Err(e);
        }

        let hook = self.before_update_ref.lock().unwrap().take();
        if let Some(hook) = hook {
            hook(self);
        }

        {
            let mut inner = self.inner.lock().unwrap();
            let current = inner
                .refs
                .get(branch.as_str())
                .ok_or_else(|| StoreError::NotFound(format!("ref {}", branch.qualified())))?;

            if current != expected {
                return Err(StoreError::Conflict(format!(
                    "{} is at {}, expected {}",
                    branch.qualified(),
                    current.short(12),
                    expected.short(12)
                )));
            }
            if !inner.commits.contains_key(new) {
                return Err(StoreError::ApiError {
                    status: 422,
                    message: format!("commit {} does not exist", new),
                });
            }

            inner.refs.insert(branch.to_string(), new.clone());
        }

        match self.fail_after_apply() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn get_file(
        &self,
        path: &str,
        branch: &BranchName,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.record(MockOperation::GetFile {
            path: path.to_string(),
            branch: branch.to_string(),
        });

        if let Some(e) = self.check_fail("get_file") {
            return Err(e);
        }

        let inner = self.inner.lock().unwrap();
        let tree = inner.branch_tree(branch)?;
        Ok(tree
            .get(path)
            .and_then(|(_, blob)| inner.blobs.get(blob))
            .cloned())
    }
}
