//! store::github
//!
//! GitHub object store over the REST git-data API.
//!
//! # Design
//!
//! Every [`ObjectStore`] operation is one (occasionally two) REST calls
//! against `/repos/{owner}/{repo}/git/*`. Blobs are uploaded base64-encoded
//! so arbitrary bytes survive the round trip. Trees are created against a
//! `base_tree`, so untouched entries are carried over by GitHub itself.
//!
//! # Ref updates
//!
//! The REST API has no native compare-and-swap for refs. `update_ref`
//! re-reads the ref and refuses to move it unless it still points at
//! `expected`, then issues a non-forced `PATCH`. A failed re-read is
//! reported as `StoreError::NotSent`. A non-forced update is
//! rejected by GitHub unless the new commit descends from the current tip,
//! which closes the window for any writer that advances the branch in
//! between. A writer that force-resets the branch *backwards* in that window
//! is not detected.
//!
//! # Rate Limiting
//!
//! Returns `StoreError::RateLimited` on HTTP 429. Retrying is the caller's
//! responsibility.
//!
//! # Example
//!
//! ```ignore
//! use gitpress::store::github::GitHubStore;
//!
//! let store = GitHubStore::new(token, "octocat", "site-content");
//! let head = store.get_ref(&BranchName::new("main")?).await?;
//! ```

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::traits::{
    CommitInfo, EntryMode, NewCommit, ObjectKind, ObjectStore, StoreError, TreeEntry,
    TreeOverride,
};
use crate::core::types::{BranchName, Oid};

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "gitpress";

/// GitHub object store.
pub struct GitHubStore {
    /// HTTP client for making requests
    client: Client,
    /// Personal access token or installation token
    token: String,
    /// Repository owner (user or organization)
    owner: String,
    /// Repository name
    repo: String,
    /// API base URL (configurable for GitHub Enterprise)
    api_base: String,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubStore")
            .field("has_token", &!self.token.is_empty())
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GitHubStore {
    /// Create a store for `owner/repo` on github.com.
    pub fn new(token: impl Into<String>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self::with_api_base(token, owner, repo, DEFAULT_API_BASE)
    }

    /// Create a store against a custom API base URL.
    ///
    /// Use this for GitHub Enterprise installations
    /// (e.g., `https://github.example.com/api/v3`) and for tests.
    pub fn with_api_base(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        let api_base: String = api_base.into();
        Self {
            client: Client::new(),
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn headers(&self) -> Result<HeaderMap, StoreError> {
        if self.token.is_empty() {
            return Err(StoreError::AuthRequired);
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| StoreError::AuthFailed("token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    /// `repo_url(base)` followed by `segments`, each percent-encoded.
    fn segmented_url<'s>(
        &self,
        base: &str,
        segments: impl IntoIterator<Item = &'s str>,
    ) -> Result<Url, StoreError> {
        let invalid = |message: String| StoreError::ApiError { status: 0, message };

        let mut url = Url::parse(&self.repo_url(base))
            .map_err(|e| invalid(format!("invalid API base '{}': {}", self.api_base, e)))?;
        url.path_segments_mut()
            .map_err(|_| invalid(format!("API base '{}' cannot be a base", self.api_base)))?
            .extend(segments);
        Ok(url)
    }

    /// Contents API URL for `path` at `branch`.
    fn contents_url(&self, path: &str, branch: &BranchName) -> Result<Url, StoreError> {
        let mut url = self.segmented_url("contents", path.split('/'))?;
        url.query_pairs_mut().append_pair("ref", branch.as_str());
        Ok(url)
    }

    /// `git/ref/heads/...` (read) or `git/refs/heads/...` (update) for `branch`.
    ///
    /// Branch names may contain `#` and `%`, so each segment is encoded.
    fn branch_url(&self, base: &str, branch: &BranchName) -> Result<Url, StoreError> {
        self.segmented_url(base, branch.as_str().split('/'))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, StoreError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| StoreError::ApiError {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            })
        } else {
            self.handle_error_response(response, status).await
        }
    }

    async fn handle_error_response<T>(
        &self,
        response: Response,
        status: StatusCode,
    ) -> Result<T, StoreError> {
        // GitHub Apps use X-Accepted-GitHub-Permissions, classic tokens X-Accepted-OAuth-Scopes.
        let required = response
            .headers()
            .get("X-Accepted-GitHub-Permissions")
            .or_else(|| response.headers().get("X-Accepted-OAuth-Scopes"))
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string());

        let message = match response.json::<GitHubErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => "Unknown error".to_string(),
        };

        Err(match status {
            StatusCode::UNAUTHORIZED => StoreError::AuthFailed("Invalid or expired token".into()),
            StatusCode::FORBIDDEN => {
                let mut err_msg = format!("Permission denied: {}", message);
                if let Some(required) = required {
                    err_msg.push_str(&format!(" [required: {}]", required));
                }
                StoreError::AuthFailed(err_msg)
            }
            StatusCode::NOT_FOUND => StoreError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimited,
            _ if status.is_server_error() => StoreError::ApiError {
                status: status.as_u16(),
                message: format!("GitHub server error: {}", message),
            },
            _ => StoreError::ApiError {
                status: status.as_u16(),
                message,
            },
        })
    }
}

#[async_trait]
impl ObjectStore for GitHubStore {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn get_ref(&self, branch: &BranchName) -> Result<Oid, StoreError> {
        let url = self.branch_url("git/ref/heads", branch)?;
        tracing::debug!(%url, "resolving ref");

        let git_ref: GitHubRef = self
            .send(self.client.get(url))
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => {
                    StoreError::NotFound(format!("ref {}", branch.qualified()))
                }
                other => other,
            })?;

        parse_oid(&git_ref.object.sha)
    }

    async fn get_commit(&self, id: &Oid) -> Result<CommitInfo, StoreError> {
        let url = self.repo_url(&format!("git/commits/{}", id));
        tracing::debug!(%url, "reading commit");

        let commit: GitHubCommit = self.send(self.client.get(&url)).await?;
        commit.try_into()
    }

    async fn get_tree(&self, id: &Oid, recursive: bool) -> Result<Vec<TreeEntry>, StoreError> {
        let mut request = self.client.get(self.repo_url(&format!("git/trees/{}", id)));
        if recursive {
            request = request.query(&[("recursive", "1")]);
        }
        tracing::debug!(tree = %id, recursive, "listing tree");

        let tree: GitHubTree = self.send(request).await?;
        if tree.truncated {
            tracing::warn!(tree = %id, "tree listing was truncated by the API");
        }

        let mut entries = Vec::with_capacity(tree.tree.len());
        for entry in tree.tree {
            let kind = match entry.kind.as_str() {
                "blob" => ObjectKind::Blob,
                "tree" => ObjectKind::Tree,
                "commit" => ObjectKind::Commit,
                other => {
                    return Err(StoreError::ApiError {
                        status: 200,
                        message: format!("unknown tree entry type '{}'", other),
                    })
                }
            };
            if recursive && kind != ObjectKind::Blob {
                continue;
            }
            let mode = EntryMode::parse(&entry.mode).ok_or_else(|| StoreError::ApiError {
                status: 200,
                message: format!("unknown tree entry mode '{}'", entry.mode),
            })?;
            entries.push(TreeEntry {
                path: entry.path,
                mode,
                kind,
                id: parse_oid(&entry.sha)?,
            });
        }
        Ok(entries)
    }

    async fn create_blob(&self, content: &[u8]) -> Result<Oid, StoreError> {
        let body = CreateBlobBody {
            content: STANDARD.encode(content),
            encoding: "base64",
        };
        tracing::debug!(bytes = content.len(), "creating blob");

        let created: GitHubSha = self
            .send(self.client.post(self.repo_url("git/blobs")).json(&body))
            .await?;
        parse_oid(&created.sha)
    }

    async fn create_tree(
        &self,
        base: &Oid,
        overrides: &[TreeOverride],
    ) -> Result<Oid, StoreError> {
        let body = CreateTreeBody {
            base_tree: base.as_str(),
            tree: overrides
                .iter()
                .map(|o| CreateTreeEntry {
                    path: &o.path,
                    mode: o.mode.as_str(),
                    kind: "blob",
                    sha: o.blob_id.as_str(),
                })
                .collect(),
        };
        tracing::debug!(base = %base, entries = overrides.len(), "creating tree");

        let created: GitHubSha = self
            .send(self.client.post(self.repo_url("git/trees")).json(&body))
            .await?;
        parse_oid(&created.sha)
    }

    async fn create_commit(&self, commit: &NewCommit) -> Result<CommitInfo, StoreError> {
        let body = CreateCommitBody {
            message: &commit.message,
            tree: commit.tree_id.as_str(),
            parents: commit.parent_ids.iter().map(Oid::as_str).collect(),
        };
        tracing::debug!(tree = %commit.tree_id, "creating commit");

        let created: GitHubCommit = self
            .send(self.client.post(self.repo_url("git/commits")).json(&body))
            .await?;
        created.try_into()
    }

    async fn update_ref(
        &self,
        branch: &BranchName,
        expected: &Oid,
        new: &Oid,
    ) -> Result<(), StoreError> {
        let not_sent = |e: StoreError| StoreError::NotSent(Box::new(e));

        let current = self.get_ref(branch).await.map_err(not_sent)?;
        if &current != expected {
            return Err(StoreError::Conflict(format!(
                "{} is at {}, expected {}",
                branch.qualified(),
                current.short(12),
                expected.short(12)
            )));
        }

        let url = self.branch_url("git/refs/heads", branch).map_err(not_sent)?;
        let body = UpdateRefBody {
            sha: new.as_str(),
            force: false,
        };
        tracing::debug!(%url, from = %expected, to = %new, "updating ref");

        let result: Result<GitHubRef, StoreError> =
            self.send(self.client.patch(url).json(&body)).await;

        match result {
            Ok(_) => Ok(()),
            Err(StoreError::ApiError { status: 422, message })
                if message.to_ascii_lowercase().contains("fast forward") =>
            {
                Err(StoreError::Conflict(message))
            }
            Err(StoreError::ApiError { status: 409, message }) => {
                Err(StoreError::Conflict(message))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_file(
        &self,
        path: &str,
        branch: &BranchName,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let url = self.contents_url(path, branch)?;
        tracing::debug!(%url, "reading file");

        let file: GitHubContent = match self.send(self.client.get(url)).await {
            Ok(file) => file,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        if file.kind != "file" {
            return Err(StoreError::ApiError {
                status: 200,
                message: format!("'{}' is a {}, not a file", path, file.kind),
            });
        }

        // Files over 1 MB come back without inline content.
        if file.encoding.as_deref() == Some("base64") && !file.content.is_empty() {
            return decode_base64(&file.content).map(Some);
        }

        let blob: GitHubBlob = self
            .send(self.client.get(self.repo_url(&format!("git/blobs/{}", file.sha))))
            .await?;
        decode_base64(&blob.content).map(Some)
    }
}

fn parse_oid(sha: &str) -> Result<Oid, StoreError> {
    Oid::new(sha).map_err(|e| StoreError::ApiError {
        status: 200,
        message: format!("invalid object id in response: {}", e),
    })
}

/// Decode GitHub's line-wrapped base64.
fn decode_base64(content: &str) -> Result<Vec<u8>, StoreError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).map_err(|e| StoreError::ApiError {
        status: 200,
        message: format!("invalid base64 content: {}", e),
    })
}

/// Parse an `OWNER/REPO` slug or a github.com remote URL.
///
/// Supported formats:
/// - `octocat/hello-world`
/// - `git@github.com:octocat/hello-world.git`
/// - `https://github.com/octocat/hello-world.git`
pub fn parse_repo_slug(input: &str) -> Option<(String, String)> {
    let rest = input
        .strip_prefix("git@github.com:")
        .or_else(|| input.strip_prefix("https://github.com/"))
        .or_else(|| input.strip_prefix("http://github.com/"))
        .unwrap_or(input);

    if rest.contains("://") || rest.contains('@') {
        return None;
    }

    let rest = rest.strip_suffix(".git").unwrap_or(rest);
    let rest = rest.trim_end_matches('/');
    let (owner, repo) = rest.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct CreateBlobBody {
    content: String,
    encoding: &'static str,
}

#[derive(Serialize)]
struct CreateTreeBody<'a> {
    base_tree: &'a str,
    tree: Vec<CreateTreeEntry<'a>>,
}

#[derive(Serialize)]
struct CreateTreeEntry<'a> {
    path: &'a str,
    mode: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    sha: &'a str,
}

#[derive(Serialize)]
struct CreateCommitBody<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Serialize)]
struct UpdateRefBody<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

#[derive(Deserialize)]
struct GitHubSha {
    sha: String,
}

#[derive(Deserialize)]
struct GitHubRef {
    object: GitHubSha,
}

#[derive(Deserialize)]
struct GitHubCommit {
    sha: String,
    tree: GitHubSha,
    #[serde(default)]
    parents: Vec<GitHubSha>,
    html_url: Option<String>,
}

impl TryFrom<GitHubCommit> for CommitInfo {
    type Error = StoreError;

    fn try_from(commit: GitHubCommit) -> Result<Self, Self::Error> {
        Ok(CommitInfo {
            id: parse_oid(&commit.sha)?,
            tree_id: parse_oid(&commit.tree.sha)?,
            parent_ids: commit
                .parents
                .iter()
                .map(|p| parse_oid(&p.sha))
                .collect::<Result<_, _>>()?,
            url: commit.html_url,
        })
    }
}

#[derive(Deserialize)]
struct GitHubTree {
    tree: Vec<GitHubTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct GitHubTreeEntry {
    path: String,
    mode: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Deserialize)]
struct GitHubContent {
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    content: String,
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct GitHubBlob {
    content: String,
}
