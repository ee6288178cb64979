//! GitHub as a content-addressed repository host
//!
//! [`RepositoryHost`] is the capability the commit dispatcher writes through.
//! [`GitHubHost`] implements it on the REST contents API (one commit per
//! file) and the git data API (blobs, trees, commits, refs).

use crate::encoding::encode_text;
use async_trait::async_trait;
use git2::Repository;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const API_TIMEOUT_SECS: u64 = 60;
const USER_AGENT: &str = "codeshift";
const API_VERSION: &str = "2022-11-28";

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("unexpected response from GitHub: {0}")]
    Decode(String),
    #[error("invalid API endpoint: {0}")]
    Endpoint(String),
}

/// Existing stored version of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRef {
    pub sha: String,
}

/// A create-or-update of a single file on a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentWrite {
    pub path: String,
    pub content: String,
    pub message: String,
    pub branch: String,
    /// Identity of the version being replaced; required when the path exists
    pub sha: Option<String>,
}

/// One file to layer onto a base tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub blob: String,
}

/// Remote repository operations the commit paths are built from.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Look up the stored version of `path` on `branch`, `None` when absent.
    async fn get_content(&self, path: &str, branch: &str) -> Result<Option<ContentRef>, HostError>;
    async fn put_content(&self, write: &ContentWrite) -> Result<(), HostError>;
    async fn get_branch_tip(&self, branch: &str) -> Result<String, HostError>;
    /// Tree id of a commit
    async fn get_tree(&self, commit: &str) -> Result<String, HostError>;
    async fn create_blob(&self, content: &str) -> Result<String, HostError>;
    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> Result<String, HostError>;
    async fn create_commit(&self, tree: &str, parent: &str, message: &str) -> Result<String, HostError>;
    async fn update_branch_tip(&self, branch: &str, commit: &str) -> Result<(), HostError>;
}

// ============================================================================
// Repository coordinates
// ============================================================================

/// `owner/name` of a GitHub repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    /// Parse `owner/name`.
    pub fn parse(s: &str) -> Option<Self> {
        let (owner, name) = s.trim().split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.trim_end_matches(".git").to_string(),
        })
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Extract owner and repo from a git remote URL.
///
/// Supports:
/// - git@github.com:owner/repo.git
/// - https://github.com/owner/repo.git
/// - https://github.com/owner/repo
pub fn parse_remote_url(url: &str) -> Option<RepoSlug> {
    // SSH format: git@github.com:owner/repo.git
    if let Some(rest) = url.strip_prefix("git@github.com:") {
        return slug_from_path(rest);
    }

    if let Ok(parsed) = Url::parse(url) {
        if parsed.host_str() == Some("github.com") {
            return slug_from_path(parsed.path().trim_start_matches('/'));
        }
    }

    None
}

fn slug_from_path(path: &str) -> Option<RepoSlug> {
    let path = path.trim_end_matches('/').trim_end_matches(".git");
    let mut parts = path.splitn(2, '/');
    let owner = parts.next()?;
    let name = parts.next()?;
    if owner.is_empty() || name.is_empty() {
        return None;
    }
    Some(RepoSlug {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

/// Find the GitHub repository behind a local checkout's remotes.
pub fn get_remote_info(repo_path: &Path) -> anyhow::Result<RepoSlug> {
    let repo = Repository::discover(repo_path)?;

    for remote_name in ["origin", "upstream", "github"] {
        if let Ok(remote) = repo.find_remote(remote_name) {
            if let Some(slug) = remote.url().and_then(parse_remote_url) {
                return Ok(slug);
            }
        }
    }

    if let Ok(remotes) = repo.remotes() {
        for name in remotes.iter().flatten() {
            if let Ok(remote) = repo.find_remote(name) {
                if let Some(slug) = remote.url().and_then(parse_remote_url) {
                    return Ok(slug);
                }
            }
        }
    }

    Err(anyhow::anyhow!(
        "No GitHub remote found. Set `repo` in the config or add a remote pointing to github.com"
    ))
}

// ============================================================================
// Error sanitizing
// ============================================================================

/// Sanitize an API error body to prevent credential leakage.
/// Truncates long responses and redacts potential secrets.
fn sanitize_error_body(body: &str) -> String {
    // Patterns that might indicate secrets in error responses
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "bearer",
        "ghp_",        // GitHub personal access token prefix
        "gho_",        // GitHub OAuth token prefix
        "ghu_",        // GitHub user token prefix
        "github_pat_", // GitHub PAT prefix
    ];

    let truncated = match body.char_indices().nth(MAX_ERROR_BODY_LEN) {
        Some((idx, _)) => format!("{}... (truncated)", &body[..idx]),
        None => body.to_string(),
    };

    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|p| lower.contains(p)) {
        return "(error details redacted - may contain sensitive data)".to_string();
    }

    truncated
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

fn api_error(status: StatusCode, body: &str) -> HostError {
    let message = match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api_error) => {
            let detail = api_error
                .errors
                .first()
                .and_then(|e| e.message.clone())
                .unwrap_or_default();
            let msg = if detail.is_empty() {
                api_error.message
            } else {
                format!("{}: {}", api_error.message, detail)
            };
            sanitize_error_body(&msg)
        }
        Err(_) => sanitize_error_body(body),
    };
    HostError::Api {
        status: status.as_u16(),
        message,
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Deserialize)]
struct ShaObject {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: ShaObject,
}

#[derive(Deserialize)]
struct CommitResponse {
    tree: ShaObject,
}

#[derive(Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateBlobRequest {
    content: String,
    encoding: &'static str,
}

#[derive(Serialize)]
struct TreeItem<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: &'a str,
}

#[derive(Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: Vec<TreeItem<'a>>,
}

#[derive(Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: [&'a str; 1],
}

#[derive(Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
}

// ============================================================================
// REST client
// ============================================================================

/// GitHub REST implementation of [`RepositoryHost`]
pub struct GitHubHost {
    client: reqwest::Client,
    api_base: Url,
    repo: RepoSlug,
    token: String,
}

impl GitHubHost {
    pub fn new(repo: RepoSlug, token: impl Into<String>) -> Result<Self, HostError> {
        let api_base =
            Url::parse(DEFAULT_API_BASE).map_err(|e| HostError::Endpoint(e.to_string()))?;
        Self::with_api_base(repo, token, api_base)
    }

    /// Point the client at another API root (GitHub Enterprise, test servers).
    pub fn with_api_base(
        repo: RepoSlug,
        token: impl Into<String>,
        api_base: Url,
    ) -> Result<Self, HostError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .map_err(|e| HostError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_base,
            repo,
            token: token.into(),
        })
    }

    pub fn repo(&self) -> &RepoSlug {
        &self.repo
    }

    /// `{api_base}/repos/{owner}/{name}/{segments..}` with each segment
    /// percent-encoded.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, HostError> {
        let mut url = self.api_base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| HostError::Endpoint(self.api_base.to_string()))?;
            path.pop_if_empty()
                .extend(["repos", self.repo.owner.as_str(), self.repo.name.as_str()])
                .extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, HostError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| HostError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(api_error(status, &body))
    }

    async fn json<T: DeserializeOwned>(resp: Response) -> Result<T, HostError> {
        resp.json::<T>()
            .await
            .map_err(|e| HostError::Decode(e.to_string()))
    }
}

fn contents_segments(path: &str) -> impl Iterator<Item = &str> {
    std::iter::once("contents").chain(path.split('/').filter(|s| !s.is_empty()))
}

fn ref_segments(branch: &str) -> impl Iterator<Item = &str> {
    ["git", "refs", "heads"]
        .into_iter()
        .chain(branch.split('/').filter(|s| !s.is_empty()))
}

#[async_trait]
impl RepositoryHost for GitHubHost {
    async fn get_content(&self, path: &str, branch: &str) -> Result<Option<ContentRef>, HostError> {
        let mut url = self.endpoint(contents_segments(path))?;
        url.query_pairs_mut().append_pair("ref", branch);
        let resp = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| HostError::Transport(e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }
        let found: ShaObject = Self::json(resp).await?;
        Ok(Some(ContentRef { sha: found.sha }))
    }

    async fn put_content(&self, write: &ContentWrite) -> Result<(), HostError> {
        let url = self.endpoint(contents_segments(&write.path))?;
        let body = PutContentRequest {
            message: &write.message,
            content: encode_text(&write.content),
            branch: &write.branch,
            sha: write.sha.as_deref(),
        };
        debug!(path = %write.path, update = write.sha.is_some(), "PUT contents");
        self.send(self.request(Method::PUT, url).json(&body)).await?;
        Ok(())
    }

    async fn get_branch_tip(&self, branch: &str) -> Result<String, HostError> {
        let url = self.endpoint(ref_segments(branch))?;
        let resp = self.send(self.request(Method::GET, url)).await?;
        let reference: RefResponse = Self::json(resp).await?;
        Ok(reference.object.sha)
    }

    async fn get_tree(&self, commit: &str) -> Result<String, HostError> {
        let url = self.endpoint(["git", "commits", commit])?;
        let resp = self.send(self.request(Method::GET, url)).await?;
        let commit: CommitResponse = Self::json(resp).await?;
        Ok(commit.tree.sha)
    }

    async fn create_blob(&self, content: &str) -> Result<String, HostError> {
        let url = self.endpoint(["git", "blobs"])?;
        let body = CreateBlobRequest {
            content: encode_text(content),
            encoding: "base64",
        };
        let resp = self.send(self.request(Method::POST, url).json(&body)).await?;
        let blob: ShaObject = Self::json(resp).await?;
        Ok(blob.sha)
    }

    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> Result<String, HostError> {
        let url = self.endpoint(["git", "trees"])?;
        let body = CreateTreeRequest {
            base_tree,
            tree: entries
                .iter()
                .map(|e| TreeItem {
                    path: &e.path,
                    mode: "100644",
                    kind: "blob",
                    sha: &e.blob,
                })
                .collect(),
        };
        let resp = self.send(self.request(Method::POST, url).json(&body)).await?;
        let tree: ShaObject = Self::json(resp).await?;
        Ok(tree.sha)
    }

    async fn create_commit(&self, tree: &str, parent: &str, message: &str) -> Result<String, HostError> {
        let url = self.endpoint(["git", "commits"])?;
        let body = CreateCommitRequest {
            message,
            tree,
            parents: [parent],
        };
        let resp = self.send(self.request(Method::POST, url).json(&body)).await?;
        let commit: ShaObject = Self::json(resp).await?;
        Ok(commit.sha)
    }

    async fn update_branch_tip(&self, branch: &str, commit: &str) -> Result<(), HostError> {
        let url = self.endpoint(ref_segments(branch))?;
        let body = UpdateRefRequest { sha: commit };
        self.send(self.request(Method::PATCH, url).json(&body)).await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
