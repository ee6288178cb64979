//! Commit dispatch for accepted changes
//!
//! Two ways to land a batch on a branch:
//!
//! - **Separate**: one contents-API write per file, in order. Fails fast, and
//!   files written before the failure stay written ([`CommitError::File`]
//!   lists them).
//! - **Single**: blobs, one tree, one commit, then a single ref move. The ref
//!   move is the last step, so any earlier failure leaves the branch exactly
//!   where it was.
//!
//! Writes are sequential and assume nobody else moves the branch meanwhile
//! (last writer wins).

use crate::github::{ContentWrite, HostError, RepositoryHost, TreeEntry};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// Batches larger than this default to a single commit.
pub const DEFAULT_BATCH_THRESHOLD: usize = 10;

/// How a batch lands on the branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStrategy {
    /// One commit per file
    Separate,
    /// One atomic commit for the whole batch
    Single,
}

impl CommitStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            CommitStrategy::Separate => "separate commits",
            CommitStrategy::Single => "single commit",
        }
    }
}

/// Strategy requested by the user; `Auto` defers to [`default_strategy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StrategyChoice {
    #[default]
    Auto,
    Separate,
    Single,
}

impl StrategyChoice {
    pub fn resolve(self, accepted: usize, batch_threshold: usize) -> CommitStrategy {
        match self {
            StrategyChoice::Auto => default_strategy(accepted, batch_threshold),
            StrategyChoice::Separate => CommitStrategy::Separate,
            StrategyChoice::Single => CommitStrategy::Single,
        }
    }
}

/// Default policy: a single file or a small batch gets one commit per file,
/// anything above `batch_threshold` files gets one commit overall.
pub fn default_strategy(accepted: usize, batch_threshold: usize) -> CommitStrategy {
    if accepted <= batch_threshold {
        CommitStrategy::Separate
    } else {
        CommitStrategy::Single
    }
}

/// Final content for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFile {
    pub path: String,
    pub content: String,
}

/// Step of the single-commit sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStep {
    ResolveTip,
    FetchTree,
    CreateBlob(String),
    CreateTree,
    CreateCommit,
    UpdateRef,
}

impl fmt::Display for CommitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitStep::ResolveTip => write!(f, "resolving the branch tip"),
            CommitStep::FetchTree => write!(f, "reading the base tree"),
            CommitStep::CreateBlob(path) => write!(f, "creating the blob for {path}"),
            CommitStep::CreateTree => write!(f, "creating the tree"),
            CommitStep::CreateCommit => write!(f, "creating the commit"),
            CommitStep::UpdateRef => write!(f, "updating the branch reference"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("no files selected")]
    NothingSelected,
    /// A per-file write failed; `written` were committed before it and are
    /// not rolled back.
    #[error("commit failed for {path}: {source}")]
    File {
        path: String,
        written: Vec<String>,
        #[source]
        source: HostError,
    },
    /// A step of the single commit failed; the branch was not moved.
    #[error("single commit failed while {step}: {source}")]
    Step {
        step: CommitStep,
        #[source]
        source: HostError,
    },
}

/// What landed on the branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub strategy: CommitStrategy,
    pub paths: Vec<String>,
    /// New branch tip, known only for single commits
    pub commit: Option<String>,
}

/// Writes accepted files to one branch of a repository host.
pub struct CommitDispatcher<'a> {
    host: &'a dyn RepositoryHost,
    branch: &'a str,
}

impl<'a> CommitDispatcher<'a> {
    pub fn new(host: &'a dyn RepositoryHost, branch: &'a str) -> Self {
        Self { host, branch }
    }

    /// Land `files` with `strategy`. For separate commits `message` is the
    /// per-file prefix, for a single commit it is the whole message.
    pub async fn dispatch(
        &self,
        strategy: CommitStrategy,
        files: &[CommitFile],
        message: &str,
    ) -> Result<CommitReport, CommitError> {
        info!(
            strategy = strategy.label(),
            files = files.len(),
            branch = self.branch,
            "dispatching commit"
        );
        match strategy {
            CommitStrategy::Separate => self.dispatch_separate(files, message).await,
            CommitStrategy::Single => self.dispatch_single(files, message).await,
        }
    }

    /// One create-or-update per file, each with the message
    /// `"{message_prefix}: {path}"`.
    pub async fn dispatch_separate(
        &self,
        files: &[CommitFile],
        message_prefix: &str,
    ) -> Result<CommitReport, CommitError> {
        if files.is_empty() {
            return Err(CommitError::NothingSelected);
        }

        let mut written = Vec::with_capacity(files.len());
        for file in files {
            if let Err(source) = self.put_file(file, message_prefix).await {
                return Err(CommitError::File {
                    path: file.path.clone(),
                    written,
                    source,
                });
            }
            written.push(file.path.clone());
        }

        Ok(CommitReport {
            strategy: CommitStrategy::Separate,
            paths: written,
            commit: None,
        })
    }

    async fn put_file(&self, file: &CommitFile, message_prefix: &str) -> Result<(), HostError> {
        let existing = self.host.get_content(&file.path, self.branch).await?;
        debug!(path = %file.path, exists = existing.is_some(), "writing file");
        let write = ContentWrite {
            path: file.path.clone(),
            content: file.content.clone(),
            message: format!("{}: {}", message_prefix, file.path),
            branch: self.branch.to_string(),
            sha: existing.map(|c| c.sha),
        };
        self.host.put_content(&write).await
    }

    /// All files in one commit on top of the current tip.
    pub async fn dispatch_single(
        &self,
        files: &[CommitFile],
        message: &str,
    ) -> Result<CommitReport, CommitError> {
        if files.is_empty() {
            return Err(CommitError::NothingSelected);
        }

        let step = |step: CommitStep| move |source: HostError| CommitError::Step { step, source };

        let tip = self
            .host
            .get_branch_tip(self.branch)
            .await
            .map_err(step(CommitStep::ResolveTip))?;
        let base_tree = self
            .host
            .get_tree(&tip)
            .await
            .map_err(step(CommitStep::FetchTree))?;
        debug!(tip = %tip, base_tree = %base_tree, "resolved branch tip");

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let blob = self
                .host
                .create_blob(&file.content)
                .await
                .map_err(step(CommitStep::CreateBlob(file.path.clone())))?;
            entries.push(TreeEntry {
                path: file.path.clone(),
                blob,
            });
        }

        let tree = self
            .host
            .create_tree(&base_tree, &entries)
            .await
            .map_err(step(CommitStep::CreateTree))?;
        let commit = self
            .host
            .create_commit(&tree, &tip, message)
            .await
            .map_err(step(CommitStep::CreateCommit))?;
        self.host
            .update_branch_tip(self.branch, &commit)
            .await
            .map_err(step(CommitStep::UpdateRef))?;

        info!(commit = %commit, files = files.len(), "branch advanced");
        Ok(CommitReport {
            strategy: CommitStrategy::Single,
            paths: files.iter().map(|f| f.path.clone()).collect(),
            commit: Some(commit),
        })
    }
}
