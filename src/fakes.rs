//! In-memory doubles for the model and repository capabilities

use crate::github::{ContentRef, ContentWrite, HostError, RepositoryHost, TreeEntry};
use crate::llm::{BackendError, CompletionBackend};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    GetContent(String),
    PutContent(ContentWrite),
    GetBranchTip(String),
    GetTree(String),
    CreateBlob(String),
    CreateTree { base: String, entries: Vec<TreeEntry> },
    CreateCommit { tree: String, parent: String, message: String },
    UpdateBranchTip { branch: String, commit: String },
}

#[derive(Debug, Default)]
struct HostState {
    calls: Vec<HostCall>,
    files: HashMap<String, String>,
    tip: Option<String>,
    counter: usize,
    fail_put: HashSet<String>,
    fail_blob_containing: Option<String>,
    fail_tree: bool,
}

/// Records every call; object ids are sequential strings.
#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

fn failure(what: &str) -> HostError {
    HostError::Api {
        status: 500,
        message: format!("{what} rejected"),
    }
}

impl FakeHost {
    fn with<T>(&self, f: impl FnOnce(&mut HostState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn seed_file(&self, path: &str, sha: &str) {
        self.with(|s| s.files.insert(path.to_string(), sha.to_string()));
    }

    pub fn fail_put_for(&self, path: &str) {
        self.with(|s| s.fail_put.insert(path.to_string()));
    }

    pub fn fail_blob_containing(&self, needle: &str) {
        self.with(|s| s.fail_blob_containing = Some(needle.to_string()));
    }

    pub fn fail_create_tree(&self) {
        self.with(|s| s.fail_tree = true);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.with(|s| s.calls.clone())
    }

    /// Successful and attempted contents-API writes, in order
    pub fn writes(&self) -> Vec<ContentWrite> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::PutContent(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    pub fn tip(&self) -> String {
        self.with(|s| s.tip.clone().unwrap_or_else(|| "commit-0".to_string()))
    }
}

#[async_trait]
impl RepositoryHost for FakeHost {
    async fn get_content(&self, path: &str, _branch: &str) -> Result<Option<ContentRef>, HostError> {
        self.with(|s| {
            s.calls.push(HostCall::GetContent(path.to_string()));
            Ok(s.files.get(path).map(|sha| ContentRef { sha: sha.clone() }))
        })
    }

    async fn put_content(&self, write: &ContentWrite) -> Result<(), HostError> {
        self.with(|s| {
            s.calls.push(HostCall::PutContent(write.clone()));
            if s.fail_put.contains(&write.path) {
                return Err(failure("put"));
            }
            s.counter += 1;
            s.files.insert(write.path.clone(), format!("sha-{}", s.counter));
            Ok(())
        })
    }

    async fn get_branch_tip(&self, branch: &str) -> Result<String, HostError> {
        let tip = self.tip();
        self.with(|s| s.calls.push(HostCall::GetBranchTip(branch.to_string())));
        Ok(tip)
    }

    async fn get_tree(&self, commit: &str) -> Result<String, HostError> {
        self.with(|s| {
            s.calls.push(HostCall::GetTree(commit.to_string()));
            Ok(format!("tree-of-{commit}"))
        })
    }

    async fn create_blob(&self, content: &str) -> Result<String, HostError> {
        self.with(|s| {
            s.calls.push(HostCall::CreateBlob(content.to_string()));
            if s
                .fail_blob_containing
                .as_deref()
                .is_some_and(|needle| content.contains(needle))
            {
                return Err(failure("blob"));
            }
            s.counter += 1;
            Ok(format!("blob-{}", s.counter))
        })
    }

    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> Result<String, HostError> {
        self.with(|s| {
            s.calls.push(HostCall::CreateTree {
                base: base_tree.to_string(),
                entries: entries.to_vec(),
            });
            if s.fail_tree {
                return Err(failure("tree"));
            }
            s.counter += 1;
            Ok(format!("tree-{}", s.counter))
        })
    }

    async fn create_commit(&self, tree: &str, parent: &str, message: &str) -> Result<String, HostError> {
        self.with(|s| {
            s.calls.push(HostCall::CreateCommit {
                tree: tree.to_string(),
                parent: parent.to_string(),
                message: message.to_string(),
            });
            s.counter += 1;
            Ok(format!("commit-{}", s.counter))
        })
    }

    async fn update_branch_tip(&self, branch: &str, commit: &str) -> Result<(), HostError> {
        self.with(|s| {
            s.calls.push(HostCall::UpdateBranchTip {
                branch: branch.to_string(),
                commit: commit.to_string(),
            });
            s.tip = Some(commit.to_string());
            Ok(())
        })
    }
}

/// Model double that records prompts and answers from a script.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    prompts: Mutex<Vec<(String, String)>>,
    /// Prepended to the echoed user prompt
    reply_prefix: String,
    fail_when_user_contains: Option<String>,
}

impl ScriptedBackend {
    /// Answers `"{reply_prefix}{user prompt}"`.
    pub fn new(reply_prefix: &str) -> Self {
        Self {
            reply_prefix: reply_prefix.to_string(),
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_when_user_contains = Some(needle.to_string());
        self
    }

    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, BackendError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        if self
            .fail_when_user_contains
            .as_deref()
            .is_some_and(|needle| user.contains(needle))
        {
            return Err(BackendError::Unauthorized("invalid key".to_string()));
        }
        Ok(format!("{}{}", self.reply_prefix, user))
    }
}

/// Model double that answers until call `stall_on`, then cancels `token` and
/// never returns.
#[derive(Debug)]
pub struct StallingBackend {
    calls: AtomicUsize,
    stall_on: usize,
    token: CancellationToken,
}

impl StallingBackend {
    pub fn new(stall_on: usize, token: CancellationToken) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            stall_on,
            token,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for StallingBackend {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn complete(&self, _system: &str, user: &str) -> Result<String, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.stall_on {
            self.token.cancel();
            std::future::pending::<()>().await;
        }
        Ok(user.to_string())
    }
}
