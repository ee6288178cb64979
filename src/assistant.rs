//! The controller behind every codeshift flow
//!
//! [`Assistant`] owns the loaded files, the single review session and the two
//! capabilities the flows need: a model backend and, for commits, a
//! repository host. Both are injected, so tests run against fakes.
//!
//! Operations take `&mut self` and replace shared state wholesale (`load`
//! drops the review, `preview_refactor` reopens it, `commit` closes it). They
//! are not reentrant-safe: drive one assistant from one logical flow at a time.

use crate::commit::{
    CommitDispatcher, CommitError, CommitFile, CommitReport, CommitStrategy, StrategyChoice,
};
use crate::github::RepositoryHost;
use crate::llm::{BackendError, CompletionBackend};
use crate::prompt::TransformKind;
use crate::review::{ReviewSession, SkippedFile};
use crate::transform::{refactor_files, run_report, TransformError};
use crate::workspace::{self, LoadedFile, LocalStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Prefix of every commit message written by a refactor
pub const COMMIT_PREFIX: &str = "AI Refactor";
pub const DEFAULT_BATCH_MESSAGE: &str = "AI Refactor: Multiple files";

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("no files loaded")]
    NoFiles,
    #[error("custom prompt is empty")]
    EmptyPrompt,
    #[error("no files selected")]
    NothingSelected,
    #[error("no review in progress")]
    NoReview,
    #[error("no repository configured for commits")]
    NoHost,
    #[error("no local storage available")]
    NoStore,
    #[error("local storage failed: {0}")]
    Storage(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Commit(#[from] CommitError),
}

/// Which loaded files a refactor preview covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefactorScope {
    /// Only the first loaded file
    First,
    /// Every loaded file, in load order
    All,
}

/// Knobs taken from the config
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub branch: String,
    pub context_limit: usize,
    pub batch_threshold: usize,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            branch: "main".to_string(),
            context_limit: crate::util::DEFAULT_CONTEXT_LIMIT,
            batch_threshold: crate::commit::DEFAULT_BATCH_THRESHOLD,
        }
    }
}

pub struct Assistant {
    backend: Arc<dyn CompletionBackend>,
    host: Option<Arc<dyn RepositoryHost>>,
    store: Option<LocalStore>,
    settings: AssistantSettings,
    files: Vec<LoadedFile>,
    review: ReviewSession,
}

impl Assistant {
    pub fn new(backend: Arc<dyn CompletionBackend>, settings: AssistantSettings) -> Self {
        Self {
            backend,
            host: None,
            store: None,
            settings,
            files: Vec::new(),
            review: ReviewSession::default(),
        }
    }

    pub fn with_host(mut self, host: Arc<dyn RepositoryHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_store(mut self, store: LocalStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn files(&self) -> &[LoadedFile] {
        &self.files
    }

    /// Replace the loaded set. Any review in progress is dropped.
    pub fn load(&mut self, files: Vec<LoadedFile>) {
        self.review.close();
        info!(files = files.len(), "files loaded");
        self.files = files;
    }

    /// Read `paths` from disk and load them.
    pub fn load_paths<P: AsRef<Path>>(&mut self, paths: &[P], base: &Path) -> usize {
        let files = workspace::load_paths(paths, base);
        let count = files.len();
        self.load(files);
        count
    }

    pub fn clear(&mut self) {
        self.load(Vec::new());
    }

    fn store(&self) -> Result<&LocalStore, AssistantError> {
        self.store.as_ref().ok_or(AssistantError::NoStore)
    }

    pub fn save_local(&self) -> Result<(), AssistantError> {
        self.store()?
            .save(&self.files)
            .map_err(|e| AssistantError::Storage(format!("{:#}", e)))
    }

    /// Load the saved set; returns how many files it held.
    pub fn restore_local(&mut self) -> Result<usize, AssistantError> {
        let files = self.store()?.load();
        let count = files.len();
        self.load(files);
        Ok(count)
    }

    pub fn clear_local(&self) -> Result<(), AssistantError> {
        self.store()?
            .clear()
            .map_err(|e| AssistantError::Storage(format!("{:#}", e)))
    }

    pub fn export_bundle(&self, dir: &Path) -> Result<PathBuf, AssistantError> {
        if self.files.is_empty() {
            return Err(AssistantError::NoFiles);
        }
        workspace::export_bundle(&self.files, dir)
            .map_err(|e| AssistantError::Storage(format!("{:#}", e)))
    }

    /// One text answer from the model about the loaded files.
    pub async fn run_report(&self, kind: &TransformKind) -> Result<String, AssistantError> {
        if self.files.is_empty() {
            return Err(AssistantError::NoFiles);
        }
        if let TransformKind::Custom(prompt) = kind {
            if prompt.trim().is_empty() {
                return Err(AssistantError::EmptyPrompt);
            }
        }
        Ok(run_report(&*self.backend, kind, &self.files, self.settings.context_limit).await?)
    }

    /// Refactor the files in `scope` and open a review over the results.
    ///
    /// Returns the files skipped for size, which the review also lists. On
    /// error or cancellation no review is opened and any previous one is gone.
    pub async fn preview_refactor(
        &mut self,
        scope: RefactorScope,
        cancel: &CancellationToken,
    ) -> Result<Vec<SkippedFile>, AssistantError> {
        if self.files.is_empty() {
            return Err(AssistantError::NoFiles);
        }
        self.review.close();

        let targets = match scope {
            RefactorScope::First => &self.files[..1],
            RefactorScope::All => &self.files[..],
        };
        let outcome = refactor_files(
            &*self.backend,
            targets,
            self.settings.context_limit,
            cancel,
        )
        .await?;

        let skipped = outcome.skipped.clone();
        self.review.open_with_skipped(outcome.files, outcome.skipped);
        Ok(skipped)
    }

    /// The open review, if any
    pub fn review(&self) -> Option<&ReviewSession> {
        self.review.is_open().then_some(&self.review)
    }

    pub fn review_mut(&mut self) -> Option<&mut ReviewSession> {
        if self.review.is_open() {
            Some(&mut self.review)
        } else {
            None
        }
    }

    pub fn cancel_review(&mut self) {
        self.review.close();
    }

    /// Commit the accepted files of the open review.
    ///
    /// The selection is read at call time. An empty selection or a missing
    /// host is reported without touching the review; once dispatch starts
    /// the review is closed whatever the outcome. `message` overrides the
    /// per-file prefix for separate commits and the whole message for a
    /// single commit.
    pub async fn commit(
        &mut self,
        choice: StrategyChoice,
        message: Option<&str>,
    ) -> Result<CommitReport, AssistantError> {
        if !self.review.is_open() {
            return Err(AssistantError::NoReview);
        }
        let files: Vec<CommitFile> = self
            .review
            .accepted()
            .map(|f| CommitFile {
                path: f.name.clone(),
                content: f.after.clone(),
            })
            .collect();
        if files.is_empty() {
            return Err(AssistantError::NothingSelected);
        }
        let host = self.host.clone().ok_or(AssistantError::NoHost)?;

        let strategy = choice.resolve(files.len(), self.settings.batch_threshold);
        let message = match (message, strategy) {
            (Some(m), _) if !m.trim().is_empty() => m.trim().to_string(),
            (_, CommitStrategy::Separate) => COMMIT_PREFIX.to_string(),
            (_, CommitStrategy::Single) => DEFAULT_BATCH_MESSAGE.to_string(),
        };

        let dispatcher = CommitDispatcher::new(&*host, &self.settings.branch);
        let result = dispatcher.dispatch(strategy, &files, &message).await;
        self.review.close();

        if let Err(err) = &result {
            warn!(error = %err, "commit failed");
        }
        Ok(result?)
    }
}
