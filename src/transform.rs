//! Model passes over the loaded files
//!
//! Files are processed one at a time in load order. The loop can be stopped
//! between or during model calls through a [`CancellationToken`]; whatever was
//! finished before the stop is discarded together with the rest of the run.

use crate::diff::{check_size, split_lines, DEFAULT_MAX_DIFF_CELLS};
use crate::llm::{BackendError, CompletionBackend};
use crate::prompt::{refactor_file_prompt, strip_code_fence, TransformKind};
use crate::review::{SkipReason, SkippedFile, TransformedFile};
use crate::workspace::LoadedFile;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("cancelled after {completed} file(s)")]
    Cancelled { completed: usize },
    #[error("model call failed for {path}: {source}")]
    Backend {
        path: String,
        #[source]
        source: BackendError,
    },
}

/// Result of a refactor pass
#[derive(Debug, Default)]
pub struct RefactorOutcome {
    pub files: Vec<TransformedFile>,
    /// Files left out because one side is too large to review
    pub skipped: Vec<SkippedFile>,
}

impl RefactorOutcome {
    fn skip(&mut self, name: &str, reason: SkipReason) {
        warn!(path = %name, reason = %reason, "leaving file out of the review");
        self.skipped.push(SkippedFile {
            name: name.to_string(),
            reason,
        });
    }
}

fn exceeds(text: &str, limit: usize) -> bool {
    text.chars().nth(limit).is_some()
}

/// Ask the model for a rewritten version of every file in `files`.
///
/// A file longer than `context_limit` characters is skipped: sending a
/// truncated copy would bring back a truncated file to commit. A proposal is
/// dropped the same way when it exceeds `context_limit` or when its line
/// count against the original exceeds [`DEFAULT_MAX_DIFF_CELLS`]. The first
/// backend failure ends the pass.
pub async fn refactor_files(
    backend: &dyn CompletionBackend,
    files: &[LoadedFile],
    context_limit: usize,
    cancel: &CancellationToken,
) -> Result<RefactorOutcome, TransformError> {
    let mut outcome = RefactorOutcome::default();
    for file in files {
        if cancel.is_cancelled() {
            return Err(TransformError::Cancelled {
                completed: outcome.files.len(),
            });
        }
        if exceeds(&file.content, context_limit) {
            outcome.skip(&file.name, SkipReason::OriginalTooLong { limit: context_limit });
            continue;
        }

        let (system, user) = refactor_file_prompt(file);
        debug!(path = %file.name, backend = backend.name(), "refactoring file");
        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(TransformError::Cancelled {
                    completed: outcome.files.len(),
                });
            }
            res = backend.complete(system, &user) => res.map_err(|source| TransformError::Backend {
                path: file.name.clone(),
                source,
            })?,
        };

        let after = strip_code_fence(&answer);
        if exceeds(after, context_limit) {
            outcome.skip(&file.name, SkipReason::ProposalTooLong { limit: context_limit });
            continue;
        }
        let lines = (split_lines(&file.content).len(), split_lines(after).len());
        if let Err(err) = check_size(lines.0, lines.1, DEFAULT_MAX_DIFF_CELLS) {
            outcome.skip(&file.name, SkipReason::TooManyLines(err));
            continue;
        }

        let after = after.to_string();
        outcome
            .files
            .push(TransformedFile::new(file.name.clone(), file.content.clone(), after));
    }

    info!(
        files = outcome.files.len(),
        skipped = outcome.skipped.len(),
        "refactor pass finished"
    );
    Ok(outcome)
}

/// One report over `files` for a non file-producing kind.
pub async fn run_report(
    backend: &dyn CompletionBackend,
    kind: &TransformKind,
    files: &[LoadedFile],
    context_limit: usize,
) -> Result<String, BackendError> {
    let user = kind.report_prompt(files, context_limit);
    info!(kind = kind.label(), backend = backend.name(), "running report");
    backend.complete(kind.system_prompt(), &user).await
}
