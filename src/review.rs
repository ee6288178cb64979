//! Review session for proposed file changes
//!
//! Holds the batch of transformed files awaiting a decision and tracks which
//! ones the user accepted. Only one session is open at a time; it is closed
//! both after a commit attempt and on cancellation.

use crate::diff::{diff_text, DiffStats, DiffTooLarge, EditOp};
use std::fmt;
use tracing::{debug, warn};

/// A file with its original and model-proposed content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedFile {
    pub name: String,
    pub before: String,
    pub after: String,
    pub accepted: bool,
}

impl TransformedFile {
    pub fn new(name: impl Into<String>, before: impl Into<String>, after: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before: before.into(),
            after: after.into(),
            accepted: true,
        }
    }

    /// Line edit script from `before` to `after`
    pub fn edit_script(&self) -> Result<Vec<EditOp>, DiffTooLarge> {
        diff_text(&self.before, &self.after)
    }

    pub fn stats(&self) -> Result<DiffStats, DiffTooLarge> {
        Ok(DiffStats::from_ops(&self.edit_script()?))
    }
}

/// Why a loaded file has no proposal under review
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The original is longer than the context limit
    OriginalTooLong { limit: usize },
    /// The model answered with more than the context limit
    ProposalTooLong { limit: usize },
    /// Both sides fit but their line counts are too large to align
    TooManyLines(DiffTooLarge),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::OriginalTooLong { limit } => {
                write!(f, "longer than {limit} characters")
            }
            SkipReason::ProposalTooLong { limit } => {
                write!(f, "proposal longer than {limit} characters")
            }
            SkipReason::TooManyLines(err) => write!(f, "{err}"),
        }
    }
}

/// A file left out of the review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub name: String,
    pub reason: SkipReason,
}

/// The set of changes currently under review.
///
/// `open` and `close` replace the whole state; none of the operations are
/// safe to interleave from several logical flows.
#[derive(Debug, Clone, Default)]
pub struct ReviewSession {
    items: Vec<TransformedFile>,
    skipped: Vec<SkippedFile>,
    open: bool,
}

impl ReviewSession {
    /// Replace any existing session with `files`, all accepted.
    ///
    /// Names must be unique within a session. A repeated name replaces the
    /// earlier entry's content but keeps its position.
    pub fn open(&mut self, files: Vec<TransformedFile>) {
        self.open_with_skipped(files, Vec::new());
    }

    /// Like [`open`](Self::open), also recording files that got no proposal.
    pub fn open_with_skipped(&mut self, files: Vec<TransformedFile>, skipped: Vec<SkippedFile>) {
        let mut items: Vec<TransformedFile> = Vec::with_capacity(files.len());
        for mut file in files {
            file.accepted = true;
            if let Some(existing) = items.iter_mut().find(|f| f.name == file.name) {
                warn!(name = %file.name, "duplicate file in review batch, keeping the later proposal");
                *existing = file;
            } else {
                items.push(file);
            }
        }
        debug!(
            count = items.len(),
            skipped = skipped.len(),
            "review session opened"
        );
        self.items = items;
        self.skipped = skipped;
        self.open = true;
    }

    /// Discard the session unconditionally.
    pub fn close(&mut self) {
        if self.open {
            debug!(count = self.items.len(), "review session closed");
        }
        self.items.clear();
        self.skipped.clear();
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Set the acceptance flag of `name`. Unknown names are ignored; the
    /// return value says whether anything matched.
    pub fn toggle(&mut self, name: &str, accepted: bool) -> bool {
        match self.items.iter_mut().find(|f| f.name == name) {
            Some(file) => {
                file.accepted = accepted;
                true
            }
            None => false,
        }
    }

    pub fn set_all(&mut self, accepted: bool) {
        for file in &mut self.items {
            file.accepted = accepted;
        }
    }

    pub fn accepted_count(&self) -> usize {
        self.items.iter().filter(|f| f.accepted).count()
    }

    pub fn total_count(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[TransformedFile] {
        &self.items
    }

    pub fn get(&self, name: &str) -> Option<&TransformedFile> {
        self.items.iter().find(|f| f.name == name)
    }

    /// Accepted files in session order
    pub fn accepted(&self) -> impl Iterator<Item = &TransformedFile> {
        self.items.iter().filter(|f| f.accepted)
    }

    /// Files of the batch that are not under review
    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }

    /// Live summary line, e.g. "2 selected of 3" or "2 selected of 3, 1 skipped"
    pub fn summary(&self) -> String {
        let base = format!("{} selected of {}", self.accepted_count(), self.total_count());
        if self.skipped.is_empty() {
            base
        } else {
            format!("{base}, {} skipped", self.skipped.len())
        }
    }
}
