//! codeshift library crate
//!
//! Load source files, ask a language model to transform them, review the
//! proposed changes as line diffs, and commit the accepted ones to GitHub.
//!
//! The core is pure and synchronous: [`diff`] aligns two line sequences,
//! [`render`] lays an edit script out side by side, [`review`] tracks which
//! changes are accepted. [`commit`] lands the accepted subset through a
//! [`github::RepositoryHost`]; [`transform`] drives an
//! [`llm::CompletionBackend`] over the loaded files. [`assistant`] ties them
//! together for the CLI.

pub mod assistant;
pub mod commit;
pub mod config;
pub mod diff;
pub mod encoding;
pub mod github;
pub mod keyring;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod render;
pub mod review;
pub mod transform;
pub mod util;
pub mod workspace;

#[cfg(test)]
mod fakes;
