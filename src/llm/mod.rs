//! Language model backends
//!
//! Everything that talks to a model goes through [`CompletionBackend`]: one
//! system message, one user message, one trimmed text answer. Which
//! implementation is used is a runtime choice ([`BackendKind`]).

pub mod client;
pub mod fallback;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::{ChatSettings, LocalBackend, RemoteBackend};
pub use fallback::FallbackBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authorization failed: {0}")]
    Unauthorized(String),
    #[error("rate limited by the model provider, try again in a few minutes")]
    RateLimited,
    #[error("model API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("malformed model response: {0}")]
    Malformed(String),
    #[error("backend misconfigured: {0}")]
    Config(String),
}

/// A chat-completion capability
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short label for logs and status lines
    fn name(&self) -> &str;

    /// Send one system and one user message, return the first answer trimmed.
    async fn complete(&self, system: &str, user: &str) -> Result<String, BackendError>;
}

/// Which backend to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hosted OpenAI-compatible API, needs an API key
    #[default]
    Remote,
    /// OpenAI-compatible server on this machine
    Local,
    /// Offline echo, no model at all
    Fallback,
}

impl BackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "remote" | "online" => Some(BackendKind::Remote),
            "local" | "offline" => Some(BackendKind::Local),
            "fallback" | "echo" => Some(BackendKind::Fallback),
            _ => None,
        }
    }
}
