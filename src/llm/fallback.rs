use super::{BackendError, CompletionBackend};
use async_trait::async_trait;

/// Prefix that marks an answer as coming from the offline stand-in
pub const FALLBACK_PREFIX: &str = "[AI fallback] ";

/// Characters of the user prompt echoed back
pub const FALLBACK_ECHO_CHARS: usize = 2000;

/// Deterministic offline stand-in for a model.
///
/// Echoes the start of the user prompt behind [`FALLBACK_PREFIX`], so every
/// flow can run without network access and tests get stable output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackBackend;

#[async_trait]
impl CompletionBackend for FallbackBackend {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn complete(&self, _system: &str, user: &str) -> Result<String, BackendError> {
        let echoed: String = user.chars().take(FALLBACK_ECHO_CHARS).collect();
        Ok(format!("{FALLBACK_PREFIX}{echoed}"))
    }
}
