//! Provider that is never available

use crate::{
    CompletionRequest, CompletionResponse, EmbeddingProvider, EmbeddingRequest,
    EmbeddingResponse, LLMError, LLMProvider, Result,
};
use async_trait::async_trait;

/// Fails every call with [`LLMError::Unavailable`]
///
/// Used when no API key is configured or the run was started offline, so the
/// pipeline takes its heuristic paths.
#[derive(Debug, Clone, Default)]
pub struct OfflineProvider {
    reason: String,
}

impl OfflineProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> LLMError {
        let reason = if self.reason.is_empty() {
            "offline"
        } else {
            &self.reason
        };
        LLMError::Unavailable(reason.to_string())
    }
}

#[async_trait]
impl LLMProvider for OfflineProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        Err(self.error())
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}

#[async_trait]
impl EmbeddingProvider for OfflineProvider {
    async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        Err(self.error())
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}
