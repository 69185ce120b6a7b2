//! Embedding request/response types and provider trait

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Batch of inputs to embed with one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
}

impl EmbeddingRequest {
    pub fn new(model: impl Into<String>, input: Vec<String>) -> Self {
        Self {
            model: model.into(),
            input,
        }
    }
}

/// One vector per input, in input order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embeddings: Vec<Vec<f32>>,
}

impl EmbeddingResponse {
    /// Dimension of the returned vectors (0 when empty)
    pub fn dimension(&self) -> usize {
        self.embeddings.first().map_or(0, Vec::len)
    }
}

/// A service that maps text to dense vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    fn name(&self) -> &str;
}
