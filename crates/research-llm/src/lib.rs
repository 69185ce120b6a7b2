//! Text generation and embedding boundary for research-rs
//!
//! The pipeline only talks to language models through the two traits defined
//! here:
//!
//! - [`LLMProvider`] turns a [`CompletionRequest`] into text
//! - [`EmbeddingProvider`] turns a batch of strings into vectors
//!
//! Implementations live in [`providers`]: an OpenAI-compatible client
//! (feature `openai`, on by default) and an always-unavailable offline stub.

pub mod completion;
pub mod embedding;
pub mod error;
pub mod messages;
pub mod provider;

pub use completion::{
    CompletionRequest, CompletionResponse, DEFAULT_MAX_TOKENS, FinishReason, TokenUsage,
};
pub use embedding::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
pub use error::{LLMError, Result};
pub use messages::{Message, Role};
pub use provider::LLMProvider;

pub mod providers;
