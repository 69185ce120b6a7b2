//! Concrete provider implementations

pub mod offline;
#[cfg(feature = "openai")]
pub mod openai;

pub use offline::OfflineProvider;
#[cfg(feature = "openai")]
pub use openai::{OpenAIConfig, OpenAIProvider};
