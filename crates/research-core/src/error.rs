//! Error types for research-core

use thiserror::Error;

/// Result type alias for research-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for core pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// Generic error message
    #[error("{0}")]
    Generic(String),

    /// A stage was invoked before the fields it reads were written
    #[error("Stage '{stage}' is missing input: {detail}")]
    MissingInput { stage: String, detail: String },

    /// Stage processing failed
    #[error("Stage processing failed: {0}")]
    ProcessingFailed(String),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
