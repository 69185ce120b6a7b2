//! Error types for model providers

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LLMError>;

/// Failure of a completion or embedding call
#[derive(Error, Debug)]
pub enum LLMError {
    /// No provider is configured, or the run is offline
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication rejected by provider")]
    Unauthorized,

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("model '{0}' is not available")]
    UnknownModel(String),

    /// Any other non-success HTTP status
    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The provider answered with something other than the expected payload
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LLMError {
    /// Classify a non-success HTTP response
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::UnknownModel(body),
            429 => Self::RateLimited(body),
            _ => Self::Rejected { status, body },
        }
    }

    /// Whether the same call could succeed later without a configuration change
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::Http(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
