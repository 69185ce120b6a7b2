//! Error types for pipeline operations

use crate::evidence::EvidenceError;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline errors
///
/// Only [`ResearchError::ReportWrite`] ends a run. Every other variant is
/// absorbed by the stage that hit it and replaced by a degraded value.
#[derive(Debug, Error)]
pub enum ResearchError {
    /// External API returned an error
    #[error("API error: {0}")]
    Api(String),

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Evidence index error: {0}")]
    Evidence(#[from] EvidenceError),

    /// Market data provider error
    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// A built-in pattern failed to compile
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The report artifact could not be written
    #[error("Failed to write report to {}: {source}", path.display())]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ResearchError>;

impl ResearchError {
    pub(crate) fn report_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReportWrite {
            path: path.into(),
            source,
        }
    }

    /// Whether this error ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReportWrite { .. })
    }
}

impl From<ResearchError> for research_core::Error {
    fn from(err: ResearchError) -> Self {
        research_core::Error::ProcessingFailed(err.to_string())
    }
}

impl From<research_core::Error> for ResearchError {
    fn from(err: research_core::Error) -> Self {
        ResearchError::Other(err.to_string())
    }
}

impl From<research_llm::LLMError> for ResearchError {
    fn from(err: research_llm::LLMError) -> Self {
        ResearchError::Api(err.to_string())
    }
}

impl From<anyhow::Error> for ResearchError {
    fn from(err: anyhow::Error) -> Self {
        ResearchError::Other(err.to_string())
    }
}
