//! Configuration for research runs

use crate::error::{ResearchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How strict claim verification is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    /// At least two overlapping tokens
    Strict,
    #[default]
    Normal,
    Relaxed,
}

impl VerificationMode {
    /// Minimum token overlap for a claim to count as verified
    pub fn min_overlap(self) -> usize {
        match self {
            Self::Strict => 2,
            Self::Normal | Self::Relaxed => 1,
        }
    }
}

impl FromStr for VerificationMode {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "normal" => Ok(Self::Normal),
            "relaxed" => Ok(Self::Relaxed),
            other => Err(ResearchError::Config(format!(
                "unknown verification mode: {other}"
            ))),
        }
    }
}

impl fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Normal => "normal",
            Self::Relaxed => "relaxed",
        })
    }
}

/// Web search backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    /// DuckDuckGo HTML endpoint (no API key required)
    #[default]
    DuckDuckGo,
    /// Self-hosted SearxNG instance (requires `searx_url`)
    Searx,
}

/// Configuration for a research run
///
/// Read once at startup; stages receive it by reference and never consult
/// the environment themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Model used for summaries and claim extraction
    pub model: String,

    pub verification_mode: VerificationMode,

    /// Overrides the mode's threshold when set
    pub min_overlap: Option<usize>,

    /// Search results requested by the research stage
    pub max_search_results: usize,

    /// Search hits fetched by the research stage
    pub fetch_top_n: usize,

    /// Per-page fetch timeout
    pub fetch_timeout: Duration,

    /// Timeout for search and market data requests
    pub request_timeout: Duration,

    /// Documents kept by the curator
    pub curate_k: usize,

    /// Documents included in the summarization prompt
    pub summary_doc_limit: usize,

    /// Claims requested from the extractor
    pub claim_count: usize,

    /// Characters of each document that are embedded
    pub index_text_chars: usize,

    /// Maximum number of live evidence indexes
    pub registry_capacity: usize,

    /// Lifetime of an evidence index
    pub registry_ttl: Duration,

    /// Hits requested per KPI fallback query
    pub kpi_fallback_hits: usize,

    /// Upper bound on page fetches during KPI fallback
    pub kpi_fallback_max_fetches: usize,

    /// Projection horizons in years
    pub projection_horizons: Vec<u32>,

    /// Directory receiving reports, sidecars and charts
    pub output_dir: PathBuf,

    pub search_backend: SearchBackend,

    /// Base URL of a SearxNG instance
    pub searx_url: Option<String>,

    /// Alpha Vantage API key (ratios and income statements)
    pub alpha_vantage_api_key: Option<String>,

    /// Search requests per minute
    pub search_rate_limit: u32,

    /// Alpha Vantage requests per minute (free tier: 5)
    pub market_data_rate_limit: u32,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            verification_mode: VerificationMode::Normal,
            min_overlap: None,
            max_search_results: 10,
            fetch_top_n: 6,
            fetch_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(20),
            curate_k: 6,
            summary_doc_limit: 8,
            claim_count: 6,
            index_text_chars: 3000,
            registry_capacity: 64,
            registry_ttl: Duration::from_secs(3600),
            kpi_fallback_hits: 6,
            kpi_fallback_max_fetches: 24,
            projection_horizons: vec![5, 10],
            output_dir: PathBuf::from("outputs"),
            search_backend: SearchBackend::DuckDuckGo,
            searx_url: None,
            alpha_vantage_api_key: None,
            search_rate_limit: 30,
            market_data_rate_limit: 5,
        }
    }
}

impl ResearchConfig {
    pub fn builder() -> ResearchConfigBuilder {
        ResearchConfigBuilder::default()
    }

    /// Effective verification threshold
    pub fn min_overlap(&self) -> usize {
        self.min_overlap
            .unwrap_or_else(|| self.verification_mode.min_overlap())
    }

    /// Apply environment overrides
    ///
    /// Reads `OPENAI_MODEL` (or `MODEL_NAME`), `MIN_EVIDENCE_OVERLAP`,
    /// `RESEARCH_OUTPUT_DIR`, `ALPHA_VANTAGE_API_KEY` and `SEARX_URL`.
    pub fn with_env(self) -> Result<Self> {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`with_env`](Self::with_env) with a custom variable lookup
    pub fn with_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = get("OPENAI_MODEL").or_else(|| get("MODEL_NAME")) {
            self.model = model;
        }
        if let Some(raw) = get("MIN_EVIDENCE_OVERLAP") {
            let value = raw.trim().parse::<usize>().map_err(|_| {
                ResearchError::Config(format!(
                    "MIN_EVIDENCE_OVERLAP must be a non-negative integer, got '{raw}'"
                ))
            })?;
            self.min_overlap = Some(value);
        }
        if let Some(dir) = get("RESEARCH_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(key) = get("ALPHA_VANTAGE_API_KEY") {
            self.alpha_vantage_api_key = Some(key);
        }
        if let Some(url) = get("SEARX_URL") {
            self.searx_url = Some(url);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_search_results", self.max_search_results),
            ("curate_k", self.curate_k),
            ("claim_count", self.claim_count),
            ("index_text_chars", self.index_text_chars),
            ("registry_capacity", self.registry_capacity),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ResearchError::Config(format!(
                "{name} must be greater than 0"
            )));
        }

        if self.projection_horizons.is_empty() || self.projection_horizons.contains(&0) {
            return Err(ResearchError::Config(
                "projection_horizons must be non-empty and positive".to_string(),
            ));
        }

        if self.search_backend == SearchBackend::Searx && self.searx_url.is_none() {
            return Err(ResearchError::Config(
                "searx_url required when using the Searx search backend".to_string(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ResearchError::Config("model must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Builder for [`ResearchConfig`]
#[derive(Debug, Default)]
pub struct ResearchConfigBuilder {
    config: Option<ResearchConfig>,
}

impl ResearchConfigBuilder {
    fn config(&mut self) -> &mut ResearchConfig {
        self.config.get_or_insert_with(ResearchConfig::default)
    }

    /// Set the model used for summaries and claim extraction
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config().model = model.into();
        self
    }

    /// Set the verification mode
    pub fn verification_mode(mut self, mode: VerificationMode) -> Self {
        self.config().verification_mode = mode;
        self
    }

    /// Set an explicit overlap threshold, overriding the mode
    pub fn min_overlap(mut self, min_overlap: usize) -> Self {
        self.config().min_overlap = Some(min_overlap);
        self
    }

    /// Set the number of search hits requested
    pub fn max_search_results(mut self, n: usize) -> Self {
        self.config().max_search_results = n;
        self
    }

    /// Set how many hits get their pages fetched
    pub fn fetch_top_n(mut self, n: usize) -> Self {
        self.config().fetch_top_n = n;
        self
    }

    /// Set the per-page fetch timeout
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config().fetch_timeout = timeout;
        self
    }

    /// Set the timeout for search and market data requests
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config().request_timeout = timeout;
        self
    }

    /// Set how many documents curation keeps
    pub fn curate_k(mut self, k: usize) -> Self {
        self.config().curate_k = k;
        self
    }

    /// Set how many claims are extracted
    pub fn claim_count(mut self, n: usize) -> Self {
        self.config().claim_count = n;
        self
    }

    /// Set the evidence registry capacity and time-to-live
    pub fn registry(mut self, capacity: usize, ttl: Duration) -> Self {
        let config = self.config();
        config.registry_capacity = capacity;
        config.registry_ttl = ttl;
        self
    }

    /// Set the page budget of the KPI web fallback
    pub fn kpi_fallback_max_fetches(mut self, n: usize) -> Self {
        self.config().kpi_fallback_max_fetches = n;
        self
    }

    /// Set the projection horizons in years
    pub fn projection_horizons(mut self, horizons: Vec<u32>) -> Self {
        self.config().projection_horizons = horizons;
        self
    }

    /// Set the directory receiving reports and charts
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config().output_dir = dir.into();
        self
    }

    /// Set the web search backend
    pub fn search_backend(mut self, backend: SearchBackend) -> Self {
        self.config().search_backend = backend;
        self
    }

    /// Set the SearxNG base URL
    pub fn searx_url(mut self, url: impl Into<String>) -> Self {
        self.config().searx_url = Some(url.into());
        self
    }

    /// Set the Alpha Vantage API key
    pub fn alpha_vantage_api_key(mut self, key: impl Into<String>) -> Self {
        self.config().alpha_vantage_api_key = Some(key.into());
        self
    }

    /// Apply environment overrides (see [`ResearchConfig::with_env`])
    pub fn with_env(mut self) -> Result<Self> {
        let config = self.config.take().unwrap_or_default().with_env()?;
        self.config = Some(config);
        Ok(self)
    }

    pub fn build(self) -> Result<ResearchConfig> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| map.get(key).map(|v| (*v).to_string())
    }

    #[test]
    fn test_default_config() {
        let config = ResearchConfig::default();
        assert_eq!(config.max_search_results, 10);
        assert_eq!(config.fetch_top_n, 6);
        assert_eq!(config.min_overlap(), 1);
        assert_eq!(config.projection_horizons, vec![5, 10]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_thresholds() {
        assert_eq!(VerificationMode::Strict.min_overlap(), 2);
        assert_eq!(VerificationMode::Normal.min_overlap(), 1);
        assert_eq!(VerificationMode::Relaxed.min_overlap(), 1);
        assert_eq!("STRICT".parse::<VerificationMode>().unwrap(), VerificationMode::Strict);
        assert!("lenient".parse::<VerificationMode>().is_err());
    }

    #[test]
    fn test_explicit_min_overlap_overrides_mode() {
        let config = ResearchConfig::builder()
            .verification_mode(VerificationMode::Strict)
            .min_overlap(4)
            .build()
            .unwrap();
        assert_eq!(config.min_overlap(), 4);
    }

    #[test]
    fn test_config_builder() {
        let config = ResearchConfig::builder()
            .model("local-model")
            .curate_k(3)
            .output_dir("/tmp/reports")
            .registry(8, Duration::from_secs(60))
            .build()
            .unwrap();

        assert_eq!(config.model, "local-model");
        assert_eq!(config.curate_k, 3);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(config.registry_capacity, 8);
    }

    #[test]
    fn test_with_lookup() {
        let config = ResearchConfig::default()
            .with_lookup(lookup(&[
                ("MODEL_NAME", "fallback-model"),
                ("MIN_EVIDENCE_OVERLAP", "3"),
                ("RESEARCH_OUTPUT_DIR", "/srv/out"),
                ("SEARX_URL", "http://searx.local"),
            ]))
            .unwrap();

        assert_eq!(config.model, "fallback-model");
        assert_eq!(config.min_overlap(), 3);
        assert_eq!(config.output_dir, PathBuf::from("/srv/out"));
        assert_eq!(config.searx_url.as_deref(), Some("http://searx.local"));
    }

    #[test]
    fn test_openai_model_wins_over_model_name() {
        let config = ResearchConfig::default()
            .with_lookup(lookup(&[("OPENAI_MODEL", "gpt-4o"), ("MODEL_NAME", "other")]))
            .unwrap();
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn test_invalid_min_overlap_is_rejected() {
        let result = ResearchConfig::default().with_lookup(lookup(&[("MIN_EVIDENCE_OVERLAP", "two")]));
        assert!(matches!(result, Err(ResearchError::Config(_))));
    }

    #[test]
    fn test_validation_searx_without_url() {
        let result = ResearchConfig::builder()
            .search_backend(SearchBackend::Searx)
            .build();
        assert!(result.is_err());

        let result = ResearchConfig::builder()
            .search_backend(SearchBackend::Searx)
            .searx_url("http://localhost:8888")
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        assert!(ResearchConfig::builder().curate_k(0).build().is_err());
        assert!(ResearchConfig::builder().projection_horizons(vec![]).build().is_err());
        assert!(ResearchConfig::builder().projection_horizons(vec![5, 0]).build().is_err());
    }
}
