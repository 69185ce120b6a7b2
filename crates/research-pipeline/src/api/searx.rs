//! SearxNG JSON search client

use super::SearchProvider;
use crate::error::{ResearchError, Result};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use research_core::SearchHit;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Search through a SearxNG instance's `format=json` API
#[derive(Debug, Clone)]
pub struct SearxSearch {
    client: Client,
    endpoint: Url,
    rate_limiter: SharedRateLimiter,
}

/// One result as returned by any of the engines SearxNG aggregates
///
/// Engines disagree on field names; every accepted spelling is listed here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSearchHit {
    #[serde(default, alias = "t")]
    pub title: Option<String>,
    #[serde(default, alias = "body", alias = "abstract", alias = "content")]
    pub snippet: Option<String>,
    #[serde(default, alias = "href", alias = "url")]
    pub link: Option<String>,
}

impl From<RawSearchHit> for SearchHit {
    fn from(raw: RawSearchHit) -> Self {
        SearchHit::new(
            raw.title.unwrap_or_default(),
            raw.snippet.unwrap_or_default(),
            raw.link.unwrap_or_default(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<RawSearchHit>,
}

impl SearxSearch {
    pub fn new(base_url: &str, timeout: Duration, rate_limit: u32) -> Result<Self> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join("search"))
            .map_err(|e| ResearchError::Config(format!("Invalid SEARX_URL '{base_url}': {e}")))?;
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SearchProvider for SearxSearch {
    #[instrument(skip(self), fields(provider = "searx"))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        let hits = decode_results(&body, max_results)?;
        debug!(hits = hits.len(), "Decoded Searx results");
        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "searx"
    }
}

fn decode_results(body: &str, max_results: usize) -> Result<Vec<SearchHit>> {
    let response: SearxResponse = serde_json::from_str(body)?;
    Ok(response
        .results
        .into_iter()
        .take(max_results)
        .map(SearchHit::from)
        .collect())
}
