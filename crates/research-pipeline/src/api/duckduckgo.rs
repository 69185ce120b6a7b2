//! DuckDuckGo HTML search client

use super::SearchProvider;
use crate::error::{ResearchError, Result};
use crate::html::{HtmlCleaner, decode_entities};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use regex::Regex;
use reqwest::Client;
use research_core::SearchHit;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

const BASE_URL: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0";

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Search through DuckDuckGo's JavaScript-free HTML endpoint
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    client: Client,
    rate_limiter: SharedRateLimiter,
    parser: ResultParser,
}

impl DuckDuckGoSearch {
    /// Create a client
    ///
    /// # Arguments
    /// * `timeout` - Per-request timeout
    /// * `rate_limit` - Maximum requests per minute
    pub fn new(timeout: Duration, rate_limit: u32) -> Result<Self> {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            parser: ResultParser::new()?,
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    #[instrument(skip(self), fields(provider = "duckduckgo"))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .post(BASE_URL)
            .form(&[("q", query), ("kl", "us-en")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResearchError::Api(format!("DuckDuckGo returned HTTP {status}")));
        }

        let html = response.text().await?;
        let hits = self.parser.parse(&html, max_results);
        debug!(hits = hits.len(), "Parsed DuckDuckGo results");
        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "duckduckgo"
    }
}

/// Extracts hits from the result page markup
#[derive(Debug, Clone)]
struct ResultParser {
    anchor: Regex,
    href: Regex,
    snippet: Regex,
    cleaner: HtmlCleaner,
}

impl ResultParser {
    fn new() -> Result<Self> {
        Ok(Self {
            anchor: Regex::new(r#"(?s)<a\s([^>]*class="result__a"[^>]*)>(.*?)</a>"#)?,
            href: Regex::new(r#"href="([^"]*)""#)?,
            snippet: Regex::new(
                r#"(?s)<(?:a|div|td)\s[^>]*class="result__snippet"[^>]*>(.*?)</(?:a|div|td)>"#,
            )?,
            cleaner: HtmlCleaner::new()?,
        })
    }

    fn parse(&self, html: &str, max_results: usize) -> Vec<SearchHit> {
        html.split("result__body")
            .skip(1)
            .filter_map(|block| self.parse_block(block))
            .take(max_results)
            .collect()
    }

    fn parse_block(&self, block: &str) -> Option<SearchHit> {
        let anchor = self.anchor.captures(block)?;
        let raw_href = self
            .href
            .captures(anchor.get(1)?.as_str())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())?;
        let link = resolve_link(raw_href)?;
        let title = self.cleaner.fragment_text(anchor.get(2)?.as_str());
        let snippet = self
            .snippet
            .captures(block)
            .and_then(|c| c.get(1))
            .map(|m| self.cleaner.fragment_text(m.as_str()))
            .unwrap_or_default();

        Some(SearchHit::new(title, snippet, link))
    }
}

/// Unwrap DuckDuckGo redirect links (`//duckduckgo.com/l/?uddg=...`); drop ads
fn resolve_link(raw: &str) -> Option<String> {
    let decoded = decode_entities(raw);
    let absolute = if decoded.starts_with("//") {
        format!("https:{decoded}")
    } else {
        decoded
    };
    let url = Url::parse(&absolute).ok()?;

    let is_ddg = url
        .host_str()
        .is_some_and(|host| host.ends_with("duckduckgo.com"));
    if !is_ddg {
        return Some(url.to_string());
    }
    if url.path().starts_with("/l/") {
        return url
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, target)| target.into_owned());
    }
    None
}
