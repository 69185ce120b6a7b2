//! Web search and page retrieval
//!
//! [`Retriever`] wraps a [`SearchProvider`] and a [`PageFetcher`] and never
//! fails: search errors become a sentinel hit and fetch errors become a
//! [`Document`] carrying the error.

use crate::api::{PageFetcher, SearchProvider};
use crate::config::ResearchConfig;
use research_core::{Document, SearchHit};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Title of the hit standing in for a failed search
pub const SEARCH_ERROR_TITLE: &str = "search_error";

/// Search and fetch front-end used by the research and KPI stages
#[derive(Clone)]
pub struct Retriever {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
}

impl Retriever {
    pub fn new(search: Arc<dyn SearchProvider>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { search, fetcher }
    }

    /// Deduplicated hits for `query`, at most `max_results`
    ///
    /// A provider error yields a single `search_error` hit whose snippet is
    /// the error message.
    #[instrument(skip(self), fields(provider = self.search.name()))]
    pub async fn search(&self, query: &str, max_results: usize) -> Vec<SearchHit> {
        let hits = match self.search.search(query, max_results).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Search failed");
                vec![SearchHit::new(SEARCH_ERROR_TITLE, e.to_string(), "")]
            }
        };
        dedup_hits(hits, max_results)
    }

    /// Fetch `url` as a document; failures are recorded in `Document::error`
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Document {
        if url.trim().is_empty() {
            return Document::default();
        }
        match self.fetcher.fetch(url, timeout).await {
            Ok(page) => Document::new(url, page.title, page.text),
            Err(e) => {
                debug!(url, error = %e, "Fetch failed");
                Document::failed(url, e.to_string())
            }
        }
    }

    /// Search, then fetch the top linked hits
    ///
    /// Returns the hits and the documents that were fetched with non-blank
    /// text. When nothing could be fetched, the first hit becomes a
    /// pseudo-document (its snippet as text) so later stages have input.
    #[instrument(skip(self, config))]
    pub async fn gather(
        &self,
        query: &str,
        config: &ResearchConfig,
    ) -> (Vec<SearchHit>, Vec<Document>) {
        let hits = self.search(query, config.max_search_results).await;

        let mut docs = Vec::new();
        for hit in hits.iter().filter(|h| h.has_link()).take(config.fetch_top_n) {
            let doc = self.fetch(&hit.link, config.fetch_timeout).await;
            if doc.error.is_none() && !doc.is_blank() {
                docs.push(doc);
            }
        }

        if docs.is_empty() {
            warn!(hits = hits.len(), "No page fetched, using first hit as evidence");
            docs.push(pseudo_document(hits.first()));
        }

        info!(hits = hits.len(), docs = docs.len(), "Gathered evidence");
        (hits, docs)
    }
}

impl fmt::Debug for Retriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retriever")
            .field("search", &self.search.name())
            .finish_non_exhaustive()
    }
}

/// Drop repeated hits (same link, or same title when unlinked), keeping first-seen order
pub fn dedup_hits(hits: Vec<SearchHit>, max_results: usize) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| {
            hit.dedup_key()
                .is_some_and(|key| seen.insert(key.to_string()))
        })
        .take(max_results)
        .collect()
}

/// Stand-in document built from a search hit
pub fn pseudo_document(hit: Option<&SearchHit>) -> Document {
    match hit {
        Some(hit) => Document::new(hit.link.clone(), hit.title.clone(), hit.snippet.clone()),
        None => Document::default(),
    }
}
