//! In-memory collaborators shared by unit tests

use crate::api::{FetchedPage, PageFetcher, SearchProvider};
use crate::error::{ResearchError, Result};
use async_trait::async_trait;
use research_core::SearchHit;
use research_llm::{CompletionRequest, CompletionResponse, LLMError, LLMProvider};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Search engine answering from a fixed table
#[derive(Debug, Default)]
pub struct FakeSearch {
    results: HashMap<String, Vec<SearchHit>>,
    default: Vec<SearchHit>,
    error: Option<String>,
    queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn returning(hits: Vec<SearchHit>) -> Self {
        Self {
            default: hits,
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.results.insert(query.to_string(), hits);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        if let Some(message) = &self.error {
            return Err(ResearchError::Api(message.clone()));
        }
        Ok(self
            .results
            .get(query)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Fetcher serving pages from a table; unknown urls fail
#[derive(Debug, Default)]
pub struct FakeFetcher {
    pages: HashMap<String, (String, String)>,
    fetched: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, title: &str, text: &str) -> Self {
        self.pages
            .insert(url.to_string(), (title.to_string(), text.to_string()));
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchedPage> {
        self.fetched.lock().unwrap().push(url.to_string());
        let (title, text) = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| ResearchError::Api(format!("404 for {url}")))?;
        Ok(FetchedPage {
            url: url.to_string(),
            status: 200,
            title,
            text,
        })
    }
}

/// Model replaying canned replies; errors once the script runs out
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedModel {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> research_llm::Result<CompletionResponse> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LLMError::Unavailable("script exhausted".to_string()))?;
        Ok(CompletionResponse::new(reply))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
