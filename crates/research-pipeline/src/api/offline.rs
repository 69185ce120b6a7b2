//! Providers for runs without network access
//!
//! Every call fails, which drives the pipeline through its degraded paths.

use super::{
    FetchedPage, HistoryRange, IncomeStatement, MarketDataProvider, PageFetcher, SearchProvider,
    TrailingRatios,
};
use crate::error::{ResearchError, Result};
use async_trait::async_trait;
use research_core::SearchHit;
use std::time::Duration;

fn offline() -> ResearchError {
    ResearchError::Api("offline mode".to_string())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSearch;

#[async_trait]
impl SearchProvider for OfflineSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        Err(offline())
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

#[async_trait]
impl PageFetcher for OfflineFetcher {
    async fn fetch(&self, _url: &str, _timeout: Duration) -> Result<FetchedPage> {
        Err(offline())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineMarketData;

#[async_trait]
impl MarketDataProvider for OfflineMarketData {
    async fn current_price(&self, _ticker: &str) -> Result<f64> {
        Err(offline())
    }

    async fn trailing_ratios(&self, _ticker: &str) -> Result<TrailingRatios> {
        Err(offline())
    }

    async fn income_statement(&self, _ticker: &str) -> Result<Option<IncomeStatement>> {
        Err(offline())
    }

    async fn daily_closes(&self, _ticker: &str, _range: HistoryRange) -> Result<Vec<f64>> {
        Err(offline())
    }
}
