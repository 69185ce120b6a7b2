//! External service boundaries and their implementations
//!
//! The pipeline depends only on the traits in this module. Concrete clients:
//!
//! - [`DuckDuckGoSearch`], [`SearxSearch`]: web search
//! - [`HttpPageFetcher`]: page retrieval
//! - [`YahooAlphaVantageData`]: prices and history from Yahoo Finance, ratios
//!   and income statements from Alpha Vantage
//! - [`offline`]: implementations that always fail, for runs without network

pub mod alpha_vantage;
pub mod duckduckgo;
pub mod fetch;
pub mod market;
pub mod offline;
pub mod searx;
pub mod yahoo;

pub use alpha_vantage::{AlphaVantageClient, CompanyOverview, IncomeReport};
pub use duckduckgo::DuckDuckGoSearch;
pub use fetch::HttpPageFetcher;
pub use market::YahooAlphaVantageData;
pub use offline::{OfflineFetcher, OfflineMarketData, OfflineSearch};
pub use searx::SearxSearch;
pub use yahoo::YahooFinanceClient;

use crate::error::Result;
use async_trait::async_trait;
use research_core::SearchHit;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Web search engine
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Up to `max_results` hits for `query`, in engine rank order
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    fn name(&self) -> &str;
}

/// Raw result of fetching one URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub title: String,
    pub text: String,
}

/// Page retrieval
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage>;
}

/// Trailing valuation ratios
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrailingRatios {
    pub pe: Option<f64>,
    pub ps: Option<f64>,
    /// Trailing twelve month earnings per share
    pub eps: Option<f64>,
}

/// Latest annual income statement lines used for margins
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub total_revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub operating_income: Option<f64>,
}

impl IncomeStatement {
    /// `component / revenue`, or `None` when either is missing or revenue is zero
    pub fn margin(&self, component: Option<f64>) -> Option<f64> {
        let revenue = self.total_revenue.filter(|r| *r != 0.0 && r.is_finite())?;
        component.filter(|c| c.is_finite()).map(|c| c / revenue)
    }

    pub fn gross_margin(&self) -> Option<f64> {
        self.margin(self.gross_profit)
    }

    pub fn operating_margin(&self) -> Option<f64> {
        self.margin(self.operating_income)
    }
}

/// Length of a daily close history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryRange {
    ThreeMonths,
    ThreeYears,
}

impl HistoryRange {
    pub fn days(self) -> i64 {
        match self {
            Self::ThreeMonths => 90,
            Self::ThreeYears => 3 * 365,
        }
    }

    pub fn years(self) -> f64 {
        self.days() as f64 / 365.0
    }
}

/// Market data for KPI fallback and projections
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Latest price
    async fn current_price(&self, ticker: &str) -> Result<f64>;

    async fn trailing_ratios(&self, ticker: &str) -> Result<TrailingRatios>;

    /// Latest annual income statement, if the provider has one
    async fn income_statement(&self, ticker: &str) -> Result<Option<IncomeStatement>>;

    /// Daily closes over `range`, oldest first
    async fn daily_closes(&self, ticker: &str, range: HistoryRange) -> Result<Vec<f64>>;
}
