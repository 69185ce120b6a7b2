//! Yahoo Finance client for prices and close history

use super::HistoryRange;
use crate::error::{ResearchError, Result};
use chrono::{DateTime, Duration, Utc};
use time::OffsetDateTime;
use tracing::debug;
use yahoo_finance_api as yahoo;

/// Yahoo Finance price client (no API key required)
#[derive(Debug, Clone, Default)]
pub struct YahooFinanceClient {}

fn yahoo_error(err: impl std::fmt::Display) -> ResearchError {
    ResearchError::MarketData(format!("Yahoo Finance: {err}"))
}

impl YahooFinanceClient {
    pub fn new() -> Self {
        Self {}
    }

    /// Close of the latest daily bar
    pub async fn latest_price(&self, symbol: &str) -> Result<f64> {
        let provider = yahoo::YahooConnector::new().map_err(yahoo_error)?;

        let response = provider
            .get_latest_quotes(symbol, "1d")
            .await
            .map_err(yahoo_error)?;
        let quote = response.last_quote().map_err(yahoo_error)?;

        if quote.close.is_finite() && quote.close > 0.0 {
            Ok(quote.close)
        } else {
            Err(ResearchError::MarketData(format!(
                "Yahoo Finance returned an unusable price for {symbol}"
            )))
        }
    }

    /// Daily closes between `start` and `end`, oldest first
    pub async fn closes_between(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<f64>> {
        let provider = yahoo::YahooConnector::new().map_err(yahoo_error)?;

        let start_odt = OffsetDateTime::from_unix_timestamp(start.timestamp())
            .map_err(|e| yahoo_error(format!("invalid start timestamp: {e}")))?;
        let end_odt = OffsetDateTime::from_unix_timestamp(end.timestamp())
            .map_err(|e| yahoo_error(format!("invalid end timestamp: {e}")))?;

        let response = provider
            .get_quote_history(symbol, start_odt, end_odt)
            .await
            .map_err(yahoo_error)?;
        let mut quotes = response.quotes().map_err(yahoo_error)?;
        quotes.sort_by_key(|q| q.timestamp);

        let closes: Vec<f64> = quotes
            .iter()
            .map(|q| q.close)
            .filter(|c| c.is_finite() && *c > 0.0)
            .collect();
        debug!(symbol, closes = closes.len(), "Loaded close history");
        Ok(closes)
    }

    /// Daily closes over a trailing range ending now
    pub async fn daily_closes(&self, symbol: &str, range: HistoryRange) -> Result<Vec<f64>> {
        let end = Utc::now();
        let start = end - Duration::days(range.days());
        self.closes_between(symbol, start, end).await
    }
}
