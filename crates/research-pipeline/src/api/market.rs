//! Market data provider backed by Yahoo Finance and Alpha Vantage

use super::alpha_vantage::parse_number;
use super::{
    AlphaVantageClient, HistoryRange, IncomeStatement, MarketDataProvider, TrailingRatios,
    YahooFinanceClient,
};
use crate::config::ResearchConfig;
use crate::error::{ResearchError, Result};
use async_trait::async_trait;
use tracing::instrument;

/// Prices and history come from Yahoo; ratios and statements need an Alpha
/// Vantage key and fail with [`ResearchError::Config`] without one.
#[derive(Debug, Clone)]
pub struct YahooAlphaVantageData {
    yahoo: YahooFinanceClient,
    alpha_vantage: Option<AlphaVantageClient>,
}

impl YahooAlphaVantageData {
    pub fn new(yahoo: YahooFinanceClient, alpha_vantage: Option<AlphaVantageClient>) -> Self {
        Self {
            yahoo,
            alpha_vantage,
        }
    }

    pub fn from_config(config: &ResearchConfig) -> Result<Self> {
        let alpha_vantage = config
            .alpha_vantage_api_key
            .as_deref()
            .map(|key| {
                AlphaVantageClient::new(key, config.market_data_rate_limit, config.request_timeout)
            })
            .transpose()?;
        Ok(Self::new(YahooFinanceClient::new(), alpha_vantage))
    }

    fn alpha_vantage(&self) -> Result<&AlphaVantageClient> {
        self.alpha_vantage.as_ref().ok_or_else(|| {
            ResearchError::Config("ALPHA_VANTAGE_API_KEY is not configured".to_string())
        })
    }
}

#[async_trait]
impl MarketDataProvider for YahooAlphaVantageData {
    #[instrument(skip(self))]
    async fn current_price(&self, ticker: &str) -> Result<f64> {
        self.yahoo.latest_price(ticker).await
    }

    #[instrument(skip(self))]
    async fn trailing_ratios(&self, ticker: &str) -> Result<TrailingRatios> {
        let overview = self.alpha_vantage()?.company_overview(ticker).await?;
        Ok(TrailingRatios {
            pe: parse_number(overview.pe_ratio.as_deref()),
            ps: parse_number(overview.price_to_sales_ttm.as_deref()),
            eps: parse_number(overview.eps.as_deref()),
        })
    }

    #[instrument(skip(self))]
    async fn income_statement(&self, ticker: &str) -> Result<Option<IncomeStatement>> {
        let report = self.alpha_vantage()?.latest_income_report(ticker).await?;
        Ok(report.map(|r| IncomeStatement {
            total_revenue: parse_number(r.total_revenue.as_deref()),
            gross_profit: parse_number(r.gross_profit.as_deref()),
            operating_income: parse_number(r.operating_income.as_deref()),
        }))
    }

    #[instrument(skip(self))]
    async fn daily_closes(&self, ticker: &str, range: HistoryRange) -> Result<Vec<f64>> {
        self.yahoo.daily_closes(ticker, range).await
    }
}
