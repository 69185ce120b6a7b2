//! Alpha Vantage client for valuation ratios and income statements

use crate::error::{ResearchError, Result};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const BASE_URL: &str = "https://www.alphavantage.co/query";

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Alpha Vantage API client
#[derive(Debug, Clone)]
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    rate_limiter: SharedRateLimiter,
}

/// Subset of the `OVERVIEW` endpoint
///
/// Alpha Vantage reports numbers as strings and uses `"None"` or `"-"` for
/// missing values; see [`parse_number`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompanyOverview {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "PERatio", default)]
    pub pe_ratio: Option<String>,
    #[serde(rename = "PriceToSalesRatioTTM", default)]
    pub price_to_sales_ttm: Option<String>,
    #[serde(rename = "EPS", default)]
    pub eps: Option<String>,
    #[serde(rename = "GrossProfitTTM", default)]
    pub gross_profit_ttm: Option<String>,
    #[serde(rename = "RevenueTTM", default)]
    pub revenue_ttm: Option<String>,
    #[serde(rename = "OperatingMarginTTM", default)]
    pub operating_margin_ttm: Option<String>,
}

/// One report of the `INCOME_STATEMENT` endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeReport {
    #[serde(default)]
    pub fiscal_date_ending: String,
    #[serde(default)]
    pub total_revenue: Option<String>,
    #[serde(default)]
    pub gross_profit: Option<String>,
    #[serde(default)]
    pub operating_income: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomeStatementResponse {
    #[serde(default)]
    annual_reports: Vec<IncomeReport>,
}

/// Parse an Alpha Vantage numeric string
pub fn parse_number(raw: Option<&str>) -> Option<f64> {
    let raw = raw?.trim();
    if raw.is_empty() || raw == "None" || raw == "-" {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

impl AlphaVantageClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `api_key` - Alpha Vantage API key
    /// * `rate_limit` - Maximum requests per minute (free tier: 5)
    /// * `timeout` - Per-request timeout
    pub fn new(api_key: impl Into<String>, rate_limit: u32, timeout: Duration) -> Result<Self> {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key: api_key.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    #[instrument(skip(self))]
    async fn query<T: DeserializeOwned>(&self, function: &str, symbol: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(BASE_URL)
            .query(&[
                ("function", function),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ResearchError::Api(format!(
                "Alpha Vantage HTTP error: {}",
                response.status()
            )));
        }

        let data: serde_json::Value = response.json().await?;
        check_api_message(&data)?;
        debug!(function, symbol, "Alpha Vantage response received");
        Ok(serde_json::from_value(data)?)
    }

    pub async fn company_overview(&self, symbol: &str) -> Result<CompanyOverview> {
        let overview: CompanyOverview = self.query("OVERVIEW", symbol).await?;
        if overview.symbol.is_empty() {
            return Err(ResearchError::MarketData(format!(
                "Alpha Vantage has no overview for {symbol}"
            )));
        }
        Ok(overview)
    }

    /// Most recent annual income statement
    pub async fn latest_income_report(&self, symbol: &str) -> Result<Option<IncomeReport>> {
        let response: IncomeStatementResponse = self.query("INCOME_STATEMENT", symbol).await?;
        Ok(latest_report(response.annual_reports))
    }
}

/// Alpha Vantage reports failures inside a 200 response
fn check_api_message(data: &serde_json::Value) -> Result<()> {
    if let Some(error) = data.get("Error Message") {
        return Err(ResearchError::Api(format!("Alpha Vantage: {error}")));
    }
    if let Some(note) = data.get("Note").or_else(|| data.get("Information")) {
        return Err(ResearchError::Api(format!(
            "Alpha Vantage rate limit or quota: {note}"
        )));
    }
    Ok(())
}

fn latest_report(mut reports: Vec<IncomeReport>) -> Option<IncomeReport> {
    reports.sort_by(|a, b| b.fiscal_date_ending.cmp(&a.fiscal_date_ending));
    reports.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(Some("45.3")), Some(45.3));
        assert_eq!(parse_number(Some("None")), None);
        assert_eq!(parse_number(Some("-")), None);
        assert_eq!(parse_number(Some("")), None);
        assert_eq!(parse_number(None), None);
        assert_eq!(parse_number(Some("abc")), None);
    }

    #[test]
    fn test_overview_decoding() {
        let overview: CompanyOverview = serde_json::from_value(json!({
            "Symbol": "NVDA",
            "Name": "NVIDIA Corporation",
            "PERatio": "52.1",
            "PriceToSalesRatioTTM": "28.4",
            "EPS": "2.53",
            "MarketCapitalization": "3000000000000"
        }))
        .unwrap();

        assert_eq!(overview.symbol, "NVDA");
        assert_eq!(parse_number(overview.pe_ratio.as_deref()), Some(52.1));
        assert_eq!(parse_number(overview.price_to_sales_ttm.as_deref()), Some(28.4));
        assert_eq!(parse_number(overview.eps.as_deref()), Some(2.53));
    }

    #[test]
    fn test_latest_report_is_most_recent() {
        let response: IncomeStatementResponse = serde_json::from_value(json!({
            "symbol": "NVDA",
            "annualReports": [
                {"fiscalDateEnding": "2023-01-29", "totalRevenue": "26974000000"},
                {"fiscalDateEnding": "2024-01-28", "totalRevenue": "60922000000",
                 "grossProfit": "44301000000", "operatingIncome": "32972000000"}
            ]
        }))
        .unwrap();

        let latest = latest_report(response.annual_reports).unwrap();
        assert_eq!(latest.fiscal_date_ending, "2024-01-28");
        assert_eq!(parse_number(latest.gross_profit.as_deref()), Some(44_301_000_000.0));
        assert!(latest_report(Vec::new()).is_none());
    }

    #[test]
    fn test_api_messages_are_errors() {
        assert!(check_api_message(&json!({"Note": "Thank you for using Alpha Vantage!"})).is_err());
        assert!(check_api_message(&json!({"Error Message": "Invalid API call"})).is_err());
        assert!(check_api_message(&json!({"Symbol": "NVDA"})).is_ok());
    }
}
