//! Financial KPI extraction and fallback lookup
//!
//! KPIs are first read from the run's own documents with a fixed pattern
//! table. Gaps are filled from targeted web searches and finally from the
//! market data provider. A value found earlier is never replaced.

use crate::api::MarketDataProvider;
use crate::config::ResearchConfig;
use crate::error::Result;
use crate::retriever::{Retriever, SEARCH_ERROR_TITLE};
use regex::Regex;
use research_core::{Document, KpiName, KpiSet, truncate_chars};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Characters taken from each document when aggregating
pub const DOC_TEXT_CHARS: usize = 6000;

/// Characters of aggregated text scanned for KPIs
pub const AGGREGATE_TEXT_CHARS: usize = 24_000;

const NUMBER: &str = r"([0-9]+(?:\.[0-9]+)?)";

/// Pattern table, tried in order per KPI
fn pattern_table() -> [(KpiName, Vec<String>); 4] {
    [
        (
            KpiName::PeRatio,
            vec![
                format!(r"p/e\s*(?:ratio|)\s*[:=]\s*{NUMBER}"),
                format!(r"\bpe\s*ratio\s*[:=]\s*{NUMBER}"),
            ],
        ),
        (
            KpiName::PsRatio,
            vec![
                format!(r"p/s\s*(?:ratio|)\s*[:=]\s*{NUMBER}"),
                format!(r"price\s*to\s*sales\s*(?:ratio|)\s*[:=]\s*{NUMBER}"),
            ],
        ),
        (
            KpiName::GrossMargin,
            vec![format!(
                r"gross\s*margin(?:\s*%|\s*percentage|)\s*[:=]?\s*{NUMBER}\s*%"
            )],
        ),
        (
            KpiName::OperatingMargin,
            vec![format!(
                r"operating\s*margin(?:\s*%|\s*percentage|)\s*[:=]?\s*{NUMBER}\s*%"
            )],
        ),
    ]
}

/// Reads KPI values out of free text
#[derive(Debug, Clone)]
pub struct KpiExtractor {
    patterns: Vec<(KpiName, Vec<Regex>)>,
}

impl KpiExtractor {
    pub fn new() -> Result<Self> {
        let patterns = pattern_table()
            .into_iter()
            .map(|(name, sources)| -> Result<(KpiName, Vec<Regex>)> {
                let compiled = sources
                    .iter()
                    .map(|source| Regex::new(&format!("(?i){source}")))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok((name, compiled))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// KPIs found in `text`; first matching pattern wins, margins become fractions
    pub fn extract(&self, text: &str) -> KpiSet {
        let lowered = text.to_lowercase();
        let mut kpis = KpiSet::new();

        for (name, patterns) in &self.patterns {
            let value = patterns.iter().find_map(|pattern| {
                pattern
                    .captures(&lowered)
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse::<f64>().ok())
            });
            if let Some(value) = value {
                let value = if name.is_margin() { value / 100.0 } else { value };
                kpis.fill(*name, value);
            }
        }
        kpis
    }
}

/// Document texts joined for KPI scanning
///
/// Each text contributes at most [`DOC_TEXT_CHARS`] characters and the result
/// is cut to [`AGGREGATE_TEXT_CHARS`].
pub fn aggregate_text(docs: &[Document]) -> String {
    let joined = docs
        .iter()
        .map(|doc| truncate_chars(&doc.text, DOC_TEXT_CHARS))
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_chars(&joined, AGGREGATE_TEXT_CHARS).to_string()
}

/// Search query used to look up one KPI
pub fn fallback_query(subject: &str, name: KpiName) -> String {
    match name {
        KpiName::PeRatio => format!("{subject} P/E ratio"),
        KpiName::PsRatio => format!("{subject} price to sales ratio"),
        KpiName::GrossMargin => format!("{subject} gross margin percentage"),
        KpiName::OperatingMargin => format!("{subject} operating margin percentage"),
    }
}

/// Result of [`KpiAggregator::collect`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiOutcome {
    pub kpis: KpiSet,
    /// Whether the document text alone was not enough
    pub used_fallback: bool,
}

/// Collects KPIs for a run
pub struct KpiAggregator {
    extractor: KpiExtractor,
    retriever: Retriever,
    market: Arc<dyn MarketDataProvider>,
    hits_per_query: usize,
    max_fetches: usize,
    fetch_timeout: Duration,
}

impl KpiAggregator {
    pub fn new(
        retriever: Retriever,
        market: Arc<dyn MarketDataProvider>,
        config: &ResearchConfig,
    ) -> Result<Self> {
        Ok(Self {
            extractor: KpiExtractor::new()?,
            retriever,
            market,
            hits_per_query: config.kpi_fallback_hits,
            max_fetches: config.kpi_fallback_max_fetches,
            fetch_timeout: config.fetch_timeout,
        })
    }

    pub fn extractor(&self) -> &KpiExtractor {
        &self.extractor
    }

    /// KPIs from `docs`, completed by the fallback lookup when some are missing
    #[instrument(skip(self, docs), fields(docs = docs.len()))]
    pub async fn collect(&self, docs: &[Document], subject: &str) -> KpiOutcome {
        let kpis = self.extractor.extract(&aggregate_text(docs));
        debug!(found = kpis.len(), "KPIs from documents");

        if kpis.is_complete() {
            return KpiOutcome {
                kpis,
                used_fallback: false,
            };
        }

        KpiOutcome {
            kpis: self.fallback(subject, &kpis).await,
            used_fallback: true,
        }
    }

    /// Fill the gaps in `known` from web search, then from market data
    ///
    /// Issues one search per missing KPI plus a general ratios query, stops
    /// as soon as every KPI is present and fetches at most the configured
    /// number of pages. Values in `known` are kept as they are.
    pub async fn fallback(&self, subject: &str, known: &KpiSet) -> KpiSet {
        let mut kpis = *known;

        let mut queries: Vec<String> = kpis
            .missing()
            .into_iter()
            .map(|name| fallback_query(subject, name))
            .collect();
        queries.push(format!("{subject} KPIs financial ratios"));

        let mut fetches = 0usize;
        let mut seen = HashSet::new();
        'queries: for query in &queries {
            if kpis.is_complete() {
                break;
            }
            for hit in self.retriever.search(query, self.hits_per_query).await {
                if hit.title == SEARCH_ERROR_TITLE && !hit.has_link() {
                    continue;
                }
                if hit.has_link() && !seen.insert(hit.link.clone()) {
                    continue;
                }

                let mut text = String::new();
                if hit.has_link() && fetches < self.max_fetches {
                    fetches += 1;
                    text = self.retriever.fetch(&hit.link, self.fetch_timeout).await.text;
                }
                if text.trim().is_empty() {
                    text = hit.snippet;
                }

                let added = kpis.fill_from(&self.extractor.extract(&text));
                if added > 0 {
                    debug!(query = %query, added, "KPIs from search");
                }
                if kpis.is_complete() {
                    break 'queries;
                }
            }
        }
        info!(found = kpis.len(), fetches, "Web KPI fallback finished");

        if !kpis.is_complete() {
            let market = self.market_kpis(subject, &kpis).await;
            let added = kpis.fill_from(&market);
            debug!(added, "KPIs from market data");
        }
        kpis
    }

    /// Ratios and margins from the market data provider for the KPIs `known` lacks
    async fn market_kpis(&self, ticker: &str, known: &KpiSet) -> KpiSet {
        let mut kpis = KpiSet::new();

        if !known.contains(KpiName::PeRatio) || !known.contains(KpiName::PsRatio) {
            match self.market.trailing_ratios(ticker).await {
                Ok(ratios) => {
                    let pe = match ratios.pe.filter(|pe| *pe != 0.0) {
                        Some(pe) => Some(pe),
                        None => self.pe_from_eps(ticker, ratios.eps).await,
                    };
                    if let Some(pe) = pe {
                        kpis.fill(KpiName::PeRatio, pe);
                    }
                    if let Some(ps) = ratios.ps.filter(|ps| *ps != 0.0) {
                        kpis.fill(KpiName::PsRatio, ps);
                    }
                }
                Err(e) => warn!(ticker, error = %e, "Trailing ratios unavailable"),
            }
        }

        if !known.contains(KpiName::GrossMargin) || !known.contains(KpiName::OperatingMargin) {
            match self.market.income_statement(ticker).await {
                Ok(Some(statement)) => {
                    if let Some(margin) = statement.gross_margin() {
                        kpis.fill(KpiName::GrossMargin, margin);
                    }
                    if let Some(margin) = statement.operating_margin() {
                        kpis.fill(KpiName::OperatingMargin, margin);
                    }
                }
                Ok(None) => debug!(ticker, "No income statement"),
                Err(e) => warn!(ticker, error = %e, "Income statement unavailable"),
            }
        }
        kpis
    }

    /// Price over trailing EPS, when EPS is known and non-zero
    async fn pe_from_eps(&self, ticker: &str, eps: Option<f64>) -> Option<f64> {
        let eps = eps.filter(|eps| *eps != 0.0 && eps.is_finite())?;
        match self.market.current_price(ticker).await {
            Ok(price) => Some(price / eps),
            Err(e) => {
                debug!(ticker, error = %e, "No price for P/E from EPS");
                None
            }
        }
    }
}

impl fmt::Debug for KpiAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KpiAggregator")
            .field("retriever", &self.retriever)
            .field("hits_per_query", &self.hits_per_query)
            .field("max_fetches", &self.max_fetches)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{IncomeStatement, MockMarketDataProvider, TrailingRatios};
    use crate::error::ResearchError;
    use crate::testing::{FakeFetcher, FakeSearch};
    use research_core::SearchHit;

    fn extractor() -> KpiExtractor {
        KpiExtractor::new().unwrap()
    }

    fn unavailable_market() -> MockMarketDataProvider {
        let mut market = MockMarketDataProvider::new();
        market
            .expect_trailing_ratios()
            .returning(|_| Err(ResearchError::MarketData("down".to_string())));
        market
            .expect_income_statement()
            .returning(|_| Err(ResearchError::MarketData("down".to_string())));
        market.expect_current_price().never();
        market
    }

    fn aggregator(
        search: FakeSearch,
        fetcher: FakeFetcher,
        market: MockMarketDataProvider,
        config: &ResearchConfig,
    ) -> KpiAggregator {
        let retriever = Retriever::new(Arc::new(search), Arc::new(fetcher));
        KpiAggregator::new(retriever, Arc::new(market), config).unwrap()
    }

    #[test]
    fn test_extract_all_patterns() {
        let text = "NVDA P/E Ratio: 45.2, P/S = 25.1. Gross margin 74.6% and \
                    operating margin percentage: 54.1 %";
        let kpis = extractor().extract(text);

        assert_eq!(kpis.p_e_ratio, Some(45.2));
        assert_eq!(kpis.p_s_ratio, Some(25.1));
        assert!((kpis.gross_margin.unwrap() - 0.746).abs() < 1e-9);
        assert!((kpis.operating_margin.unwrap() - 0.541).abs() < 1e-9);
    }

    #[test]
    fn test_extract_gross_margin_label() {
        let kpis = extractor().extract("Gross Margin: 42%");
        assert!((kpis.gross_margin.unwrap() - 0.42).abs() < 1e-9);
        assert!(kpis.p_e_ratio.is_none());
    }

    #[test]
    fn test_extract_alternate_patterns_and_first_match() {
        let kpis = extractor().extract("PE ratio = 30 then PE ratio = 99; Price to sales: 12");
        assert_eq!(kpis.p_e_ratio, Some(30.0));
        assert_eq!(kpis.p_s_ratio, Some(12.0));
    }

    #[test]
    fn test_extract_omits_absent_values() {
        let kpis = extractor().extract("gross margin improved substantially; operating margin 40");
        assert!(kpis.is_empty());
        assert!(extractor().extract("").is_empty());
    }

    #[test]
    fn test_aggregate_text_bounds() {
        let docs: Vec<Document> = (0..6)
            .map(|i| Document::new(format!("https://{i}"), "t", "a".repeat(7000)))
            .collect();
        let text = aggregate_text(&docs);
        assert_eq!(text.chars().count(), AGGREGATE_TEXT_CHARS);
        assert!(text.starts_with(&format!("{}\n\n", "a".repeat(DOC_TEXT_CHARS))));

        let short = vec![Document::new("u", "t", "one"), Document::new("v", "t", "two")];
        assert_eq!(aggregate_text(&short), "one\n\ntwo");
    }

    #[tokio::test]
    async fn test_collect_skips_fallback_when_complete() {
        let search = Arc::new(FakeSearch::returning(Vec::new()));
        let retriever = Retriever::new(search.clone(), Arc::new(FakeFetcher::new()));
        let mut market = MockMarketDataProvider::new();
        market.expect_trailing_ratios().never();
        market.expect_income_statement().never();
        let aggregator =
            KpiAggregator::new(retriever, Arc::new(market), &ResearchConfig::default()).unwrap();

        let docs = vec![Document::new(
            "https://a",
            "A",
            "P/E: 40 P/S: 20 gross margin: 70% operating margin: 50%",
        )];
        let outcome = aggregator.collect(&docs, "NVDA").await;

        assert!(!outcome.used_fallback);
        assert!(outcome.kpis.is_complete());
        assert!(search.queries().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_never_overwrites_and_stops_early() {
        let search = FakeSearch::returning(Vec::new())
            .with_query(
                "NVDA P/E ratio",
                vec![SearchHit::new("PE page", "", "https://pe")],
            )
            .with_query(
                "NVDA price to sales ratio",
                vec![SearchHit::new(
                    "All ratios",
                    "P/S: 25 gross margin 75% operating margin 60% P/E: 99",
                    "",
                )],
            );
        let fetcher = FakeFetcher::new().with_page("https://pe", "PE", "P/E ratio: 50.5");
        let search = Arc::new(search);
        let retriever = Retriever::new(search.clone(), Arc::new(fetcher));
        let mut market = MockMarketDataProvider::new();
        market.expect_trailing_ratios().never();
        market.expect_income_statement().never();
        let aggregator =
            KpiAggregator::new(retriever, Arc::new(market), &ResearchConfig::default()).unwrap();

        let known = KpiSet {
            gross_margin: Some(0.42),
            ..Default::default()
        };
        let kpis = aggregator.fallback("NVDA", &known).await;

        assert_eq!(kpis.gross_margin, Some(0.42));
        assert_eq!(kpis.p_e_ratio, Some(50.5));
        assert_eq!(kpis.p_s_ratio, Some(25.0));
        assert_eq!(kpis.operating_margin, Some(0.6));
        assert_eq!(
            search.queries(),
            vec!["NVDA P/E ratio", "NVDA price to sales ratio"]
        );
    }

    #[tokio::test]
    async fn test_fallback_bounds_fetches() {
        let hits: Vec<SearchHit> = (0..6)
            .map(|i| SearchHit::new(format!("hit {i}"), "", format!("https://h/{i}")))
            .collect();
        let search = FakeSearch::returning(hits.clone())
            .with_query("ACME P/S ratio", hits)
            .with_query(
                "ACME KPIs financial ratios",
                (6..12)
                    .map(|i| SearchHit::new(format!("hit {i}"), "", format!("https://h/{i}")))
                    .collect(),
            );
        let fetcher = Arc::new(FakeFetcher::new());
        let retriever = Retriever::new(Arc::new(search), fetcher.clone());
        let config = ResearchConfig {
            kpi_fallback_max_fetches: 4,
            ..Default::default()
        };
        let aggregator =
            KpiAggregator::new(retriever, Arc::new(unavailable_market()), &config).unwrap();

        let kpis = aggregator.fallback("ACME", &KpiSet::new()).await;
        assert!(kpis.is_empty());
        assert_eq!(fetcher.fetched().len(), 4);
    }

    #[tokio::test]
    async fn test_market_data_fills_remaining_gaps() {
        let mut market = MockMarketDataProvider::new();
        market.expect_trailing_ratios().times(1).returning(|_| {
            Ok(TrailingRatios {
                pe: None,
                ps: Some(26.0),
                eps: Some(2.0),
            })
        });
        market.expect_current_price().times(1).returning(|_| Ok(120.0));
        market.expect_income_statement().times(1).returning(|_| {
            Ok(Some(IncomeStatement {
                total_revenue: Some(100.0),
                gross_profit: Some(75.0),
                operating_income: Some(60.0),
            }))
        });

        let aggregator = aggregator(
            FakeSearch::failing("offline"),
            FakeFetcher::new(),
            market,
            &ResearchConfig::default(),
        );
        let known = KpiSet {
            operating_margin: Some(0.5),
            ..Default::default()
        };
        let kpis = aggregator.fallback("NVDA", &known).await;

        assert_eq!(kpis.p_e_ratio, Some(60.0));
        assert_eq!(kpis.p_s_ratio, Some(26.0));
        assert_eq!(kpis.gross_margin, Some(0.75));
        assert_eq!(kpis.operating_margin, Some(0.5));
    }

    #[tokio::test]
    async fn test_market_margins_skip_zero_revenue() {
        let mut market = MockMarketDataProvider::new();
        market
            .expect_trailing_ratios()
            .returning(|_| Ok(TrailingRatios::default()));
        market.expect_current_price().never();
        market.expect_income_statement().returning(|_| {
            Ok(Some(IncomeStatement {
                total_revenue: Some(0.0),
                gross_profit: Some(10.0),
                operating_income: Some(5.0),
            }))
        });

        let aggregator = aggregator(
            FakeSearch::returning(Vec::new()),
            FakeFetcher::new(),
            market,
            &ResearchConfig::default(),
        );
        let kpis = aggregator.fallback("ACME", &KpiSet::new()).await;
        assert!(kpis.is_empty());
    }

    #[tokio::test]
    async fn test_collect_degrades_to_partial_set() {
        let aggregator = aggregator(
            FakeSearch::failing("offline"),
            FakeFetcher::new(),
            unavailable_market(),
            &ResearchConfig::default(),
        );
        let docs = vec![Document::new("https://a", "A", "P/E: 33.3")];
        let outcome = aggregator.collect(&docs, "NVIDIA data center outlook 2025").await;

        assert!(outcome.used_fallback);
        assert_eq!(outcome.kpis.p_e_ratio, Some(33.3));
        assert_eq!(outcome.kpis.len(), 1);
    }
}
