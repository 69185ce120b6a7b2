//! Heuristic growth estimate and price projection

use crate::api::{HistoryRange, MarketDataProvider};
use crate::chart::{ChartRenderer, ChartRequest};
use crate::config::ResearchConfig;
use research_core::{KpiSet, ProjectionSeries, ProjectionSummary};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const BASE_GROWTH: f64 = 0.08;

/// Lower bound on the estimated growth rate
pub const MIN_GROWTH: f64 = 0.01;

/// Price used when no quote is available
pub const ASSUMED_PRICE: f64 = 100.0;

/// Spacing of projection samples, in years
pub const STEP_YEARS: f64 = 0.25;

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Annual growth rate from KPIs and price history
///
/// Starts at [`BASE_GROWTH`] and adds bounded adjustments for gross margin,
/// operating margin, P/E, 3-month momentum and 3-year CAGR. The result is
/// never below [`MIN_GROWTH`].
pub fn estimate_growth(kpis: &KpiSet, momentum: Option<f64>, cagr: Option<f64>) -> f64 {
    let mut adjustment = 0.0;

    if let Some(gm) = finite(kpis.gross_margin) {
        adjustment += ((gm - 0.35) * 0.5).clamp(-0.05, 0.10);
    }
    if let Some(om) = finite(kpis.operating_margin) {
        adjustment += ((om - 0.15) * 0.7).clamp(-0.05, 0.12);
    }
    if let Some(pe) = finite(kpis.p_e_ratio).filter(|pe| *pe > 0.0) {
        if pe < 20.0 {
            adjustment += 0.02;
        } else if pe > 50.0 {
            adjustment -= 0.03;
        }
    }
    if let Some(momentum) = finite(momentum) {
        adjustment += (momentum * 0.3).clamp(-0.05, 0.06);
    }
    if let Some(cagr) = finite(cagr) {
        adjustment += (cagr * 0.5).clamp(-0.05, 0.10);
    }

    (BASE_GROWTH + adjustment).max(MIN_GROWTH)
}

/// `(t, p0 * (1 + g)^t)` for `t` from 0 to `horizon_years` in quarter-year steps
pub fn project(current_price: f64, growth: f64, horizon_years: u32) -> Vec<(f64, f64)> {
    let steps = horizon_years * 4;
    (0..=steps)
        .map(|i| {
            let t = f64::from(i) * STEP_YEARS;
            (t, current_price * (1.0 + growth).powf(t))
        })
        .collect()
}

/// Simple return between the first and last close
pub fn momentum_from_closes(closes: &[f64]) -> Option<f64> {
    let (first, last) = endpoints(closes)?;
    Some(last / first - 1.0)
}

/// Compound annual growth between the first and last close over `years`
pub fn cagr_from_closes(closes: &[f64], years: f64) -> Option<f64> {
    if years <= 0.0 {
        return None;
    }
    let (first, last) = endpoints(closes)?;
    Some((last / first).powf(1.0 / years) - 1.0)
}

fn endpoints(closes: &[f64]) -> Option<(f64, f64)> {
    let first = *closes.first()?;
    let last = *closes.last()?;
    (closes.len() >= 2 && first > 0.0 && first.is_finite() && last.is_finite())
        .then_some((first, last))
}

/// File name safe form of a ticker or query
pub fn file_stem(subject: &str) -> String {
    let stem: String = subject
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(48)
        .collect();
    if stem.is_empty() { "topic".to_string() } else { stem }
}

/// Builds projections and their charts
pub struct ProjectionModel {
    market: Arc<dyn MarketDataProvider>,
    charts: Arc<dyn ChartRenderer>,
    horizons: Vec<u32>,
    output_dir: PathBuf,
}

impl ProjectionModel {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        charts: Arc<dyn ChartRenderer>,
        config: &ResearchConfig,
    ) -> Self {
        Self {
            market,
            charts,
            horizons: config.projection_horizons.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    /// Project `ticker` over every configured horizon
    ///
    /// Uses a single price lookup (falling back to [`ASSUMED_PRICE`]). A chart
    /// that cannot be written leaves its series without a `chart_path`.
    #[instrument(skip(self, kpis))]
    pub async fn run(&self, ticker: &str, kpis: &KpiSet, run_tag: &str) -> ProjectionSummary {
        let (current_price, price_is_assumed) = match self.market.current_price(ticker).await {
            Ok(price) if price.is_finite() && price > 0.0 => (price, false),
            Ok(price) => {
                warn!(ticker, price, "Unusable price, assuming {ASSUMED_PRICE}");
                (ASSUMED_PRICE, true)
            }
            Err(e) => {
                warn!(ticker, error = %e, "Price unavailable, assuming {ASSUMED_PRICE}");
                (ASSUMED_PRICE, true)
            }
        };

        let momentum = self.history_stat(ticker, HistoryRange::ThreeMonths).await;
        let cagr = self.history_stat(ticker, HistoryRange::ThreeYears).await;
        let growth = estimate_growth(kpis, momentum, cagr);
        info!(ticker, current_price, growth, ?momentum, ?cagr, "Estimated growth");

        let stem = file_stem(ticker);
        let mut horizons = Vec::with_capacity(self.horizons.len());
        for &years in &self.horizons {
            let points = project(current_price, growth, years);
            let path = self.output_dir.join(format!(
                "{stem}_proj_{years}y_{run_tag}.{}",
                self.charts.extension()
            ));
            let title = format!(
                "{ticker} — {years}Y Projection (g~{:.1}%)",
                growth * 100.0
            );
            let chart_path = self.draw(&title, &points, &path).await;
            horizons.push(ProjectionSeries {
                horizon_years: years,
                points,
                chart_path,
            });
        }

        ProjectionSummary {
            current_price,
            price_is_assumed,
            growth,
            horizons,
        }
    }

    /// Momentum for the short range, CAGR for the long one
    async fn history_stat(&self, ticker: &str, range: HistoryRange) -> Option<f64> {
        match self.market.daily_closes(ticker, range).await {
            Ok(closes) => match range {
                HistoryRange::ThreeMonths => momentum_from_closes(&closes),
                HistoryRange::ThreeYears => cagr_from_closes(&closes, range.years()),
            },
            Err(e) => {
                debug!(ticker, ?range, error = %e, "No price history");
                None
            }
        }
    }

    async fn draw(&self, title: &str, points: &[(f64, f64)], path: &Path) -> Option<PathBuf> {
        let chart = ChartRequest {
            title,
            x_label: "Years",
            y_label: "Projected Price",
            points,
        };
        match self.charts.render(&chart, path).await {
            Ok(()) => Some(path.to_path_buf()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Chart not written");
                None
            }
        }
    }
}

impl fmt::Debug for ProjectionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionModel")
            .field("horizons", &self.horizons)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}
