//! Price projection results

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Projected price path for one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSeries {
    pub horizon_years: u32,
    /// `(years_from_now, price)` pairs, quarterly from 0 to the horizon inclusive
    pub points: Vec<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_path: Option<PathBuf>,
}

impl ProjectionSeries {
    /// Projected price at the end of the horizon
    pub fn final_price(&self) -> Option<f64> {
        self.points.last().map(|&(_, price)| price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSummary {
    pub current_price: f64,
    /// True when no price could be looked up and the placeholder was used
    pub price_is_assumed: bool,
    /// Annual growth rate used for every horizon
    pub growth: f64,
    pub horizons: Vec<ProjectionSeries>,
}

impl ProjectionSummary {
    pub fn chart_paths(&self) -> Vec<&PathBuf> {
        self.horizons
            .iter()
            .filter_map(|series| series.chart_path.as_ref())
            .collect()
    }
}
