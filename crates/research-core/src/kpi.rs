//! Financial KPI set

use serde::{Deserialize, Serialize};
use std::fmt;

/// Names of the tracked KPIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiName {
    #[serde(rename = "p_e_ratio")]
    PeRatio,
    #[serde(rename = "p_s_ratio")]
    PsRatio,
    GrossMargin,
    OperatingMargin,
}

impl KpiName {
    /// All KPIs, in report order
    pub const ALL: [KpiName; 4] = [
        KpiName::PeRatio,
        KpiName::PsRatio,
        KpiName::GrossMargin,
        KpiName::OperatingMargin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KpiName::PeRatio => "p_e_ratio",
            KpiName::PsRatio => "p_s_ratio",
            KpiName::GrossMargin => "gross_margin",
            KpiName::OperatingMargin => "operating_margin",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            KpiName::PeRatio => "P/E (ttm)",
            KpiName::PsRatio => "P/S (ttm)",
            KpiName::GrossMargin => "Gross Margin",
            KpiName::OperatingMargin => "Operating Margin",
        }
    }

    /// Margins are stored as fractions and displayed as percentages
    pub fn is_margin(&self) -> bool {
        matches!(self, KpiName::GrossMargin | KpiName::OperatingMargin)
    }
}

impl fmt::Display for KpiName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial set of KPIs; absent values are `None`, never zero-filled
///
/// Margins are fractions in `0..=1`, not percentages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_e_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_s_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gross_margin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_margin: Option<f64>,
}

impl KpiSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: KpiName) -> Option<f64> {
        match name {
            KpiName::PeRatio => self.p_e_ratio,
            KpiName::PsRatio => self.p_s_ratio,
            KpiName::GrossMargin => self.gross_margin,
            KpiName::OperatingMargin => self.operating_margin,
        }
    }

    fn slot(&mut self, name: KpiName) -> &mut Option<f64> {
        match name {
            KpiName::PeRatio => &mut self.p_e_ratio,
            KpiName::PsRatio => &mut self.p_s_ratio,
            KpiName::GrossMargin => &mut self.gross_margin,
            KpiName::OperatingMargin => &mut self.operating_margin,
        }
    }

    pub fn contains(&self, name: KpiName) -> bool {
        self.get(name).is_some()
    }

    /// Set `name` only if it is absent. Returns whether the value was stored.
    pub fn fill(&mut self, name: KpiName, value: f64) -> bool {
        let slot = self.slot(name);
        if slot.is_some() || !value.is_finite() {
            return false;
        }
        *slot = Some(value);
        true
    }

    /// Fill every absent KPI from `other`; present values are never overwritten
    pub fn fill_from(&mut self, other: &KpiSet) -> usize {
        KpiName::ALL
            .iter()
            .filter_map(|&name| other.get(name).map(|v| (name, v)))
            .filter(|&(name, value)| self.fill(name, value))
            .count()
    }

    pub fn missing(&self) -> Vec<KpiName> {
        KpiName::ALL
            .into_iter()
            .filter(|name| !self.contains(*name))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Number of present KPIs
    pub fn len(&self) -> usize {
        KpiName::ALL.len() - self.missing().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display form: ratios with two decimals, margins as percentages, `-` when absent
    pub fn display(&self, name: KpiName) -> String {
        match self.get(name) {
            None => "-".to_string(),
            Some(v) if name.is_margin() => format!("{:.1}%", v * 100.0),
            Some(v) => format!("{v:.2}"),
        }
    }
}
