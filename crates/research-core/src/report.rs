//! Inputs handed to report renderers

use crate::{KpiSet, ProjectionSummary, RunState, TraceEvent, VerifiedClaim};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// Read-only view of everything a report shows
#[derive(Debug, Clone, Serialize)]
pub struct ReportInputs<'a> {
    pub run_id: Uuid,
    pub query: &'a str,
    pub ticker: Option<&'a str>,
    pub summary: &'a str,
    pub kpis: &'a KpiSet,
    pub checked_claims: &'a [VerifiedClaim],
    pub projection: Option<&'a ProjectionSummary>,
    pub sources_path: Option<&'a PathBuf>,
    pub trace: &'a [TraceEvent],
    pub generated_at: DateTime<Utc>,
}

impl<'a> ReportInputs<'a> {
    /// Snapshot of `state`, stamped with the current time
    pub fn from_state(state: &'a RunState) -> Self {
        Self {
            run_id: state.run_id(),
            query: state.query(),
            ticker: state.ticker(),
            summary: state.summary(),
            kpis: state.kpis(),
            checked_claims: state.checked_claims(),
            projection: state.projection(),
            sources_path: state.sources_path(),
            trace: state.trace(),
            generated_at: Utc::now(),
        }
    }

    /// Ticker when present, otherwise the query
    pub fn topic(&self) -> &str {
        self.ticker.unwrap_or(self.query)
    }
}
