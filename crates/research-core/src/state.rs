//! Per-run pipeline state

use crate::{Document, KpiSet, ProjectionSummary, SearchHit, TraceEvent, VerifiedClaim};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Everything one pipeline run accumulates
///
/// Each stage owns the fields it produces and replaces them wholesale through
/// the `set_*` methods. The trace only grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    run_id: Uuid,
    query: String,
    ticker: Option<String>,
    web_results: Vec<SearchHit>,
    docs: Vec<Document>,
    summary: String,
    claims: Vec<String>,
    checked_claims: Vec<VerifiedClaim>,
    kpis: KpiSet,
    projection: Option<ProjectionSummary>,
    sources_path: Option<PathBuf>,
    report_path: Option<PathBuf>,
    trace: Vec<TraceEvent>,
}

impl RunState {
    pub fn new(query: impl Into<String>, ticker: Option<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            query: query.into(),
            ticker: ticker.filter(|t| !t.trim().is_empty()),
            web_results: Vec::new(),
            docs: Vec::new(),
            summary: String::new(),
            claims: Vec::new(),
            checked_claims: Vec::new(),
            kpis: KpiSet::default(),
            projection: None,
            sources_path: None,
            report_path: None,
            trace: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Short form of the run id used in artifact file names
    pub fn run_tag(&self) -> String {
        self.run_id.simple().to_string()[..12].to_string()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn ticker(&self) -> Option<&str> {
        self.ticker.as_deref()
    }

    /// Ticker when given, the query otherwise
    pub fn subject(&self) -> &str {
        self.ticker().unwrap_or(&self.query)
    }

    pub fn web_results(&self) -> &[SearchHit] {
        &self.web_results
    }

    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn claims(&self) -> &[String] {
        &self.claims
    }

    pub fn checked_claims(&self) -> &[VerifiedClaim] {
        &self.checked_claims
    }

    pub fn kpis(&self) -> &KpiSet {
        &self.kpis
    }

    pub fn projection(&self) -> Option<&ProjectionSummary> {
        self.projection.as_ref()
    }

    pub fn sources_path(&self) -> Option<&PathBuf> {
        self.sources_path.as_ref()
    }

    pub fn report_path(&self) -> Option<&Path> {
        self.report_path.as_deref()
    }

    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    pub fn set_web_results(&mut self, hits: Vec<SearchHit>) {
        self.web_results = hits;
    }

    pub fn set_docs(&mut self, docs: Vec<Document>) {
        self.docs = docs;
    }

    pub fn set_summary(&mut self, summary: String) {
        self.summary = summary;
    }

    pub fn set_claims(&mut self, claims: Vec<String>) {
        self.claims = claims;
    }

    pub fn set_checked_claims(&mut self, checked: Vec<VerifiedClaim>) {
        self.checked_claims = checked;
    }

    pub fn set_kpis(&mut self, kpis: KpiSet) {
        self.kpis = kpis;
    }

    pub fn set_projection(&mut self, projection: Option<ProjectionSummary>) {
        self.projection = projection;
    }

    pub fn set_sources_path(&mut self, path: Option<PathBuf>) {
        self.sources_path = path;
    }

    pub fn set_report_path(&mut self, path: PathBuf) {
        self.report_path = Some(path);
    }

    /// Append a trace event
    pub fn record(&mut self, event: TraceEvent) {
        self.trace.push(event);
    }

    /// Number of verified claims whose verdict is true
    pub fn verified_count(&self) -> usize {
        self.checked_claims.iter().filter(|c| c.verdict).count()
    }
}
