//! Core data model for research-rs
//!
//! This crate defines the records threaded through the research pipeline:
//! the mutable [`RunState`], the documents and search hits gathered from the
//! web, verified claims, the KPI set, projection results and the append-only
//! trace log.

pub mod claim;
pub mod document;
pub mod error;
pub mod kpi;
pub mod projection;
pub mod report;
pub mod state;
pub mod trace;

pub use claim::VerifiedClaim;
pub use document::{Document, MAX_DOCUMENT_BYTES, SearchHit, truncate_to_bytes, truncate_chars};
pub use error::{Error, Result};
pub use kpi::{KpiName, KpiSet};
pub use projection::{ProjectionSeries, ProjectionSummary};
pub use report::ReportInputs;
pub use state::RunState;
pub use trace::{TraceEvent, TracePhase};
