//! Research-to-report pipeline
//!
//! Given a topic and an optional ticker, a run gathers web evidence,
//! selects and summarizes the most relevant documents, verifies the claims
//! extracted from the summary, computes financial KPIs, projects a price
//! path and writes an HTML report.
//!
//! # Architecture
//!
//! [`PipelineOrchestrator`] drives each run through a fixed sequence of
//! stages, each backed by one component:
//! - [`Retriever`]: web search and page fetching
//! - [`Curator`]: evidence index selection and summarization
//! - [`ClaimVerifier`]: claim extraction and token-overlap verification
//! - [`KpiAggregator`]: KPI extraction with web and market data fallback
//! - [`ProjectionModel`]: growth estimate, projection and charts
//!
//! External services sit behind the traits in [`api`] and
//! [`research_llm`], so every component can run against fakes or fully
//! offline.
//!
//! # Example
//!
//! ```rust,ignore
//! use research_pipeline::{PipelineOrchestrator, ResearchConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ResearchConfig::default().with_env()?;
//!     let pipeline = PipelineOrchestrator::builder(config)
//!         .search(/* your search provider */)
//!         .llm(/* your model provider */)
//!         .build()?;
//!
//!     let state = pipeline.run("NVIDIA data center outlook 2025", Some("NVDA".into())).await?;
//!     println!("{}", state.report_path().unwrap().display());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod chart;
pub mod config;
pub mod curator;
pub mod error;
pub mod evidence;
pub mod html;
pub mod kpi;
pub mod pipeline;
pub mod projection;
pub mod prompts;
pub mod report;
pub mod retriever;
pub mod verifier;

#[cfg(test)]
mod testing;

pub use chart::{ChartRenderer, ChartRequest, SvgChartRenderer};
pub use config::{ResearchConfig, ResearchConfigBuilder, SearchBackend, VerificationMode};
pub use curator::{CurationOutcome, Curator, SummarySource};
pub use error::{ResearchError, Result};
pub use evidence::{
    Embedder, EvidenceError, EvidenceHit, EvidenceMetadata, EvidenceStore, HashingEmbedder,
    IndexHandle, ProviderEmbedder, cosine_similarity,
};
pub use kpi::{KpiAggregator, KpiExtractor, KpiOutcome};
pub use pipeline::{PipelineBuilder, PipelineOrchestrator, Stage};
pub use projection::{ProjectionModel, estimate_growth, project};
pub use prompts::PromptLibrary;
pub use report::{HtmlReportRenderer, ReportRenderer, SourcesFile};
pub use retriever::Retriever;
pub use verifier::{ClaimVerifier, decode_claims};
