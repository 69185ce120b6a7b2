//! Run orchestration
//!
//! A run moves through a fixed sequence of [`Stage`]s. Each call to
//! [`PipelineOrchestrator::advance`] performs exactly one transition and
//! records a `start`/`done` pair in the run trace. Stages absorb provider
//! failures and continue with degraded values; only a report that cannot be
//! written ends the run with an error.

use crate::api::{
    MarketDataProvider, OfflineFetcher, OfflineMarketData, OfflineSearch, PageFetcher,
    SearchProvider,
};
use crate::chart::{ChartRenderer, SvgChartRenderer};
use crate::config::ResearchConfig;
use crate::curator::Curator;
use crate::error::{ResearchError, Result};
use crate::evidence::{Embedder, EvidenceStore, HashingEmbedder, ProviderEmbedder};
use crate::kpi::KpiAggregator;
use crate::projection::ProjectionModel;
use crate::prompts::PromptLibrary;
use crate::report::{HtmlReportRenderer, ReportRenderer, SourcesFile};
use crate::retriever::Retriever;
use crate::verifier::ClaimVerifier;
use research_core::{ReportInputs, RunState, TraceEvent};
use research_llm::{EmbeddingProvider, LLMProvider};
use research_llm::providers::OfflineProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Position of a run in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Init,
    Researched,
    Curated,
    Verified,
    Reported,
    Done,
}

impl Stage {
    /// Stage reached by the next transition; `None` once done
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Init => Some(Stage::Researched),
            Stage::Researched => Some(Stage::Curated),
            Stage::Curated => Some(Stage::Verified),
            Stage::Verified => Some(Stage::Reported),
            Stage::Reported => Some(Stage::Done),
            Stage::Done => None,
        }
    }

    /// Name of the transition leaving this stage, as recorded in the trace
    pub fn step(self) -> Option<&'static str> {
        match self {
            Stage::Init => Some("research"),
            Stage::Researched => Some("curate"),
            Stage::Curated => Some("verify"),
            Stage::Verified => Some("report"),
            Stage::Reported => Some("finish"),
            Stage::Done => None,
        }
    }

    pub fn is_done(self) -> bool {
        self == Stage::Done
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Researched => "researched",
            Stage::Curated => "curated",
            Stage::Verified => "verified",
            Stage::Reported => "reported",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Append `event` to the trace and mirror it to the log
fn record(state: &mut RunState, event: TraceEvent) {
    info!(
        run_id = %state.run_id(),
        stage = %event.stage,
        phase = %event.phase,
        extra = %event.extra_summary(),
        "{}",
        event.label()
    );
    state.record(event);
}

/// Drives runs from a query to a written report
pub struct PipelineOrchestrator {
    config: ResearchConfig,
    retriever: Retriever,
    curator: Curator,
    verifier: ClaimVerifier,
    kpis: KpiAggregator,
    projection: ProjectionModel,
    renderer: Arc<dyn ReportRenderer>,
    store: Arc<EvidenceStore>,
}

impl PipelineOrchestrator {
    pub fn builder(config: ResearchConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn evidence_store(&self) -> &Arc<EvidenceStore> {
        &self.store
    }

    /// Execute a complete run
    ///
    /// Returns the final state, or the error that stopped the run.
    #[instrument(skip(self, ticker), fields(ticker = ticker.as_deref().unwrap_or("-")))]
    pub async fn run(&self, query: &str, ticker: Option<String>) -> Result<RunState> {
        let mut state = RunState::new(query, ticker);
        let mut stage = Stage::Init;
        info!(run_id = %state.run_id(), "Run started");

        while !stage.is_done() {
            (stage, state) = self.advance(stage, state).await?;
        }

        info!(
            run_id = %state.run_id(),
            report = ?state.report_path(),
            verified = state.verified_count(),
            "Run finished"
        );
        Ok(state)
    }

    /// Perform the transition leaving `stage`
    ///
    /// Advancing a finished run returns it unchanged.
    pub async fn advance(&self, stage: Stage, mut state: RunState) -> Result<(Stage, RunState)> {
        match stage {
            Stage::Init => self.research(&mut state).await,
            Stage::Researched => self.curate(&mut state).await,
            Stage::Curated => self.verify(&mut state).await,
            Stage::Verified => self.report(&mut state).await?,
            Stage::Reported => self.finish(&mut state).await?,
            Stage::Done => return Ok((Stage::Done, state)),
        }
        let next = stage.next().unwrap_or(Stage::Done);
        Ok((next, state))
    }

    async fn research(&self, state: &mut RunState) {
        record(state, TraceEvent::start("research"));

        let (hits, docs) = self.retriever.gather(state.query(), &self.config).await;
        let event = TraceEvent::done("research")
            .with("hits", hits.len())
            .with("docs", docs.len());
        state.set_web_results(hits);
        state.set_docs(docs);

        record(state, event);
    }

    async fn curate(&self, state: &mut RunState) {
        record(state, TraceEvent::start("curate"));

        let outcome = self.curator.curate(state.query(), state.docs()).await;
        let event = TraceEvent::done("curate")
            .with("docs", outcome.selected.len())
            .with("used_index", outcome.used_index)
            .with(
                "summary",
                serde_json::to_value(outcome.summary_source).unwrap_or_default(),
            );
        state.set_docs(outcome.selected);
        state.set_summary(outcome.summary);

        record(state, event);
    }

    async fn verify(&self, state: &mut RunState) {
        record(state, TraceEvent::start("verify"));

        let claims = self
            .verifier
            .extract(state.summary(), state.query(), self.config.claim_count)
            .await;
        let checked = self
            .verifier
            .verify(&claims, state.docs(), self.config.min_overlap());
        let event = TraceEvent::done("verify")
            .with("claims", claims.len())
            .with("verified", checked.iter().filter(|c| c.verdict).count())
            .with("min_overlap", self.config.min_overlap());
        state.set_claims(claims);
        state.set_checked_claims(checked);

        record(state, event);
    }

    async fn report(&self, state: &mut RunState) -> Result<()> {
        record(state, TraceEvent::start("report"));

        let output_dir = &self.config.output_dir;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| ResearchError::report_write(output_dir, e))?;

        let subject = state.subject().to_string();
        let tag = state.run_tag();

        let outcome = self.kpis.collect(state.docs(), &subject).await;
        state.set_kpis(outcome.kpis);

        let projection = self.projection.run(&subject, state.kpis(), &tag).await;
        let growth = projection.growth;
        state.set_projection(Some(projection));

        let sources_path = output_dir.join(format!("sources_{tag}.json"));
        match SourcesFile::from_documents(state.docs())
            .write(&sources_path)
            .await
        {
            Ok(()) => state.set_sources_path(Some(sources_path)),
            Err(e) => {
                warn!(path = %sources_path.display(), error = %e, "Sources sidecar not written");
                state.set_sources_path(None);
            }
        }

        let html = self.renderer.render(&ReportInputs::from_state(state))?;
        let report_path =
            output_dir.join(format!("report_{tag}.{}", self.renderer.extension()));
        tokio::fs::write(&report_path, html)
            .await
            .map_err(|e| ResearchError::report_write(&report_path, e))?;
        state.set_report_path(report_path.clone());

        let event = TraceEvent::done("report")
            .with("kpis", state.kpis().len())
            .with("kpi_fallback", outcome.used_fallback)
            .with("growth", growth)
            .with("report", report_path.display().to_string());
        record(state, event);
        Ok(())
    }

    async fn finish(&self, state: &mut RunState) -> Result<()> {
        record(state, TraceEvent::start("finish"));

        let Some(path) = state.report_path().map(PathBuf::from) else {
            return Err(ResearchError::report_write(
                &self.config.output_dir,
                io::Error::new(io::ErrorKind::NotFound, "no report was produced"),
            ));
        };
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(ResearchError::report_write(
                    path,
                    io::Error::new(io::ErrorKind::NotFound, "report file is missing"),
                ));
            }
            Err(e) => return Err(ResearchError::report_write(path, e)),
        }

        let verified = state.verified_count();
        record(state, TraceEvent::done("finish").with("verified", verified));
        Ok(())
    }
}

impl fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .field("retriever", &self.retriever)
            .field("curator", &self.curator)
            .finish_non_exhaustive()
    }
}

/// Builder for [`PipelineOrchestrator`]
///
/// Collaborators that are not supplied default to offline implementations,
/// so a pipeline built from the configuration alone runs fully degraded.
pub struct PipelineBuilder {
    config: ResearchConfig,
    search: Option<Arc<dyn SearchProvider>>,
    fetcher: Option<Arc<dyn PageFetcher>>,
    llm: Option<Arc<dyn LLMProvider>>,
    market: Option<Arc<dyn MarketDataProvider>>,
    store: Option<Arc<EvidenceStore>>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    charts: Option<Arc<dyn ChartRenderer>>,
    renderer: Option<Arc<dyn ReportRenderer>>,
}

impl PipelineBuilder {
    pub fn new(config: ResearchConfig) -> Self {
        Self {
            config,
            search: None,
            fetcher: None,
            llm: None,
            market: None,
            store: None,
            embeddings: None,
            charts: None,
            renderer: None,
        }
    }

    pub fn search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LLMProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn market(mut self, market: Arc<dyn MarketDataProvider>) -> Self {
        self.market = Some(market);
        self
    }

    /// Share an evidence store with other pipelines
    pub fn evidence_store(mut self, store: Arc<EvidenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Embed evidence with a model instead of the local hashing embedder
    ///
    /// Ignored when an evidence store is supplied.
    pub fn embeddings(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = Some(provider);
        self
    }

    pub fn charts(mut self, charts: Arc<dyn ChartRenderer>) -> Self {
        self.charts = Some(charts);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn build(self) -> Result<PipelineOrchestrator> {
        let config = self.config;
        config.validate()?;

        let search = self.search.unwrap_or_else(|| Arc::new(OfflineSearch));
        let fetcher = self.fetcher.unwrap_or_else(|| Arc::new(OfflineFetcher));
        let llm = self
            .llm
            .unwrap_or_else(|| Arc::new(OfflineProvider::new("no language model configured")));
        let market = self.market.unwrap_or_else(|| Arc::new(OfflineMarketData));
        let embeddings = self.embeddings;
        let store = self.store.unwrap_or_else(|| {
            let embedder: Arc<dyn Embedder> = match embeddings {
                Some(provider) => Arc::new(ProviderEmbedder::new(provider, "")),
                None => Arc::new(HashingEmbedder::default()),
            };
            Arc::new(EvidenceStore::with_limits(
                embedder,
                config.registry_capacity,
                config.registry_ttl,
                config.index_text_chars,
            ))
        });
        let charts = self.charts.unwrap_or_else(|| Arc::new(SvgChartRenderer::new()));
        let renderer = match self.renderer {
            Some(renderer) => renderer,
            None => Arc::new(HtmlReportRenderer::new()?),
        };

        let prompts = Arc::new(PromptLibrary::new()?);
        let retriever = Retriever::new(search, fetcher);

        Ok(PipelineOrchestrator {
            curator: Curator::new(store.clone(), llm.clone(), prompts.clone(), &config),
            verifier: ClaimVerifier::new(llm, prompts, config.model.clone())?,
            kpis: KpiAggregator::new(retriever.clone(), market.clone(), &config)?,
            projection: ProjectionModel::new(market, charts, &config),
            retriever,
            renderer,
            store,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{HistoryRange, MockMarketDataProvider, TrailingRatios};
    use crate::config::VerificationMode;
    use crate::testing::{FakeFetcher, FakeSearch, ScriptedModel};
    use research_core::SearchHit;
    use std::path::Path;

    const NVDA_PAGE: &str = "NVIDIA data center revenue grew strongly on demand for Hopper GPUs. \
        P/E ratio: 52.3. P/S: 28.4. Gross margin 75.0% and operating margin 62.0%.";

    fn config(dir: &Path) -> ResearchConfig {
        ResearchConfig {
            output_dir: dir.to_path_buf(),
            verification_mode: VerificationMode::Strict,
            ..Default::default()
        }
    }

    fn market() -> MockMarketDataProvider {
        let mut market = MockMarketDataProvider::new();
        market.expect_current_price().returning(|_| Ok(180.0));
        market
            .expect_daily_closes()
            .returning(|_, range| match range {
                HistoryRange::ThreeMonths => Ok(vec![150.0, 180.0]),
                HistoryRange::ThreeYears => Ok(vec![40.0, 180.0]),
            });
        market
            .expect_trailing_ratios()
            .returning(|_| Ok(TrailingRatios::default()));
        market.expect_income_statement().returning(|_| Ok(None));
        market
    }

    fn online(dir: &Path) -> PipelineOrchestrator {
        let search = FakeSearch::returning(vec![
            SearchHit::new("NVIDIA results", "record quarter", "https://nvda.example/results"),
            SearchHit::new("Broken", "", "https://broken.example"),
        ]);
        let fetcher = FakeFetcher::new().with_page(
            "https://nvda.example/results",
            "NVIDIA results",
            NVDA_PAGE,
        );
        let model = ScriptedModel::new([
            "NVIDIA data center revenue grew strongly.",
            "- NVIDIA data center revenue grew strongly\n- Gaming revenue collapsed on Mars",
        ]);

        PipelineOrchestrator::builder(config(dir))
            .search(Arc::new(search))
            .fetcher(Arc::new(fetcher))
            .llm(Arc::new(model))
            .market(Arc::new(market()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_stage_sequence() {
        let mut stage = Stage::Init;
        let mut steps = Vec::new();
        while let Some(step) = stage.step() {
            steps.push(step);
            stage = stage.next().unwrap();
        }
        assert_eq!(steps, vec!["research", "curate", "verify", "report", "finish"]);
        assert!(stage.is_done());
        assert_eq!(Stage::Done.next(), None);
        assert_eq!(Stage::Curated.to_string(), "curated");
    }

    #[tokio::test]
    async fn test_full_run() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = online(dir.path());

        let state = pipeline
            .run("NVIDIA data center outlook", Some("NVDA".to_string()))
            .await
            .unwrap();

        assert_eq!(state.web_results().len(), 2);
        assert_eq!(state.docs().len(), 1);
        assert_eq!(state.summary(), "NVIDIA data center revenue grew strongly.");
        assert_eq!(state.claims().len(), 2);
        let checked = state.checked_claims();
        assert!(checked[0].verdict);
        assert_eq!(checked[0].evidence_url.as_deref(), Some("https://nvda.example/results"));
        assert!(!checked[1].verdict);

        assert!(state.kpis().is_complete());
        assert_eq!(state.kpis().p_e_ratio, Some(52.3));

        let projection = state.projection().unwrap();
        assert!(!projection.price_is_assumed);
        assert_eq!(projection.chart_paths().len(), 2);

        let report = state.report_path().unwrap();
        assert!(report.starts_with(dir.path()));
        let html = std::fs::read_to_string(report).unwrap();
        assert!(html.contains("Checked Claims"));
        assert!(state.sources_path().unwrap().exists());

        let labels: Vec<String> = state.trace().iter().map(TraceEvent::label).collect();
        assert_eq!(
            labels,
            vec![
                "research:start",
                "research:done",
                "curate:start",
                "curate:done",
                "verify:start",
                "verify:done",
                "report:start",
                "report:done",
                "finish:start",
                "finish:done",
            ]
        );
        assert_eq!(state.trace()[1].extra["docs"], 1);
        assert_eq!(state.trace()[5].extra["verified"], 1);
    }

    #[tokio::test]
    async fn test_advance_one_step_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = online(dir.path());
        let state = RunState::new("NVIDIA data center outlook", None);

        let (stage, state) = pipeline.advance(Stage::Init, state).await.unwrap();
        assert_eq!(stage, Stage::Researched);
        assert_eq!(state.trace().len(), 2);
        assert!(state.summary().is_empty());

        let (stage, state) = pipeline.advance(Stage::Researched, state).await.unwrap();
        assert_eq!(stage, Stage::Curated);
        assert!(!state.summary().is_empty());

        let (stage, state) = pipeline.advance(Stage::Done, state).await.unwrap();
        assert_eq!(stage, Stage::Done);
        assert_eq!(state.trace().len(), 4);
    }

    #[tokio::test]
    async fn test_offline_run_degrades_but_completes() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PipelineOrchestrator::builder(config(dir.path()))
            .build()
            .unwrap();

        let state = tokio_test::assert_ok!(pipeline.run("ACME outlook", None).await);

        assert_eq!(state.docs().len(), 1);
        assert!(state.summary().starts_with("Key points from retrieved sources"));
        assert!(state.claims().is_empty());
        assert!(state.kpis().is_empty());
        assert!(state.projection().unwrap().price_is_assumed);
        assert!(state.report_path().unwrap().exists());
    }

    #[test]
    fn test_embedder_selection() {
        let dir = tempfile::tempdir().unwrap();

        let local = PipelineOrchestrator::builder(config(dir.path()))
            .build()
            .unwrap();
        assert_eq!(local.evidence_store().embedder_name(), "hashing");

        let remote = PipelineOrchestrator::builder(config(dir.path()))
            .embeddings(Arc::new(OfflineProvider::new("no key")))
            .build()
            .unwrap();
        assert_eq!(remote.evidence_store().embedder_name(), "offline");

        let shared = Arc::new(EvidenceStore::hashing());
        let explicit = PipelineOrchestrator::builder(config(dir.path()))
            .evidence_store(shared.clone())
            .embeddings(Arc::new(OfflineProvider::new("no key")))
            .build()
            .unwrap();
        assert!(Arc::ptr_eq(explicit.evidence_store(), &shared));
    }

    #[tokio::test]
    async fn test_failing_embeddings_fall_back_to_leading_documents() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new().with_page(
            "https://nvda.example/results",
            "NVIDIA results",
            NVDA_PAGE,
        );
        let pipeline = PipelineOrchestrator::builder(config(dir.path()))
            .search(Arc::new(FakeSearch::returning(vec![SearchHit::new(
                "NVIDIA results",
                "record quarter",
                "https://nvda.example/results",
            )])))
            .fetcher(Arc::new(fetcher))
            .embeddings(Arc::new(OfflineProvider::new("embeddings down")))
            .build()
            .unwrap();

        let state = RunState::new("NVIDIA data center outlook", None);
        let (_, state) = pipeline.advance(Stage::Init, state).await.unwrap();
        let (_, state) = pipeline.advance(Stage::Researched, state).await.unwrap();

        assert_eq!(state.docs().len(), 1);
        assert_eq!(state.trace()[3].extra["used_index"], false);
    }

    #[tokio::test]
    async fn test_unwritable_output_dir_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let pipeline = PipelineOrchestrator::builder(config(&blocker.join("out")))
            .build()
            .unwrap();
        let err = tokio_test::assert_err!(pipeline.run("ACME", None).await);

        assert!(err.is_terminal());
        assert!(matches!(err, ResearchError::ReportWrite { .. }));
    }

    #[tokio::test]
    async fn test_finish_requires_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PipelineOrchestrator::builder(config(dir.path()))
            .build()
            .unwrap();

        let state = RunState::new("ACME", None);
        let err = pipeline.advance(Stage::Reported, state).await.unwrap_err();
        assert!(err.is_terminal());

        let mut state = RunState::new("ACME", None);
        state.set_report_path(dir.path().join("gone.html"));
        let err = pipeline.advance(Stage::Reported, state).await.unwrap_err();
        assert!(matches!(err, ResearchError::ReportWrite { .. }));
    }
}
