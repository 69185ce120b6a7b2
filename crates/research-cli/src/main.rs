//! Command-line interface for the research-to-report pipeline

use anyhow::Context;
use clap::{Parser, ValueEnum};
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use research_core::{KpiName, RunState};
use research_llm::{EmbeddingProvider, LLMProvider};
use research_llm::providers::{OfflineProvider, OpenAIConfig, OpenAIProvider};
use research_pipeline::api::{
    DuckDuckGoSearch, HttpPageFetcher, MarketDataProvider, OfflineFetcher, OfflineMarketData,
    OfflineSearch, PageFetcher, SearchProvider, SearxSearch, YahooAlphaVantageData,
};
use research_pipeline::{PipelineOrchestrator, ResearchConfig, SearchBackend, VerificationMode};
use research_utils::{Config, LogFormat};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Strict,
    Normal,
    Relaxed,
}

impl From<ModeArg> for VerificationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Strict => VerificationMode::Strict,
            ModeArg::Normal => VerificationMode::Normal,
            ModeArg::Relaxed => VerificationMode::Relaxed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SearchArg {
    Duckduckgo,
    Searx,
}

impl From<SearchArg> for SearchBackend {
    fn from(backend: SearchArg) -> Self {
        match backend {
            SearchArg::Duckduckgo => SearchBackend::DuckDuckGo,
            SearchArg::Searx => SearchBackend::Searx,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "research")]
#[command(about = "Research a topic and write an evidence-checked HTML report", long_about = None)]
struct Args {
    /// Topic to research
    query: String,

    /// Stock ticker used for KPIs and the price projection
    #[arg(short, long)]
    ticker: Option<String>,

    /// Claim verification strictness
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Minimum token overlap for a verified claim (overrides --mode)
    #[arg(long)]
    min_overlap: Option<usize>,

    /// Directory receiving the report, sources and charts
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Model used for summaries and claim extraction
    #[arg(short, long)]
    model: Option<String>,

    /// Web search backend
    #[arg(long, value_enum)]
    search: Option<SearchArg>,

    /// Base URL of a SearxNG instance
    #[arg(long)]
    searx_url: Option<String>,

    /// Log one JSON object per line
    #[arg(long)]
    json_logs: bool,

    /// Print the run result as JSON instead of tables
    #[arg(long)]
    json: bool,

    /// Run without network access
    #[arg(long)]
    offline: bool,
}

impl Args {
    fn apply(&self, mut config: ResearchConfig) -> ResearchConfig {
        if let Some(mode) = self.mode {
            config.verification_mode = mode.into();
        }
        if self.min_overlap.is_some() {
            config.min_overlap = self.min_overlap;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir.clone_from(dir);
        }
        if let Some(model) = &self.model {
            config.model.clone_from(model);
        }
        if let Some(search) = self.search {
            config.search_backend = search.into();
        }
        if let Some(url) = &self.searx_url {
            config.searx_url = Some(url.clone());
        }
        config
    }
}

fn search_provider(
    config: &ResearchConfig,
    offline: bool,
) -> anyhow::Result<Arc<dyn SearchProvider>> {
    if offline {
        return Ok(Arc::new(OfflineSearch));
    }
    let search: Arc<dyn SearchProvider> = match config.search_backend {
        SearchBackend::DuckDuckGo => Arc::new(DuckDuckGoSearch::new(
            config.request_timeout,
            config.search_rate_limit,
        )?),
        SearchBackend::Searx => {
            let base = config
                .searx_url
                .as_deref()
                .context("--searx-url or SEARX_URL is required for the searx backend")?;
            Arc::new(SearxSearch::new(
                base,
                config.request_timeout,
                config.search_rate_limit,
            )?)
        }
    };
    Ok(search)
}

fn fetcher(offline: bool) -> anyhow::Result<Arc<dyn PageFetcher>> {
    if offline {
        return Ok(Arc::new(OfflineFetcher));
    }
    Ok(Arc::new(HttpPageFetcher::new()?))
}

/// Language and embedding models
///
/// With an OpenAI key both come from the same provider. Without one, summaries
/// and claims degrade and evidence is embedded locally.
struct Models {
    llm: Arc<dyn LLMProvider>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
}

fn models(offline: bool) -> Models {
    if offline {
        return Models {
            llm: Arc::new(OfflineProvider::new("offline mode")),
            embeddings: None,
        };
    }
    match OpenAIConfig::from_env().and_then(OpenAIProvider::with_config) {
        Ok(provider) => {
            let provider = Arc::new(provider);
            Models {
                llm: provider.clone(),
                embeddings: Some(provider),
            }
        }
        Err(e) => {
            warn!("Model provider unavailable, continuing without it: {}", e);
            Models {
                llm: Arc::new(OfflineProvider::new(e.to_string())),
                embeddings: None,
            }
        }
    }
}

fn market_provider(
    config: &ResearchConfig,
    offline: bool,
) -> anyhow::Result<Arc<dyn MarketDataProvider>> {
    if offline {
        return Ok(Arc::new(OfflineMarketData));
    }
    Ok(Arc::new(YahooAlphaVantageData::from_config(config)?))
}

fn kpi_table(state: &RunState) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["KPI", "Value"]);
    for name in KpiName::ALL {
        table.add_row(vec![
            Cell::new(name.label()),
            Cell::new(state.kpis().display(name)),
        ]);
    }
    table
}

fn claims_table(state: &RunState) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Claim", "Verdict", "Overlap", "Evidence"]);
    for claim in state.checked_claims() {
        table.add_row(vec![
            Cell::new(&claim.claim),
            Cell::new(claim.verdict_label()),
            Cell::new(claim.overlap_score),
            Cell::new(claim.evidence_url.as_deref().unwrap_or("-")),
        ]);
    }
    table
}

fn run_json(state: &RunState) -> serde_json::Value {
    serde_json::json!({
        "run_id": state.run_id().to_string(),
        "query": state.query(),
        "ticker": state.ticker(),
        "report_path": state.report_path(),
        "sources_path": state.sources_path(),
        "kpis": state.kpis(),
        "projection": state.projection(),
        "checked_claims": state.checked_claims(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let app = Config::from_env();
    let log_format = if args.json_logs {
        LogFormat::Json
    } else {
        app.log_format
    };
    research_utils::init_tracing_with(log_format);

    let config = args.apply(ResearchConfig::default().with_env()?);
    info!(
        "Starting {} ({}), mode={}, min_overlap={}",
        app.app_name,
        app.environment,
        config.verification_mode,
        config.min_overlap()
    );

    let models = models(args.offline);
    let mut builder = PipelineOrchestrator::builder(config.clone())
        .search(search_provider(&config, args.offline)?)
        .fetcher(fetcher(args.offline)?)
        .llm(models.llm)
        .market(market_provider(&config, args.offline)?);
    if let Some(embeddings) = models.embeddings {
        builder = builder.embeddings(embeddings);
    }
    let pipeline = builder.build()?;
    info!(
        embedder = pipeline.evidence_store().embedder_name(),
        "Pipeline ready"
    );

    let state = pipeline.run(&args.query, args.ticker.clone()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run_json(&state))?);
        return Ok(());
    }

    if let Some(path) = state.report_path() {
        println!("Report: {}", path.display());
    }
    if let Some(path) = state.sources_path() {
        println!("Sources: {}", path.display());
    }
    println!("\n{}", kpi_table(&state));
    if let Some(projection) = state.projection() {
        println!(
            "\nProjection from {:.2}{} at {:.1}% annual growth",
            projection.current_price,
            if projection.price_is_assumed { " (assumed)" } else { "" },
            projection.growth * 100.0
        );
        for series in &projection.horizons {
            if let Some(price) = series.final_price() {
                println!("  {}Y: {:.2}", series.horizon_years, price);
            }
        }
    }
    if state.checked_claims().is_empty() {
        println!("\nNo claims extracted.");
    } else {
        println!("\n{}", claims_table(&state));
    }

    Ok(())
}
