//! Report and sources artifacts

use crate::error::Result;
use minijinja::{Environment, context};
use research_core::{Document, KpiName, ReportInputs, truncate_chars};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Documents listed in the sources sidecar
pub const SIDECAR_MAX_SOURCES: usize = 12;

/// Characters of text kept per sidecar entry
pub const SIDECAR_TEXT_CHARS: usize = 1200;

const REPORT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8"/><meta name="viewport" content="width=device-width, initial-scale=1"/>
  <title>Research Report — {{ topic }}</title>
  <link href="https://cdn.jsdelivr.net/npm/tailwindcss@2.2.19/dist/tailwind.min.css" rel="stylesheet">
  <style>
    body{background:#0b0f19;color:#e5e7eb}
    .card{background:#111827;border:1px solid #1f2937;border-radius:14px;padding:20px}
    a{color:#60a5fa}
    td,th{padding:4px 12px 4px 0;vertical-align:top}
  </style>
</head>
<body class="p-6">
  <div class="max-w-6xl mx-auto space-y-6">
    <header class="flex items-center justify-between">
      <h1 class="text-2xl font-bold">Research Report</h1>
      <span class="text-sm opacity-70">{{ generated_at }}</span>
    </header>
    <section class="card">
      <div class="text-xl font-semibold">Topic</div>
      <p class="opacity-80"><b>Query:</b> {{ query }} &nbsp; | &nbsp; <b>Ticker:</b> {{ ticker }}</p>
      {% if sources_href %}<p class="text-sm mt-2"><a href="{{ sources_href }}" target="_blank">Sources (JSON)</a></p>{% endif %}
    </section>
    <section class="card">
      <h2 class="text-xl font-semibold mb-2">Curated Summary</h2>
      <div class="prose prose-invert">{% for line in summary_lines %}{{ line }}{% if not loop.last %}<br/>{% endif %}{% endfor %}</div>
    </section>
    <section class="card">
      <h2 class="text-xl font-semibold mb-2">KPI Table (web + market data fallback)</h2>
      <table class="text-sm"><tbody>
      {% for row in kpis %}<tr><td class="opacity-80">{{ row.label }}</td><td>{{ row.value }}</td></tr>
      {% endfor %}</tbody></table>
    </section>
    <section class="card">
      <h2 class="text-xl font-semibold mb-2">Price Projection</h2>
      {% if projection %}
      <p class="text-sm opacity-80">Current price {{ projection.current_price }}{% if projection.price_is_assumed %} (assumed){% endif %}, growth ~{{ projection.growth }}</p>
      <div class="grid grid-cols-1 md:grid-cols-2 gap-4 mt-3">
      {% for series in projection.series %}<figure>
        {% if series.chart_href %}<img src="{{ series.chart_href }}" class="w-full rounded border border-gray-800" alt="{{ series.years }}Y projection"/>{% endif %}
        <figcaption class="text-sm opacity-80">{{ series.years }}Y target: {{ series.final_price }}</figcaption>
      </figure>
      {% endfor %}</div>
      {% else %}<p class="opacity-60">Projection not available.</p>{% endif %}
    </section>
    <section class="card">
      <h2 class="text-xl font-semibold mb-2">Checked Claims</h2>
      <div class="overflow-x-auto">
        <table class="min-w-full text-sm">
          <thead><tr><th class="text-left">Claim</th><th class="text-left">Verdict</th><th class="text-left">Evidence</th></tr></thead>
          <tbody>
          {% for claim in claims %}<tr><td>{{ claim.claim }}</td><td>{{ claim.verdict }}</td><td>{% if claim.evidence_url %}<a href="{{ claim.evidence_url }}" target="_blank">{{ claim.evidence_url }}</a>{% endif %}</td></tr>
          {% else %}<tr><td colspan="3" class="opacity-60">No claims extracted.</td></tr>
          {% endfor %}</tbody>
        </table>
      </div>
    </section>
    <section class="card">
      <h2 class="text-xl font-semibold mb-2">Run Trace</h2>
      <table class="text-xs opacity-80"><tbody>
      {% for event in trace %}<tr><td>{{ event.label }}</td><td>{{ event.timestamp }}</td><td>{{ event.extra }}</td></tr>
      {% endfor %}</tbody></table>
      <p class="text-xs opacity-50 mt-2">Run {{ run_id }}</p>
    </section>
  </div>
</body>
</html>
"#;

/// Turns a run's outputs into a report document
pub trait ReportRenderer: Send + Sync {
    fn render(&self, inputs: &ReportInputs<'_>) -> Result<String>;

    /// File extension of the rendered report
    fn extension(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct KpiRow {
    label: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
struct ClaimRow<'a> {
    claim: &'a str,
    verdict: &'static str,
    evidence_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SeriesView {
    years: u32,
    final_price: String,
    chart_href: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProjectionView {
    current_price: String,
    price_is_assumed: bool,
    growth: String,
    series: Vec<SeriesView>,
}

#[derive(Debug, Serialize)]
struct TraceRow {
    label: String,
    timestamp: String,
    extra: String,
}

/// HTML report rendered with auto-escaping
#[derive(Debug)]
pub struct HtmlReportRenderer {
    env: Environment<'static>,
}

impl HtmlReportRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("report.html", REPORT_TEMPLATE)?;
        Ok(Self { env })
    }
}

/// Link to an artifact that sits next to the report
fn sibling_href(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

impl ReportRenderer for HtmlReportRenderer {
    fn render(&self, inputs: &ReportInputs<'_>) -> Result<String> {
        let kpis: Vec<KpiRow> = KpiName::ALL
            .iter()
            .map(|&name| KpiRow {
                label: name.label(),
                value: inputs.kpis.display(name),
            })
            .collect();

        let claims: Vec<ClaimRow<'_>> = inputs
            .checked_claims
            .iter()
            .map(|c| ClaimRow {
                claim: &c.claim,
                verdict: c.verdict_label(),
                evidence_url: c.evidence_url.as_deref(),
            })
            .collect();

        let projection = inputs.projection.map(|p| ProjectionView {
            current_price: format!("{:.2}", p.current_price),
            price_is_assumed: p.price_is_assumed,
            growth: format!("{:.1}%", p.growth * 100.0),
            series: p
                .horizons
                .iter()
                .map(|s| SeriesView {
                    years: s.horizon_years,
                    final_price: s
                        .final_price()
                        .map_or_else(|| "-".to_string(), |v| format!("{v:.2}")),
                    chart_href: s.chart_path.as_deref().and_then(sibling_href),
                })
                .collect(),
        });

        let trace: Vec<TraceRow> = inputs
            .trace
            .iter()
            .map(|e| TraceRow {
                label: e.label(),
                timestamp: e.timestamp.format("%H:%M:%S%.3f").to_string(),
                extra: e.extra_summary(),
            })
            .collect();

        let template = self.env.get_template("report.html")?;
        let html = template.render(context! {
            topic => inputs.topic(),
            generated_at => inputs.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            query => inputs.query,
            ticker => inputs.ticker.unwrap_or("-"),
            sources_href => inputs.sources_path.and_then(|p| sibling_href(p)),
            summary_lines => inputs.summary.lines().collect::<Vec<_>>(),
            kpis,
            projection,
            claims,
            trace,
            run_id => inputs.run_id.to_string(),
        })?;
        debug!(bytes = html.len(), "Rendered report");
        Ok(html)
    }

    fn extension(&self) -> &'static str {
        "html"
    }
}

/// One entry of the sources sidecar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub url: String,
    pub title: String,
    pub text: String,
}

/// Contents of `sources_{run}.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesFile {
    pub sources: Vec<SourceEntry>,
}

impl SourcesFile {
    /// Excerpts of the first documents; a missing title falls back to the url
    pub fn from_documents(docs: &[Document]) -> Self {
        let sources = docs
            .iter()
            .take(SIDECAR_MAX_SOURCES)
            .map(|doc| SourceEntry {
                url: doc.url.clone(),
                title: if doc.title.is_empty() {
                    doc.url.clone()
                } else {
                    doc.title.clone()
                },
                text: truncate_chars(&doc.text, SIDECAR_TEXT_CHARS).to_string(),
            })
            .collect();
        Self { sources }
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        debug!(path = %path.display(), sources = self.sources.len(), "Wrote sources sidecar");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use research_core::{
        KpiSet, ProjectionSeries, ProjectionSummary, RunState, TraceEvent, VerifiedClaim,
    };
    use std::path::PathBuf;

    fn state() -> RunState {
        let mut state = RunState::new("NVIDIA <data center> outlook", Some("NVDA".to_string()));
        state.set_summary("Line one & more\nLine two".to_string());
        state.set_kpis(KpiSet {
            p_e_ratio: Some(45.234),
            gross_margin: Some(0.746),
            ..Default::default()
        });
        state.set_checked_claims(vec![
            VerifiedClaim {
                claim: "Revenue <grew>".to_string(),
                verdict: true,
                evidence_url: Some("https://nvda.com/ir".to_string()),
                overlap_score: 3,
            },
            VerifiedClaim {
                claim: "Gaming recovered".to_string(),
                verdict: false,
                evidence_url: None,
                overlap_score: 0,
            },
        ]);
        state.record(TraceEvent::start("research"));
        state.record(TraceEvent::done("research").with("docs", 3));
        state
    }

    #[test]
    fn test_report_sections_and_escaping() {
        let state = state();
        let html = HtmlReportRenderer::new()
            .unwrap()
            .render(&ReportInputs::from_state(&state))
            .unwrap();

        assert!(html.contains("<title>Research Report — NVDA</title>"));
        assert!(html.contains("NVIDIA &lt;data center&gt; outlook"));
        assert!(html.contains("<b>Ticker:</b> NVDA"));
        assert!(html.contains("Line one &amp; more<br/>Line two"));
        // auto-escape also encodes '/' in "P/E"
        assert!(html.contains("E (ttm)</td><td>45.23</td>"));
        assert!(html.contains("<td class=\"opacity-80\">Gross Margin</td><td>74.6%</td>"));
        assert!(html.contains("S (ttm)</td><td>-</td>"));
        assert!(html.contains("Revenue &lt;grew&gt;"));
        assert!(html.contains("✅ True"));
        assert!(html.contains("⚠️ Unverified"));
        assert!(html.contains("Projection not available."));
        assert!(html.contains("research:done"));
        assert!(html.contains("docs=3"));
        assert!(!html.contains("No claims extracted."));
    }

    #[test]
    fn test_report_without_claims_and_with_projection() {
        let mut state = RunState::new("ACME", None);
        state.set_projection(Some(ProjectionSummary {
            current_price: 100.0,
            price_is_assumed: true,
            growth: 0.08,
            horizons: vec![ProjectionSeries {
                horizon_years: 5,
                points: vec![(0.0, 100.0), (5.0, 146.93)],
                chart_path: Some(PathBuf::from("/tmp/out/ACME_proj_5y_x.svg")),
            }],
        }));
        state.set_sources_path(Some(PathBuf::from("/tmp/out/sources_x.json")));

        let html = HtmlReportRenderer::new()
            .unwrap()
            .render(&ReportInputs::from_state(&state))
            .unwrap();

        assert!(html.contains("<b>Ticker:</b> -"));
        assert!(html.contains("No claims extracted."));
        assert!(html.contains("src=\"ACME_proj_5y_x.svg\""));
        assert!(html.contains("Current price 100.00 (assumed), growth ~8.0%"));
        assert!(html.contains("5Y target: 146.93"));
        assert!(html.contains("href=\"sources_x.json\""));
    }

    #[test]
    fn test_sources_file_limits() {
        let mut docs: Vec<Document> = (0..15)
            .map(|i| Document::new(format!("https://s/{i}"), format!("S{i}"), "t".repeat(2000)))
            .collect();
        docs[0].title.clear();

        let file = SourcesFile::from_documents(&docs);
        assert_eq!(file.sources.len(), SIDECAR_MAX_SOURCES);
        assert_eq!(file.sources[0].title, "https://s/0");
        assert_eq!(file.sources[1].title, "S1");
        assert_eq!(file.sources[1].text.len(), SIDECAR_TEXT_CHARS);
    }

    #[tokio::test]
    async fn test_sources_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources_run.json");
        let file = SourcesFile::from_documents(&[Document::new("https://a", "A", "text")]);

        file.write(&path).await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["sources"][0]["url"], "https://a");
        assert_eq!(value["sources"][0]["title"], "A");
    }
}
