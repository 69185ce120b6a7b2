//! Evidence selection and summarization

use crate::config::ResearchConfig;
use crate::evidence::EvidenceStore;
use crate::prompts::PromptLibrary;
use research_core::{Document, truncate_chars};
use research_llm::{CompletionRequest, LLMProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// First line of the heuristic summary
pub const HEURISTIC_HEADER: &str = "Key points from retrieved sources (heuristic summary):";

const SUMMARY_TEMPERATURE: f32 = 0.2;
const SUMMARY_MAX_TOKENS: usize = 1200;
const HEURISTIC_DOCS: usize = 5;
const HEURISTIC_TITLE_CHARS: usize = 120;
const HEURISTIC_SNIPPET_CHARS: usize = 280;

/// Where a summary came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    /// Written by the language model
    Generated,
    /// Built from document titles and snippets
    Heuristic,
}

/// Result of [`Curator::curate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationOutcome {
    pub selected: Vec<Document>,
    pub summary: String,
    /// Whether selection came from the evidence index
    pub used_index: bool,
    pub summary_source: SummarySource,
}

/// Selects the documents most relevant to a query and summarizes them
pub struct Curator {
    store: Arc<EvidenceStore>,
    llm: Arc<dyn LLMProvider>,
    prompts: Arc<PromptLibrary>,
    model: String,
    k: usize,
    summary_doc_limit: usize,
}

impl Curator {
    pub fn new(
        store: Arc<EvidenceStore>,
        llm: Arc<dyn LLMProvider>,
        prompts: Arc<PromptLibrary>,
        config: &ResearchConfig,
    ) -> Self {
        Self {
            store,
            llm,
            prompts,
            model: config.model.clone(),
            k: config.curate_k,
            summary_doc_limit: config.summary_doc_limit,
        }
    }

    #[instrument(skip(self, docs), fields(docs = docs.len()))]
    pub async fn curate(&self, query: &str, docs: &[Document]) -> CurationOutcome {
        let (selected, used_index) = self.select(query, docs).await;
        let (summary, summary_source) = self.summarize(query, &selected).await;
        CurationOutcome {
            selected,
            summary,
            used_index,
            summary_source,
        }
    }

    /// Top `k` documents by similarity to `query`, or the first `k` inputs
    /// when the index cannot be built or returns nothing
    pub async fn select(&self, query: &str, docs: &[Document]) -> (Vec<Document>, bool) {
        match self.store.build(docs).await {
            Ok(handle) => {
                let hits = self.store.search(&handle, query, self.k).await;
                if !hits.is_empty() {
                    debug!(key = handle.key(), hits = hits.len(), "Selected documents from index");
                    return (
                        hits.into_iter().map(|hit| hit.into_document()).collect(),
                        true,
                    );
                }
                debug!(key = handle.key(), "Index search returned nothing");
            }
            Err(e) => warn!(error = %e, "Evidence index unavailable, keeping input order"),
        }
        (docs.iter().take(self.k).cloned().collect(), false)
    }

    /// Model-written summary, or the heuristic one when generation fails
    pub async fn summarize(&self, query: &str, docs: &[Document]) -> (String, SummarySource) {
        match self.generate(query, docs).await {
            Some(summary) => (summary, SummarySource::Generated),
            None => (heuristic_summary(docs), SummarySource::Heuristic),
        }
    }

    async fn generate(&self, query: &str, docs: &[Document]) -> Option<String> {
        let prompt = match self.prompts.summarize(query, docs, self.summary_doc_limit) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(error = %e, "Failed to render summary prompt");
                return None;
            }
        };

        let request = CompletionRequest::prompt(&self.model, prompt)
            .with_temperature(SUMMARY_TEMPERATURE)
            .with_max_tokens(SUMMARY_MAX_TOKENS);

        match self.llm.complete(request).await {
            Ok(response) => {
                if response.is_truncated() {
                    debug!(
                        tokens = response.usage.completion_tokens,
                        "Summary hit the token limit"
                    );
                }
                let text = response.text().trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Err(e) => {
                warn!(
                    provider = self.llm.name(),
                    transient = e.is_transient(),
                    error = %e,
                    "Summary generation failed"
                );
                None
            }
        }
    }
}

impl fmt::Debug for Curator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Curator")
            .field("llm", &self.llm.name())
            .field("model", &self.model)
            .field("k", &self.k)
            .finish_non_exhaustive()
    }
}

/// Bullet list of the top documents' titles, snippets and urls
///
/// Never empty: with no documents only the header is returned.
pub fn heuristic_summary(docs: &[Document]) -> String {
    let mut summary = String::from(HEURISTIC_HEADER);
    for doc in docs.iter().take(HEURISTIC_DOCS) {
        let title = truncate_chars(&doc.title, HEURISTIC_TITLE_CHARS);
        let snippet = truncate_chars(&doc.text, HEURISTIC_SNIPPET_CHARS).replace('\n', " ");
        summary.push_str(&format!("\n- {title} — {snippet} [{}]", doc.url));
    }
    summary
}
