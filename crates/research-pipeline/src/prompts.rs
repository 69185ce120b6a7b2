//! Prompt templates for the language model stages

use crate::error::Result;
use minijinja::{Environment, context};
use research_core::{Document, truncate_chars};
use serde::Serialize;

const SUMMARIZE: &str = "\
You are a careful equity research analyst.
Using only the source excerpts below, write a concise, factual summary that answers the research topic.
Prefer concrete figures, attribute them to their source URL, and never invent numbers.

Topic: {{ query }}

Sources:
{% for doc in docs %}
TITLE: {{ doc.title }}
URL: {{ doc.url }}
TEXT: {{ doc.text }}
{% endfor %}";

const EXTRACT_CLAIMS: &str = "\
Extract up to {{ n }} specific, checkable factual claims about \"{{ topic }}\" from the summary below.
Write one claim per line. Do not number the claims or add commentary.

Summary:
{{ summary }}";

/// Characters of a title shown in the summary prompt
pub const EXCERPT_TITLE_CHARS: usize = 80;

/// Characters of a document's text shown in the summary prompt
pub const EXCERPT_TEXT_CHARS: usize = 1500;

#[derive(Debug, Serialize)]
struct Excerpt<'a> {
    title: &'a str,
    url: &'a str,
    text: &'a str,
}

/// Compiled prompt templates
#[derive(Debug)]
pub struct PromptLibrary {
    env: Environment<'static>,
}

impl PromptLibrary {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("summarize", SUMMARIZE)?;
        env.add_template("extract_claims", EXTRACT_CLAIMS)?;
        Ok(Self { env })
    }

    /// Summarization prompt over the first `limit` documents
    pub fn summarize(&self, query: &str, docs: &[Document], limit: usize) -> Result<String> {
        let excerpts: Vec<Excerpt<'_>> = docs
            .iter()
            .take(limit)
            .map(|doc| Excerpt {
                title: truncate_chars(&doc.title, EXCERPT_TITLE_CHARS),
                url: &doc.url,
                text: truncate_chars(&doc.text, EXCERPT_TEXT_CHARS),
            })
            .collect();

        let template = self.env.get_template("summarize")?;
        Ok(template.render(context! { query, docs => excerpts })?)
    }

    pub fn extract_claims(&self, summary: &str, topic: &str, n: usize) -> Result<String> {
        let template = self.env.get_template("extract_claims")?;
        Ok(template.render(context! { summary, topic, n })?)
    }
}
