//! Claim extraction and evidence overlap verification
//!
//! Verification is lexical: a claim is supported by a source when enough of
//! the claim's longer tokens occur in the source text. It never calls the
//! model, so it is deterministic for a given set of sources.

use crate::error::Result;
use crate::prompts::PromptLibrary;
use regex::Regex;
use research_core::{Document, VerifiedClaim};
use research_llm::{CompletionRequest, LLMProvider};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const EXTRACT_TEMPERATURE: f32 = 0.0;
const EXTRACT_MAX_TOKENS: usize = 600;

/// Tokens of this many bytes or fewer are ignored
const MIN_TOKEN_LEN: usize = 3;

/// Extracts checkable claims from a summary and checks them against sources
pub struct ClaimVerifier {
    llm: Arc<dyn LLMProvider>,
    prompts: Arc<PromptLibrary>,
    model: String,
    token_pattern: Regex,
}

impl ClaimVerifier {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        prompts: Arc<PromptLibrary>,
        model: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            llm,
            prompts,
            model: model.into(),
            token_pattern: Regex::new(r"[a-z0-9\-]+")?,
        })
    }

    /// Up to `n` claims from `summary`; empty when generation fails
    #[instrument(skip(self, summary), fields(summary_len = summary.len()))]
    pub async fn extract(&self, summary: &str, topic: &str, n: usize) -> Vec<String> {
        if n == 0 {
            return Vec::new();
        }
        let prompt = match self.prompts.extract_claims(summary, topic, n) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(error = %e, "Failed to render claim prompt");
                return Vec::new();
            }
        };

        let request = CompletionRequest::prompt(&self.model, prompt)
            .with_temperature(EXTRACT_TEMPERATURE)
            .with_max_tokens(EXTRACT_MAX_TOKENS);

        match self.llm.complete(request).await {
            Ok(response) => {
                let claims = decode_claims(response.text(), n);
                debug!(claims = claims.len(), "Extracted claims");
                claims
            }
            Err(e) => {
                warn!(provider = self.llm.name(), error = %e, "Claim extraction failed");
                Vec::new()
            }
        }
    }

    /// Lowercased claim tokens longer than three bytes, repeats kept
    pub fn tokens<'a>(&self, lowered_claim: &'a str) -> Vec<&'a str> {
        self.token_pattern
            .find_iter(lowered_claim)
            .map(|m| m.as_str())
            .filter(|t| t.len() > MIN_TOKEN_LEN)
            .collect()
    }

    /// Check each claim against `sources`
    ///
    /// The overlap with a source is the number of claim tokens found in its
    /// lowercased text. The first source with the highest overlap provides
    /// the evidence url. A claim is verified when that overlap reaches
    /// `min_overlap` and there is at least one source.
    pub fn verify(
        &self,
        claims: &[String],
        sources: &[Document],
        min_overlap: usize,
    ) -> Vec<VerifiedClaim> {
        let lowered: Vec<String> = sources.iter().map(|s| s.text.to_lowercase()).collect();

        claims
            .iter()
            .map(|claim| {
                let claim_lower = claim.to_lowercase();
                let tokens = self.tokens(&claim_lower);

                let mut best: Option<(usize, &Document)> = None;
                for (source, text) in sources.iter().zip(&lowered) {
                    let overlap = tokens.iter().filter(|t| text.contains(*t)).count();
                    if overlap > best.map_or(0, |(score, _)| score) {
                        best = Some((overlap, source));
                    }
                }

                let overlap_score = best.map_or(0, |(score, _)| score);
                VerifiedClaim {
                    claim: claim.clone(),
                    verdict: !sources.is_empty() && overlap_score >= min_overlap,
                    evidence_url: best
                        .map(|(_, source)| source.url.clone())
                        .filter(|url| !url.is_empty()),
                    overlap_score,
                }
            })
            .collect()
    }
}

impl fmt::Debug for ClaimVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimVerifier")
            .field("llm", &self.llm.name())
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Decode a model reply into at most `n` claims
///
/// Accepts a JSON array of strings (optionally inside a code fence) or
/// plain lines; bullets and `1.`/`1)` numbering are stripped.
pub fn decode_claims(text: &str, n: usize) -> Vec<String> {
    let body = strip_code_fence(text.trim());

    if let Ok(items) = serde_json::from_str::<Vec<String>>(body) {
        return items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .take(n)
            .collect();
    }

    body.lines()
        .map(clean_line)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .take(n)
        .collect()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn clean_line(line: &str) -> &str {
    let line = line.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '•' | '*'));
    strip_numbering(line).trim()
}

fn strip_numbering(line: &str) -> &str {
    let digits = line
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(line.len());
    if digits == 0 {
        return line;
    }
    let rest = &line[digits..];
    match rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
        Some(after) if after.starts_with(char::is_whitespace) => after,
        _ => line,
    }
}
