//! HTML to text helpers

use crate::error::Result;
use regex::Regex;

/// Compiled patterns for turning fetched HTML into plain text
#[derive(Debug, Clone)]
pub struct HtmlCleaner {
    title: Regex,
    hidden: Regex,
    block: Regex,
    tag: Regex,
    whitespace: Regex,
}

impl HtmlCleaner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>")?,
            hidden: Regex::new(
                r"(?is)<script\b.*?</script>|<style\b.*?</style>|<noscript\b.*?</noscript>|<svg\b.*?</svg>|<!--.*?-->",
            )?,
            block: Regex::new(r"(?i)<(?:br|/p|/div|/li|/h[1-6]|/tr)\b[^>]*>")?,
            tag: Regex::new(r"(?s)<[^>]*>")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    /// Contents of the first `<title>`, whitespace collapsed; empty when absent
    pub fn title(&self, html: &str) -> String {
        self.title
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| self.collapse(&decode_entities(m.as_str())))
            .unwrap_or_default()
    }

    /// Visible text of a page: scripts, styles and comments dropped, tags
    /// removed, entities decoded, whitespace collapsed
    pub fn visible_text(&self, html: &str) -> String {
        let without_hidden = self.hidden.replace_all(html, " ");
        let with_breaks = self.block.replace_all(&without_hidden, "\n");
        let without_tags = self.tag.replace_all(&with_breaks, " ");
        let decoded = decode_entities(&without_tags);

        decoded
            .lines()
            .map(|line| self.collapse(line))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Plain text of a small HTML fragment on a single line
    pub fn fragment_text(&self, fragment: &str) -> String {
        let without_tags = self.tag.replace_all(fragment, "");
        self.collapse(&decode_entities(&without_tags))
    }

    fn collapse(&self, text: &str) -> String {
        self.whitespace.replace_all(text, " ").trim().to_string()
    }
}

/// Decode the handful of entities that matter for readable text
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
