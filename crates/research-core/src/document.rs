//! Documents and raw search hits

use serde::{Deserialize, Serialize};

/// Upper bound on the text kept for a fetched page, in bytes
pub const MAX_DOCUMENT_BYTES: usize = 60_000;

/// A fetched page (or a degraded stand-in for one)
///
/// Created by the retriever and read by every later stage. A failed fetch
/// still yields a `Document`: its `title` and `text` are empty and `error`
/// carries the reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub title: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Document {
    /// Create a document, bounding its text to [`MAX_DOCUMENT_BYTES`]
    pub fn new(url: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        let mut text = text.into();
        truncate_to_bytes(&mut text, MAX_DOCUMENT_BYTES);
        Self {
            url: url.into(),
            title: title.into(),
            text,
            error: None,
        }
    }

    /// Document standing in for a fetch that failed
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            text: String::new(),
            error: Some(error.into()),
        }
    }

    /// Whether the text is empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Raw search engine output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

impl SearchHit {
    pub fn new(
        title: impl Into<String>,
        snippet: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
            link: link.into(),
        }
    }

    /// Key used for deduplication: the link, or the title when there is no link
    pub fn dedup_key(&self) -> Option<&str> {
        if !self.link.is_empty() {
            Some(&self.link)
        } else if !self.title.is_empty() {
            Some(&self.title)
        } else {
            None
        }
    }

    pub fn has_link(&self) -> bool {
        !self.link.is_empty()
    }
}

/// Truncate `text` in place to at most `max_bytes`, never splitting a character
pub fn truncate_to_bytes(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

/// First `max_chars` characters of `text`
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
