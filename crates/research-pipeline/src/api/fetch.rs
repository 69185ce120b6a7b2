//! HTTP page fetcher

use super::{FetchedPage, PageFetcher};
use crate::error::Result;
use crate::html::HtmlCleaner;
use async_trait::async_trait;
use reqwest::{Client, Response};
use research_core::{MAX_DOCUMENT_BYTES, truncate_to_bytes};
use std::time::Duration;
use tracing::{debug, instrument};

const USER_AGENT: &str = "Mozilla/5.0";

/// Bytes of a response body read before the rest is dropped
pub const MAX_RAW_BODY_BYTES: usize = MAX_DOCUMENT_BYTES;

/// Read at most `cap` bytes of the body; returns the text and whether it was cut
async fn read_capped(mut response: Response, cap: usize) -> Result<(String, bool)> {
    let mut body: Vec<u8> = Vec::new();
    let mut cut = false;
    while let Some(chunk) = response.chunk().await? {
        let room = cap - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            cut = true;
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok((String::from_utf8_lossy(&body).into_owned(), cut))
}

/// Fetches a page and reduces it to its title and visible text
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
    cleaner: HtmlCleaner,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            cleaner: HtmlCleaner::new()?,
        })
    }

    /// Turn a response body into a page; non-HTML bodies are kept as text
    fn to_page(&self, url: &str, status: u16, body: &str, is_html: bool) -> FetchedPage {
        let (title, mut text) = if is_html {
            (self.cleaner.title(body), self.cleaner.visible_text(body))
        } else {
            (String::new(), body.to_string())
        };
        truncate_to_bytes(&mut text, MAX_DOCUMENT_BYTES);

        FetchedPage {
            url: url.to_string(),
            status,
            title,
            text,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;

        let status = response.status().as_u16();
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_none_or(|ct| ct.contains("html"));
        let (body, cut) = read_capped(response, MAX_RAW_BODY_BYTES).await?;

        debug!(status, bytes = body.len(), cut, "Fetched page");
        Ok(self.to_page(url, status, &body, is_html))
    }
}
