//! Content fetcher for source-grounded research.
//!
//! Resolves a brief's `source` (URL or local file path) into plain text. A
//! fetch failure is not fatal: the researcher falls back to model research.

use podsmith_common::{text, PodsmithError, Result};
use scraper::{Html, Selector};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub title: String,
    pub content: String,
    pub word_count: usize,
    pub source: String,
}

pub struct ContentFetcher {
    http_client: reqwest::Client,
    /// Fetched documents are truncated to this many bytes of text
    max_content_length: usize,
}

impl Default for ContentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentFetcher {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent("podsmith/0.1 (content fetcher)")
                .build()
                .expect("Failed to create HTTP client"),
            max_content_length: 200_000,
        }
    }

    pub async fn fetch(&self, source: &str) -> Result<FetchedContent> {
        match Url::parse(source) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => self.fetch_url(url).await,
            _ => self.fetch_file(source).await,
        }
    }

    async fn fetch_url(&self, url: Url) -> Result<FetchedContent> {
        debug!(url = %url, "Fetching source URL");
        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| PodsmithError::Backend(format!("Source fetch failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PodsmithError::Backend(format!(
                "Source fetch returned {status}"
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| PodsmithError::Backend(format!("Source body read failed: {e}")))?;

        let (title, mut content) = extract_text(&html);
        truncate_at_char_boundary(&mut content, self.max_content_length);
        let word_count = text::count_words(&content);

        Ok(FetchedContent {
            title: title.unwrap_or_else(|| url.to_string()),
            content,
            word_count,
            source: url.to_string(),
        })
    }

    async fn fetch_file(&self, path_str: &str) -> Result<FetchedContent> {
        debug!(path = path_str, "Reading source file");
        let path = Path::new(path_str);
        let mut content = tokio::fs::read_to_string(path).await?;
        truncate_at_char_boundary(&mut content, self.max_content_length);

        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().replace(['-', '_'], " "))
            .unwrap_or_else(|| path_str.to_string());
        let word_count = text::count_words(&content);

        Ok(FetchedContent {
            title,
            content,
            word_count,
            source: path_str.to_string(),
        })
    }
}

fn truncate_at_char_boundary(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut idx = max_bytes;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    s.truncate(idx);
}

/// Pull the title and readable text out of an HTML document.
fn extract_text(html: &str) -> (Option<String>, String) {
    let document = Html::parse_document(html);

    let title_selector = Selector::parse("title").expect("valid selector");
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let content_selector =
        Selector::parse("p, h1, h2, h3, h4, h5, h6, li, blockquote").expect("valid selector");
    let mut paragraphs = Vec::new();
    for element in document.select(&content_selector) {
        let text: String = element.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            paragraphs.push(text);
        }
    }

    (title, paragraphs.join("\n\n"))
}
