use std::time::Duration;
use tracing::debug;

use crate::constants::rag::{FETCH_TIMEOUT_SECS, SEARCH_ENGINE_URL};
use crate::error::{PatchError, Result};
use crate::rag::{RagResult, RagSource};

/// Web search source backed by the DuckDuckGo HTML-lite endpoint (no API
/// key required). Site-scoped variants cover the common developer sources.
pub struct WebSearchSource {
    client: reqwest::Client,
    name: String,
    site_filter: Option<String>,
}

impl WebSearchSource {
    pub fn new() -> Result<Self> {
        Self::named("web", None)
    }

    pub fn stackexchange() -> Result<Self> {
        Self::named(
            "stackexchange",
            Some("site:stackoverflow.com OR site:stackexchange.com".to_string()),
        )
    }

    pub fn github() -> Result<Self> {
        Self::named("github", Some("site:github.com".to_string()))
    }

    pub fn crates_io() -> Result<Self> {
        Self::named("crates", Some("site:crates.io OR site:docs.rs".to_string()))
    }

    fn named(name: &str, site_filter: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent("PatchMind/0.1")
            .build()
            .map_err(PatchError::Http)?;
        Ok(Self {
            client,
            name: name.to_string(),
            site_filter,
        })
    }
}

#[async_trait::async_trait]
impl RagSource for WebSearchSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, query: &str, max_results: usize) -> Result<Vec<RagResult>> {
        let full_query = match &self.site_filter {
            Some(filter) => format!("{filter} {query}"),
            None => query.to_string(),
        };
        let url = format!("{}{}", SEARCH_ENGINE_URL, urlencoding::encode(&full_query));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PatchError::source_fetch(&self.name, format!("request failed: {e}")))?;
        let html = response
            .text()
            .await
            .map_err(|e| PatchError::source_fetch(&self.name, format!("bad response: {e}")))?;

        let results = parse_results(&html, &self.name, max_results);
        debug!("{}: {} results for '{full_query}'", self.name, results.len());
        Ok(results)
    }
}

/// Pulls result links and snippets out of the DuckDuckGo HTML-lite markup.
fn parse_results(html: &str, source: &str, max_results: usize) -> Vec<RagResult> {
    let mut results = Vec::new();

    for segment in html.split("class=\"result__a\"").skip(1) {
        if results.len() >= max_results {
            break;
        }

        let url = extract_between(segment, "href=\"", "\"").unwrap_or_default();
        let title = extract_between(segment, ">", "</a>").unwrap_or_default();
        let snippet = segment
            .find("class=\"result__snippet\"")
            .and_then(|idx| extract_between(&segment[idx..], ">", "</"))
            .unwrap_or_default();

        // Internal DDG links are navigation, not results.
        if url.is_empty() || url.starts_with('/') {
            continue;
        }

        let snippet = strip_html_tags(snippet.trim());
        if snippet.is_empty() {
            continue;
        }

        results.push(RagResult {
            url: unwrap_redirect(&url),
            title: strip_html_tags(&title),
            text_snippet: snippet,
            source: source.to_string(),
            score: None,
        });
    }

    results
}

/// DuckDuckGo wraps result URLs in a redirect with the target in `uddg=`.
fn unwrap_redirect(url: &str) -> String {
    if let Some(encoded) = url.split("uddg=").nth(1) {
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        return urlencoding::decode(encoded)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| url.to_string());
    }
    url.to_string()
}

fn extract_between(text: &str, start: &str, end: &str) -> Option<String> {
    let start_idx = text.find(start)? + start.len();
    let remaining = &text[start_idx..];
    let end_idx = remaining.find(end)?;
    Some(remaining[..end_idx].to_string())
}

fn strip_html_tags(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.trim().to_string()
}
