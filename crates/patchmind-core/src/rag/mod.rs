//! External retrieval: source fan-out and result ranking.

mod web;

pub use web::WebSearchSource;

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::constants::rag::MAX_PARALLEL_FETCHES;
use crate::error::Result;

/// One retrieved snippet from an external source.
#[derive(Debug, Clone)]
pub struct RagResult {
    pub url: String,
    pub title: String,
    pub text_snippet: String,
    pub source: String,
    pub score: Option<f32>,
}

/// An external retrieval source (web search engine, code host, index).
#[async_trait::async_trait]
pub trait RagSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self, query: &str, max_results: usize) -> Result<Vec<RagResult>>;
}

/// Scores and filters fetched results against the query. Implementations
/// are typically embedding-similarity based.
pub trait Ranker: Send + Sync {
    fn rank(
        &self,
        results: Vec<RagResult>,
        query: &str,
        max_to_return: usize,
        min_score: f32,
    ) -> Vec<RagResult>;
}

/// Builds the source set enabled by the settings snapshot.
pub fn sources_from_settings(settings: &Settings) -> Vec<Arc<dyn RagSource>> {
    let mut sources: Vec<Arc<dyn RagSource>> = Vec::new();
    if !settings.rag_external_enabled {
        return sources;
    }
    if settings.rag_stackexchange_enabled {
        if let Ok(src) = WebSearchSource::stackexchange() {
            sources.push(Arc::new(src));
        }
    }
    if settings.rag_github_enabled {
        if let Ok(src) = WebSearchSource::github() {
            sources.push(Arc::new(src));
        }
    }
    if settings.rag_crates_enabled {
        if let Ok(src) = WebSearchSource::crates_io() {
            sources.push(Arc::new(src));
        }
    }
    sources
}

/// Fetches from all sources concurrently (bounded pool) and aggregates.
///
/// A failing source is logged and contributes nothing; it never aborts its
/// siblings. Results are deduplicated by URL, first occurrence wins.
pub async fn fetch_external_sources(
    sources: &[Arc<dyn RagSource>],
    query: &str,
    max_per_source: usize,
) -> Vec<RagResult> {
    use futures::StreamExt;

    if sources.is_empty() {
        return Vec::new();
    }
    let preview: String = query.chars().take(50).collect();
    info!("fetching {} external sources for '{preview}'", sources.len());

    // Materialized up front: a lazy map of async blocks here does not pass
    // the compiler's higher-ranked lifetime check once spawned.
    let fetches: Vec<_> = sources
        .iter()
        .cloned()
        .map(|source| {
            let query = query.to_string();
            async move {
                let name = source.name().to_string();
                match tokio::spawn(async move { source.fetch(&query, max_per_source).await }).await
                {
                    Ok(Ok(results)) => {
                        debug!("source '{name}' returned {} results", results.len());
                        results
                    }
                    Ok(Err(e)) => {
                        warn!("source '{name}' failed: {e}");
                        Vec::new()
                    }
                    Err(e) => {
                        warn!("source '{name}' task panicked: {e}");
                        Vec::new()
                    }
                }
            }
        })
        .collect();

    let batches: Vec<Vec<RagResult>> = futures::stream::iter(fetches)
        .buffer_unordered(MAX_PARALLEL_FETCHES.min(sources.len()))
        .collect()
        .await;

    let mut seen = HashSet::new();
    let mut all = Vec::new();
    for result in batches.into_iter().flatten() {
        if seen.insert(result.url.clone()) {
            all.push(result);
        }
    }
    info!("{} external results after dedup", all.len());
    all
}

/// Ranks results if a ranker is available; otherwise returns the first
/// `max_to_return` results that carry a non-empty snippet, unranked.
pub fn rank_or_truncate(
    ranker: Option<&dyn Ranker>,
    results: Vec<RagResult>,
    query: &str,
    max_to_return: usize,
    min_score: f32,
) -> Vec<RagResult> {
    match ranker {
        Some(r) => r.rank(results, query, max_to_return, min_score),
        None => {
            warn!("no ranking model available, returning unranked results");
            results
                .into_iter()
                .filter(|r| !r.text_snippet.is_empty())
                .take(max_to_return)
                .collect()
        }
    }
}
