use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::chat::{ChatMessage, Role};
use crate::config::Settings;
use crate::constants::budget::{FORMAT_MARGIN, RESERVE_FOR_IO};
use crate::constants::files::MAX_CONTEXT_FILE_BYTES;
use crate::error::{PatchError, Result};
use crate::generate::{CancelFlag, GenerationEvent};
use crate::llm::LlmClient;
use crate::prompts;
use crate::rag::{self, RagSource, Ranker};
use crate::token::{BudgetPacker, Candidate, TokenCounter};
use crate::workspace::{is_likely_binary, FileStore};

pub const NO_CODE_CONTEXT: &str = "[No code context]";
pub const NO_RAG_CONTEXT: &str = "[No external context]";
pub const NO_LOCAL_CONTEXT: &str = "[No local context]";
pub const NO_HISTORY: &str = "[No previous conversation]";

/// The bounded context for one generation run. Built once, then immutable.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub query: String,
    pub code_context: String,
    pub chat_history: String,
    pub rag_context: String,
    pub local_context: String,
    pub total_tokens_used: usize,
    pub token_ceiling: usize,
}

/// Builds the four context channels (checked files, local RAG, external RAG,
/// chat history) against a shared token budget.
pub struct ContextAssembler {
    counter: Arc<dyn TokenCounter>,
    store: Arc<dyn FileStore>,
    sources: Vec<Arc<dyn RagSource>>,
    ranker: Option<Arc<dyn Ranker>>,
    summarizer: Option<Arc<dyn LlmClient>>,
}

impl ContextAssembler {
    pub fn new(counter: Arc<dyn TokenCounter>, store: Arc<dyn FileStore>) -> Self {
        Self {
            counter,
            store,
            sources: Vec::new(),
            ranker: None,
            summarizer: None,
        }
    }

    pub fn with_sources(mut self, sources: Vec<Arc<dyn RagSource>>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_ranker(mut self, ranker: Arc<dyn Ranker>) -> Self {
        self.ranker = Some(ranker);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn LlmClient>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Assembles the context bundle. Steps run in fixed priority order
    /// against one remaining-budget counter; cancellation is checked at
    /// every step boundary and inside each per-item loop.
    pub async fn assemble(
        &self,
        settings: &Settings,
        history: &[ChatMessage],
        checked_paths: &[PathBuf],
        project_root: &Path,
        cancel: &CancelFlag,
        events: &UnboundedSender<GenerationEvent>,
    ) -> Result<ContextBundle> {
        let ceiling = settings.context_limit;
        let mut available = ceiling.saturating_sub(RESERVE_FOR_IO + FORMAT_MARGIN);
        let mut total_used = 0usize;
        let packer = BudgetPacker::new(self.counter.clone());

        let query = latest_user_query(history).ok_or(PatchError::MissingQuery)?;
        let chat_history = render_history(history);

        if cancel.is_cancelled() {
            return Err(PatchError::Cancelled);
        }

        // Sources injected at construction win; otherwise the built-in web
        // sources enabled by this settings snapshot are used.
        let run_sources = if self.sources.is_empty() {
            rag::sources_from_settings(settings)
        } else {
            self.sources.clone()
        };

        // Summarize the query for search. Failure is never fatal here; the
        // raw query is always an acceptable search string.
        let mut search_query = query.clone();
        let external_will_run = settings.external_rag_will_run() && !run_sources.is_empty();
        if settings.rag_summarizer_enabled && external_will_run {
            if let Some(summarizer) = &self.summarizer {
                let _ = events.send(GenerationEvent::Status(
                    "Summarizing query for RAG...".to_string(),
                ));
                search_query = self
                    .summarize_query(summarizer.as_ref(), &query, &chat_history)
                    .await;
                if cancel.is_cancelled() {
                    return Err(PatchError::Cancelled);
                }
            }
        }

        // External RAG.
        let mut rag_context = String::new();
        if external_will_run && available > 0 {
            let _ = events.send(GenerationEvent::Status(
                "Fetching external RAG sources...".to_string(),
            ));
            let fetched = rag::fetch_external_sources(
                &run_sources,
                &search_query,
                settings.rag_max_results_per_source,
            )
            .await;
            if cancel.is_cancelled() {
                return Err(PatchError::Cancelled);
            }
            let ranked = rag::rank_or_truncate(
                self.ranker.as_deref(),
                fetched,
                &search_query,
                settings.rag_max_ranked_results,
                settings.rag_similarity_threshold,
            );

            let mut candidates = Vec::new();
            for result in &ranked {
                if cancel.is_cancelled() {
                    return Err(PatchError::Cancelled);
                }
                let snippet = result.text_snippet.trim();
                if snippet.is_empty() {
                    continue;
                }
                candidates.push(Candidate::new(
                    format!(
                        "### RAG: {} - {} ({}) ###",
                        capitalize(&result.source),
                        result.title,
                        result.url
                    ),
                    snippet,
                    "### End RAG ###",
                ));
            }
            let (parts, used) = packer.pack(available, &candidates);
            rag_context = parts.join("\n\n");
            available -= used;
            total_used += used;
            info!("external RAG used {used} tokens, {available} available");
        } else {
            debug!("skipping external RAG");
        }

        // Local RAG source files.
        let mut local_context = String::new();
        if settings.rag_local_enabled && available > 0 {
            let _ = events.send(GenerationEvent::Status(
                "Fetching local RAG sources...".to_string(),
            ));
            let mut candidates = Vec::new();
            for source in settings.rag_local_sources.iter().filter(|s| s.enabled) {
                if cancel.is_cancelled() {
                    return Err(PatchError::Cancelled);
                }
                if is_likely_binary(&source.path) {
                    debug!("skipping likely binary local source {}", source.path.display());
                    continue;
                }
                match self.store.read_text(&source.path) {
                    Ok(text) if !text.is_empty() => candidates.push(Candidate::new(
                        format!("### Local File: {} ###", source.path.display()),
                        text,
                        "### End Local File ###",
                    )),
                    Ok(_) => {}
                    Err(e) => warn!("failed to read local source {}: {e}", source.path.display()),
                }
            }
            let (parts, used) = packer.pack(available, &candidates);
            local_context = parts.join("\n\n");
            available -= used;
            total_used += used;
            info!("local RAG used {used} tokens, {available} available");
        } else {
            debug!("skipping local RAG");
        }

        // Checked files, in the order they were checked.
        let mut code_context = String::new();
        if !checked_paths.is_empty() && available > 0 {
            let _ = events.send(GenerationEvent::Status(
                "Gathering checked file context...".to_string(),
            ));
            let mut candidates = Vec::new();
            for path in checked_paths {
                if cancel.is_cancelled() {
                    return Err(PatchError::Cancelled);
                }
                match self.checked_file_candidate(path, project_root) {
                    Some(candidate) => candidates.push(candidate),
                    None => continue,
                }
            }
            let (parts, used) = packer.pack(available, &candidates);
            code_context = parts.join("\n");
            total_used += used;
            info!("checked file context used {used} tokens");
        } else {
            debug!("skipping checked file context");
        }

        let _ = events.send(GenerationEvent::ContextInfo {
            used: total_used,
            max: ceiling,
        });
        info!("context assembly complete, {total_used}/{ceiling} tokens");

        Ok(ContextBundle {
            query,
            code_context: non_empty_or(code_context, NO_CODE_CONTEXT),
            chat_history,
            rag_context: non_empty_or(rag_context, NO_RAG_CONTEXT),
            local_context: non_empty_or(local_context, NO_LOCAL_CONTEXT),
            total_tokens_used: total_used,
            token_ceiling: ceiling,
        })
    }

    async fn summarize_query(
        &self,
        summarizer: &dyn LlmClient,
        query: &str,
        _chat_history: &str,
    ) -> String {
        let mut placeholders: HashMap<&str, String> = HashMap::new();
        placeholders.insert("original_query", query.to_string());
        placeholders.insert("chat_history", "[History not used]".to_string());
        placeholders.insert("query", query.to_string());

        let prompt = prompts::render_or_query(prompts::RAG_SUMMARIZER_TEMPLATE, &placeholders);
        match summarizer.send(&prompt).await {
            Ok(response) => {
                let summarized = response.trim();
                if summarized.is_empty() {
                    warn!("query summarizer returned empty text");
                    query.to_string()
                } else {
                    info!("summarized search query: '{summarized}'");
                    summarized.to_string()
                }
            }
            Err(e) => {
                warn!("query summarization failed, using raw query: {e}");
                query.to_string()
            }
        }
    }

    fn checked_file_candidate(&self, path: &Path, project_root: &Path) -> Option<Candidate> {
        if !self.store.exists(path) {
            warn!("checked path {} is not a readable file", path.display());
            return None;
        }
        match self.store.file_size(path) {
            Ok(size) if size > MAX_CONTEXT_FILE_BYTES => {
                warn!("skipping large file {}", path.display());
                return None;
            }
            Err(e) => {
                warn!("failed to stat {}: {e}", path.display());
                return None;
            }
            _ => {}
        }
        if is_likely_binary(path) {
            debug!("skipping likely binary file {}", path.display());
            return None;
        }

        let text = match self.store.read_text(path) {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => return None,
            Err(e) => {
                warn!("failed to read {}: {e}", path.display());
                return None;
            }
        };
        let rel = path
            .strip_prefix(project_root)
            .unwrap_or(path)
            .display()
            .to_string();
        Some(Candidate::new(
            format!("### START FILE: {rel} ###"),
            text,
            format!("### END FILE: {rel} ###"),
        ))
    }
}

/// Content of the most recent user message, if any.
pub fn latest_user_query(history: &[ChatMessage]) -> Option<String> {
    history
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.trim().to_string())
        .filter(|q| !q.is_empty())
}

/// Renders every message before the latest user message into one block.
pub fn render_history(history: &[ChatMessage]) -> String {
    let last_user_idx = history
        .iter()
        .rposition(|m| m.role == Role::User)
        .unwrap_or(history.len());

    let parts: Vec<String> = history[..last_user_idx]
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| {
            let role = match m.role {
                Role::User => "User",
                Role::Ai => "Ai",
            };
            format!("{role}:\n{}", m.content.trim())
        })
        .collect();

    if parts.is_empty() {
        NO_HISTORY.to_string()
    } else {
        parts.join("\n---\n")
    }
}

fn non_empty_or(value: String, placeholder: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        placeholder.to_string()
    } else {
        trimmed.to_string()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
