use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{defaults, paths};

/// Flat settings snapshot consumed by a generation run.
///
/// A run receives a clone taken at start time; edits made while the run is
/// in flight are never visible to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // LLM
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub top_k: u32,
    pub context_limit: usize,

    // Prompts
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompts: Vec<UserPrompt>,
    #[serde(default)]
    pub selected_prompt_ids: Vec<String>,

    // Workflow
    pub disable_critic_workflow: bool,

    // External RAG
    pub rag_external_enabled: bool,
    pub rag_stackexchange_enabled: bool,
    pub rag_github_enabled: bool,
    pub rag_crates_enabled: bool,
    pub rag_max_results_per_source: usize,
    pub rag_max_ranked_results: usize,
    pub rag_similarity_threshold: f32,

    // Local RAG
    pub rag_local_enabled: bool,
    #[serde(default)]
    pub rag_local_sources: Vec<LocalSource>,

    // Query summarizer
    pub rag_summarizer_enabled: bool,
    pub rag_summarizer_model: String,
}

/// A reusable user instruction block appended to the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPrompt {
    pub id: String,
    pub name: String,
    pub content: String,
}

/// A local file registered as a RAG source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSource {
    pub path: PathBuf,
    pub enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: defaults::PROVIDER.to_string(),
            model: defaults::MODEL.to_string(),
            temperature: defaults::TEMPERATURE,
            top_k: defaults::TOP_K,
            context_limit: defaults::CONTEXT_LIMIT,
            system_prompt: "You are a helpful AI assistant expert in software development."
                .to_string(),
            user_prompts: Vec::new(),
            selected_prompt_ids: Vec::new(),
            disable_critic_workflow: false,
            rag_external_enabled: true,
            rag_stackexchange_enabled: true,
            rag_github_enabled: true,
            rag_crates_enabled: false,
            rag_max_results_per_source: defaults::RAG_MAX_RESULTS_PER_SOURCE,
            rag_max_ranked_results: defaults::RAG_MAX_RANKED_RESULTS,
            rag_similarity_threshold: defaults::RAG_SIMILARITY_THRESHOLD,
            rag_local_enabled: false,
            rag_local_sources: Vec::new(),
            rag_summarizer_enabled: true,
            rag_summarizer_model: defaults::MODEL.to_string(),
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(paths::CONFIG_DIR)
            .join(paths::CONFIG_FILE)
    }

    pub fn load() -> Self {
        let config_path = Self::config_path();
        if config_path.exists() {
            if let Ok(content) = std::fs::read_to_string(&config_path) {
                if let Ok(config) = toml::from_str(&content) {
                    return config;
                }
            }
        }
        Self::default()
    }

    pub fn save(&self) -> Result<(), crate::error::PatchError> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::PatchError::Config(e.to_string()))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Whether any external source channel is switched on.
    pub fn external_rag_will_run(&self) -> bool {
        self.rag_external_enabled
            && (self.rag_stackexchange_enabled || self.rag_github_enabled || self.rag_crates_enabled)
    }

    /// System prompt with selected user instruction blocks appended.
    pub fn effective_system_prompt(&self) -> String {
        let selected: Vec<&str> = self
            .selected_prompt_ids
            .iter()
            .filter_map(|id| {
                self.user_prompts
                    .iter()
                    .find(|p| &p.id == id)
                    .map(|p| p.content.as_str())
            })
            .collect();
        if selected.is_empty() {
            self.system_prompt.clone()
        } else {
            format!(
                "{}\n\n--- User Instructions ---\n{}",
                self.system_prompt,
                selected.join("\n\n")
            )
        }
    }

    /// Human-readable list of the active user prompt names.
    pub fn active_prompt_names(&self) -> String {
        let names: Vec<String> = self
            .user_prompts
            .iter()
            .filter(|p| self.selected_prompt_ids.contains(&p.id))
            .map(|p| format!("- {}", p.name))
            .collect();
        if names.is_empty() {
            "[No active user prompts]".to_string()
        } else {
            names.join("\n")
        }
    }
}
