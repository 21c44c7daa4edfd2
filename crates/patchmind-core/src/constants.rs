/// PatchMind — centralized constants.
/// All magic numbers and limits live here. Never hardcode these elsewhere.

// ─── Context Budget ───────────────────────────────────────────────────────────

pub mod budget {
    /// Tokens held back from the context ceiling for IO/response headroom.
    pub const RESERVE_FOR_IO: usize = 1024;
    /// Extra margin for prompt-template framing text.
    pub const FORMAT_MARGIN: usize = 500;
    /// Subtracted when computing a truncated body so the re-measured cut
    /// cannot overshoot (token-to-character ratios are approximate).
    pub const SAFETY_MARGIN: usize = 5;
    /// A truncated body below this token count is not worth keeping.
    pub const MIN_TRUNCATED_TOKENS: usize = 5;
}

// ─── Generation Pipeline ──────────────────────────────────────────────────────

pub mod pipeline {
    /// Upper bound on critic revise iterations; the loop always terminates.
    pub const MAX_CRITIC_LOOPS: usize = 3;
    /// How long a cancelled run may keep running before its task is aborted.
    pub const JOIN_TIMEOUT_MS: u64 = 5_000;
}

// ─── Change Matching ──────────────────────────────────────────────────────────

pub mod matching {
    /// A matching block shorter than this is a coincidence, not a placement.
    pub const MIN_MATCH_LINES: usize = 2;
    /// The largest block must cover at least this fraction of the proposed lines.
    pub const MIN_MATCH_COVERAGE: f64 = 0.30;
}

// ─── RAG ──────────────────────────────────────────────────────────────────────

pub mod rag {
    /// Cap on concurrent external source fetches within one run.
    pub const MAX_PARALLEL_FETCHES: usize = 8;
    pub const FETCH_TIMEOUT_SECS: u64 = 15;
    pub const SEARCH_ENGINE_URL: &str = "https://html.duckduckgo.com/html/?q=";
}

// ─── Files ────────────────────────────────────────────────────────────────────

pub mod files {
    /// Checked files larger than this are skipped during context gathering.
    pub const MAX_CONTEXT_FILE_BYTES: u64 = 5 * 1024 * 1024;
    /// Bytes sniffed when deciding whether a file is binary.
    pub const BINARY_CHECK_BUFFER_SIZE: usize = 1024;
    /// Fraction of non-text bytes above which a file is treated as binary.
    pub const BINARY_THRESHOLD: f64 = 0.10;
}

// ─── Defaults ─────────────────────────────────────────────────────────────────

pub mod defaults {
    pub const PROVIDER: &str = "ollama";
    pub const MODEL: &str = "llama3:8b";
    pub const TEMPERATURE: f32 = 0.3;
    pub const TOP_K: u32 = 40;
    pub const CONTEXT_LIMIT: usize = 8192;
    pub const RAG_MAX_RESULTS_PER_SOURCE: usize = 3;
    pub const RAG_MAX_RANKED_RESULTS: usize = 5;
    pub const RAG_SIMILARITY_THRESHOLD: f32 = 0.30;
    pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";
}

// ─── Config Paths ─────────────────────────────────────────────────────────────

pub mod paths {
    pub const CONFIG_DIR: &str = "patchmind";
    pub const CONFIG_FILE: &str = "config.toml";
}
