use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("No user query found in chat history")]
    MissingQuery,

    #[error("Prompt template error: {0}")]
    PromptFormat(String),

    #[error("LLM error: {0}")]
    LlmCall(String),

    // Field deliberately not named `source`: thiserror would treat that as
    // the error's source() and String is not an Error.
    #[error("RAG source '{name}' failed: {message}")]
    SourceFetch { name: String, message: String },

    #[error("Invalid critic response: {0}")]
    InvalidCriticResponse(String),

    #[error("Invalid line range: {0}")]
    InvalidRange(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl PatchError {
    pub fn source_fetch(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceFetch {
            name: name.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PatchError>;
