pub mod changes;
pub mod chat;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod generate;
pub mod llm;
pub mod prompts;
pub mod rag;
pub mod token;
pub mod workspace;

// Re-export key types
pub use changes::{ChangeProposal, ChangeQueue, MatchConfidence};
pub use chat::{ChatHistory, ChatMessage, Role};
pub use config::Settings;
pub use context::{ContextAssembler, ContextBundle};
pub use error::PatchError;
pub use generate::{CancelFlag, GenerationController, GenerationEvent, GenerationRequest};
pub use llm::{LlmClient, OllamaClient, StreamEvent};
pub use rag::{RagResult, RagSource, Ranker};
pub use token::{TokenCounter, WordCounter};
pub use workspace::{DiskStore, FileStore};
