mod ollama;
mod traits;

pub use ollama::OllamaClient;
pub use traits::{LlmClient, StreamEvent};
