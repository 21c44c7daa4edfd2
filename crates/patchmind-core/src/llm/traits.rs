use crate::error::PatchError;
use futures::channel::mpsc;

/// Events emitted while streaming an LLM response.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta(String),
    Done,
    Error(String),
}

/// The LLM client seam. One fully-rendered prompt in, text out.
///
/// `stream` yields a finite, consume-once sequence of events; any
/// unrecoverable failure surfaces as an `Err` or a `StreamEvent::Error`.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a prompt and block until the full response text is available.
    async fn send(&self, prompt: &str) -> Result<String, PatchError>;

    /// Send a prompt and receive response text incrementally.
    async fn stream(&self, prompt: &str)
        -> Result<mpsc::UnboundedReceiver<StreamEvent>, PatchError>;
}
