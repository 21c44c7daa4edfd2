use crate::constants::defaults;
use crate::error::PatchError;
use crate::llm::traits::{LlmClient, StreamEvent};
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};

/// Client for a local Ollama server, speaking its generate REST API.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    top_k: u32,
}

impl OllamaClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: defaults::OLLAMA_BASE_URL.to_string(),
            model: model.into(),
            temperature: defaults::TEMPERATURE,
            top_k: defaults::TOP_K,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_options(mut self, temperature: f32, top_k: u32) -> Self {
        self.temperature = temperature;
        self.top_k = top_k;
        self
    }

    fn request_body(&self, prompt: &str, stream: bool) -> GenerateRequest {
        GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream,
            options: GenerateOptions {
                temperature: self.temperature,
                top_k: self.top_k,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    async fn send(&self, prompt: &str) -> Result<String, PatchError> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.request_body(prompt, false))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PatchError::LlmCall(format!(
                "Ollama API error ({status}): {text}"
            )));
        }

        let chunk: GenerateChunk = response.json().await?;
        Ok(chunk.response)
    }

    async fn stream(
        &self,
        prompt: &str,
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, PatchError> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.request_body(prompt, true))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PatchError::LlmCall(format!(
                "Ollama API error ({status}): {text}"
            )));
        }

        let (tx, rx) = mpsc::unbounded();

        // Ollama streams newline-delimited JSON objects; forward each
        // response fragment as a text delta.
        let mut stream = response.bytes_stream();
        tokio::spawn(async move {
            use futures::StreamExt;
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.unbounded_send(StreamEvent::Error(e.to_string()));
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();
                    if line.is_empty() {
                        continue;
                    }

                    match serde_json::from_str::<GenerateChunk>(&line) {
                        Ok(parsed) => {
                            if !parsed.response.is_empty() {
                                let _ =
                                    tx.unbounded_send(StreamEvent::TextDelta(parsed.response));
                            }
                            if parsed.done {
                                let _ = tx.unbounded_send(StreamEvent::Done);
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = tx.unbounded_send(StreamEvent::Error(format!(
                                "Malformed stream line: {e}"
                            )));
                            return;
                        }
                    }
                }
            }

            let _ = tx.unbounded_send(StreamEvent::Done);
        });

        Ok(rx)
    }
}
