use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::config::Settings;
use crate::constants::pipeline::MAX_CRITIC_LOOPS;
use crate::context::ContextBundle;
use crate::error::{PatchError, Result};
use crate::generate::{CancelFlag, GenerationEvent};
use crate::llm::{LlmClient, StreamEvent};
use crate::prompts;

/// The critic's structured judgment of a proposed plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CritiqueReport {
    pub plan_status: String,
    #[serde(default)]
    pub critique_reasoning: Option<String>,
    #[serde(default)]
    pub revised_plan: Option<Vec<String>>,
}

/// A `CritiqueReport` reduced to the decision the loop acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriticVerdict {
    Valid,
    Invalid { revised_plan: Option<Vec<String>> },
}

impl CritiqueReport {
    pub fn verdict(&self) -> Result<CriticVerdict> {
        match self.plan_status.trim().to_ascii_uppercase().as_str() {
            "GOOD" => Ok(CriticVerdict::Valid),
            "BAD" => Ok(CriticVerdict::Invalid {
                revised_plan: self.revised_plan.clone(),
            }),
            other => Err(PatchError::InvalidCriticResponse(format!(
                "unknown plan_status '{other}'"
            ))),
        }
    }
}

/// Extracts the critic's JSON object from its raw response. Models often
/// wrap the object in a fenced code block; that form is tried first, then
/// the whole trimmed response.
pub fn parse_critic_response(raw: &str) -> Result<CritiqueReport> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"```(?:json)?\s*(\{[\s\S]*?\})\s*```").expect("static regex")
    });

    let json_text = fence
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| raw.trim());

    serde_json::from_str(json_text)
        .map_err(|e| PatchError::InvalidCriticResponse(format!("not valid critique JSON: {e}")))
}

/// Splits a planner response into steps, dropping blank lines and any
/// leading "1." / "2)" numbering the model added.
pub fn parse_plan_lines(raw: &str) -> Vec<String> {
    static NUMBERING: OnceLock<Regex> = OnceLock::new();
    let numbering =
        NUMBERING.get_or_init(|| Regex::new(r"^\s*\d+[.)]\s*").expect("static regex"));

    raw.lines()
        .map(|line| numbering.replace(line.trim(), "").to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

fn numbered(steps: &[String]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs the LLM side of a generation: either the plan/critic/executor
/// workflow or the direct single-prompt path.
pub struct Pipeline {
    llm: Arc<dyn LlmClient>,
}

impl Pipeline {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn run(
        &self,
        settings: &Settings,
        bundle: &ContextBundle,
        cancel: &CancelFlag,
        events: &UnboundedSender<GenerationEvent>,
    ) -> Result<String> {
        if settings.disable_critic_workflow {
            self.run_direct(settings, bundle, cancel, events).await
        } else {
            self.run_planned(settings, bundle, cancel, events).await
        }
    }

    async fn run_direct(
        &self,
        settings: &Settings,
        bundle: &ContextBundle,
        cancel: &CancelFlag,
        events: &UnboundedSender<GenerationEvent>,
    ) -> Result<String> {
        let mut placeholders = base_placeholders(bundle);
        placeholders.insert("user_prompts", settings.active_prompt_names());
        let prompt = prompts::render_or_query(prompts::DIRECT_EXECUTOR_TEMPLATE, &placeholders);

        let _ = events.send(GenerationEvent::Status("Generating response...".to_string()));
        self.stream_and_relay(&prompt, cancel, events).await
    }

    async fn run_planned(
        &self,
        settings: &Settings,
        bundle: &ContextBundle,
        cancel: &CancelFlag,
        events: &UnboundedSender<GenerationEvent>,
    ) -> Result<String> {
        let placeholders = base_placeholders(bundle);

        // Plan.
        let _ = events.send(GenerationEvent::Status("Generating plan...".to_string()));
        let prompt = prompts::render_or_query(prompts::PLANNER_TEMPLATE, &placeholders);
        let raw_plan = self.llm.send(&prompt).await?;
        if cancel.is_cancelled() {
            return Err(PatchError::Cancelled);
        }

        let mut plan = parse_plan_lines(&raw_plan);
        if plan.is_empty() {
            return Err(PatchError::LlmCall("planner produced an empty plan".to_string()));
        }
        let _ = events.send(GenerationEvent::PlanGenerated(plan.clone()));

        // Critique. A parse failure or unknown status re-runs the critic on
        // the same plan; the loop bound caps the total number of rounds.
        let mut accepted = false;
        for round in 1..=MAX_CRITIC_LOOPS {
            if cancel.is_cancelled() {
                return Err(PatchError::Cancelled);
            }
            let _ = events.send(GenerationEvent::Status(format!(
                "Critiquing plan (round {round}/{MAX_CRITIC_LOOPS})..."
            )));

            let mut critic_placeholders = placeholders.clone();
            critic_placeholders.insert("proposed_plan", numbered(&plan));
            let prompt = prompts::render_or_query(prompts::CRITIC_TEMPLATE, &critic_placeholders);
            let raw = self.llm.send(&prompt).await?;

            // Unparseable JSON retries the same plan; a parseable but
            // unusable verdict accepts the current plan and stops.
            let report = match parse_critic_response(&raw) {
                Ok(report) => report,
                Err(e) => {
                    warn!("critic round {round}: {e}, retrying with the same plan");
                    continue;
                }
            };
            let verdict = report.verdict();
            let _ = events.send(GenerationEvent::PlanCritiqued(report));

            match verdict {
                Ok(CriticVerdict::Valid) => {
                    info!("critic approved plan on round {round}");
                    accepted = true;
                    break;
                }
                Ok(CriticVerdict::Invalid {
                    revised_plan: Some(revised),
                }) if !revised.is_empty() => {
                    info!("critic revised plan on round {round}");
                    plan = revised;
                }
                Ok(CriticVerdict::Invalid { .. }) => {
                    warn!("critic rejected plan without a usable revision, keeping current plan");
                    break;
                }
                Err(e) => {
                    warn!("critic round {round}: {e}, keeping current plan");
                    break;
                }
            }
        }
        if !accepted {
            info!("critic rounds exhausted, proceeding with current plan");
        }
        let _ = events.send(GenerationEvent::PlanAccepted(plan.clone()));

        // Execute.
        if cancel.is_cancelled() {
            return Err(PatchError::Cancelled);
        }
        let _ = events.send(GenerationEvent::Status("Executing plan...".to_string()));
        let mut exec_placeholders = placeholders;
        exec_placeholders.insert("final_plan", numbered(&plan));
        exec_placeholders.insert("user_prompts", settings.active_prompt_names());
        let prompt = prompts::render_or_query(prompts::EXECUTOR_TEMPLATE, &exec_placeholders);
        self.stream_and_relay(&prompt, cancel, events).await
    }

    /// Streams one prompt, relaying text chunks as events. A mid-stream
    /// provider error surfaces as an `Error` event and ends the stream; the
    /// text received so far is still returned.
    async fn stream_and_relay(
        &self,
        prompt: &str,
        cancel: &CancelFlag,
        events: &UnboundedSender<GenerationEvent>,
    ) -> Result<String> {
        use futures::StreamExt;

        let mut rx = self.llm.stream(prompt).await?;
        let mut text = String::new();
        while let Some(event) = rx.next().await {
            if cancel.is_cancelled() {
                return Err(PatchError::Cancelled);
            }
            match event {
                StreamEvent::TextDelta(chunk) => {
                    text.push_str(&chunk);
                    let _ = events.send(GenerationEvent::Chunk(chunk));
                }
                StreamEvent::Done => break,
                StreamEvent::Error(message) => {
                    warn!("stream ended with provider error: {message}");
                    if !cancel.is_cancelled() {
                        let _ = events.send(GenerationEvent::Error(message));
                    }
                    break;
                }
            }
        }
        Ok(text)
    }
}

fn base_placeholders(bundle: &ContextBundle) -> HashMap<&'static str, String> {
    let mut placeholders = HashMap::new();
    placeholders.insert("query", bundle.query.clone());
    placeholders.insert("code_context", bundle.code_context.clone());
    placeholders.insert("chat_history", bundle.chat_history.clone());
    placeholders.insert("rag_context", bundle.rag_context.clone());
    placeholders.insert("local_context", bundle.local_context.clone());
    placeholders
}
