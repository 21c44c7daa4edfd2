use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use patchmind_core::{
    CancelFlag, ContextAssembler, DiskStore, GenerationController, GenerationEvent,
    GenerationRequest, LlmClient, PatchError, Settings, StreamEvent, WordCounter,
};
use patchmind_core::chat::ChatHistory;

/// Mock LLM with scripted responses: one queue for blocking sends, one for
/// streams.
struct MockLlm {
    sends: Mutex<VecDeque<String>>,
    streams: Mutex<VecDeque<Vec<StreamEvent>>>,
}

impl MockLlm {
    fn new(sends: Vec<&str>, streams: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            sends: Mutex::new(sends.into_iter().map(String::from).collect()),
            streams: Mutex::new(streams.into_iter().collect()),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlm {
    async fn send(&self, _prompt: &str) -> Result<String, PatchError> {
        self.sends
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PatchError::LlmCall("no scripted send response".to_string()))
    }

    async fn stream(
        &self,
        _prompt: &str,
    ) -> Result<UnboundedReceiver<StreamEvent>, PatchError> {
        let events = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PatchError::LlmCall("no scripted stream response".to_string()))?;
        let (tx, rx) = unbounded();
        for event in events {
            let _ = tx.unbounded_send(event);
        }
        Ok(rx)
    }
}

/// LLM whose call fails a little while after being issued, standing in for
/// a connection dropped mid-run.
struct LateFailingLlm;

#[async_trait::async_trait]
impl LlmClient for LateFailingLlm {
    async fn send(&self, _prompt: &str) -> Result<String, PatchError> {
        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        Err(PatchError::LlmCall("connection reset by peer".to_string()))
    }

    async fn stream(
        &self,
        _prompt: &str,
    ) -> Result<UnboundedReceiver<StreamEvent>, PatchError> {
        futures::future::pending().await
    }
}

/// LLM whose send never resolves, for cancellation tests.
struct HangingLlm;

#[async_trait::async_trait]
impl LlmClient for HangingLlm {
    async fn send(&self, _prompt: &str) -> Result<String, PatchError> {
        futures::future::pending().await
    }

    async fn stream(
        &self,
        _prompt: &str,
    ) -> Result<UnboundedReceiver<StreamEvent>, PatchError> {
        futures::future::pending().await
    }
}

fn controller(llm: Arc<dyn LlmClient>) -> GenerationController {
    let assembler = Arc::new(ContextAssembler::new(
        Arc::new(WordCounter),
        Arc::new(DiskStore),
    ));
    GenerationController::new(llm, assembler)
}

fn quiet_settings() -> Settings {
    Settings {
        rag_external_enabled: false,
        rag_local_enabled: false,
        rag_summarizer_enabled: false,
        ..Settings::default()
    }
}

fn request_with_query(settings: Settings, query: &str) -> GenerationRequest {
    let mut history = ChatHistory::new();
    history.add_user_message(query);
    GenerationRequest {
        settings,
        history: history.snapshot(),
        checked_paths: Vec::new(),
        project_root: PathBuf::from("."),
    }
}

async fn collect_run(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<GenerationEvent>,
) -> Vec<GenerationEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let finished = matches!(event, GenerationEvent::Finished { .. });
        events.push(event);
        if finished {
            break;
        }
    }
    events
}

fn chunks_text(events: &[GenerationEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            GenerationEvent::Chunk(c) => Some(c.as_str()),
            _ => None,
        })
        .collect()
}

fn critique_count(events: &[GenerationEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, GenerationEvent::PlanCritiqued(_)))
        .count()
}

fn accepted_plan(events: &[GenerationEvent]) -> Option<Vec<String>> {
    events.iter().find_map(|e| match e {
        GenerationEvent::PlanAccepted(plan) => Some(plan.clone()),
        _ => None,
    })
}

const GOOD_CRITIQUE: &str = r#"```json
{"plan_status": "GOOD", "critique_reasoning": "direct and actionable", "revised_plan": null}
```"#;

fn bad_critique(step: &str) -> String {
    format!(
        r#"{{"plan_status": "BAD", "critique_reasoning": "too vague", "revised_plan": ["{step}"]}}"#
    )
}

#[tokio::test]
async fn direct_mode_streams_without_planning() {
    let llm = Arc::new(MockLlm::new(
        vec![],
        vec![vec![
            StreamEvent::TextDelta("Hello ".to_string()),
            StreamEvent::TextDelta("world".to_string()),
            StreamEvent::Done,
        ]],
    ));
    let controller = controller(llm);

    let mut settings = quiet_settings();
    settings.disable_critic_workflow = true;
    let rx = controller
        .start(request_with_query(settings, "say hello"))
        .unwrap();
    let events = collect_run(rx).await;

    assert!(matches!(events.first(), Some(GenerationEvent::Started)));
    assert_eq!(chunks_text(&events), "Hello world");
    assert!(!events
        .iter()
        .any(|e| matches!(e, GenerationEvent::PlanGenerated(_))));
    assert!(matches!(
        events.last(),
        Some(GenerationEvent::Finished { cancelled: false })
    ));
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn critic_approval_accepts_the_plan() {
    let llm = Arc::new(MockLlm::new(
        vec!["1. Find the bug\n2. Fix it", GOOD_CRITIQUE],
        vec![vec![
            StreamEvent::TextDelta("patched".to_string()),
            StreamEvent::Done,
        ]],
    ));
    let controller = controller(llm);

    let rx = controller
        .start(request_with_query(quiet_settings(), "fix the bug"))
        .unwrap();
    let events = collect_run(rx).await;

    let generated = events
        .iter()
        .find_map(|e| match e {
            GenerationEvent::PlanGenerated(plan) => Some(plan.clone()),
            _ => None,
        })
        .expect("plan generated");
    assert_eq!(generated, vec!["Find the bug", "Fix it"]);
    assert_eq!(critique_count(&events), 1);
    assert_eq!(accepted_plan(&events), Some(generated));
    assert_eq!(chunks_text(&events), "patched");
}

#[tokio::test]
async fn repeated_rejection_is_bounded_and_takes_the_last_revision() {
    let bad1 = bad_critique("revision one");
    let bad2 = bad_critique("revision two");
    let bad3 = bad_critique("revision three");
    let llm = Arc::new(MockLlm::new(
        vec!["1. original step", bad1.as_str(), bad2.as_str(), bad3.as_str()],
        vec![vec![StreamEvent::Done]],
    ));
    let controller = controller(llm);

    let rx = controller
        .start(request_with_query(quiet_settings(), "do the thing"))
        .unwrap();
    let events = collect_run(rx).await;

    // Exactly the bounded number of critic rounds ran, then the loop gave
    // up and executed the latest revision.
    assert_eq!(critique_count(&events), 3);
    assert_eq!(
        accepted_plan(&events),
        Some(vec!["revision three".to_string()])
    );
    assert!(matches!(
        events.last(),
        Some(GenerationEvent::Finished { cancelled: false })
    ));
}

#[tokio::test]
async fn unparseable_critique_retries_with_the_same_plan() {
    let llm = Arc::new(MockLlm::new(
        vec![
            "1. only step",
            "the plan looks fine to me",
            "still not json",
            GOOD_CRITIQUE,
        ],
        vec![vec![StreamEvent::Done]],
    ));
    let controller = controller(llm);

    let rx = controller
        .start(request_with_query(quiet_settings(), "q"))
        .unwrap();
    let events = collect_run(rx).await;

    // Only the parseable round produced a critique event, and the original
    // plan survived the garbage rounds.
    assert_eq!(critique_count(&events), 1);
    assert_eq!(accepted_plan(&events), Some(vec!["only step".to_string()]));
}

#[tokio::test]
async fn rejection_without_a_revision_stops_the_loop() {
    let llm = Arc::new(MockLlm::new(
        vec![
            "1. keep this step",
            r#"{"plan_status": "BAD", "critique_reasoning": "cannot improve", "revised_plan": null}"#,
        ],
        vec![vec![StreamEvent::Done]],
    ));
    let controller = controller(llm);

    let rx = controller
        .start(request_with_query(quiet_settings(), "q"))
        .unwrap();
    let events = collect_run(rx).await;

    // One rejection with no usable revision ends the loop right away with
    // the current plan; no further critic rounds run.
    assert_eq!(critique_count(&events), 1);
    assert_eq!(
        accepted_plan(&events),
        Some(vec!["keep this step".to_string()])
    );
    assert!(matches!(
        events.last(),
        Some(GenerationEvent::Finished { cancelled: false })
    ));
}

#[tokio::test]
async fn missing_query_fails_the_run_cleanly() {
    let llm = Arc::new(MockLlm::new(vec![], vec![]));
    let controller = controller(llm);

    let request = GenerationRequest {
        settings: quiet_settings(),
        history: Vec::new(),
        checked_paths: Vec::new(),
        project_root: PathBuf::from("."),
    };
    let rx = controller.start(request).unwrap();
    let events = collect_run(rx).await;

    assert!(events
        .iter()
        .any(|e| matches!(e, GenerationEvent::Error(_))));
    assert!(matches!(
        events.last(),
        Some(GenerationEvent::Finished { cancelled: false })
    ));
    assert!(!controller.is_busy());
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_while_busy() {
    let controller = controller(Arc::new(HangingLlm));

    let rx = controller
        .start(request_with_query(quiet_settings(), "first"))
        .unwrap();
    assert!(controller
        .start(request_with_query(quiet_settings(), "second"))
        .is_err());

    controller.cancel();
    let events = collect_run(rx).await;
    assert!(matches!(
        events.last(),
        Some(GenerationEvent::Finished { cancelled: true })
    ));
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_a_hung_run() {
    let controller = controller(Arc::new(HangingLlm));

    let mut rx = controller
        .start(request_with_query(quiet_settings(), "never finishes"))
        .unwrap();
    assert!(matches!(rx.recv().await, Some(GenerationEvent::Started)));

    controller.cancel();
    let events = collect_run(rx).await;

    assert!(chunks_text(&events).is_empty());
    assert!(matches!(
        events.last(),
        Some(GenerationEvent::Finished { cancelled: true })
    ));
    assert!(!controller.is_busy());
}

#[tokio::test(start_paused = true)]
async fn failures_after_cancellation_are_not_surfaced() {
    let controller = controller(Arc::new(LateFailingLlm));

    let mut rx = controller
        .start(request_with_query(quiet_settings(), "q"))
        .unwrap();
    assert!(matches!(rx.recv().await, Some(GenerationEvent::Started)));

    // Let the run reach its in-flight LLM call, then cancel while the call
    // is still pending. Its eventual failure belongs in the log only.
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    controller.cancel();
    let events = collect_run(rx).await;

    assert!(!events
        .iter()
        .any(|e| matches!(e, GenerationEvent::Error(_))));
    assert!(matches!(
        events.last(),
        Some(GenerationEvent::Finished { cancelled: true })
    ));
}

#[tokio::test]
async fn cancel_flag_is_shared_between_clones() {
    let flag = CancelFlag::new();
    let clone = flag.clone();
    assert!(!clone.is_cancelled());
    flag.cancel();
    assert!(clone.is_cancelled());
}
