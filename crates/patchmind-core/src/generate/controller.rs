use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use tracing::{error, info, warn};

use crate::chat::ChatMessage;
use crate::config::Settings;
use crate::constants::pipeline::JOIN_TIMEOUT_MS;
use crate::context::ContextAssembler;
use crate::error::{PatchError, Result};
use crate::generate::pipeline::Pipeline;
use crate::generate::{CancelFlag, GenerationEvent};
use crate::llm::LlmClient;

/// Everything a run needs, snapshotted at start time. Later edits to
/// settings or history are invisible to an in-flight run.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub settings: Settings,
    pub history: Vec<ChatMessage>,
    pub checked_paths: Vec<PathBuf>,
    pub project_root: PathBuf,
}

struct RunState {
    cancel: CancelFlag,
    abort: AbortHandle,
}

/// Owns the lifecycle of generation runs: one at a time, observable
/// through an event channel, cancellable cooperatively with a hard abort
/// as the backstop.
pub struct GenerationController {
    llm: Arc<dyn LlmClient>,
    assembler: Arc<ContextAssembler>,
    busy: Arc<AtomicBool>,
    state: Mutex<Option<RunState>>,
}

impl GenerationController {
    pub fn new(llm: Arc<dyn LlmClient>, assembler: Arc<ContextAssembler>) -> Self {
        Self {
            llm,
            assembler,
            busy: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(None),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Starts a run and returns its event stream. Exactly one
    /// `Finished { .. }` event terminates the stream, on every path.
    pub fn start(&self, request: GenerationRequest) -> Result<UnboundedReceiver<GenerationEvent>> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(PatchError::Other("a generation run is already active".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancelFlag::new();
        let _ = tx.send(GenerationEvent::Started);

        let inner = tokio::spawn(run_inner(
            self.llm.clone(),
            self.assembler.clone(),
            request,
            cancel.clone(),
            tx.clone(),
        ));

        *self.state.lock().expect("run state lock") = Some(RunState {
            cancel: cancel.clone(),
            abort: inner.abort_handle(),
        });

        let busy = self.busy.clone();
        tokio::spawn(async move {
            match inner.await {
                Ok(Ok(())) => info!("generation run completed"),
                Ok(Err(PatchError::Cancelled)) => info!("generation run cancelled"),
                // A failure from a call abandoned by cancellation is not an
                // error the user needs to see.
                Ok(Err(e)) if cancel.is_cancelled() => {
                    info!("generation run failed after cancellation: {e}");
                }
                Ok(Err(e)) => {
                    error!("generation run failed: {e}");
                    let _ = tx.send(GenerationEvent::Error(e.to_string()));
                }
                Err(e) if e.is_cancelled() => warn!("generation run aborted after timeout"),
                Err(e) => error!("generation run panicked: {e}"),
            }
            let _ = tx.send(GenerationEvent::Finished {
                cancelled: cancel.is_cancelled(),
            });
            busy.store(false, Ordering::SeqCst);
        });

        Ok(rx)
    }

    /// Requests cancellation of the active run, if any. The run is given
    /// `JOIN_TIMEOUT_MS` to wind down cooperatively before being aborted.
    pub fn cancel(&self) {
        let state = self.state.lock().expect("run state lock");
        let Some(state) = state.as_ref() else {
            return;
        };
        info!("cancellation requested");
        state.cancel.cancel();

        let abort = state.abort.clone();
        let busy = self.busy.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(JOIN_TIMEOUT_MS)).await;
            if busy.load(Ordering::SeqCst) && !abort.is_finished() {
                warn!("run did not stop within {JOIN_TIMEOUT_MS}ms, aborting task");
                abort.abort();
            }
        });
    }
}

async fn run_inner(
    llm: Arc<dyn LlmClient>,
    assembler: Arc<ContextAssembler>,
    request: GenerationRequest,
    cancel: CancelFlag,
    events: UnboundedSender<GenerationEvent>,
) -> Result<()> {
    let bundle = assembler
        .assemble(
            &request.settings,
            &request.history,
            &request.checked_paths,
            &request.project_root,
            &cancel,
            &events,
        )
        .await?;

    let pipeline = Pipeline::new(llm);
    pipeline
        .run(&request.settings, &bundle, &cancel, &events)
        .await?;
    Ok(())
}
