use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::generate::pipeline::CritiqueReport;

/// Events emitted during a generation run - the worker/UI interface.
///
/// Every run observes `Started`, then any number of progress events, then
/// exactly one `Finished`. `Error` may appear but never replaces `Finished`.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    Started,
    Status(String),
    ContextInfo { used: usize, max: usize },
    Chunk(String),
    PlanGenerated(Vec<String>),
    PlanCritiqued(CritiqueReport),
    PlanAccepted(Vec<String>),
    Error(String),
    Finished { cancelled: bool },
}

/// Cooperative cancellation flag, polled at every step boundary and inside
/// every per-item loop of a run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
