//! Generation run lifecycle: controller, event stream, and the LLM
//! pipeline behind them.

mod controller;
mod event;
mod pipeline;

pub use controller::{GenerationController, GenerationRequest};
pub use event::{CancelFlag, GenerationEvent};
pub use pipeline::{
    parse_critic_response, parse_plan_lines, CriticVerdict, CritiqueReport, Pipeline,
};
