//! Bounded context assembly for generation runs.

mod assembler;

pub use assembler::{
    latest_user_query, render_history, ContextAssembler, ContextBundle, NO_CODE_CONTEXT,
    NO_HISTORY, NO_LOCAL_CONTEXT, NO_RAG_CONTEXT,
};
