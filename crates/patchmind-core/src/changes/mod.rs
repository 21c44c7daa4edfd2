//! Turning AI output into reviewed file changes: marker parsing, anchor
//! matching, and the apply queue.

mod applier;
mod matcher;
mod parser;
mod queue;

pub use applier::{apply_block, Placement};
pub use matcher::{locate_block, BlockMatch, MatchConfidence};
pub use parser::{parse_change_blocks, ParsedChange};
pub use queue::{ApplyType, ChangeProposal, ChangeQueue};
