use std::sync::Arc;
use tracing::{trace, warn};

use crate::constants::budget::{MIN_TRUNCATED_TOKENS, SAFETY_MARGIN};

/// Token counting seam. One counter instance is used for an entire run so
/// every budget decision is made in the same units.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Whitespace-word counter, the fallback when no model tokenizer is wired in.
#[derive(Debug, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// A candidate context block: body text framed by a header and footer line.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub header: String,
    pub body: String,
    pub footer: String,
}

impl Candidate {
    pub fn new(
        header: impl Into<String>,
        body: impl Into<String>,
        footer: impl Into<String>,
    ) -> Self {
        Self {
            header: header.into(),
            body: body.into(),
            footer: footer.into(),
        }
    }

    fn render(&self, body: &str) -> String {
        format!("{}\n{}\n{}", self.header, body, self.footer)
    }
}

/// Greedy packer that fits candidate blocks into a token budget.
///
/// Candidates are taken strictly in input order; order encodes priority.
/// The first candidate that cannot be fitted (even truncated) stops the
/// packing entirely, so a low-priority block can never displace a
/// higher-priority one.
pub struct BudgetPacker {
    counter: Arc<dyn TokenCounter>,
}

impl BudgetPacker {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    /// Packs candidates into `budget` tokens. Returns the accepted rendered
    /// blocks and the tokens consumed; `tokens_used <= budget` always holds.
    pub fn pack(&self, budget: usize, candidates: &[Candidate]) -> (Vec<String>, usize) {
        let mut accepted = Vec::new();
        let mut remaining = budget;

        for candidate in candidates {
            let header_tokens = self.counter.count(&candidate.header);
            let body_tokens = self.counter.count(&candidate.body);
            let footer_tokens = self.counter.count(&candidate.footer);

            if body_tokens == 0 {
                continue;
            }

            let total = header_tokens + body_tokens + footer_tokens;
            if total <= remaining {
                accepted.push(candidate.render(&candidate.body));
                remaining -= total;
                trace!("packer: accepted whole block ({total} tokens), {remaining} remaining");
                continue;
            }

            // Partial fit: cut the body proportionally by characters, then
            // re-measure — the token-to-character ratio is only approximate.
            let frame = header_tokens + footer_tokens + SAFETY_MARGIN;
            let needed = remaining.saturating_sub(frame);
            if needed > MIN_TRUNCATED_TOKENS {
                let ratio = needed as f64 / body_tokens as f64;
                let cutoff = (candidate.body.len() as f64 * ratio) as usize;
                let truncated = truncate_at_char_boundary(&candidate.body, cutoff).trim_end();
                let cut_tokens = self.counter.count(truncated);
                let final_total = header_tokens + cut_tokens + footer_tokens;
                if cut_tokens > 0 && final_total <= remaining {
                    accepted.push(candidate.render(truncated));
                    remaining -= final_total;
                    warn!(
                        "packer: truncated block to {cut_tokens} body tokens, {remaining} remaining"
                    );
                    continue;
                }
            }

            // Budget is too tight for this candidate; everything after it is
            // lower priority and unreachable by construction.
            break;
        }

        (accepted, budget - remaining)
    }
}

fn truncate_at_char_boundary(text: &str, mut index: usize) -> &str {
    if index >= text.len() {
        return text;
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    &text[..index]
}
