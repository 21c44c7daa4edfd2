use tracing::debug;

use crate::constants::matching::{MIN_MATCH_COVERAGE, MIN_MATCH_LINES};

/// How confident the matcher is that a located region corresponds to the
/// proposed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchConfidence {
    Exact,
    Partial,
    None,
}

/// An anchor region in the original file, as inclusive 0-based line
/// indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMatch {
    pub start_line: usize,
    pub end_line: usize,
    pub confidence: MatchConfidence,
}

/// Finds where a proposed block of lines belongs in the original file.
///
/// The anchor is the longest contiguous run of lines the two sequences
/// share. A run is accepted only when it spans at least `MIN_MATCH_LINES`
/// lines and covers at least `MIN_MATCH_COVERAGE` of the proposed block;
/// anything weaker is reported as no match rather than risking an apply at
/// the wrong place.
pub fn locate_block(original: &[&str], proposed: &[&str]) -> Option<BlockMatch> {
    if original.is_empty() || proposed.is_empty() {
        return None;
    }

    let (start, len) = longest_common_run(original, proposed)?;
    let coverage = len as f64 / proposed.len() as f64;
    debug!("longest shared run: {len} lines at {start}, coverage {coverage:.2}");

    if len < MIN_MATCH_LINES || coverage < MIN_MATCH_COVERAGE {
        return None;
    }

    Some(BlockMatch {
        start_line: start,
        end_line: start + len - 1,
        confidence: MatchConfidence::Partial,
    })
}

/// Longest contiguous run of lines shared by the two sequences, as
/// `(start_in_original, length)`, favoring the earliest original position
/// on ties.
///
/// Computed directly by dynamic programming over line pairs. A diff
/// script's `Equal` ops are not usable here: when a trailing line can
/// align with more than one identical original line the edit script may
/// split what is actually one maximal run.
fn longest_common_run(original: &[&str], proposed: &[&str]) -> Option<(usize, usize)> {
    let mut prev = vec![0usize; proposed.len() + 1];
    let mut best_len = 0;
    let mut best_start = 0;

    for (i, orig_line) in original.iter().enumerate() {
        let mut cur = vec![0usize; proposed.len() + 1];
        for (j, prop_line) in proposed.iter().enumerate() {
            if orig_line == prop_line {
                let run = prev[j] + 1;
                cur[j + 1] = run;
                if run > best_len {
                    best_len = run;
                    best_start = i + 1 - run;
                }
            }
        }
        prev = cur;
    }

    if best_len == 0 {
        None
    } else {
        Some((best_start, best_len))
    }
}
