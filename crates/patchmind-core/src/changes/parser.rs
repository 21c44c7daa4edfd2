use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

/// A file change extracted from AI output markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChange {
    pub file_path: String,
    pub content: String,
}

/// Extracts `### START FILE: path ###` ... `### END FILE: path ###` blocks
/// from a response. The end marker must repeat the same path; a start
/// marker with no matching end is dropped with a warning.
pub fn parse_change_blocks(text: &str) -> Vec<ParsedChange> {
    static START: OnceLock<Regex> = OnceLock::new();
    let start = START.get_or_init(|| {
        Regex::new(r"### START FILE: (.+?) ###").expect("static regex")
    });

    let mut changes = Vec::new();
    for caps in start.captures_iter(text) {
        let Some(path_match) = caps.get(1) else {
            continue;
        };
        let path = path_match.as_str().trim();
        if path.is_empty() {
            continue;
        }

        let after_start = &text[path_match.end()..];
        let after_start = match after_start.find("###") {
            Some(idx) => &after_start[idx + 3..],
            None => continue,
        };

        let end_marker = format!("### END FILE: {path} ###");
        let Some(end_idx) = after_start.find(&end_marker) else {
            warn!("change block for '{path}' has no end marker, dropping");
            continue;
        };

        let content = after_start[..end_idx]
            .trim_matches(|c| c == '\n' || c == '\r')
            .to_string();
        if content.is_empty() {
            warn!("change block for '{path}' is empty, dropping");
            continue;
        }

        changes.push(ParsedChange {
            file_path: path.to_string(),
            content,
        });
    }
    changes
}
