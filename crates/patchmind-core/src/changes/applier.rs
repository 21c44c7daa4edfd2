use crate::error::{PatchError, Result};

/// Where a proposed block lands in the target file, as 0-based line indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Replace the inclusive line range `start..=end`.
    Replace { start: usize, end: usize },
    /// Insert before line `before`; a value past the last line appends.
    Insert { before: usize },
}

/// Applies one block to file text and returns the new text. Pure: callers
/// decide what to do with the result.
pub fn apply_block(original: &str, block: &str, placement: Placement) -> Result<String> {
    let lines: Vec<&str> = original.split_inclusive('\n').collect();

    let block = ensure_trailing_newline(block, original, &lines, placement);

    match placement {
        Placement::Replace { start, end } => {
            if start > end {
                return Err(PatchError::InvalidRange(format!(
                    "replace range {start}..={end} is inverted"
                )));
            }
            if end >= lines.len() {
                return Err(PatchError::InvalidRange(format!(
                    "replace range {start}..={end} exceeds {} lines",
                    lines.len()
                )));
            }
            let mut out = String::with_capacity(original.len() + block.len());
            for line in &lines[..start] {
                out.push_str(line);
            }
            out.push_str(&block);
            for line in &lines[end + 1..] {
                out.push_str(line);
            }
            Ok(out)
        }
        Placement::Insert { before } => {
            let before = before.min(lines.len());
            let mut out = String::with_capacity(original.len() + block.len());
            for line in &lines[..before] {
                out.push_str(line);
            }
            // Appending after an unterminated final line needs a separator.
            if before == lines.len() && !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&block);
            for line in &lines[before..] {
                out.push_str(line);
            }
            Ok(out)
        }
    }
}

/// The seam between the block and the following text must keep line
/// structure intact: a block spliced before remaining lines needs a
/// trailing newline, and one replacing the final newline-terminated lines
/// keeps the file newline-terminated.
fn ensure_trailing_newline(
    block: &str,
    original: &str,
    lines: &[&str],
    placement: Placement,
) -> String {
    let at_eof = match placement {
        Placement::Replace { end, .. } => end + 1 >= lines.len(),
        Placement::Insert { before } => before >= lines.len(),
    };
    let original_terminated = original.ends_with('\n');

    if block.ends_with('\n') || (at_eof && !original_terminated) {
        block.to_string()
    } else {
        format!("{block}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_inner_range() {
        let original = "a\nb\nc\nd\n";
        let out = apply_block(original, "X\nY", Placement::Replace { start: 1, end: 2 }).unwrap();
        assert_eq!(out, "a\nX\nY\nd\n");
    }

    #[test]
    fn replace_is_idempotent_for_identical_content() {
        let original = "a\ndef f():\n  return 1\nc\n";
        let out = apply_block(
            original,
            "def f():\n  return 1",
            Placement::Replace { start: 1, end: 2 },
        )
        .unwrap();
        assert_eq!(out, original);
    }

    #[test]
    fn inserts_before_line() {
        let out = apply_block("a\nb\n", "new", Placement::Insert { before: 1 }).unwrap();
        assert_eq!(out, "a\nnew\nb\n");
    }

    #[test]
    fn insert_past_end_appends() {
        let out = apply_block("a\nb\n", "tail", Placement::Insert { before: 99 }).unwrap();
        assert_eq!(out, "a\nb\ntail\n");
    }

    #[test]
    fn append_after_unterminated_line_keeps_line_structure() {
        let out = apply_block("a\nb", "tail", Placement::Insert { before: 9 }).unwrap();
        assert_eq!(out, "a\nb\ntail");
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = apply_block("a\nb\n", "x", Placement::Replace { start: 2, end: 1 });
        assert!(matches!(err, Err(PatchError::InvalidRange(_))));
    }

    #[test]
    fn out_of_bounds_range_is_rejected() {
        let err = apply_block("a\nb\n", "x", Placement::Replace { start: 0, end: 5 });
        assert!(matches!(err, Err(PatchError::InvalidRange(_))));
    }

    #[test]
    fn unterminated_file_stays_unterminated() {
        let out = apply_block("a\nb", "X", Placement::Replace { start: 1, end: 1 }).unwrap();
        assert_eq!(out, "a\nX");
    }
}
