use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::changes::applier::{apply_block, Placement};
use crate::changes::matcher::{locate_block, MatchConfidence};
use crate::changes::parser::ParsedChange;
use crate::error::{PatchError, Result};
use crate::workspace::FileStore;

/// How a proposal will be written into its target file once applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyType {
    Replace,
    Insert,
    Unset,
}

/// A pending file change awaiting user review.
///
/// `original_content` is the file as it was when the proposal was detected,
/// so review UIs can diff against what the model actually saw.
#[derive(Debug, Clone)]
pub struct ChangeProposal {
    pub id: Uuid,
    pub file_path: PathBuf,
    pub content: String,
    pub original_content: String,
    pub original_block: Option<String>,
    pub apply_type: ApplyType,
    pub placement: Option<Placement>,
    pub confidence: MatchConfidence,
}

/// Review queue for parsed change blocks. Proposals stay pending until
/// applied or rejected; a failed apply leaves the proposal in place.
#[derive(Default)]
pub struct ChangeQueue {
    pending: Mutex<Vec<ChangeProposal>>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues parsed blocks against a project root. Blocks whose content is
    /// identical to the current file are dropped as no-ops. Returns the
    /// number of proposals added.
    pub fn enqueue_parsed(
        &self,
        parsed: Vec<ParsedChange>,
        store: &dyn FileStore,
        project_root: &Path,
    ) -> usize {
        let mut queue = self.pending.lock().expect("change queue lock");
        let mut added = 0;

        for change in parsed {
            let path = project_root.join(&change.file_path);
            let mut original_content = String::new();
            if store.exists(&path) {
                match store.read_text(&path) {
                    Ok(current) if current.trim_end() == change.content.trim_end() => {
                        debug!("skipping no-op change for {}", path.display());
                        continue;
                    }
                    Ok(current) => original_content = current,
                    Err(e) => warn!("could not read {} for comparison: {e}", path.display()),
                }
            }

            let mut id = Uuid::new_v4();
            while queue.iter().any(|p| p.id == id) {
                id = Uuid::new_v4();
            }
            queue.push(ChangeProposal {
                id,
                file_path: path,
                content: change.content,
                original_content,
                original_block: None,
                apply_type: ApplyType::Unset,
                placement: None,
                confidence: MatchConfidence::None,
            });
            added += 1;
        }

        info!("{added} change proposals queued, {} pending", queue.len());
        added
    }

    pub fn pending(&self) -> Vec<ChangeProposal> {
        self.pending.lock().expect("change queue lock").clone()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().expect("change queue lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Computes where a proposal lands in its target file. An anchored
    /// match becomes a replace; otherwise the block is set to append, so
    /// nothing existing is overwritten on weak evidence.
    pub fn resolve(&self, id: Uuid, store: &dyn FileStore) -> Result<MatchConfidence> {
        let mut queue = self.pending.lock().expect("change queue lock");
        let proposal = queue
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| PatchError::Other(format!("no pending change with id {id}")))?;
        resolve_placement(proposal, store)?;
        Ok(proposal.confidence)
    }

    /// Applies a proposal and removes it from the queue. On any failure the
    /// proposal stays pending so the user can retry or reject it.
    pub fn apply(&self, id: Uuid, store: &dyn FileStore) -> Result<()> {
        let mut queue = self.pending.lock().expect("change queue lock");
        let index = queue
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PatchError::Other(format!("no pending change with id {id}")))?;

        {
            let proposal = &mut queue[index];
            if proposal.placement.is_none() && store.exists(&proposal.file_path) {
                resolve_placement(proposal, store)?;
            }

            let new_text = match (store.exists(&proposal.file_path), proposal.placement) {
                (false, _) => {
                    // New file: the block is the whole file.
                    let mut text = proposal.content.clone();
                    if !text.ends_with('\n') {
                        text.push('\n');
                    }
                    text
                }
                (true, Some(placement)) => {
                    let original = store.read_text(&proposal.file_path)?;
                    apply_block(&original, &proposal.content, placement)?
                }
                (true, None) => {
                    return Err(PatchError::Other(format!(
                        "placement unresolved for {}",
                        proposal.file_path.display()
                    )))
                }
            };
            store.write_text(&proposal.file_path, &new_text)?;
            info!("applied change to {}", proposal.file_path.display());
        }

        queue.remove(index);
        Ok(())
    }

    /// Drops a proposal without touching the file. Returns whether it existed.
    pub fn reject(&self, id: Uuid) -> bool {
        let mut queue = self.pending.lock().expect("change queue lock");
        let before = queue.len();
        queue.retain(|p| p.id != id);
        queue.len() != before
    }

    pub fn clear(&self) {
        self.pending.lock().expect("change queue lock").clear();
    }
}

fn resolve_placement(proposal: &mut ChangeProposal, store: &dyn FileStore) -> Result<()> {
    let original = store.read_text(&proposal.file_path)?;
    let original_lines: Vec<&str> = original.lines().collect();
    let proposed_lines: Vec<&str> = proposal.content.lines().collect();

    match locate_block(&original_lines, &proposed_lines) {
        Some(anchor) => {
            proposal.placement = Some(Placement::Replace {
                start: anchor.start_line,
                end: anchor.end_line,
            });
            proposal.original_block =
                Some(original_lines[anchor.start_line..=anchor.end_line].join("\n"));
            proposal.apply_type = ApplyType::Replace;
            proposal.confidence = anchor.confidence;
        }
        None => {
            proposal.placement = Some(Placement::Insert {
                before: original_lines.len(),
            });
            proposal.original_block = None;
            proposal.apply_type = ApplyType::Insert;
            proposal.confidence = MatchConfidence::None;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::DiskStore;

    fn parsed(path: &str, content: &str) -> ParsedChange {
        ParsedChange {
            file_path: path.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn identical_content_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore;
        store
            .write_text(&dir.path().join("same.rs"), "fn a() {}\n")
            .unwrap();

        let queue = ChangeQueue::new();
        let added = queue.enqueue_parsed(vec![parsed("same.rs", "fn a() {}")], &store, dir.path());
        assert_eq!(added, 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn anchored_change_replaces_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore;
        let target = dir.path().join("mod.py");
        store
            .write_text(&target, "a\ndef f():\n  return 1\nc\n")
            .unwrap();

        let queue = ChangeQueue::new();
        queue.enqueue_parsed(
            vec![parsed("mod.py", "def f():\n  return 1\n  # done")],
            &store,
            dir.path(),
        );
        let id = queue.pending()[0].id;

        let confidence = queue.resolve(id, &store).unwrap();
        assert_eq!(confidence, MatchConfidence::Partial);

        queue.apply(id, &store).unwrap();
        assert_eq!(
            store.read_text(&target).unwrap(),
            "a\ndef f():\n  return 1\n  # done\nc\n"
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn unanchored_change_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore;
        let target = dir.path().join("x.txt");
        store.write_text(&target, "alpha\nbeta\n").unwrap();

        let queue = ChangeQueue::new();
        queue.enqueue_parsed(
            vec![parsed("x.txt", "gamma\ndelta")],
            &store,
            dir.path(),
        );
        let id = queue.pending()[0].id;

        let confidence = queue.resolve(id, &store).unwrap();
        assert_eq!(confidence, MatchConfidence::None);
        assert_eq!(queue.pending()[0].apply_type, ApplyType::Insert);

        queue.apply(id, &store).unwrap();
        assert_eq!(
            store.read_text(&target).unwrap(),
            "alpha\nbeta\ngamma\ndelta\n"
        );
    }

    #[test]
    fn new_file_is_created_whole() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore;

        let queue = ChangeQueue::new();
        queue.enqueue_parsed(
            vec![parsed("sub/new.rs", "pub fn hello() {}")],
            &store,
            dir.path(),
        );
        let id = queue.pending()[0].id;
        queue.apply(id, &store).unwrap();
        assert_eq!(
            store.read_text(&dir.path().join("sub/new.rs")).unwrap(),
            "pub fn hello() {}\n"
        );
    }

    #[test]
    fn reject_removes_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore;
        let target = dir.path().join("keep.txt");
        store.write_text(&target, "original\ncontent\n").unwrap();

        let queue = ChangeQueue::new();
        queue.enqueue_parsed(vec![parsed("keep.txt", "replacement")], &store, dir.path());
        let id = queue.pending()[0].id;
        assert!(queue.reject(id));
        assert!(queue.is_empty());
        assert_eq!(store.read_text(&target).unwrap(), "original\ncontent\n");
    }
}
