use std::path::Path;
use tracing::warn;

use crate::constants::files::{BINARY_CHECK_BUFFER_SIZE, BINARY_THRESHOLD};
use crate::error::Result;

/// Filesystem collaborator. The core never touches the disk except through
/// this seam, so tests and embedders can substitute their own storage.
pub trait FileStore: Send + Sync {
    fn read_text(&self, path: &Path) -> Result<String>;
    fn write_text(&self, path: &Path, content: &str) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn file_size(&self, path: &Path) -> Result<u64>;
}

/// Plain on-disk implementation.
#[derive(Debug, Default)]
pub struct DiskStore;

impl FileStore for DiskStore {
    fn read_text(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }
}

/// Heuristic binary sniff: sample the head of the file and measure the
/// fraction of bytes outside the printable-ASCII-plus-whitespace set.
pub fn is_likely_binary(path: &Path) -> bool {
    use std::io::Read;

    let mut buf = [0u8; BINARY_CHECK_BUFFER_SIZE];
    let read = match std::fs::File::open(path).and_then(|mut f| f.read(&mut buf)) {
        Ok(n) => n,
        Err(e) => {
            warn!("binary sniff failed for {}: {e}", path.display());
            return false;
        }
    };
    if read == 0 {
        return false;
    }

    let non_text = buf[..read]
        .iter()
        .filter(|&&b| !(32..127).contains(&b) && !b"\n\r\t\x0c\x08".contains(&b))
        .count();
    non_text as f64 / read as f64 > BINARY_THRESHOLD
}
