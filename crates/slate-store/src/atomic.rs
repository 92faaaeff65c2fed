//! Atomic whole-file replacement.
//!
//! The sole mechanism by which document content changes on disk: write the
//! new bytes to a temporary sibling file, sync it, then rename it over the
//! target. The temp file lives in the target's own directory so the rename
//! stays on one filesystem and is atomic; a concurrent reader sees either
//! the old complete content or the new complete content, never a mix. Any
//! failure before the rename leaves the target untouched.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

/// Atomically replace the contents of `path` with `bytes`.
///
/// Creates the parent directory if it does not exist.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    debug!(path = %path.display(), len = bytes.len(), "atomic write");
    Ok(())
}
