//! On-disk lock marker format and marker name derivation.
//!
//! Marker names must be deterministic: two callers referring to the same
//! logical document always compute the same marker name. The name combines
//! a sanitized, human-recognizable prefix from the document's file name with
//! a BLAKE3 hash of the canonicalized document path, so distinct documents
//! with the same file name in different directories get distinct markers and
//! different spellings of the same path get the same one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::liveness;

/// Hex characters of the path hash included in the marker name.
const HASH_PREFIX_LEN: usize = 16;

/// Maximum length of the sanitized file-name prefix.
const STEM_MAX_LEN: usize = 40;

/// Per-process sequence counter for issued locks.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Next lock sequence number for this process.
///
/// Sequence numbers distinguish a reissued lock on the same path from the
/// lock a stale handle was issued for, so a holder that overran its assumed
/// hold (and was reclaimed) cannot release a lock it no longer owns.
pub fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1
}

/// The owner record stored inside a lock marker file, as JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMarker {
    /// PID of the owning process.
    pub pid: u32,
    /// Start time of the owning process (clock-tick nonce from the OS),
    /// `0` when the platform cannot report it. Guards against PID reuse.
    pub pid_start: u64,
    /// Per-process sequence number of this acquisition.
    pub sequence: u64,
    /// Wall-clock time of acquisition.
    pub acquired_at: DateTime<Utc>,
}

impl LockMarker {
    /// Build a marker describing the current process.
    pub fn for_current_process() -> Self {
        let pid = std::process::id();
        Self {
            pid,
            pid_start: liveness::process_start_time(pid).unwrap_or(0),
            sequence: next_sequence(),
            acquired_at: Utc::now(),
        }
    }

    /// Whether `other` records the same owner and acquisition as `self`.
    pub fn same_owner(&self, other: &Self) -> bool {
        self.pid == other.pid
            && self.pid_start == other.pid_start
            && self.sequence == other.sequence
    }

    /// Age of this marker relative to now.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.acquired_at
    }
}

/// Compute the marker file path for a document inside `locks_dir`.
pub fn marker_path(locks_dir: &Path, document: &Path) -> PathBuf {
    locks_dir.join(marker_name(document))
}

/// Deterministic marker file name for a document path.
fn marker_name(document: &Path) -> String {
    let canonical = canonical_document_path(document);
    let digest = blake3::hash(canonical.to_string_lossy().as_bytes());
    let hash = hex::encode(&digest.as_bytes()[..HASH_PREFIX_LEN / 2]);

    let stem: String = document
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(STEM_MAX_LEN)
        .collect();

    format!("{stem}-{hash}.lock")
}

/// Canonical form of a document path for hashing.
///
/// `std::path::absolute` does not resolve symlinks or collapse `..`, so two
/// spellings of the same document (`/srv/a/state.json` and
/// `/srv/a/../a/state.json`) would hash to different marker names and get
/// independent locks. Canonicalizing the parent directory (which must exist
/// for the lock to matter) and rejoining the file name unifies them; the
/// document itself need not exist yet.
fn canonical_document_path(document: &Path) -> PathBuf {
    let absolute = std::path::absolute(document).unwrap_or_else(|_| document.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(parent) => parent.join(name),
            Err(_) => absolute,
        },
        _ => absolute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = next_sequence();
        let b = next_sequence();
        assert!(b > a);
    }

    #[test]
    fn marker_records_current_pid() {
        let marker = LockMarker::for_current_process();
        assert_eq!(marker.pid, std::process::id());
        assert!(marker.sequence > 0);
    }

    #[test]
    fn same_owner_requires_matching_sequence() {
        let a = LockMarker::for_current_process();
        let b = LockMarker::for_current_process();
        assert!(a.same_owner(&a.clone()));
        assert!(!a.same_owner(&b));
    }

    #[test]
    fn marker_serde_roundtrip() {
        let marker = LockMarker::for_current_process();
        let json = serde_json::to_string(&marker).unwrap();
        let parsed: LockMarker = serde_json::from_str(&json).unwrap();
        assert_eq!(marker, parsed);
    }

    #[test]
    fn marker_name_is_deterministic() {
        let doc = Path::new("/var/state/session-context.json");
        assert_eq!(marker_name(doc), marker_name(doc));
    }

    #[test]
    fn marker_name_distinguishes_directories() {
        let a = marker_name(Path::new("/srv/a/state.json"));
        let b = marker_name(Path::new("/srv/b/state.json"));
        assert_ne!(a, b);
        assert!(a.starts_with("state.json-"));
        assert!(b.starts_with("state.json-"));
    }

    #[test]
    fn marker_name_unifies_path_spellings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();

        let direct = dir.path().join("a/state.json");
        let dotted = dir.path().join("a/../a/state.json");
        assert_eq!(marker_name(&direct), marker_name(&dotted));
    }

    #[test]
    fn marker_name_sanitizes_odd_characters() {
        let name = marker_name(Path::new("/tmp/weird name?.json"));
        assert!(name.ends_with(".lock"));
        assert!(!name.contains(' '));
        assert!(!name.contains('?'));
    }

    #[test]
    fn marker_path_lives_in_locks_dir() {
        let path = marker_path(Path::new("/run/locks"), Path::new("/data/doc.json"));
        assert!(path.starts_with("/run/locks"));
        assert_eq!(path.extension().unwrap(), "lock");
    }
}
