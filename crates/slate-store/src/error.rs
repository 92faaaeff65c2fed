use std::io;
use std::path::PathBuf;

use slate_lock::LockError;

/// Errors surfaced by document store operations.
///
/// Every variant is distinguishable so callers can branch: a timeout is
/// recoverable by retrying later, a corrupt document needs a decision
/// (treat as absent, alert, or restore from backup), a type mismatch is a
/// caller bug, and an I/O error is an environment failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Lock contention exceeded the configured patience.
    #[error("timed out acquiring lock for {path} after {waited_ms} ms ({attempts} attempts)")]
    LockTimeout {
        path: PathBuf,
        waited_ms: u64,
        attempts: u32,
    },

    /// The on-disk content failed to parse as JSON. Never auto-repaired.
    #[error("corrupt document {path}: {reason}")]
    CorruptDocument { path: PathBuf, reason: String },

    /// The operation's target is not a mergeable shape.
    #[error("type mismatch for {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: PathBuf,
        expected: &'static str,
        found: &'static str,
    },

    /// Environment failure: disk full, permission denied, and the like.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<LockError> for StoreError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Timeout {
                path,
                waited_ms,
                attempts,
            } => Self::LockTimeout {
                path,
                waited_ms,
                attempts,
            },
            LockError::Io(e) => Self::Io(e),
            LockError::MalformedMarker { path, reason } => Self::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("lock marker {}: {reason}", path.display()),
            )),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
