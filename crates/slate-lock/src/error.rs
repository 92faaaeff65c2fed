use std::path::PathBuf;

/// Errors from lock operations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Contention exceeded the caller's patience. Recoverable; retry later.
    #[error("timed out acquiring lock for {path} after {waited_ms} ms ({attempts} attempts)")]
    Timeout {
        path: PathBuf,
        waited_ms: u64,
        attempts: u32,
    },

    /// A lock marker exists but cannot be decoded.
    #[error("malformed lock marker {path}: {reason}")]
    MalformedMarker { path: PathBuf, reason: String },

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for lock operations.
pub type LockResult<T> = Result<T, LockError>;
