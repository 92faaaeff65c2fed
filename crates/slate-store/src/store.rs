//! The document store API: read, write, update, merge.
//!
//! Every mutating operation follows the same shape: acquire the document's
//! lock, do the work in memory, persist through the atomic writer (backup
//! first), release the lock. Release is unconditional -- the lock handle is
//! RAII, so the marker is removed even on the error path. Reads take no
//! lock at all: the atomic rename already guarantees a reader sees a
//! complete old or new document.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use slate_lock::{Liveness, LockManager};
use slate_types::{Clock, Document, MergeOutcome, StoreConfig};

use crate::atomic::write_atomic;
use crate::backup::BackupRotator;
use crate::error::{StoreError, StoreResult};
use crate::oplog::OperationLog;

/// Lines of the operation log included in [`StoreStatus`].
const STATUS_TAIL_LINES: usize = 10;

/// A handle to a document store rooted at a locks directory.
///
/// Instances are cheap; every piece of state lives on the filesystem, so
/// any number of stores (across any number of processes) configured with
/// the same locks directory coordinate correctly.
pub struct DocumentStore {
    config: StoreConfig,
    locks: LockManager,
    backups: BackupRotator,
    oplog: OperationLog,
}

/// Snapshot of store activity for the `status` surface.
#[derive(Clone, Debug, Serialize)]
pub struct StoreStatus {
    /// Number of lock markers currently present.
    pub active_locks: usize,
    /// Tail of the operation log, oldest first.
    pub recent_ops: Vec<String>,
}

impl DocumentStore {
    /// Create a store with the platform liveness check and real clock.
    pub fn new(config: StoreConfig) -> Self {
        let locks = LockManager::new(config.locks_dir.clone(), config.retry.clone());
        Self::assemble(config, locks)
    }

    /// Create a store with injected liveness and clock (tests, platform
    /// ports).
    pub fn with_parts(
        config: StoreConfig,
        liveness: Arc<dyn Liveness>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let locks = LockManager::with_parts(
            config.locks_dir.clone(),
            config.retry.clone(),
            liveness,
            clock,
        );
        Self::assemble(config, locks)
    }

    fn assemble(config: StoreConfig, locks: LockManager) -> Self {
        let backups = BackupRotator::new(config.backup.clone());
        let oplog = OperationLog::in_dir(&config.locks_dir);
        Self {
            config,
            locks,
            backups,
            oplog,
        }
    }

    /// This store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Read the document at `path`, or `default` if it does not exist.
    ///
    /// Lock-free and never blocks. A missing file or an empty file yields
    /// the default without creating anything on disk; content that fails to
    /// parse is a [`StoreError::CorruptDocument`], never silently replaced.
    pub fn read(&self, path: &Path, default: Document) -> StoreResult<Document> {
        match fs::read(path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                if text.trim().is_empty() {
                    return Ok(default);
                }
                serde_json::from_str(&text).map_err(|e| StoreError::CorruptDocument {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(default),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the document at `path` with `value`.
    pub fn write(&self, path: &Path, value: &Document) -> StoreResult<()> {
        let result = self.write_locked(path, value);
        self.oplog.record("write", path, outcome(&result));
        result
    }

    /// Atomically read-modify-write the document at `path`.
    ///
    /// `transform` receives the current value (or `default` if the document
    /// is absent) and must be a pure function of it -- no hidden I/O. The
    /// whole operation happens under one lock hold, so the transform never
    /// acts on a value another writer could invalidate in between. Returns
    /// the newly persisted value.
    pub fn update<F>(&self, path: &Path, default: Document, transform: F) -> StoreResult<Document>
    where
        F: FnOnce(Document) -> StoreResult<Document>,
    {
        let result = self.update_locked(path, default, transform);
        self.oplog.record("update", path, outcome(&result));
        result
    }

    /// Shallow-merge the top-level keys of `partial` into the document.
    ///
    /// An absent document merges into an empty object. Merging into or from
    /// a non-object is a [`StoreError::TypeMismatch`].
    pub fn merge(&self, path: &Path, partial: &Document) -> StoreResult<Document> {
        let result = self.update_locked(path, Document::Object(Default::default()), |current| {
            match slate_types::shallow_merge(current, partial) {
                MergeOutcome::Merged(merged) => Ok(merged),
                MergeOutcome::CurrentNotObject(found)
                | MergeOutcome::PartialNotObject(found) => Err(StoreError::TypeMismatch {
                    path: path.to_path_buf(),
                    expected: "object",
                    found,
                }),
            }
        });
        self.oplog.record("merge", path, outcome(&result));
        result
    }

    /// Remove orphaned lock markers. See [`LockManager::cleanup`].
    pub fn cleanup(&self, force: bool) -> StoreResult<usize> {
        Ok(self.locks.cleanup(force)?)
    }

    /// Current store activity: active lock count and operation log tail.
    pub fn status(&self) -> StoreResult<StoreStatus> {
        Ok(StoreStatus {
            active_locks: self.locks.active_count()?,
            recent_ops: self.oplog.tail(STATUS_TAIL_LINES)?,
        })
    }

    fn write_locked(&self, path: &Path, value: &Document) -> StoreResult<()> {
        let _lock = self.locks.acquire(path)?;
        self.persist(path, value)
    }

    fn update_locked<F>(
        &self,
        path: &Path,
        default: Document,
        transform: F,
    ) -> StoreResult<Document>
    where
        F: FnOnce(Document) -> StoreResult<Document>,
    {
        let _lock = self.locks.acquire(path)?;
        let current = self.read(path, default)?;
        let next = transform(current)?;
        self.persist(path, &next)?;
        Ok(next)
    }

    /// Backup, serialize, and atomically replace. Caller holds the lock.
    fn persist(&self, path: &Path, value: &Document) -> StoreResult<()> {
        self.backups.before_overwrite(path);

        let mut bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        bytes.push(b'\n');
        write_atomic(path, &bytes)?;

        debug!(document = %path.display(), "document persisted");
        Ok(())
    }
}

fn outcome<T>(result: &StoreResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(StoreError::LockTimeout { .. }) => "lock-timeout",
        Err(StoreError::CorruptDocument { .. }) => "corrupt",
        Err(StoreError::TypeMismatch { .. }) => "type-mismatch",
        Err(StoreError::Io(_)) => "io-error",
    }
}
