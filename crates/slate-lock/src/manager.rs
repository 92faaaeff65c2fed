//! Lock acquisition, release, and orphan cleanup.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use slate_types::{Clock, RetryPolicy, SystemClock};

use crate::error::{LockError, LockResult};
use crate::liveness::{Liveness, ProcLiveness};
use crate::marker::{marker_path, LockMarker};
use crate::retry::{retry, Attempt, RetryError};

/// Markers that cannot be parsed are treated as contended (a racing owner
/// may still be writing the body) until they reach this age, after which
/// they are reclaimed. Also the minimum age for non-forced cleanup.
const STALE_MARKER_AGE: Duration = Duration::from_secs(60);

/// Manages advisory lock markers for document paths.
///
/// Marker creation uses exclusive-create semantics, so of any number of
/// contending processes at most one succeeds; the rest back off and retry
/// under the configured [`RetryPolicy`]. Ownership is advisory: it is only
/// meaningful to callers that also go through this manager.
pub struct LockManager {
    locks_dir: PathBuf,
    retry: RetryPolicy,
    liveness: Arc<dyn Liveness>,
    clock: Arc<dyn Clock>,
}

/// A held lock. Releases the marker on [`LockHandle::release`] or on drop.
///
/// Release removes the marker only if it still records this handle's owner
/// and sequence number. If the lock was reclaimed out from under an
/// overrunning holder, releasing the stale handle leaves the new holder's
/// marker untouched.
#[derive(Debug)]
pub struct LockHandle {
    marker_path: PathBuf,
    document: PathBuf,
    owner: LockMarker,
    released: bool,
}

impl LockManager {
    /// Create a manager with the platform liveness check and real clock.
    pub fn new(locks_dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self::with_parts(locks_dir, retry, Arc::new(ProcLiveness), Arc::new(SystemClock))
    }

    /// Create a manager with injected liveness and clock (used by tests and
    /// platform ports).
    pub fn with_parts(
        locks_dir: impl Into<PathBuf>,
        retry: RetryPolicy,
        liveness: Arc<dyn Liveness>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            locks_dir: locks_dir.into(),
            retry,
            liveness,
            clock,
        }
    }

    /// Directory holding this manager's lock markers.
    pub fn locks_dir(&self) -> &Path {
        &self.locks_dir
    }

    /// Acquire the lock for `document`, retrying with backoff until the
    /// policy's timeout elapses.
    pub fn acquire(&self, document: &Path) -> LockResult<LockHandle> {
        fs::create_dir_all(&self.locks_dir)?;
        let marker = marker_path(&self.locks_dir, document);

        retry(&self.retry, self.clock.as_ref(), || {
            self.try_acquire(document, &marker)
        })
        .map_err(|e| match e {
            RetryError::Elapsed { waited_ms, attempts } => LockError::Timeout {
                path: document.to_path_buf(),
                waited_ms,
                attempts,
            },
            RetryError::Failed(e) => e,
        })
    }

    /// Release a held lock. Equivalent to dropping the handle, but surfaces
    /// I/O errors instead of swallowing them.
    pub fn release(&self, mut handle: LockHandle) -> LockResult<()> {
        handle.release_inner()
    }

    /// Remove lock markers left behind by dead owners.
    ///
    /// Without `force`, only markers whose owner is dead *and* that are
    /// older than the stale threshold are removed. With `force`, all
    /// dead-owner markers are removed regardless of age, along with
    /// unparseable ones. Markers with live owners are never touched.
    /// Returns the number of markers removed.
    pub fn cleanup(&self, force: bool) -> LockResult<usize> {
        let entries = match fs::read_dir(&self.locks_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }
            match read_marker(&path) {
                Ok(marker) => {
                    if self.liveness.is_alive(&marker) {
                        continue;
                    }
                    let old_enough = marker.age().to_std().unwrap_or(Duration::ZERO)
                        >= STALE_MARKER_AGE;
                    if (force || old_enough) && remove_if_matches(&path, &marker)? {
                        warn!(
                            marker = %path.display(),
                            pid = marker.pid,
                            "removed orphaned lock marker (owner is dead)"
                        );
                        removed += 1;
                    }
                }
                Err(LockError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {}
                Err(LockError::MalformedMarker { .. }) if force => {
                    warn!(marker = %path.display(), "removing unparseable lock marker");
                    remove_if_present(&path)?;
                    removed += 1;
                }
                Err(LockError::MalformedMarker { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        debug!(removed, force, "lock cleanup complete");
        Ok(removed)
    }

    /// Number of lock markers currently present.
    pub fn active_count(&self) -> LockResult<usize> {
        let entries = match fs::read_dir(&self.locks_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("lock") {
                count += 1;
            }
        }
        Ok(count)
    }

    /// One acquisition attempt: create the marker exclusively, or inspect
    /// the existing one for orphan reclamation.
    fn try_acquire(
        &self,
        document: &Path,
        marker: &Path,
    ) -> Result<Attempt<LockHandle>, LockError> {
        match OpenOptions::new().write(true).create_new(true).open(marker) {
            Ok(mut file) => {
                let owner = LockMarker::for_current_process();
                let body = serde_json::to_vec(&owner)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                if let Err(e) = file.write_all(&body).and_then(|()| file.sync_all()) {
                    // Never leave a half-written marker we claim to own.
                    let _ = fs::remove_file(marker);
                    return Err(e.into());
                }
                debug!(
                    document = %document.display(),
                    sequence = owner.sequence,
                    "lock acquired"
                );
                Ok(Attempt::Ready(LockHandle {
                    marker_path: marker.to_path_buf(),
                    document: document.to_path_buf(),
                    owner,
                    released: false,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                self.inspect_contended(document, marker)?;
                Ok(Attempt::Retry)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The marker already exists: reclaim it if its owner is dead, or leave
    /// it for the backoff loop.
    fn inspect_contended(&self, document: &Path, marker: &Path) -> LockResult<()> {
        match read_marker(marker) {
            Ok(recorded) => {
                if !self.liveness.is_alive(&recorded)
                    && remove_if_matches(marker, &recorded)?
                {
                    warn!(
                        document = %document.display(),
                        pid = recorded.pid,
                        "reclaimed orphaned lock (previous holder did not release cleanly)"
                    );
                }
            }
            Err(LockError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                // Released between our create attempt and the read.
            }
            Err(LockError::MalformedMarker { .. }) => {
                // Possibly a racing owner mid-write; reclaim only once the
                // file is old enough that no writer can still be at it.
                if marker_file_age(marker)?.is_some_and(|age| age >= STALE_MARKER_AGE) {
                    warn!(
                        document = %document.display(),
                        "reclaiming stale unparseable lock marker"
                    );
                    remove_if_present(marker)?;
                }
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

impl LockHandle {
    /// The document path this lock protects.
    pub fn document(&self) -> &Path {
        &self.document
    }

    /// Sequence number issued for this acquisition.
    pub fn sequence(&self) -> u64 {
        self.owner.sequence
    }

    fn release_inner(&mut self) -> LockResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match read_marker(&self.marker_path) {
            Ok(recorded) if recorded.same_owner(&self.owner) => {
                remove_if_present(&self.marker_path)?;
                debug!(document = %self.document.display(), "lock released");
                Ok(())
            }
            Ok(_) => {
                // Someone reclaimed the lock while we held it (e.g. after a
                // long stall); the marker now belongs to them.
                warn!(
                    document = %self.document.display(),
                    "lock was reclaimed before release; leaving new owner's marker"
                );
                Ok(())
            }
            Err(LockError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(LockError::MalformedMarker { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!(
                document = %self.document.display(),
                error = %e,
                "failed to release lock on drop"
            );
        }
    }
}

/// Read and decode a marker file.
fn read_marker(path: &Path) -> LockResult<LockMarker> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| LockError::MalformedMarker {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Age of the marker file itself, from filesystem mtime. `None` if the
/// marker disappeared in the meantime (the holder released, or another
/// contender reclaimed it first).
fn marker_file_age(path: &Path) -> LockResult<Option<Duration>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.modified()?.elapsed().unwrap_or(Duration::ZERO))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Delete `path` only if it still records exactly the owner the caller
/// observed. Returns whether the marker was removed.
///
/// Between a contender deciding a marker is orphaned and its unlink, a
/// faster contender may have reclaimed the lock and written its own marker.
/// Re-reading just before the unlink makes a stale reclaimer see the new
/// holder's record (different pid, sequence, and acquisition time) and back
/// off instead of deleting a live lock.
fn remove_if_matches(path: &Path, observed: &LockMarker) -> LockResult<bool> {
    match read_marker(path) {
        Ok(current) if current == *observed => {
            remove_if_present(path)?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(LockError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(LockError::MalformedMarker { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

fn remove_if_present(path: &Path) -> LockResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Liveness fake: every recorded owner except this process is dead.
    struct OnlySelfAlive;

    impl Liveness for OnlySelfAlive {
        fn is_alive(&self, marker: &LockMarker) -> bool {
            marker.pid == std::process::id()
        }
    }

    /// Liveness fake: everyone is dead.
    struct EveryoneDead;

    impl Liveness for EveryoneDead {
        fn is_alive(&self, _marker: &LockMarker) -> bool {
            false
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            initial_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(10),
        }
    }

    fn manager_with(dir: &Path, liveness: Arc<dyn Liveness>) -> LockManager {
        LockManager::with_parts(dir, fast_retry(), liveness, Arc::new(SystemClock))
    }

    fn write_foreign_marker(dir: &Path, document: &Path, pid: u32, age_secs: i64) -> PathBuf {
        let path = marker_path(dir, document);
        fs::create_dir_all(dir).unwrap();
        let marker = LockMarker {
            pid,
            pid_start: 1,
            sequence: 99,
            acquired_at: Utc::now() - chrono::Duration::seconds(age_secs),
        };
        fs::write(&path, serde_json::to_vec(&marker).unwrap()).unwrap();
        path
    }

    #[test]
    fn acquire_creates_marker_and_release_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), Arc::new(OnlySelfAlive));
        let doc = dir.path().join("doc.json");

        let handle = manager.acquire(&doc).unwrap();
        let marker = marker_path(dir.path(), &doc);
        assert!(marker.exists());
        assert_eq!(manager.active_count().unwrap(), 1);

        manager.release(handle).unwrap();
        assert!(!marker.exists());
        assert_eq!(manager.active_count().unwrap(), 0);
    }

    #[test]
    fn drop_releases_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), Arc::new(OnlySelfAlive));
        let doc = dir.path().join("doc.json");

        {
            let _handle = manager.acquire(&doc).unwrap();
            assert_eq!(manager.active_count().unwrap(), 1);
        }
        assert_eq!(manager.active_count().unwrap(), 0);
    }

    #[test]
    fn contended_acquire_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), Arc::new(OnlySelfAlive));
        let doc = dir.path().join("doc.json");

        let _held = manager.acquire(&doc).unwrap();
        let err = manager.acquire(&doc).unwrap_err();
        match err {
            LockError::Timeout { path, attempts, .. } => {
                assert_eq!(path, doc);
                assert!(attempts >= 2);
            }
            other => panic!("expected Timeout, got {other}"),
        }
    }

    #[test]
    fn orphaned_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.json");
        write_foreign_marker(dir.path(), &doc, 4_000_000, 0);

        let manager = manager_with(dir.path(), Arc::new(OnlySelfAlive));
        let handle = manager.acquire(&doc).unwrap();
        assert_eq!(handle.document(), doc);
    }

    #[test]
    fn stale_handle_does_not_release_reclaimed_lock() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.json");
        let manager = manager_with(dir.path(), Arc::new(OnlySelfAlive));

        let stale = manager.acquire(&doc).unwrap();

        // Simulate reclamation: replace the marker with a different owner.
        let marker = write_foreign_marker(dir.path(), &doc, std::process::id(), 0);

        manager.release(stale).unwrap();
        assert!(marker.exists(), "new owner's marker must survive");
    }

    #[test]
    fn cleanup_skips_fresh_dead_markers_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.json");
        write_foreign_marker(dir.path(), &doc, 4_000_000, 0);

        let manager = manager_with(dir.path(), Arc::new(EveryoneDead));
        assert_eq!(manager.cleanup(false).unwrap(), 0);
        assert_eq!(manager.cleanup(true).unwrap(), 1);
    }

    #[test]
    fn cleanup_removes_old_dead_markers() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.json");
        write_foreign_marker(dir.path(), &doc, 4_000_000, 3_600);

        let manager = manager_with(dir.path(), Arc::new(EveryoneDead));
        assert_eq!(manager.cleanup(false).unwrap(), 1);
        assert_eq!(manager.active_count().unwrap(), 0);
    }

    #[test]
    fn cleanup_never_touches_live_markers() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.json");
        let manager = manager_with(dir.path(), Arc::new(OnlySelfAlive));

        let _held = manager.acquire(&doc).unwrap();
        assert_eq!(manager.cleanup(true).unwrap(), 0);
        assert_eq!(manager.active_count().unwrap(), 1);
    }

    #[test]
    fn cleanup_force_removes_unparseable_markers() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join("garbage-0000.lock"), b"not json").unwrap();

        let manager = manager_with(dir.path(), Arc::new(EveryoneDead));
        assert_eq!(manager.cleanup(false).unwrap(), 0);
        assert_eq!(manager.cleanup(true).unwrap(), 1);
    }

    #[test]
    fn cleanup_on_missing_dir_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(&dir.path().join("nope"), Arc::new(EveryoneDead));
        assert_eq!(manager.cleanup(true).unwrap(), 0);
        assert_eq!(manager.active_count().unwrap(), 0);
    }

    #[test]
    fn reclamation_skips_marker_replaced_since_observation() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.json");
        let path = write_foreign_marker(dir.path(), &doc, 4_000_000, 120);
        let observed = read_marker(&path).unwrap();

        // A faster contender reclaimed the lock and wrote its own marker
        // while we were deciding; our observation is stale.
        let new_holder = LockMarker::for_current_process();
        fs::write(&path, serde_json::to_vec(&new_holder).unwrap()).unwrap();

        assert!(!remove_if_matches(&path, &observed).unwrap());
        assert!(path.exists(), "new holder's marker must survive");
        assert_eq!(read_marker(&path).unwrap(), new_holder);
    }

    #[test]
    fn reclamation_removes_marker_matching_observation() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.json");
        let path = write_foreign_marker(dir.path(), &doc, 4_000_000, 120);
        let observed = read_marker(&path).unwrap();

        assert!(remove_if_matches(&path, &observed).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn vanished_marker_has_no_age() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone-0000.lock");
        assert_eq!(marker_file_age(&missing).unwrap(), None);
    }

    #[test]
    fn cleanup_propagates_unreadable_marker_errors() {
        let dir = tempfile::tempdir().unwrap();
        // A directory with the marker extension cannot be read as a file;
        // that is an I/O failure, not an unparseable marker.
        let odd = dir.path().join("odd-0000.lock");
        fs::create_dir(&odd).unwrap();

        let manager = manager_with(dir.path(), Arc::new(EveryoneDead));
        assert!(manager.cleanup(true).is_err());
        assert!(odd.exists(), "cleanup must not touch what it cannot read");
    }

    #[test]
    fn sequences_differ_across_acquisitions() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), Arc::new(OnlySelfAlive));
        let doc = dir.path().join("doc.json");

        let first = manager.acquire(&doc).unwrap();
        let seq1 = first.sequence();
        manager.release(first).unwrap();

        let second = manager.acquire(&doc).unwrap();
        assert!(second.sequence() > seq1);
    }
}
