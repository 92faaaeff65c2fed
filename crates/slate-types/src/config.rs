use std::path::PathBuf;
use std::time::Duration;

/// Retention policy for pre-overwrite document backups.
#[derive(Clone, Debug)]
pub struct BackupPolicy {
    /// Whether backups are taken at all.
    pub enabled: bool,
    /// Maximum number of backups kept per document (oldest pruned first).
    pub max_count: usize,
    /// Backups older than this are deleted regardless of count.
    pub max_age: Duration,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_count: 5,
            max_age: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
        }
    }
}

impl BackupPolicy {
    /// A policy that never takes backups.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Bounded retry/backoff parameters for lock acquisition.
///
/// Delays grow exponentially from `initial_delay` up to `max_delay`, with
/// uniform random jitter added so several daemons contending on the same hot
/// document do not retry in lockstep. The whole acquisition attempt is
/// bounded by `timeout`; it never blocks indefinitely.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Overall deadline for a single acquisition attempt.
    pub timeout: Duration,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the exponentially growing delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_600),
        }
    }
}

impl RetryPolicy {
    /// A policy with the given overall timeout and default backoff shape.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// Configuration for a document store instance.
///
/// Passed explicitly at construction; the store has no implicit global
/// state. Two store instances (in the same or different processes) given the
/// same `locks_dir` coordinate with each other through the filesystem.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory holding lock markers and the operation log.
    pub locks_dir: PathBuf,
    /// Pre-overwrite backup retention.
    pub backup: BackupPolicy,
    /// Lock acquisition retry/backoff parameters.
    pub retry: RetryPolicy,
}

impl StoreConfig {
    /// Create a configuration with default backup and retry policies.
    pub fn new(locks_dir: impl Into<PathBuf>) -> Self {
        Self {
            locks_dir: locks_dir.into(),
            backup: BackupPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the backup policy.
    pub fn with_backup(mut self, backup: BackupPolicy) -> Self {
        self.backup = backup;
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backup_policy_is_bounded() {
        let policy = BackupPolicy::default();
        assert!(policy.enabled);
        assert!(policy.max_count > 0);
        assert!(policy.max_age > Duration::ZERO);
    }

    #[test]
    fn disabled_backup_policy() {
        assert!(!BackupPolicy::disabled().enabled);
    }

    #[test]
    fn default_retry_policy_shape() {
        let policy = RetryPolicy::default();
        assert!(policy.initial_delay < policy.max_delay);
        assert!(policy.max_delay < policy.timeout);
    }

    #[test]
    fn with_timeout_keeps_backoff_shape() {
        let policy = RetryPolicy::with_timeout(Duration::from_millis(250));
        assert_eq!(policy.timeout, Duration::from_millis(250));
        assert_eq!(policy.initial_delay, RetryPolicy::default().initial_delay);
    }

    #[test]
    fn config_builders() {
        let config = StoreConfig::new("/tmp/locks")
            .with_backup(BackupPolicy::disabled())
            .with_retry(RetryPolicy::with_timeout(Duration::from_secs(1)));
        assert_eq!(config.locks_dir, PathBuf::from("/tmp/locks"));
        assert!(!config.backup.enabled);
        assert_eq!(config.retry.timeout, Duration::from_secs(1));
    }
}
