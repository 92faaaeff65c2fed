//! Pre-overwrite backup rotation.
//!
//! Before a document is overwritten, its previous version may be copied to
//! a timestamped sibling (`<name>.<timestamp>.<rand>.bak`). Retention is
//! bounded two ways: a maximum count per document (oldest pruned first) and
//! a maximum age (expired backups deleted regardless of count).
//!
//! Everything here is best-effort. A backup failure is logged but never
//! blocks the write it was protecting; durability of the *new* value takes
//! priority over backup hygiene.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use rand::Rng;
use tracing::{debug, warn};

use slate_types::BackupPolicy;

/// Suffix shared by all backup files.
const BACKUP_SUFFIX: &str = ".bak";

/// Rotates pre-overwrite backups according to a [`BackupPolicy`].
#[derive(Clone, Debug)]
pub struct BackupRotator {
    policy: BackupPolicy,
}

impl BackupRotator {
    pub fn new(policy: BackupPolicy) -> Self {
        Self { policy }
    }

    /// Preserve the current version of `path` before it is overwritten,
    /// then enforce the retention bounds. Best-effort: failures are logged
    /// and swallowed.
    pub fn before_overwrite(&self, path: &Path) {
        if !self.policy.enabled || !path.exists() {
            return;
        }
        if let Err(e) = self.copy_to_backup(path) {
            warn!(
                document = %path.display(),
                error = %e,
                "could not create backup; continuing with the write"
            );
        }
        if let Err(e) = self.prune(path) {
            warn!(
                document = %path.display(),
                error = %e,
                "backup pruning failed"
            );
        }
    }

    /// Existing backups for `path`, newest first.
    pub fn backups_for(path: &Path) -> io::Result<Vec<PathBuf>> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Ok(Vec::new());
        };
        let prefix = format!("{name}.");

        let mut backups = Vec::new();
        for entry in fs::read_dir(parent)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with(&prefix) && file_name.ends_with(BACKUP_SUFFIX) {
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                backups.push((modified, entry.path()));
            }
        }
        backups.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(backups.into_iter().map(|(_, p)| p).collect())
    }

    fn copy_to_backup(&self, path: &Path) -> io::Result<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let disambiguator: u16 = rand::thread_rng().gen();
        let backup = path.with_file_name(format!(
            "{name}.{stamp}.{disambiguator:04x}{BACKUP_SUFFIX}"
        ));

        fs::copy(path, &backup)?;
        debug!(backup = %backup.display(), "backup created");
        Ok(())
    }

    fn prune(&self, path: &Path) -> io::Result<()> {
        let backups = Self::backups_for(path)?;

        // Count bound: drop everything beyond the newest max_count.
        for stale in backups.iter().skip(self.policy.max_count) {
            debug!(backup = %stale.display(), "pruning backup beyond count bound");
            remove_quietly(stale);
        }

        // Age bound: drop expired backups among the survivors.
        for kept in backups.iter().take(self.policy.max_count) {
            if backup_age(kept).is_some_and(|age| age > self.policy.max_age) {
                debug!(backup = %kept.display(), "pruning expired backup");
                remove_quietly(kept);
            }
        }
        Ok(())
    }
}

fn backup_age(path: &Path) -> Option<Duration> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()?
        .elapsed()
        .ok()
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(backup = %path.display(), error = %e, "failed to remove backup");
        }
    }
}
