//! Diagnostic operation log.
//!
//! One line per mutating store operation, appended to `ops.log` in the
//! locks directory. Purely diagnostic: the `status` command shows its tail
//! so an operator can see what the store did last without trawling daemon
//! logs. Best-effort by design; the log is never a source of truth and a
//! logging failure never fails the operation it describes.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::warn;

/// File name of the operation log inside the locks directory.
const OPLOG_FILE: &str = "ops.log";

/// Append-only operation log with a tail view.
#[derive(Clone, Debug)]
pub struct OperationLog {
    path: PathBuf,
}

impl OperationLog {
    /// Operation log living inside `locks_dir`.
    pub fn in_dir(locks_dir: &Path) -> Self {
        Self {
            path: locks_dir.join(OPLOG_FILE),
        }
    }

    /// Record one operation. Best-effort: failures are logged and swallowed.
    pub fn record(&self, op: &str, document: &Path, outcome: &str) {
        let line = format!(
            "{} {op} {} {outcome}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            document.display(),
        );
        if let Err(e) = self.append(&line) {
            warn!(error = %e, "could not append to operation log");
        }
    }

    /// The last `n` lines of the log, oldest first. Missing log is empty.
    pub fn tail(&self, n: usize) -> io::Result<Vec<String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..].iter().map(|s| s.to_string()).collect())
    }

    fn append(&self, line: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_of_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = OperationLog::in_dir(dir.path());
        assert!(log.tail(10).unwrap().is_empty());
    }

    #[test]
    fn record_then_tail() {
        let dir = tempfile::tempdir().unwrap();
        let log = OperationLog::in_dir(dir.path());

        log.record("write", Path::new("/data/doc.json"), "ok");
        log.record("merge", Path::new("/data/doc.json"), "ok");

        let tail = log.tail(10).unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail[0].contains("write /data/doc.json ok"));
        assert!(tail[1].contains("merge /data/doc.json ok"));
    }

    #[test]
    fn tail_returns_only_the_last_n() {
        let dir = tempfile::tempdir().unwrap();
        let log = OperationLog::in_dir(dir.path());

        for i in 0..20 {
            log.record("update", Path::new("doc.json"), &format!("ok-{i}"));
        }
        let tail = log.tail(5).unwrap();
        assert_eq!(tail.len(), 5);
        assert!(tail[0].ends_with("ok-15"));
        assert!(tail[4].ends_with("ok-19"));
    }
}
