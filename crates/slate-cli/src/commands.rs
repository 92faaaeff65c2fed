//! Command dispatch and the small transform language for `slate update`.

use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use serde_json::json;
use thiserror::Error;

use slate_store::{DocumentStore, StoreError};
use slate_types::{json_kind, BackupPolicy, Document, RetryPolicy, StoreConfig};

use crate::cli::{Cli, Command, OutputFormat};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CliError {
    /// Process exit code for this error. `0` is reserved for success.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Usage(_) => 1,
            CliError::Store(StoreError::LockTimeout { .. }) => 2,
            CliError::Store(StoreError::CorruptDocument { .. }) => 3,
            CliError::Store(StoreError::TypeMismatch { .. }) => 4,
            CliError::Store(StoreError::Io(_)) => 5,
        }
    }
}

pub fn run_command(cli: Cli) -> Result<(), CliError> {
    let backup = if cli.backups == 0 {
        BackupPolicy::disabled()
    } else {
        BackupPolicy {
            max_count: cli.backups,
            ..BackupPolicy::default()
        }
    };
    let config = StoreConfig::new(cli.locks_dir)
        .with_backup(backup)
        .with_retry(RetryPolicy::with_timeout(Duration::from_millis(
            cli.timeout_ms,
        )));
    let store = DocumentStore::new(config);
    let format = cli.format;

    match cli.command {
        Command::Read(args) => {
            let default = match args.default {
                Some(text) => parse_json(&text)?,
                None => json!(null),
            };
            let value = store.read(&args.path, default)?;
            print_document(&value, &format);
        }
        Command::Write(args) => {
            let value = parse_json(&args.json)?;
            store.write(&args.path, &value)?;
            match format {
                OutputFormat::Text => {
                    println!("{} {}", "wrote".green().bold(), args.path.display());
                }
                OutputFormat::Json => {
                    println!("{}", json!({"status": "ok", "path": args.path}));
                }
            }
        }
        Command::Update(args) => {
            let transform = TransformSpec::parse(&args.spec)?;
            let path = args.path.clone();
            let updated = store.update(&args.path, json!({}), move |current| {
                transform.apply(&path, current)
            })?;
            print_document(&updated, &format);
        }
        Command::Merge(args) => {
            let partial = parse_json(&args.json)?;
            let merged = store.merge(&args.path, &partial)?;
            print_document(&merged, &format);
        }
        Command::Cleanup(args) => {
            let removed = store.cleanup(args.force)?;
            match format {
                OutputFormat::Text => {
                    println!(
                        "{} {} stale lock marker(s)",
                        "removed".green().bold(),
                        removed
                    );
                }
                OutputFormat::Json => {
                    println!("{}", json!({"removed": removed}));
                }
            }
        }
        Command::Status(_) => {
            let status = store.status()?;
            match format {
                OutputFormat::Text => {
                    println!("{} {}", "active locks:".bold(), status.active_locks);
                    if status.recent_ops.is_empty() {
                        println!("{}", "no recorded operations".dimmed());
                    } else {
                        println!("{}", "recent operations:".bold());
                        for line in &status.recent_ops {
                            println!("  {line}");
                        }
                    }
                }
                OutputFormat::Json => {
                    let rendered = serde_json::to_string(&status)
                        .map_err(|e| CliError::Usage(e.to_string()))?;
                    println!("{rendered}");
                }
            }
        }
    }
    Ok(())
}

fn parse_json(text: &str) -> Result<Document, CliError> {
    serde_json::from_str(text).map_err(|e| CliError::Usage(format!("invalid JSON argument: {e}")))
}

fn print_document(value: &Document, format: &OutputFormat) {
    match format {
        OutputFormat::Text => match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{value}"),
        },
        OutputFormat::Json => println!("{value}"),
    }
}

/// A parsed `slate update` transform.
///
/// The language is deliberately tiny: each invocation applies exactly one
/// mutation to one top-level key, and anything structural beyond that is a
/// job for `write` or `merge` with a full JSON argument.
#[derive(Clone, Debug, PartialEq)]
pub enum TransformSpec {
    /// `incr KEY [DELTA]` -- add `delta` to an integer key, absent reads 0.
    Incr { key: String, delta: i64 },
    /// `set KEY JSON` -- replace one top-level key with a JSON value.
    Set { key: String, value: Document },
    /// `remove KEY` -- delete one top-level key, absent is a no-op.
    Remove { key: String },
}

impl TransformSpec {
    pub fn parse(spec: &str) -> Result<Self, CliError> {
        let mut words = spec.split_whitespace();
        let verb = words
            .next()
            .ok_or_else(|| CliError::Usage("empty transform".into()))?;
        match verb {
            "incr" => {
                let key = expect_key(words.next(), "incr")?;
                let delta = match words.next() {
                    Some(raw) => raw.parse::<i64>().map_err(|_| {
                        CliError::Usage(format!("incr delta must be an integer, got {raw:?}"))
                    })?,
                    None => 1,
                };
                expect_end(words.next(), "incr")?;
                Ok(TransformSpec::Incr {
                    key: key.to_owned(),
                    delta,
                })
            }
            "set" => {
                let key = expect_key(words.next(), "set")?;
                // The value is everything after the key, so JSON containing
                // spaces survives.
                let rest = words.collect::<Vec<_>>().join(" ");
                if rest.is_empty() {
                    return Err(CliError::Usage("set requires a JSON value".into()));
                }
                Ok(TransformSpec::Set {
                    key: key.to_owned(),
                    value: parse_json(&rest)?,
                })
            }
            "remove" => {
                let key = expect_key(words.next(), "remove")?;
                expect_end(words.next(), "remove")?;
                Ok(TransformSpec::Remove { key: key.to_owned() })
            }
            other => Err(CliError::Usage(format!(
                "unknown transform {other:?}; expected incr, set, or remove"
            ))),
        }
    }

    /// Apply this transform to `current`, which must be a JSON object.
    pub fn apply(self, path: &Path, current: Document) -> Result<Document, StoreError> {
        let Document::Object(mut map) = current else {
            return Err(StoreError::TypeMismatch {
                path: path.to_path_buf(),
                expected: "object",
                found: json_kind(&current),
            });
        };
        match self {
            TransformSpec::Incr { key, delta } => {
                let current = match map.get(&key) {
                    None | Some(Document::Null) => 0,
                    Some(value) => value.as_i64().ok_or_else(|| StoreError::TypeMismatch {
                        path: path.to_path_buf(),
                        expected: "integer",
                        found: json_kind(value),
                    })?,
                };
                map.insert(key, json!(current + delta));
            }
            TransformSpec::Set { key, value } => {
                map.insert(key, value);
            }
            TransformSpec::Remove { key } => {
                map.remove(&key);
            }
        }
        Ok(Document::Object(map))
    }
}

fn expect_key<'a>(word: Option<&'a str>, verb: &str) -> Result<&'a str, CliError> {
    word.ok_or_else(|| CliError::Usage(format!("{verb} requires a key")))
}

fn expect_end(word: Option<&str>, verb: &str) -> Result<(), CliError> {
    match word {
        None => Ok(()),
        Some(extra) => Err(CliError::Usage(format!(
            "unexpected trailing argument {extra:?} after {verb}"
        ))),
    }
}
