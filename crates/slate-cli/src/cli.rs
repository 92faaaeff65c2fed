use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "slate",
    about = "Lock-protected JSON document store for cooperating daemons",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory for lock markers and the operation log.
    #[arg(long, global = true, default_value = ".slate/locks")]
    pub locks_dir: PathBuf,

    /// Maximum time to wait for a contended lock, in milliseconds.
    #[arg(long, global = true, default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// Pre-overwrite backups kept per document (0 disables backups).
    #[arg(long, global = true, default_value_t = 5)]
    pub backups: usize,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Read a document, printing its JSON value
    Read(ReadArgs),
    /// Replace a document with the given JSON value
    Write(WriteArgs),
    /// Apply a transform to a document under its lock
    Update(UpdateArgs),
    /// Shallow-merge a JSON object into a document
    Merge(MergeArgs),
    /// Remove lock markers left behind by dead processes
    Cleanup(CleanupArgs),
    /// Show active locks and recent operations
    Status(StatusArgs),
}

#[derive(Args)]
pub struct ReadArgs {
    /// Document path.
    pub path: PathBuf,
    /// JSON value returned when the document does not exist.
    pub default: Option<String>,
}

#[derive(Args)]
pub struct WriteArgs {
    /// Document path.
    pub path: PathBuf,
    /// New JSON value.
    pub json: String,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Document path.
    pub path: PathBuf,
    /// Transform: "incr KEY [DELTA]", "set KEY JSON", or "remove KEY".
    pub spec: String,
}

#[derive(Args)]
pub struct MergeArgs {
    /// Document path.
    pub path: PathBuf,
    /// JSON object whose top-level keys are merged in.
    pub json: String,
}

#[derive(Args)]
pub struct CleanupArgs {
    /// Also remove fresh dead-owner markers and unparseable markers.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct StatusArgs {}
