//! Foundation types for the slate document store.
//!
//! slate is a filesystem-backed, lock-protected JSON document store used by
//! independent daemon processes to share mutable state without corrupting
//! each other's writes. This crate holds the pieces every other slate crate
//! depends on:
//!
//! - [`StoreConfig`] -- explicit configuration passed at construction
//!   (locks directory, backup retention, retry/backoff parameters). There
//!   are no ambient environment variables and no process-wide singletons.
//! - [`Document`] -- the dynamically-typed JSON value at the store boundary.
//!   The store is schema-agnostic by design; callers impose their own typed
//!   views on top.
//! - [`Clock`] -- the time source used by the retry driver, injectable so
//!   backoff logic is testable without real sleeping.

pub mod clock;
pub mod config;
pub mod document;

// Re-export primary types at crate root for ergonomic imports.
pub use clock::{Clock, SystemClock};
pub use config::{BackupPolicy, RetryPolicy, StoreConfig};
pub use document::{json_kind, shallow_merge, Document, MergeOutcome};
