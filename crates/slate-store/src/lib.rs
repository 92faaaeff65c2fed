//! The slate document store.
//!
//! A small, filesystem-backed, lock-protected JSON document store used by
//! independent daemon processes to persist and mutate shared state. A
//! document is an arbitrary JSON value at a filesystem path; the store
//! guarantees the on-disk bytes are always a complete, syntactically valid
//! JSON document, even under crashes and concurrent writers.
//!
//! # Operations
//!
//! - [`DocumentStore::read`] -- lock-free; a reader sees either the old or
//!   the new complete content, never a mix (the atomic rename guarantees
//!   this without mutual exclusion).
//! - [`DocumentStore::write`] -- replace the document under the lock.
//! - [`DocumentStore::update`] -- read-modify-write under a single lock
//!   hold; the transform never sees a value that could be concurrently
//!   invalidated between the read and the write.
//! - [`DocumentStore::merge`] -- shallow top-level merge, sugar over
//!   `update`.
//!
//! # Design rules
//!
//! 1. The document's on-disk bytes are owned exclusively by the store; no
//!    caller writes the path directly.
//! 2. Every mutation goes through the atomic temp-file-and-rename writer.
//! 3. The store never silently discards an error; every operation returns
//!    an applied result or a typed error. Best-effort is reserved for the
//!    backup rotator's own bookkeeping and the diagnostic operation log,
//!    never for the primary write.

pub mod atomic;
pub mod backup;
pub mod error;
pub mod oplog;
pub mod store;

// Re-export primary types at crate root for ergonomic imports.
pub use backup::BackupRotator;
pub use error::{StoreError, StoreResult};
pub use oplog::OperationLog;
pub use store::{DocumentStore, StoreStatus};
