//! Advisory file locking for the slate document store.
//!
//! Every document path maps to exactly one lock marker file inside a
//! dedicated locks directory. The marker is created with exclusive-create
//! semantics (`O_CREAT | O_EXCL`), so two contending processes can never
//! both believe they hold the lock. Locking is cooperative: nothing stops a
//! process that bypasses this crate from writing the document directly, so
//! all callers must go through the store API.
//!
//! # Orphan recovery
//!
//! A marker records its owner's PID, the owner's process start time (a nonce
//! that distinguishes a recycled PID from the original owner), a per-process
//! sequence number, and the acquisition timestamp. If the recorded owner is
//! no longer alive, any other caller may reclaim the lock; reclamation logs
//! a warning (the previous holder did not release cleanly) and proceeds.
//!
//! # Pieces
//!
//! - [`LockManager`] / [`LockHandle`] -- acquire, release, cleanup.
//! - [`LockMarker`] -- the on-disk marker format and name derivation.
//! - [`Liveness`] -- injectable process-existence predicate.
//! - [`retry`] -- bounded exponential backoff with jitter over an
//!   injectable clock.

pub mod error;
pub mod liveness;
pub mod manager;
pub mod marker;
pub mod retry;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{LockError, LockResult};
pub use liveness::{Liveness, ProcLiveness};
pub use manager::{LockHandle, LockManager};
pub use marker::{marker_path, LockMarker};
pub use retry::{retry, Attempt, RetryError};
