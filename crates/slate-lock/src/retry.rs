//! Bounded retry with exponential backoff and jitter.
//!
//! Replaces the ad-hoc polling loops the store's callers used to write by
//! hand. An attempt either produces a value, asks to be retried, or fails
//! outright. Delays double from the policy's initial delay up to its cap,
//! with uniform random jitter so concurrent callers contending on the same
//! resource do not retry in lockstep. The whole loop is bounded by the
//! policy's overall timeout.
//!
//! Timing goes through [`Clock`] so tests can drive the schedule with a
//! fake clock and no real sleeping.

use std::time::Duration;

use rand::Rng;

use slate_types::{Clock, RetryPolicy};

/// Outcome of a single attempt.
pub enum Attempt<T> {
    /// The operation succeeded with this value.
    Ready(T),
    /// The resource is busy; try again after a backoff delay.
    Retry,
}

/// Why the retry loop stopped without producing a value.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The overall timeout elapsed before any attempt succeeded.
    #[error("timed out after {waited_ms} ms ({attempts} attempts)")]
    Elapsed { waited_ms: u64, attempts: u32 },

    /// An attempt failed with a non-retryable error.
    #[error(transparent)]
    Failed(E),
}

/// Run `attempt` until it is ready, the policy's timeout elapses, or it
/// fails with a hard error.
///
/// The first attempt runs immediately; only `Attempt::Retry` outcomes sleep.
pub fn retry<T, E, F>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<Attempt<T>, E>,
{
    let start = clock.now();
    let deadline = start + policy.timeout;
    let mut delay = policy.initial_delay;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match attempt() {
            Ok(Attempt::Ready(value)) => return Ok(value),
            Ok(Attempt::Retry) => {}
            Err(e) => return Err(RetryError::Failed(e)),
        }

        let now = clock.now();
        if now >= deadline {
            return Err(RetryError::Elapsed {
                waited_ms: (now - start).as_millis() as u64,
                attempts,
            });
        }

        let mut wait = delay + jitter(delay);
        if now + wait > deadline {
            wait = deadline - now;
        }
        clock.sleep(wait);

        delay = (delay * 2).min(policy.max_delay);
    }
}

/// Uniform jitter in `[0, delay / 2]`.
fn jitter(delay: Duration) -> Duration {
    let half_ms = delay.as_millis() as u64 / 2;
    if half_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=half_ms))
}
