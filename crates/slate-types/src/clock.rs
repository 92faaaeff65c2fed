//! Injectable time source for retry/backoff logic.
//!
//! The retry driver only needs "what time is it" and "wait this long". Both
//! go through [`Clock`] so tests can drive backoff schedules with a fake
//! clock instead of real sleeping.

use std::time::{Duration, Instant};

/// Monotonic time source used by the retry driver.
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Block the caller for the given duration.
    fn sleep(&self, duration: Duration);
}

/// The real wall clock: `Instant::now` + `std::thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
