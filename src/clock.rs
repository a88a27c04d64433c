//! Injectable millisecond clock.
//!
//! The cache and the audit log read wall time; tests need to control it.
//! A [`Clock`] is a cheap cloneable handle around a time source. Production
//! code uses [`Clock::system()`]; tests use [`ManualClock`] to advance time
//! explicitly instead of sleeping.
//!
//! The evaluator does NOT use this - it only reads `ctx.timestamp`, which
//! the caller supplies.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A cloneable source of epoch-millisecond timestamps.
#[derive(Clone)]
pub struct Clock(Arc<dyn Fn() -> i64 + Send + Sync>);

impl Clock {
    /// Wall-clock time from `SystemTime`.
    #[must_use]
    pub fn system() -> Self {
        Self(Arc::new(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64
        }))
    }

    /// A clock frozen at a fixed instant.
    #[must_use]
    pub fn fixed(now_ms: i64) -> Self {
        Self(Arc::new(move || now_ms))
    }

    /// Current time in epoch milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> i64 {
        (self.0)()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Clock").field(&self.now_ms()).finish()
    }
}

/// A hand-driven clock for tests.
///
/// Keep the handle around to advance time; `clock()` hands out the [`Clock`]
/// view that components consume.
///
/// # Example
///
/// ```
/// use flag_engine::clock::ManualClock;
///
/// let manual = ManualClock::new(1_000);
/// let clock = manual.clock();
/// assert_eq!(clock.now_ms(), 1_000);
/// manual.advance(250);
/// assert_eq!(clock.now_ms(), 1_250);
/// ```
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    /// The [`Clock`] view of this handle.
    #[must_use]
    pub fn clock(&self) -> Clock {
        let now = Arc::clone(&self.now);
        Clock(Arc::new(move || now.load(Ordering::Acquire)))
    }

    /// Move time forward by `delta_ms`.
    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::AcqRel);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_recent() {
        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        let now = Clock::system().now_ms();
        assert!(now >= before);
    }

    #[test]
    fn fixed_clock_never_moves() {
        let clock = Clock::fixed(42);
        assert_eq!(clock.now_ms(), 42);
        assert_eq!(clock.now_ms(), 42);
    }

    #[test]
    fn manual_clock_advances() {
        let manual = ManualClock::new(100);
        let clock = manual.clock();

        assert_eq!(clock.now_ms(), 100);
        manual.advance(50);
        assert_eq!(clock.now_ms(), 150);
        manual.set(1_000);
        assert_eq!(clock.now_ms(), 1_000);
    }

    #[test]
    fn clones_share_the_same_source() {
        let manual = ManualClock::new(0);
        let a = manual.clock();
        let b = a.clone();

        manual.advance(7);
        assert_eq!(a.now_ms(), 7);
        assert_eq!(b.now_ms(), 7);
    }
}
