//! The host clock abstraction the meter is built over. Out of the core's
//! scope (§1) as a *source* of wall-clock time, but the engine needs a
//! concrete default and tests need a deterministic one, so both live here.

use std::cell::Cell;
use std::time::Instant;

/// Nanosecond-resolution wall clock with test fast-forward. The meter (§4.6)
/// is the only consumer; nothing else in the engine reads wall-clock time
/// directly.
pub trait ZombieClock {
    /// Elapsed nanoseconds since the clock was constructed.
    fn now_ns(&self) -> u64;
    /// Advance the clock's notion of "now" by `ns` without actually sleeping.
    /// Real clocks may choose to ignore callers that never call this; the
    /// test clock depends on it entirely.
    fn fast_forward(&self, ns: u64);
}

/// Real wall-clock time, measured from construction.
pub struct SystemClock {
    start: Instant,
    forwarded: Cell<u64>,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        SystemClock {
            start: Instant::now(),
            forwarded: Cell::new(0),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ZombieClock for SystemClock {
    fn now_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64 + self.forwarded.get()
    }

    fn fast_forward(&self, ns: u64) {
        self.forwarded.set(self.forwarded.get() + ns);
    }
}

/// A fully deterministic clock for tests: time only ever moves when
/// `fast_forward` is called.
#[derive(Debug, Default)]
pub struct TestClock {
    now: Cell<u64>,
}

impl TestClock {
    #[must_use]
    pub fn new() -> Self {
        TestClock { now: Cell::new(0) }
    }
}

impl ZombieClock for TestClock {
    fn now_ns(&self) -> u64 {
        self.now.get()
    }

    fn fast_forward(&self, ns: u64) {
        self.now.set(self.now.get() + ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_only_advances_on_fast_forward() {
        let clock = TestClock::new();
        assert_eq!(clock.now_ns(), 0);
        clock.fast_forward(100);
        assert_eq!(clock.now_ns(), 100);
        clock.fast_forward(50);
        assert_eq!(clock.now_ns(), 150);
    }

    #[test]
    fn system_clock_fast_forward_is_additive() {
        let clock = SystemClock::new();
        let before = clock.now_ns();
        clock.fast_forward(1_000_000);
        assert!(clock.now_ns() >= before + 1_000_000);
    }
}
