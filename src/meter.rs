//! §4.6: a stack-structured wall-clock measurement that subtracts nested-bind
//! time from its enclosing bind, so per-bind `time_taken` is exclusive.

use std::cell::RefCell;
use std::rc::Rc;

use crate::clock::ZombieClock;

struct Frame {
    constructed_time: u64,
    skipping_time: u64,
}

/// `ZombieMeter` in the source. Holds a stack of frames over a base clock.
pub struct Meter {
    clock: Rc<dyn ZombieClock>,
    stack: RefCell<Vec<Frame>>,
}

impl Meter {
    #[must_use]
    pub fn new(clock: Rc<dyn ZombieClock>) -> Self {
        let base = clock.now_ns();
        Meter {
            clock,
            stack: RefCell::new(vec![Frame {
                constructed_time: base,
                skipping_time: 0,
            }]),
        }
    }

    fn raw_time(&self) -> u64 {
        self.clock.now_ns()
    }

    /// Elapsed time on the current (top) frame, net of nested blocks already
    /// closed underneath it.
    #[must_use]
    pub fn time(&self) -> u64 {
        let stack = self.stack.borrow();
        let top = stack.last().expect("meter stack is never empty");
        self.raw_time() - top.constructed_time - top.skipping_time
    }

    /// Push a frame, run `f`, pop, and fold the popped frame's elapsed time
    /// into the enclosing frame's `skipping_time` — so the enclosing bind's
    /// `time()` does not double-count time spent inside `f`.
    pub fn block<R>(&self, f: impl FnOnce() -> R) -> R {
        let constructed_time = self.raw_time();
        self.stack.borrow_mut().push(Frame {
            constructed_time,
            skipping_time: 0,
        });
        let result = f();
        let popped = self
            .stack
            .borrow_mut()
            .pop()
            .expect("pushed frame must still be present");
        let elapsed = self.raw_time() - popped.constructed_time;
        if let Some(parent) = self.stack.borrow_mut().last_mut() {
            parent.skipping_time += elapsed;
        }
        result
    }

    /// Like `block`, but also returns the elapsed exclusive time measured on
    /// the top frame around the call to `f`.
    pub fn measured<R>(&self, f: impl FnOnce() -> R) -> (R, u64) {
        let before = self.time();
        let result = self.block(f);
        let after = self.time();
        (result, after - before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    #[test]
    fn nested_block_time_is_subtracted_from_outer() {
        let clock = Rc::new(TestClock::new());
        let meter = Meter::new(clock.clone());

        clock.fast_forward(10);
        let outer_before = meter.time();
        meter.block(|| {
            clock.fast_forward(4);
        });
        clock.fast_forward(6);
        let outer_after = meter.time();

        // Outer frame sees 10 (pre) + 6 (post) = 16 elapsed; the 4 spent in
        // the nested block was subtracted, not double-counted.
        assert_eq!(outer_after - outer_before, 6);
        let _ = outer_before;
    }

    #[test]
    fn measured_reports_only_time_spent_in_closure() {
        let clock = Rc::new(TestClock::new());
        let meter = Meter::new(clock.clone());

        let (value, elapsed) = meter.measured(|| {
            clock.fast_forward(25);
            7
        });
        assert_eq!(value, 7);
        assert_eq!(elapsed, 25);
    }

    #[test]
    fn meter_subtraction_law_a_around_b() {
        // For nested blocks of elapsed `a` around nested elapsed `b`, the
        // outer block reports `a`, not `a + b`.
        let clock = Rc::new(TestClock::new());
        let meter = Meter::new(clock.clone());

        let (_, outer_elapsed) = meter.measured(|| {
            clock.fast_forward(3); // part of outer's own `a`
            meter.block(|| {
                clock.fast_forward(100); // nested `b`, must not leak out
            });
            clock.fast_forward(4); // rest of outer's own `a`
        });
        assert_eq!(outer_elapsed, 7);
    }
}
