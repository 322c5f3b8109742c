/*!
 * Barrier and Latch
 *
 * One-shot rendezvous points built on a parking_lot mutex and condvar.
 */

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// One-shot arrival barrier
///
/// Every caller of [`wait`](Self::wait) blocks until `count` callers have
/// arrived. Later callers pass straight through.
#[derive(Debug)]
pub struct Barrier {
    remaining: Mutex<usize>,
    cv: Condvar,
}

impl Barrier {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            cv: Condvar::new(),
        }
    }

    /// Arrive and wait for the others
    ///
    /// Returns `true` for the caller whose arrival released the barrier.
    pub fn wait(&self) -> bool {
        let mut remaining = self.remaining.lock();
        match *remaining {
            0 => false,
            1 => {
                *remaining = 0;
                self.cv.notify_all();
                true
            }
            _ => {
                *remaining -= 1;
                self.cv.wait_while(&mut remaining, |r| *r > 0);
                false
            }
        }
    }
}

/// Count-down latch
#[derive(Debug)]
pub struct Latch {
    remaining: Mutex<usize>,
    cv: Condvar,
}

impl Latch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            cv: Condvar::new(),
        }
    }

    /// Count down by one
    #[inline]
    pub fn arrive(&self) {
        self.count_down(1);
    }

    /// Count down by `n`, saturating at zero
    pub fn count_down(&self, n: usize) {
        let mut remaining = self.remaining.lock();
        if *remaining == 0 {
            return;
        }
        *remaining = remaining.saturating_sub(n);
        if *remaining == 0 {
            self.cv.notify_all();
        }
    }

    /// Count down by one, then wait for zero
    pub fn arrive_and_wait(&self) {
        self.arrive();
        self.wait();
    }

    /// Whether the count has reached zero
    pub fn try_wait(&self) -> bool {
        *self.remaining.lock() == 0
    }

    /// Block until the count reaches zero
    pub fn wait(&self) {
        let mut remaining = self.remaining.lock();
        self.cv.wait_while(&mut remaining, |r| *r > 0);
    }

    /// Wait up to `timeout` for the count to reach zero
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut remaining = self.remaining.lock();
        !self
            .cv
            .wait_while_for(&mut remaining, |r| *r > 0, timeout)
            .timed_out()
    }
}
