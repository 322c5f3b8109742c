/*!
 * Reader Indicator
 *
 * Counts readers present on one slot of a two-copy structure and lets a
 * writer wait for that count to drain to zero.
 *
 * # Design
 *
 * Parking uses parking_lot_core with the counter's own address as the key.
 * The writer raises `waiting` before it validates the count, and the reader
 * that drops the count to zero checks `waiting` after its decrement. Both
 * sides use `SeqCst`, so at least one of them observes the other and the
 * wakeup cannot be lost.
 *
 * # Performance
 *
 * - Enter/leave is one uncontended atomic add on a dedicated cache line
 * - The unpark path is only taken when a writer is actually parked
 */

use super::config::{StrategyType, SyncConfig};
use crossbeam_utils::{Backoff, CachePadded};
use parking_lot_core::{park, unpark_all, ParkToken, DEFAULT_UNPARK_TOKEN};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::trace;

/// Reader count for one slot
pub struct ReaderIndicator {
    count: CachePadded<AtomicUsize>,
    waiting: AtomicBool,
}

impl ReaderIndicator {
    pub const fn new() -> Self {
        Self {
            count: CachePadded::new(AtomicUsize::new(0)),
            waiting: AtomicBool::new(false),
        }
    }

    /// Register a reader
    #[inline]
    pub fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Deregister a reader, waking a drained-waiting writer if this was the last one
    #[inline]
    pub fn leave(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 && self.waiting.load(Ordering::SeqCst) {
            unsafe { unpark_all(self.key(), DEFAULT_UNPARK_TOKEN) };
        }
    }

    /// Readers currently present
    #[inline]
    pub fn readers(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    #[inline]
    fn key(&self) -> usize {
        &*self.count as *const AtomicUsize as usize
    }

    /// Block until no reader is present
    ///
    /// Only one thread may wait on a given indicator at a time.
    pub fn wait_drained(&self, config: &SyncConfig) {
        if self.readers() == 0 {
            return;
        }

        match config.select_strategy() {
            StrategyType::Spin => self.spin_until_drained(),
            StrategyType::Adaptive => {
                if !self.spin_bounded(config) {
                    self.park_until_drained();
                }
            }
            // Auto never survives select_strategy
            StrategyType::Park | StrategyType::Auto => self.park_until_drained(),
        }
    }

    fn spin_until_drained(&self) {
        let backoff = Backoff::new();
        while self.readers() != 0 {
            backoff.snooze();
        }
    }

    /// Returns true if the readers drained within the spin budget
    fn spin_bounded(&self, config: &SyncConfig) -> bool {
        let start = Instant::now();
        let backoff = Backoff::new();
        let mut spins = 0;

        while self.readers() != 0 {
            if spins >= config.max_spins || start.elapsed() >= config.spin_duration {
                return false;
            }
            backoff.snooze();
            spins += 1;
        }
        true
    }

    fn park_until_drained(&self) {
        self.waiting.store(true, Ordering::SeqCst);
        let mut parks = 0u32;

        while self.readers() != 0 {
            // Validation runs under the bucket lock that `unpark_all` takes
            let _ = unsafe {
                park(
                    self.key(),
                    || self.count.load(Ordering::SeqCst) != 0,
                    || {},
                    |_, _| {},
                    ParkToken(0),
                    None,
                )
            };
            parks += 1;
        }

        self.waiting.store(false, Ordering::SeqCst);
        if parks > 0 {
            trace!(parks, "readers drained after parking");
        }
    }
}

impl Default for ReaderIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReaderIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderIndicator")
            .field("readers", &self.readers())
            .finish()
    }
}
