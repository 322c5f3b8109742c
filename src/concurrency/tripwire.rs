/*!
 * Tripwire
 *
 * A shutdown flag shared explicitly between the site that trips it and the
 * holders that consult it. The line is tripped exactly once, when the
 * trigger bound to it is dropped.
 */

use crate::errors::{GuardedError, GuardedResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared tripwire flag
#[derive(Debug, Clone, Default)]
pub struct TripLine(Arc<AtomicBool>);

impl TripLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a trigger that trips this line when dropped
    pub fn trigger(&self) -> TripWireTrigger {
        TripWireTrigger::new(self.clone())
    }

    /// Bind a read-only detector to this line
    pub fn detector(&self) -> TripWireDetector {
        TripWireDetector::new(self.clone())
    }

    #[inline]
    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Trips its line on drop
#[derive(Debug)]
#[must_use = "the line is tripped as soon as the trigger is dropped"]
pub struct TripWireTrigger {
    line: TripLine,
}

impl TripWireTrigger {
    pub fn new(line: TripLine) -> Self {
        Self { line }
    }
}

impl Drop for TripWireTrigger {
    fn drop(&mut self) {
        self.line.0.store(true, Ordering::Release);
    }
}

/// Observes a line without being able to trip it
#[derive(Debug, Clone)]
pub struct TripWireDetector {
    line: TripLine,
}

impl TripWireDetector {
    pub fn new(line: TripLine) -> Self {
        Self { line }
    }

    #[inline]
    pub fn is_tripped(&self) -> bool {
        self.line.is_tripped()
    }
}

/// Fixed set of independent lines addressed by index
#[derive(Debug, Clone)]
pub struct TripLinePool {
    lines: Box<[TripLine]>,
}

impl TripLinePool {
    pub fn new(count: usize) -> Self {
        Self {
            lines: (0..count).map(|_| TripLine::new()).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line at `index`
    ///
    /// # Errors
    ///
    /// [`GuardedError::IndexOutOfRange`] when `index` is not below the pool size.
    pub fn line(&self, index: usize) -> GuardedResult<TripLine> {
        self.lines
            .get(index)
            .cloned()
            .ok_or(GuardedError::IndexOutOfRange {
                index,
                len: self.lines.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_trigger_trips_on_drop() {
        let line = TripLine::new();
        let detector = line.detector();
        let trigger = line.trigger();
        assert!(!detector.is_tripped());

        drop(trigger);
        assert!(detector.is_tripped());
        assert!(line.is_tripped());
    }

    #[test]
    fn test_trip_seen_across_threads() {
        let line = TripLine::new();
        let trigger = line.trigger();
        let detector = line.detector();
        let watcher = thread::spawn(move || {
            while !detector.is_tripped() {
                thread::yield_now();
            }
        });
        thread::spawn(move || drop(trigger)).join().unwrap();
        watcher.join().unwrap();
    }

    #[test]
    fn test_pool_lines_independent() {
        let pool = TripLinePool::new(3);
        let first = pool.line(0).unwrap();
        drop(first.trigger());

        assert!(pool.line(0).unwrap().is_tripped());
        assert!(!pool.line(2).unwrap().is_tripped());
    }

    #[test]
    fn test_pool_out_of_range() {
        let pool = TripLinePool::new(2);
        assert_eq!(
            pool.line(2).unwrap_err(),
            GuardedError::IndexOutOfRange { index: 2, len: 2 }
        );
    }
}
