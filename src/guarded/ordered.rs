/*!
 * Ordered Discipline
 *
 * Reader/writer locking with first-in first-out admission. A burst of
 * concurrent writers is serviced in the order the writers arrived, and a
 * reader that arrives behind a waiting writer does not overtake it.
 */

use super::shared::SharedGuarded;
use crate::access::{SharedAccess, TimedSharedAccess};
use crate::handle::ReadHandle;
use crate::lock::{FairRwLock, RawSharedLock, RawTimedSharedLock};
use std::fmt;
use std::time::{Duration, Instant};

/// Value protected by a FIFO reader/writer lock
///
/// # Example
///
/// ```
/// use guarded::OrderedGuarded;
///
/// let log = OrderedGuarded::new(Vec::new());
/// let len = log.modify(|entries| {
///     entries.push("started");
///     entries.len()
/// });
/// assert_eq!(len, 1);
/// assert_eq!(log.read(|entries| entries[0]), "started");
/// ```
pub struct OrderedGuarded<T: ?Sized, L: RawSharedLock = FairRwLock> {
    inner: SharedGuarded<T, L>,
}

impl<T> OrderedGuarded<T> {
    /// Protect `value` with a FIFO reader/writer lock
    #[inline]
    pub const fn new(value: T) -> Self {
        Self::with_lock(value, FairRwLock::new())
    }
}

impl<T, L: RawSharedLock> OrderedGuarded<T, L> {
    /// Protect `value` with a caller-supplied lock
    ///
    /// The ordering guarantee only holds when `lock` is itself fair.
    #[inline]
    pub const fn with_lock(value: T, lock: L) -> Self {
        Self {
            inner: SharedGuarded::with_lock(value, lock),
        }
    }

    /// Consume the discipline and return the value
    #[inline]
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: ?Sized, L: RawSharedLock> OrderedGuarded<T, L> {
    /// Apply `f` under the write lock and return its result
    ///
    /// A panic inside `f` propagates after the lock has been released.
    #[inline]
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut handle = self.inner.lock();
        f(&mut *handle)
    }

    /// Apply `f` under a shared lock and return its result
    #[inline]
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let handle = self.inner.lock_shared();
        f(&*handle)
    }

    /// Block until shared access is granted
    #[inline]
    pub fn lock_shared(&self) -> ReadHandle<'_, T, L> {
        self.inner.lock_shared()
    }

    /// Acquire shared access without blocking
    #[inline]
    pub fn try_lock_shared(&self) -> Option<ReadHandle<'_, T, L>> {
        self.inner.try_lock_shared()
    }

    /// Mutable access without locking
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

impl<T: ?Sized, L: RawTimedSharedLock> OrderedGuarded<T, L> {
    /// Try to acquire shared access, giving up after `timeout`
    #[inline]
    pub fn try_lock_shared_for(&self, timeout: Duration) -> Option<ReadHandle<'_, T, L>> {
        self.inner.try_lock_shared_for(timeout)
    }

    /// Try to acquire shared access, giving up at `deadline`
    #[inline]
    pub fn try_lock_shared_until(&self, deadline: Instant) -> Option<ReadHandle<'_, T, L>> {
        self.inner.try_lock_shared_until(deadline)
    }
}

impl<T, L: RawSharedLock> From<T> for OrderedGuarded<T, L> {
    fn from(value: T) -> Self {
        Self::with_lock(value, L::INIT)
    }
}

impl<T: Default, L: RawSharedLock> Default for OrderedGuarded<T, L> {
    fn default() -> Self {
        Self::from(T::default())
    }
}

impl<T: ?Sized + fmt::Debug, L: RawSharedLock> fmt::Debug for OrderedGuarded<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock_shared() {
            Some(handle) => f
                .debug_struct("OrderedGuarded")
                .field("value", &&*handle)
                .finish(),
            None => f
                .debug_struct("OrderedGuarded")
                .field("value", &"<locked>")
                .finish(),
        }
    }
}

impl<T: ?Sized, L: RawSharedLock> SharedAccess<T> for OrderedGuarded<T, L> {
    type SharedHandle<'a> = ReadHandle<'a, T, L> where Self: 'a;

    fn lock_shared(&self) -> Self::SharedHandle<'_> {
        OrderedGuarded::lock_shared(self)
    }

    fn try_lock_shared(&self) -> Option<Self::SharedHandle<'_>> {
        OrderedGuarded::try_lock_shared(self)
    }
}

impl<T: ?Sized, L: RawTimedSharedLock> TimedSharedAccess<T> for OrderedGuarded<T, L> {
    fn try_lock_shared_for(&self, timeout: Duration) -> Option<Self::SharedHandle<'_>> {
        OrderedGuarded::try_lock_shared_for(self, timeout)
    }

    fn try_lock_shared_until(&self, deadline: Instant) -> Option<Self::SharedHandle<'_>> {
        OrderedGuarded::try_lock_shared_until(self, deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_modify_returns_closure_value() {
        let data = OrderedGuarded::new(0);
        let doubled = data.modify(|v| {
            *v = 5;
            *v * 2
        });
        assert_eq!(doubled, 10);
        assert_eq!(data.read(|v| *v), 5);
    }

    #[test]
    fn test_concurrent_writers_get_their_own_results() {
        let data = Arc::new(OrderedGuarded::new(Vec::new()));
        let handles: Vec<_> = (0..8usize)
            .map(|id| {
                let data = data.clone();
                thread::spawn(move || {
                    (0..100)
                        .map(|i| {
                            let submitted = id * 1000 + i;
                            data.modify(|log| {
                                log.push(submitted);
                                submitted
                            })
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for (id, handle) in handles.into_iter().enumerate() {
            let results = handle.join().unwrap();
            let expected: Vec<_> = (0..100).map(|i| id * 1000 + i).collect();
            assert_eq!(results, expected);
        }
        assert_eq!(data.read(|log| log.len()), 800);
    }

    #[test]
    fn test_reader_blocked_by_held_writer() {
        let data = Arc::new(OrderedGuarded::new(1));
        let other = data.clone();

        let (held_tx, held_rx) = flume::bounded(0);
        let (done_tx, done_rx) = flume::bounded::<()>(0);
        let writer = thread::spawn(move || {
            other.modify(|v| {
                held_tx.send(()).unwrap();
                done_rx.recv().unwrap();
                *v += 1;
            })
        });

        held_rx.recv().unwrap();
        assert!(data.try_lock_shared().is_none());
        assert!(data.try_lock_shared_for(Duration::from_millis(10)).is_none());
        done_tx.send(()).unwrap();
        writer.join().unwrap();
        assert_eq!(*data.lock_shared(), 2);
    }
}
