/*!
 * Left-Right Discipline
 *
 * Two live copies of the value. Readers always read the active copy and
 * never wait; writers update the inactive copy, swap the copies, wait for
 * readers to leave the copy that just went inactive, and replay the update
 * there.
 *
 * # Design
 *
 * A reader registers on the slot named by `active`, then re-reads `active`.
 * If the selector moved in between, the reader deregisters and retries, so a
 * registered reader is always on a slot that was active after registration.
 * The writer flips `active` with `SeqCst` before checking the old slot's
 * indicator, which makes the two checks mutually visible.
 *
 * # Replay Contract
 *
 * Every update runs twice, once per copy. [`LrGuarded::modify`] therefore
 * takes an `Fn` closure: it cannot change its own captured state between the
 * two runs, and both runs start from equal copies. The closure must not have
 * side effects outside the value. The first run's result is returned.
 *
 * # Performance
 *
 * - **Reads**: two atomic loads and an increment on a padded counter
 * - **Writes**: two applications plus a drain wait, serialized by a lock
 */

use crate::access::{SharedAccess, TimedSharedAccess};
use crate::lock::{DefaultMutex, RawGuard, RawLock};
use crate::sync::{ReaderIndicator, SyncConfig};
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// Value kept as two copies so readers and writers never block each other
///
/// # Example
///
/// ```
/// use guarded::LrGuarded;
///
/// let hits = LrGuarded::new(0u64);
/// let after = hits.modify(|v| {
///     *v += 1;
///     *v
/// });
/// assert_eq!(after, 1);
/// assert_eq!(hits.read(|v| *v), 1);
/// ```
pub struct LrGuarded<T, M: RawLock = DefaultMutex> {
    slots: [UnsafeCell<T>; 2],
    readers: [ReaderIndicator; 2],
    active: AtomicUsize,
    write_lock: M,
    config: SyncConfig,
}

// Safety: readers share `&T` across threads; the writer mutates a slot only
// after its indicator has drained
unsafe impl<T: Send, M: RawLock> Send for LrGuarded<T, M> {}
unsafe impl<T: Send + Sync, M: RawLock> Sync for LrGuarded<T, M> {}

impl<T: Clone> LrGuarded<T> {
    /// Keep two copies of `value`
    pub fn new(value: T) -> Self {
        Self::with_lock(value, DefaultMutex::INIT)
    }

    /// Keep two copies of `value`, waiting for readers as `config` says
    pub fn with_config(value: T, config: SyncConfig) -> Self {
        Self::with_lock_and_config(value, DefaultMutex::INIT, config)
    }
}

impl<T: Clone, M: RawLock> LrGuarded<T, M> {
    /// Keep two copies of `value` with a caller-supplied writer lock
    pub fn with_lock(value: T, write_lock: M) -> Self {
        Self::with_lock_and_config(value, write_lock, SyncConfig::default())
    }

    /// Keep two copies of `value` with a caller-supplied writer lock, waiting
    /// for readers as `config` says
    pub fn with_lock_and_config(value: T, write_lock: M, config: SyncConfig) -> Self {
        Self {
            slots: [UnsafeCell::new(value.clone()), UnsafeCell::new(value)],
            readers: [ReaderIndicator::new(), ReaderIndicator::new()],
            active: AtomicUsize::new(0),
            write_lock,
            config,
        }
    }

    /// Apply `f` to both copies and return the result of the first run
    ///
    /// Never blocks on readers of the active copy, but waits for readers of
    /// the copy it swaps out, so it must not be called while this thread
    /// still holds a read handle. If `f` panics the copy it was working on
    /// is restored from the other one before the panic propagates and the
    /// write lock is released.
    pub fn modify<R>(&self, f: impl Fn(&mut T) -> R) -> R {
        let _writer = RawGuard::acquire(&self.write_lock);

        let live = self.active.load(Ordering::Relaxed);
        let idle = live ^ 1;

        // The idle slot has no readers: the previous write drained it
        let result = self.apply(idle, live, &f);

        self.active.store(idle, Ordering::SeqCst);
        self.readers[live].wait_drained(&self.config);

        self.apply(live, idle, &f);
        trace!(active = idle, "left-right write applied to both copies");
        result
    }

    /// Run `f` on `target`, restoring it from `source` if `f` panics
    fn apply<R>(&self, target: usize, source: usize, f: &impl Fn(&mut T) -> R) -> R {
        let mut restore = Restore {
            target: &self.slots[target],
            source: &self.slots[source],
            armed: true,
        };
        // Safety: the write lock is held and `target` has no readers
        let result = f(unsafe { &mut *self.slots[target].get() });
        restore.armed = false;
        result
    }
}

impl<T, M: RawLock> LrGuarded<T, M> {
    /// Read the active copy; never blocks
    pub fn lock_shared(&self) -> LrReadHandle<'_, T> {
        loop {
            let slot = self.active.load(Ordering::SeqCst);
            self.readers[slot].enter();
            if self.active.load(Ordering::SeqCst) == slot {
                return LrReadHandle {
                    value: &self.slots[slot],
                    indicator: &self.readers[slot],
                };
            }
            self.readers[slot].leave();
        }
    }

    /// Read the active copy; never fails
    #[inline]
    pub fn try_lock_shared(&self) -> Option<LrReadHandle<'_, T>> {
        Some(self.lock_shared())
    }

    /// Read the active copy; never waits
    #[inline]
    pub fn try_lock_shared_for(&self, _timeout: Duration) -> Option<LrReadHandle<'_, T>> {
        Some(self.lock_shared())
    }

    /// Read the active copy; never waits
    #[inline]
    pub fn try_lock_shared_until(&self, _deadline: Instant) -> Option<LrReadHandle<'_, T>> {
        Some(self.lock_shared())
    }

    /// Apply `f` to the active copy and return its result
    #[inline]
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.lock_shared())
    }

    /// Wait configuration used when draining readers
    #[inline]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Consume the discipline and return the active copy
    pub fn into_inner(self) -> T {
        let active = self.active.load(Ordering::Relaxed);
        let [first, second] = self.slots;
        if active == 0 {
            first.into_inner()
        } else {
            second.into_inner()
        }
    }
}

impl<T: Clone, M: RawLock> From<T> for LrGuarded<T, M> {
    fn from(value: T) -> Self {
        Self::with_lock(value, M::INIT)
    }
}

impl<T: Clone + Default, M: RawLock> Default for LrGuarded<T, M> {
    fn default() -> Self {
        Self::from(T::default())
    }
}

impl<T: fmt::Debug, M: RawLock> fmt::Debug for LrGuarded<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LrGuarded")
            .field("value", &&*self.lock_shared())
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T, M: RawLock> SharedAccess<T> for LrGuarded<T, M> {
    type SharedHandle<'a> = LrReadHandle<'a, T> where Self: 'a;

    fn lock_shared(&self) -> Self::SharedHandle<'_> {
        LrGuarded::lock_shared(self)
    }

    fn try_lock_shared(&self) -> Option<Self::SharedHandle<'_>> {
        LrGuarded::try_lock_shared(self)
    }
}

impl<T, M: RawLock> TimedSharedAccess<T> for LrGuarded<T, M> {
    fn try_lock_shared_for(&self, timeout: Duration) -> Option<Self::SharedHandle<'_>> {
        LrGuarded::try_lock_shared_for(self, timeout)
    }

    fn try_lock_shared_until(&self, deadline: Instant) -> Option<Self::SharedHandle<'_>> {
        LrGuarded::try_lock_shared_until(self, deadline)
    }
}

/// Shared handle of an [`LrGuarded`]
///
/// Pins one copy; a writer cannot touch that copy until the handle drops.
#[must_use = "if unused the read is released immediately"]
pub struct LrReadHandle<'a, T> {
    value: &'a UnsafeCell<T>,
    indicator: &'a ReaderIndicator,
}

impl<T> Deref for LrReadHandle<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.value.get() }
    }
}

impl<T> Drop for LrReadHandle<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.indicator.leave();
    }
}

// Safety: the handle only hands out `&T`
unsafe impl<T: Sync> Send for LrReadHandle<'_, T> {}
unsafe impl<T: Sync> Sync for LrReadHandle<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for LrReadHandle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LrReadHandle").field(&&**self).finish()
    }
}

struct Restore<'a, T: Clone> {
    target: &'a UnsafeCell<T>,
    source: &'a UnsafeCell<T>,
    armed: bool,
}

impl<T: Clone> Drop for Restore<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            // Safety: only reached under the write lock, with no readers on
            // `target`; `source` is only read
            unsafe { (*self.target.get()).clone_from(&*self.source.get()) };
            trace!("left-right copy restored after panic");
        }
    }
}
