/*!
 * Raw Lock Guard
 *
 * Scoped ownership of an acquired exclusive lock with no data attached.
 * Snapshot disciplines use it to serialize writers while the value itself
 * lives elsewhere.
 */

use super::capability::{RawLock, RawTimedLock};
use std::marker::PhantomData;
use std::time::{Duration, Instant};

/// Held exclusive lock, released on drop
#[must_use = "if unused the lock is released immediately"]
pub(crate) struct RawGuard<'a, L: RawLock> {
    lock: &'a L,
    _not_send: PhantomData<*const ()>,
}

impl<'a, L: RawLock> RawGuard<'a, L> {
    /// Block until the lock is held
    #[inline]
    pub(crate) fn acquire(lock: &'a L) -> Self {
        lock.lock();
        unsafe { Self::adopt(lock) }
    }

    /// Take the lock if it is free
    #[inline]
    pub(crate) fn try_acquire(lock: &'a L) -> Option<Self> {
        lock.try_lock().then(|| unsafe { Self::adopt(lock) })
    }

    /// Wrap a lock the caller already holds
    ///
    /// # Safety
    ///
    /// The caller must hold `lock` exclusively and hand over its release.
    #[inline]
    pub(crate) unsafe fn adopt(lock: &'a L) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl<'a, L: RawTimedLock> RawGuard<'a, L> {
    #[inline]
    pub(crate) fn try_acquire_for(lock: &'a L, timeout: Duration) -> Option<Self> {
        lock.try_lock_for(timeout).then(|| unsafe { Self::adopt(lock) })
    }

    #[inline]
    pub(crate) fn try_acquire_until(lock: &'a L, deadline: Instant) -> Option<Self> {
        lock.try_lock_until(deadline)
            .then(|| unsafe { Self::adopt(lock) })
    }
}

impl<L: RawLock> Drop for RawGuard<'_, L> {
    #[inline]
    fn drop(&mut self) {
        unsafe { self.lock.unlock() };
    }
}
