/*!
 * Lock Capability Traits
 *
 * The minimal lock surface every discipline is written against. A type
 * that implements these traits can stand behind any protected value,
 * so a discipline never names a concrete mutex.
 *
 * # Layers
 *
 * - [`RawLock`]: exclusive acquire / try-acquire / release
 * - [`RawTimedLock`]: bounded exclusive acquisition
 * - [`RawSharedLock`]: shared (reader) acquisition on top of exclusive
 * - [`RawTimedSharedLock`]: bounded shared acquisition
 *
 * Implementations are provided for the parking_lot raw locks.
 */

use parking_lot::lock_api::{RawRwLock as _, RawRwLockTimed as _};
use std::time::{Duration, Instant};

/// Exclusive lock capability
///
/// # Safety
///
/// Implementations must guarantee mutual exclusion: while a thread holds the
/// lock (after `lock` returned or `try_lock` returned `true`), no other
/// exclusive or shared acquisition may succeed.
pub unsafe trait RawLock: Send + Sync {
    /// Unlocked initial state
    const INIT: Self;

    /// Block until exclusive access is granted
    fn lock(&self);

    /// Acquire exclusive access without blocking
    fn try_lock(&self) -> bool;

    /// Release exclusive access
    ///
    /// # Safety
    ///
    /// The caller must hold the lock in exclusive mode.
    unsafe fn unlock(&self);
}

/// Exclusive lock capability with bounded waits
///
/// # Safety
///
/// Same contract as [`RawLock`]; the timed variants must never return `true`
/// without having acquired the lock.
pub unsafe trait RawTimedLock: RawLock {
    /// Try to acquire, giving up after `timeout`
    fn try_lock_for(&self, timeout: Duration) -> bool;

    /// Try to acquire, giving up at `deadline`
    fn try_lock_until(&self, deadline: Instant) -> bool;
}

/// Reader/writer lock capability
///
/// # Safety
///
/// Shared holders may coexist with each other but never with an exclusive
/// holder.
pub unsafe trait RawSharedLock: RawLock {
    /// Block until shared access is granted
    fn lock_shared(&self);

    /// Acquire shared access without blocking
    fn try_lock_shared(&self) -> bool;

    /// Release shared access
    ///
    /// # Safety
    ///
    /// The caller must hold the lock in shared mode.
    unsafe fn unlock_shared(&self);
}

/// Reader/writer lock capability with bounded shared waits
///
/// # Safety
///
/// Same contract as [`RawSharedLock`].
pub unsafe trait RawTimedSharedLock: RawSharedLock + RawTimedLock {
    /// Try to acquire shared access, giving up after `timeout`
    fn try_lock_shared_for(&self, timeout: Duration) -> bool;

    /// Try to acquire shared access, giving up at `deadline`
    fn try_lock_shared_until(&self, deadline: Instant) -> bool;
}

unsafe impl RawLock for parking_lot::RawMutex {
    const INIT: Self = <parking_lot::RawMutex as parking_lot::lock_api::RawMutex>::INIT;

    #[inline]
    fn lock(&self) {
        parking_lot::lock_api::RawMutex::lock(self);
    }

    #[inline]
    fn try_lock(&self) -> bool {
        parking_lot::lock_api::RawMutex::try_lock(self)
    }

    #[inline]
    unsafe fn unlock(&self) {
        parking_lot::lock_api::RawMutex::unlock(self);
    }
}

unsafe impl RawTimedLock for parking_lot::RawMutex {
    #[inline]
    fn try_lock_for(&self, timeout: Duration) -> bool {
        parking_lot::lock_api::RawMutexTimed::try_lock_for(self, timeout)
    }

    #[inline]
    fn try_lock_until(&self, deadline: Instant) -> bool {
        parking_lot::lock_api::RawMutexTimed::try_lock_until(self, deadline)
    }
}

unsafe impl RawLock for parking_lot::RawFairMutex {
    const INIT: Self = <parking_lot::RawFairMutex as parking_lot::lock_api::RawMutex>::INIT;

    #[inline]
    fn lock(&self) {
        parking_lot::lock_api::RawMutex::lock(self);
    }

    #[inline]
    fn try_lock(&self) -> bool {
        parking_lot::lock_api::RawMutex::try_lock(self)
    }

    #[inline]
    unsafe fn unlock(&self) {
        // Hand the lock straight to the next waiter
        parking_lot::lock_api::RawMutexFair::unlock_fair(self);
    }
}

unsafe impl RawTimedLock for parking_lot::RawFairMutex {
    #[inline]
    fn try_lock_for(&self, timeout: Duration) -> bool {
        parking_lot::lock_api::RawMutexTimed::try_lock_for(self, timeout)
    }

    #[inline]
    fn try_lock_until(&self, deadline: Instant) -> bool {
        parking_lot::lock_api::RawMutexTimed::try_lock_until(self, deadline)
    }
}

unsafe impl RawLock for parking_lot::RawRwLock {
    const INIT: Self = <parking_lot::RawRwLock as parking_lot::lock_api::RawRwLock>::INIT;

    #[inline]
    fn lock(&self) {
        self.lock_exclusive();
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.try_lock_exclusive()
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.unlock_exclusive();
    }
}

unsafe impl RawTimedLock for parking_lot::RawRwLock {
    #[inline]
    fn try_lock_for(&self, timeout: Duration) -> bool {
        self.try_lock_exclusive_for(timeout)
    }

    #[inline]
    fn try_lock_until(&self, deadline: Instant) -> bool {
        self.try_lock_exclusive_until(deadline)
    }
}

unsafe impl RawSharedLock for parking_lot::RawRwLock {
    #[inline]
    fn lock_shared(&self) {
        parking_lot::lock_api::RawRwLock::lock_shared(self);
    }

    #[inline]
    fn try_lock_shared(&self) -> bool {
        parking_lot::lock_api::RawRwLock::try_lock_shared(self)
    }

    #[inline]
    unsafe fn unlock_shared(&self) {
        parking_lot::lock_api::RawRwLock::unlock_shared(self);
    }
}

unsafe impl RawTimedSharedLock for parking_lot::RawRwLock {
    #[inline]
    fn try_lock_shared_for(&self, timeout: Duration) -> bool {
        parking_lot::lock_api::RawRwLockTimed::try_lock_shared_for(self, timeout)
    }

    #[inline]
    fn try_lock_shared_until(&self, deadline: Instant) -> bool {
        parking_lot::lock_api::RawRwLockTimed::try_lock_shared_until(self, deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_exclusive<L: RawTimedLock>() {
        let lock = L::INIT;
        assert!(lock.try_lock());
        assert!(!lock.try_lock());
        assert!(!lock.try_lock_for(Duration::from_millis(5)));
        unsafe { lock.unlock() };
        assert!(lock.try_lock_until(Instant::now() + Duration::from_millis(5)));
        unsafe { lock.unlock() };
    }

    #[test]
    fn test_parking_lot_mutex_capability() {
        exercise_exclusive::<parking_lot::RawMutex>();
    }

    #[test]
    fn test_parking_lot_fair_mutex_capability() {
        exercise_exclusive::<parking_lot::RawFairMutex>();
    }

    #[test]
    fn test_parking_lot_rwlock_capability() {
        exercise_exclusive::<parking_lot::RawRwLock>();

        let lock = <parking_lot::RawRwLock as RawLock>::INIT;
        assert!(RawSharedLock::try_lock_shared(&lock));
        assert!(RawSharedLock::try_lock_shared(&lock));
        assert!(!RawLock::try_lock(&lock));
        unsafe {
            RawSharedLock::unlock_shared(&lock);
            RawSharedLock::unlock_shared(&lock);
        }
        assert!(RawLock::try_lock(&lock));
        assert!(!RawTimedSharedLock::try_lock_shared_for(
            &lock,
            Duration::from_millis(5)
        ));
        unsafe { RawLock::unlock(&lock) };
    }
}
