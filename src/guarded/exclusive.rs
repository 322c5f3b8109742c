/*!
 * Exclusive Discipline
 *
 * One lock, one holder at a time. [`GuardedOpt`] adds a construction-time
 * switch that turns every acquisition into a pass-through for callers that
 * already guarantee single-threaded access.
 */

use crate::access::{ExclusiveAccess, SharedAccess, TimedExclusiveAccess, TimedSharedAccess};
use crate::handle::WriteHandle;
use crate::lock::{DefaultMutex, RawLock, RawTimedLock};
use std::cell::UnsafeCell;
use std::fmt;
use std::time::{Duration, Instant};

/// Value protected by a single exclusive lock
///
/// # Example
///
/// ```
/// use guarded::Guarded;
///
/// let counter = Guarded::new(0);
/// *counter.lock() += 1;
/// let after = counter.modify(|v| {
///     *v += 1;
///     *v
/// });
/// assert_eq!(after, 2);
/// ```
pub struct Guarded<T: ?Sized, M: RawLock = DefaultMutex> {
    lock: M,
    value: UnsafeCell<T>,
}

// Safety: the lock serializes every access to `value`
unsafe impl<T: ?Sized + Send, M: RawLock> Send for Guarded<T, M> {}
unsafe impl<T: ?Sized + Send, M: RawLock> Sync for Guarded<T, M> {}

impl<T> Guarded<T> {
    /// Protect `value` with the default mutex
    #[inline]
    pub const fn new(value: T) -> Self {
        Self::with_lock(value, DefaultMutex::INIT)
    }
}

impl<T, M: RawLock> Guarded<T, M> {
    /// Protect `value` with a caller-supplied lock
    #[inline]
    pub const fn with_lock(value: T, lock: M) -> Self {
        Self {
            lock,
            value: UnsafeCell::new(value),
        }
    }

    /// Consume the discipline and return the value
    #[inline]
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: ?Sized, M: RawLock> Guarded<T, M> {
    /// Block until exclusive access is granted
    #[inline]
    pub fn lock(&self) -> WriteHandle<'_, T, M> {
        self.lock.lock();
        unsafe { WriteHandle::new(Some(&self.lock), &self.value) }
    }

    /// Acquire exclusive access without blocking
    #[inline]
    pub fn try_lock(&self) -> Option<WriteHandle<'_, T, M>> {
        if self.lock.try_lock() {
            Some(unsafe { WriteHandle::new(Some(&self.lock), &self.value) })
        } else {
            None
        }
    }

    /// Apply `f` under the lock and return its result
    ///
    /// A panic inside `f` propagates after the lock has been released.
    #[inline]
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut handle = self.lock();
        f(&mut *handle)
    }

    /// Mutable access without locking; the borrow checker proves exclusivity
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

impl<T: ?Sized, M: RawTimedLock> Guarded<T, M> {
    /// Try to acquire exclusive access, giving up after `timeout`
    #[inline]
    pub fn try_lock_for(&self, timeout: Duration) -> Option<WriteHandle<'_, T, M>> {
        if self.lock.try_lock_for(timeout) {
            Some(unsafe { WriteHandle::new(Some(&self.lock), &self.value) })
        } else {
            None
        }
    }

    /// Try to acquire exclusive access, giving up at `deadline`
    #[inline]
    pub fn try_lock_until(&self, deadline: Instant) -> Option<WriteHandle<'_, T, M>> {
        if self.lock.try_lock_until(deadline) {
            Some(unsafe { WriteHandle::new(Some(&self.lock), &self.value) })
        } else {
            None
        }
    }
}

impl<T, M: RawLock> From<T> for Guarded<T, M> {
    fn from(value: T) -> Self {
        Self::with_lock(value, M::INIT)
    }
}

impl<T: Default, M: RawLock> Default for Guarded<T, M> {
    fn default() -> Self {
        Self::from(T::default())
    }
}

impl<T: ?Sized + fmt::Debug, M: RawLock> fmt::Debug for Guarded<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(handle) => f.debug_struct("Guarded").field("value", &&*handle).finish(),
            None => f.debug_struct("Guarded").field("value", &"<locked>").finish(),
        }
    }
}

impl<T: ?Sized, M: RawLock> ExclusiveAccess<T> for Guarded<T, M> {
    type Handle<'a> = WriteHandle<'a, T, M> where Self: 'a;

    fn lock(&self) -> Self::Handle<'_> {
        Guarded::lock(self)
    }

    fn try_lock(&self) -> Option<Self::Handle<'_>> {
        Guarded::try_lock(self)
    }
}

impl<T: ?Sized, M: RawTimedLock> TimedExclusiveAccess<T> for Guarded<T, M> {
    fn try_lock_for(&self, timeout: Duration) -> Option<Self::Handle<'_>> {
        Guarded::try_lock_for(self, timeout)
    }

    fn try_lock_until(&self, deadline: Instant) -> Option<Self::Handle<'_>> {
        Guarded::try_lock_until(self, deadline)
    }
}

// Readers of an exclusive discipline take the one lock like writers do
impl<T: ?Sized, M: RawLock> SharedAccess<T> for Guarded<T, M> {
    type SharedHandle<'a> = WriteHandle<'a, T, M> where Self: 'a;

    fn lock_shared(&self) -> Self::SharedHandle<'_> {
        Guarded::lock(self)
    }

    fn try_lock_shared(&self) -> Option<Self::SharedHandle<'_>> {
        Guarded::try_lock(self)
    }
}

impl<T: ?Sized, M: RawTimedLock> TimedSharedAccess<T> for Guarded<T, M> {
    fn try_lock_shared_for(&self, timeout: Duration) -> Option<Self::SharedHandle<'_>> {
        Guarded::try_lock_for(self, timeout)
    }

    fn try_lock_shared_until(&self, deadline: Instant) -> Option<Self::SharedHandle<'_>> {
        Guarded::try_lock_until(self, deadline)
    }
}

/// Exclusive discipline whose locking can be switched off at construction
///
/// Built with [`GuardedOpt::new`] it behaves like [`Guarded`]. Built with
/// [`GuardedOpt::new_unsynchronized`] every acquisition succeeds immediately
/// and performs no synchronization at all.
///
/// # Example
///
/// ```
/// use guarded::GuardedOpt;
///
/// // Safety: only this thread ever touches `scratch`
/// let scratch = unsafe { GuardedOpt::new_unsynchronized(Vec::new()) };
/// scratch.lock().push(1);
/// assert!(!scratch.is_enabled());
/// assert_eq!(*scratch.lock(), [1]);
/// ```
pub struct GuardedOpt<T: ?Sized, M: RawLock = DefaultMutex> {
    enabled: bool,
    lock: M,
    value: UnsafeCell<T>,
}

// Safety: with locking enabled the lock serializes access; with it disabled
// the unsafe constructors put exclusivity on the caller
unsafe impl<T: ?Sized + Send, M: RawLock> Send for GuardedOpt<T, M> {}
unsafe impl<T: ?Sized + Send, M: RawLock> Sync for GuardedOpt<T, M> {}

impl<T> GuardedOpt<T> {
    /// Protect `value` with the default mutex; locking is enabled
    #[inline]
    pub const fn new(value: T) -> Self {
        Self::with_lock(value, DefaultMutex::INIT)
    }

    /// Hold `value` with locking disabled
    ///
    /// # Safety
    ///
    /// The caller guarantees single-threaded access: no two handles may be
    /// dereferenced at the same time from different threads.
    #[inline]
    pub const unsafe fn new_unsynchronized(value: T) -> Self {
        Self::with_locking(false, value, DefaultMutex::INIT)
    }
}

impl<T, M: RawLock> GuardedOpt<T, M> {
    /// Protect `value` with a caller-supplied lock; locking is enabled
    #[inline]
    pub const fn with_lock(value: T, lock: M) -> Self {
        // Safety: locking is enabled
        unsafe { Self::with_locking(true, value, lock) }
    }

    /// Protect `value` with `lock`, or bypass it entirely when `enabled` is
    /// false
    ///
    /// # Safety
    ///
    /// When `enabled` is false the caller guarantees single-threaded access,
    /// as for [`GuardedOpt::new_unsynchronized`].
    #[inline]
    pub const unsafe fn with_locking(enabled: bool, value: T, lock: M) -> Self {
        Self {
            enabled,
            lock,
            value: UnsafeCell::new(value),
        }
    }

    /// Consume the discipline and return the value
    #[inline]
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: ?Sized, M: RawLock> GuardedOpt<T, M> {
    /// Whether acquisitions synchronize
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    fn handle(&self, locked: bool) -> WriteHandle<'_, T, M> {
        let lock = if locked { Some(&self.lock) } else { None };
        unsafe { WriteHandle::new(lock, &self.value) }
    }

    /// Block until exclusive access is granted
    #[inline]
    pub fn lock(&self) -> WriteHandle<'_, T, M> {
        if self.enabled {
            self.lock.lock();
        }
        self.handle(self.enabled)
    }

    /// Acquire exclusive access without blocking
    #[inline]
    pub fn try_lock(&self) -> Option<WriteHandle<'_, T, M>> {
        if !self.enabled {
            return Some(self.handle(false));
        }
        self.lock.try_lock().then(|| self.handle(true))
    }

    /// Apply `f` with exclusive access and return its result
    #[inline]
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut handle = self.lock();
        f(&mut *handle)
    }
}

impl<T: ?Sized, M: RawTimedLock> GuardedOpt<T, M> {
    /// Try to acquire exclusive access, giving up after `timeout`
    #[inline]
    pub fn try_lock_for(&self, timeout: Duration) -> Option<WriteHandle<'_, T, M>> {
        if !self.enabled {
            return Some(self.handle(false));
        }
        self.lock.try_lock_for(timeout).then(|| self.handle(true))
    }

    /// Try to acquire exclusive access, giving up at `deadline`
    #[inline]
    pub fn try_lock_until(&self, deadline: Instant) -> Option<WriteHandle<'_, T, M>> {
        if !self.enabled {
            return Some(self.handle(false));
        }
        self.lock.try_lock_until(deadline).then(|| self.handle(true))
    }
}

impl<T: ?Sized, M: RawLock> ExclusiveAccess<T> for GuardedOpt<T, M> {
    type Handle<'a> = WriteHandle<'a, T, M> where Self: 'a;

    fn lock(&self) -> Self::Handle<'_> {
        GuardedOpt::lock(self)
    }

    fn try_lock(&self) -> Option<Self::Handle<'_>> {
        GuardedOpt::try_lock(self)
    }
}

impl<T: ?Sized, M: RawTimedLock> TimedExclusiveAccess<T> for GuardedOpt<T, M> {
    fn try_lock_for(&self, timeout: Duration) -> Option<Self::Handle<'_>> {
        GuardedOpt::try_lock_for(self, timeout)
    }

    fn try_lock_until(&self, deadline: Instant) -> Option<Self::Handle<'_>> {
        GuardedOpt::try_lock_until(self, deadline)
    }
}

impl<T: ?Sized, M: RawLock> SharedAccess<T> for GuardedOpt<T, M> {
    type SharedHandle<'a> = WriteHandle<'a, T, M> where Self: 'a;

    fn lock_shared(&self) -> Self::SharedHandle<'_> {
        GuardedOpt::lock(self)
    }

    fn try_lock_shared(&self) -> Option<Self::SharedHandle<'_>> {
        GuardedOpt::try_lock(self)
    }
}

impl<T: ?Sized, M: RawTimedLock> TimedSharedAccess<T> for GuardedOpt<T, M> {
    fn try_lock_shared_for(&self, timeout: Duration) -> Option<Self::SharedHandle<'_>> {
        GuardedOpt::try_lock_for(self, timeout)
    }

    fn try_lock_shared_until(&self, deadline: Instant) -> Option<Self::SharedHandle<'_>> {
        GuardedOpt::try_lock_until(self, deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lock_and_modify() {
        let data = Guarded::new(vec![1, 2]);
        data.lock().push(3);
        let len = data.modify(|v| {
            v.push(4);
            v.len()
        });
        assert_eq!(len, 4);
        assert_eq!(data.into_inner(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_try_lock_contended_from_other_thread() {
        let data = Arc::new(Guarded::new(1));
        let handle = data.lock();

        let other = data.clone();
        let contended = thread::spawn(move || {
            let immediate = other.try_lock().is_none();
            let timed = other.try_lock_for(Duration::from_millis(20)).is_none();
            let until = other
                .try_lock_until(Instant::now() + Duration::from_millis(20))
                .is_none();
            immediate && timed && until
        })
        .join()
        .unwrap();

        assert!(contended);
        drop(handle);
        assert!(data.try_lock().is_some());
    }

    #[test]
    fn test_panic_in_modify_releases_lock() {
        let data = Arc::new(Guarded::new(0));
        let other = data.clone();
        let result = thread::spawn(move || {
            other.modify(|v| {
                *v = 7;
                panic!("mutation failed");
            })
        })
        .join();

        assert!(result.is_err());
        assert_eq!(*data.try_lock().unwrap(), 7);
    }

    #[test]
    fn test_fair_mutex_backend() {
        let data: Guarded<u32, parking_lot::RawFairMutex> = Guarded::from(3);
        *data.lock() *= 2;
        assert_eq!(*data.lock(), 6);
    }

    #[test]
    fn test_opt_enabled_excludes() {
        let data = Arc::new(GuardedOpt::new(0));
        let held = data.try_lock().unwrap();
        assert!(held.is_locking());

        let other = data.clone();
        let acquired = thread::spawn(move || other.try_lock().is_some())
            .join()
            .unwrap();
        assert!(!acquired);
    }

    #[test]
    fn test_opt_safe_constructors_always_lock() {
        let data = Arc::new(GuardedOpt::with_lock(0u32, parking_lot::RawFairMutex::INIT));
        assert!(data.is_enabled());
        assert!(GuardedOpt::new(0u32).is_enabled());

        let held = data.lock();
        let other = data.clone();
        let excluded = thread::spawn(move || {
            other.try_lock().is_none() && other.try_lock_for(Duration::from_millis(5)).is_none()
        })
        .join()
        .unwrap();
        assert!(excluded);
        drop(held);
    }

    #[test]
    fn test_opt_disabled_is_pass_through() {
        // Safety: no handle is ever dereferenced
        let data = Arc::new(unsafe { GuardedOpt::new_unsynchronized(0) });
        let held = data.lock();
        assert!(!held.is_locking());

        let other = data.clone();
        let acquired = thread::spawn(move || {
            other.try_lock().is_some()
                && other.try_lock_for(Duration::from_millis(20)).is_some()
                && other
                    .try_lock_until(Instant::now() + Duration::from_millis(20))
                    .is_some()
        })
        .join()
        .unwrap();

        assert!(acquired);
        drop(held);
    }
}
