/*!
 * Shared Discipline
 *
 * Reader/writer locking: any number of shared handles, or one exclusive
 * handle. [`SharedGuardedOpt`] can be built with locking disabled, in which
 * case every acquisition is a pass-through.
 */

use crate::access::{ExclusiveAccess, SharedAccess, TimedExclusiveAccess, TimedSharedAccess};
use crate::handle::{ReadHandle, WriteHandle};
use crate::lock::{DefaultRwLock, RawLock, RawSharedLock, RawTimedSharedLock};
use std::cell::UnsafeCell;
use std::fmt;
use std::time::{Duration, Instant};

/// Value protected by a reader/writer lock
///
/// # Example
///
/// ```
/// use guarded::SharedGuarded;
///
/// let config = SharedGuarded::new(String::from("v1"));
/// config.lock().push_str(".1");
/// assert_eq!(config.lock_shared().as_str(), "v1.1");
/// ```
pub struct SharedGuarded<T: ?Sized, L: RawSharedLock = DefaultRwLock> {
    lock: L,
    value: UnsafeCell<T>,
}

// Safety: readers receive `&T` concurrently, hence `T: Sync`
unsafe impl<T: ?Sized + Send, L: RawSharedLock> Send for SharedGuarded<T, L> {}
unsafe impl<T: ?Sized + Send + Sync, L: RawSharedLock> Sync for SharedGuarded<T, L> {}

impl<T> SharedGuarded<T> {
    /// Protect `value` with the default reader/writer lock
    #[inline]
    pub const fn new(value: T) -> Self {
        Self::with_lock(value, DefaultRwLock::INIT)
    }
}

impl<T, L: RawSharedLock> SharedGuarded<T, L> {
    /// Protect `value` with a caller-supplied lock
    #[inline]
    pub const fn with_lock(value: T, lock: L) -> Self {
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

impl<T: ?Sized, L: RawSharedLock> SharedGuarded<T, L> {
    #[inline]
    fn write_handle(&self) -> WriteHandle<'_, T, L> {
        unsafe { WriteHandle::new(Some(&self.lock), &self.value) }
    }

    #[inline]
    fn read_handle(&self) -> ReadHandle<'_, T, L> {
        unsafe { ReadHandle::new(Some(&self.lock), &self.value) }
    }

    /// Block until exclusive access is granted
    #[inline]
    pub fn lock(&self) -> WriteHandle<'_, T, L> {
        RawLock::lock(&self.lock);
        self.write_handle()
    }

    /// Acquire exclusive access without blocking
    #[inline]
    pub fn try_lock(&self) -> Option<WriteHandle<'_, T, L>> {
        RawLock::try_lock(&self.lock).then(|| self.write_handle())
    }

    /// Block until shared access is granted
    #[inline]
    pub fn lock_shared(&self) -> ReadHandle<'_, T, L> {
        self.lock.lock_shared();
        self.read_handle()
    }

    /// Acquire shared access without blocking
    #[inline]
    pub fn try_lock_shared(&self) -> Option<ReadHandle<'_, T, L>> {
        self.lock.try_lock_shared().then(|| self.read_handle())
    }

    /// Mutable access without locking
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

impl<T: ?Sized, L: RawTimedSharedLock> SharedGuarded<T, L> {
    /// Try to acquire exclusive access, giving up after `timeout`
    #[inline]
    pub fn try_lock_for(&self, timeout: Duration) -> Option<WriteHandle<'_, T, L>> {
        self.lock.try_lock_for(timeout).then(|| self.write_handle())
    }

    /// Try to acquire exclusive access, giving up at `deadline`
    #[inline]
    pub fn try_lock_until(&self, deadline: Instant) -> Option<WriteHandle<'_, T, L>> {
        self.lock.try_lock_until(deadline).then(|| self.write_handle())
    }

    /// Try to acquire shared access, giving up after `timeout`
    #[inline]
    pub fn try_lock_shared_for(&self, timeout: Duration) -> Option<ReadHandle<'_, T, L>> {
        self.lock.try_lock_shared_for(timeout).then(|| self.read_handle())
    }

    /// Try to acquire shared access, giving up at `deadline`
    #[inline]
    pub fn try_lock_shared_until(&self, deadline: Instant) -> Option<ReadHandle<'_, T, L>> {
        self.lock
            .try_lock_shared_until(deadline)
            .then(|| self.read_handle())
    }
}

impl<T, L: RawSharedLock> From<T> for SharedGuarded<T, L> {
    fn from(value: T) -> Self {
        Self::with_lock(value, L::INIT)
    }
}

impl<T: Default, L: RawSharedLock> Default for SharedGuarded<T, L> {
    fn default() -> Self {
        Self::from(T::default())
    }
}

impl<T: ?Sized + fmt::Debug, L: RawSharedLock> fmt::Debug for SharedGuarded<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock_shared() {
            Some(handle) => f
                .debug_struct("SharedGuarded")
                .field("value", &&*handle)
                .finish(),
            None => f
                .debug_struct("SharedGuarded")
                .field("value", &"<locked>")
                .finish(),
        }
    }
}

impl<T: ?Sized, L: RawSharedLock> ExclusiveAccess<T> for SharedGuarded<T, L> {
    type Handle<'a> = WriteHandle<'a, T, L> where Self: 'a;

    fn lock(&self) -> Self::Handle<'_> {
        SharedGuarded::lock(self)
    }

    fn try_lock(&self) -> Option<Self::Handle<'_>> {
        SharedGuarded::try_lock(self)
    }
}

impl<T: ?Sized, L: RawTimedSharedLock> TimedExclusiveAccess<T> for SharedGuarded<T, L> {
    fn try_lock_for(&self, timeout: Duration) -> Option<Self::Handle<'_>> {
        SharedGuarded::try_lock_for(self, timeout)
    }

    fn try_lock_until(&self, deadline: Instant) -> Option<Self::Handle<'_>> {
        SharedGuarded::try_lock_until(self, deadline)
    }
}

impl<T: ?Sized, L: RawSharedLock> SharedAccess<T> for SharedGuarded<T, L> {
    type SharedHandle<'a> = ReadHandle<'a, T, L> where Self: 'a;

    fn lock_shared(&self) -> Self::SharedHandle<'_> {
        SharedGuarded::lock_shared(self)
    }

    fn try_lock_shared(&self) -> Option<Self::SharedHandle<'_>> {
        SharedGuarded::try_lock_shared(self)
    }
}

impl<T: ?Sized, L: RawTimedSharedLock> TimedSharedAccess<T> for SharedGuarded<T, L> {
    fn try_lock_shared_for(&self, timeout: Duration) -> Option<Self::SharedHandle<'_>> {
        SharedGuarded::try_lock_shared_for(self, timeout)
    }

    fn try_lock_shared_until(&self, deadline: Instant) -> Option<Self::SharedHandle<'_>> {
        SharedGuarded::try_lock_shared_until(self, deadline)
    }
}

/// Reader/writer discipline whose locking can be switched off at construction
///
/// Built with [`SharedGuardedOpt::new`] it behaves like [`SharedGuarded`].
/// With locking disabled no acquisition synchronizes: exclusive and shared
/// handles from different threads can all be live at once. This mode exists
/// for callers that already run single-threaded and want to skip lock costs,
/// so it is only reachable through unsafe constructors.
pub struct SharedGuardedOpt<T: ?Sized, L: RawSharedLock = DefaultRwLock> {
    enabled: bool,
    lock: L,
    value: UnsafeCell<T>,
}

// Safety: with locking enabled the lock orders access; with it disabled the
// unsafe constructors put exclusivity on the caller
unsafe impl<T: ?Sized + Send, L: RawSharedLock> Send for SharedGuardedOpt<T, L> {}
unsafe impl<T: ?Sized + Send + Sync, L: RawSharedLock> Sync for SharedGuardedOpt<T, L> {}

impl<T> SharedGuardedOpt<T> {
    /// Protect `value` with the default reader/writer lock; locking is enabled
    #[inline]
    pub const fn new(value: T) -> Self {
        Self::with_lock(value, DefaultRwLock::INIT)
    }

    /// Hold `value` with locking disabled
    ///
    /// # Safety
    ///
    /// The caller guarantees single-threaded access: a write handle is never
    /// dereferenced while any other handle is in use on another thread.
    #[inline]
    pub const unsafe fn new_unsynchronized(value: T) -> Self {
        Self::with_locking(false, value, DefaultRwLock::INIT)
    }
}

impl<T, L: RawSharedLock> SharedGuardedOpt<T, L> {
    /// Protect `value` with a caller-supplied lock; locking is enabled
    #[inline]
    pub const fn with_lock(value: T, lock: L) -> Self {
        // Safety: locking is enabled
        unsafe { Self::with_locking(true, value, lock) }
    }

    /// Protect `value` with `lock`, or bypass it entirely when `enabled` is
    /// false
    ///
    /// # Safety
    ///
    /// When `enabled` is false the caller guarantees single-threaded access,
    /// as for [`SharedGuardedOpt::new_unsynchronized`].
    #[inline]
    pub const unsafe fn with_locking(enabled: bool, value: T, lock: L) -> Self {
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

impl<T: ?Sized, L: RawSharedLock> SharedGuardedOpt<T, L> {
    /// Whether acquisitions synchronize
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    fn write_handle(&self, locked: bool) -> WriteHandle<'_, T, L> {
        let lock = if locked { Some(&self.lock) } else { None };
        unsafe { WriteHandle::new(lock, &self.value) }
    }

    #[inline]
    fn read_handle(&self, locked: bool) -> ReadHandle<'_, T, L> {
        let lock = if locked { Some(&self.lock) } else { None };
        unsafe { ReadHandle::new(lock, &self.value) }
    }

    /// Block until exclusive access is granted
    #[inline]
    pub fn lock(&self) -> WriteHandle<'_, T, L> {
        if self.enabled {
            RawLock::lock(&self.lock);
        }
        self.write_handle(self.enabled)
    }

    /// Acquire exclusive access without blocking
    #[inline]
    pub fn try_lock(&self) -> Option<WriteHandle<'_, T, L>> {
        if !self.enabled {
            return Some(self.write_handle(false));
        }
        RawLock::try_lock(&self.lock).then(|| self.write_handle(true))
    }

    /// Block until shared access is granted
    #[inline]
    pub fn lock_shared(&self) -> ReadHandle<'_, T, L> {
        if self.enabled {
            self.lock.lock_shared();
        }
        self.read_handle(self.enabled)
    }

    /// Acquire shared access without blocking
    #[inline]
    pub fn try_lock_shared(&self) -> Option<ReadHandle<'_, T, L>> {
        if !self.enabled {
            return Some(self.read_handle(false));
        }
        self.lock.try_lock_shared().then(|| self.read_handle(true))
    }
}

impl<T: ?Sized, L: RawTimedSharedLock> SharedGuardedOpt<T, L> {
    /// Try to acquire exclusive access, giving up after `timeout`
    #[inline]
    pub fn try_lock_for(&self, timeout: Duration) -> Option<WriteHandle<'_, T, L>> {
        if !self.enabled {
            return Some(self.write_handle(false));
        }
        self.lock.try_lock_for(timeout).then(|| self.write_handle(true))
    }

    /// Try to acquire exclusive access, giving up at `deadline`
    #[inline]
    pub fn try_lock_until(&self, deadline: Instant) -> Option<WriteHandle<'_, T, L>> {
        if !self.enabled {
            return Some(self.write_handle(false));
        }
        self.lock
            .try_lock_until(deadline)
            .then(|| self.write_handle(true))
    }

    /// Try to acquire shared access, giving up after `timeout`
    #[inline]
    pub fn try_lock_shared_for(&self, timeout: Duration) -> Option<ReadHandle<'_, T, L>> {
        if !self.enabled {
            return Some(self.read_handle(false));
        }
        self.lock
            .try_lock_shared_for(timeout)
            .then(|| self.read_handle(true))
    }

    /// Try to acquire shared access, giving up at `deadline`
    #[inline]
    pub fn try_lock_shared_until(&self, deadline: Instant) -> Option<ReadHandle<'_, T, L>> {
        if !self.enabled {
            return Some(self.read_handle(false));
        }
        self.lock
            .try_lock_shared_until(deadline)
            .then(|| self.read_handle(true))
    }
}

impl<T: ?Sized, L: RawSharedLock> ExclusiveAccess<T> for SharedGuardedOpt<T, L> {
    type Handle<'a> = WriteHandle<'a, T, L> where Self: 'a;

    fn lock(&self) -> Self::Handle<'_> {
        SharedGuardedOpt::lock(self)
    }

    fn try_lock(&self) -> Option<Self::Handle<'_>> {
        SharedGuardedOpt::try_lock(self)
    }
}

impl<T: ?Sized, L: RawTimedSharedLock> TimedExclusiveAccess<T> for SharedGuardedOpt<T, L> {
    fn try_lock_for(&self, timeout: Duration) -> Option<Self::Handle<'_>> {
        SharedGuardedOpt::try_lock_for(self, timeout)
    }

    fn try_lock_until(&self, deadline: Instant) -> Option<Self::Handle<'_>> {
        SharedGuardedOpt::try_lock_until(self, deadline)
    }
}

impl<T: ?Sized, L: RawSharedLock> SharedAccess<T> for SharedGuardedOpt<T, L> {
    type SharedHandle<'a> = ReadHandle<'a, T, L> where Self: 'a;

    fn lock_shared(&self) -> Self::SharedHandle<'_> {
        SharedGuardedOpt::lock_shared(self)
    }

    fn try_lock_shared(&self) -> Option<Self::SharedHandle<'_>> {
        SharedGuardedOpt::try_lock_shared(self)
    }
}

impl<T: ?Sized, L: RawTimedSharedLock> TimedSharedAccess<T> for SharedGuardedOpt<T, L> {
    fn try_lock_shared_for(&self, timeout: Duration) -> Option<Self::SharedHandle<'_>> {
        SharedGuardedOpt::try_lock_shared_for(self, timeout)
    }

    fn try_lock_shared_until(&self, deadline: Instant) -> Option<Self::SharedHandle<'_>> {
        SharedGuardedOpt::try_lock_shared_until(self, deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_readers_coexist() {
        let data = Arc::new(SharedGuarded::new(1));
        let first = data.lock_shared();

        let other = data.clone();
        let seen = thread::spawn(move || {
            let a = other.try_lock_shared().map(|h| *h);
            let b = other.try_lock_shared_for(Duration::from_millis(20)).map(|h| *h);
            (a, b)
        })
        .join()
        .unwrap();

        assert_eq!(seen, (Some(1), Some(1)));
        assert_eq!(*first, 1);
    }

    #[test]
    fn test_writer_excludes_readers() {
        let data = Arc::new(SharedGuarded::new(1));
        let writer = data.lock();

        let other = data.clone();
        let blocked = thread::spawn(move || {
            other.try_lock_shared().is_none()
                && other
                    .try_lock_shared_until(Instant::now() + Duration::from_millis(20))
                    .is_none()
                && other.try_lock_for(Duration::from_millis(20)).is_none()
        })
        .join()
        .unwrap();

        assert!(blocked);
        drop(writer);
    }

    #[test]
    fn test_reader_excludes_writer() {
        let data = Arc::new(SharedGuarded::new(1));
        let reader = data.lock_shared();

        let other = data.clone();
        let blocked = thread::spawn(move || other.try_lock().is_none())
            .join()
            .unwrap();

        assert!(blocked);
        drop(reader);
        assert!(data.try_lock().is_some());
    }

    #[test]
    fn test_opt_disabled_reports_no_lock() {
        // Safety: single-threaded, and the writer is never dereferenced
        let data = unsafe { SharedGuardedOpt::new_unsynchronized(5) };
        assert!(!data.is_enabled());
        let writer = data.lock();
        let reader = data.try_lock_shared().unwrap();
        assert!(!writer.is_locking());
        assert!(!reader.is_locking());
        assert_eq!(*reader, 5);
    }

    #[test]
    fn test_opt_enabled_behaves_like_shared() {
        let data = Arc::new(SharedGuardedOpt::new(5));
        let writer = data.try_lock().unwrap();

        let other = data.clone();
        let blocked = thread::spawn(move || other.try_lock_shared().is_none())
            .join()
            .unwrap();

        assert!(blocked);
        drop(writer);
    }
}
