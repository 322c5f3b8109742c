/*!
 * Access Handles
 *
 * Scoped, non-copyable access tokens returned by lock-based disciplines.
 *
 * ## Design Principles
 *
 * 1. **Capability, not container**: a handle borrows the protected value and
 *    never outlives the acquisition it represents
 * 2. **Release exactly once**: the lock is released in `Drop`; a consumed
 *    handle cannot be released again
 * 3. **No empty handles**: failed acquisitions are `None`, so an empty handle
 *    can never be dereferenced
 * 4. **Pass-through mode**: a handle may hold no lock at all when the
 *    discipline was constructed with locking disabled
 */

use crate::lock::{RawLock, RawSharedLock};
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// Explicit early release of an exclusive handle
///
/// Disciplines that write into a private working copy discard it; every
/// other handle just releases its access mode without side effects.
pub trait Cancel {
    /// Release without publishing the in-progress write
    fn cancel(self);
}

/// Exclusive handle over a lock-protected value
///
/// Dereferences mutably to the value. Dropping the handle releases the lock.
#[must_use = "if unused the lock is released immediately"]
pub struct WriteHandle<'a, T: ?Sized, L: RawLock> {
    lock: Option<&'a L>,
    value: &'a UnsafeCell<T>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T: ?Sized, L: RawLock> WriteHandle<'a, T, L> {
    /// Wrap an acquired exclusive lock
    ///
    /// # Safety
    ///
    /// When `lock` is `Some`, the caller must hold it in exclusive mode; the
    /// handle takes over responsibility for releasing it. When `lock` is
    /// `None`, the caller guarantees single-threaded access to `value`.
    #[inline]
    pub(crate) unsafe fn new(lock: Option<&'a L>, value: &'a UnsafeCell<T>) -> Self {
        Self {
            lock,
            value,
            _not_send: PhantomData,
        }
    }

    /// Whether this handle actually holds a lock
    ///
    /// `false` only for optional disciplines constructed with locking disabled.
    #[inline]
    pub fn is_locking(&self) -> bool {
        self.lock.is_some()
    }
}

impl<T: ?Sized, L: RawLock> Deref for WriteHandle<'_, T, L> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.value.get() }
    }
}

impl<T: ?Sized, L: RawLock> DerefMut for WriteHandle<'_, T, L> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.value.get() }
    }
}

impl<T: ?Sized, L: RawLock> Drop for WriteHandle<'_, T, L> {
    #[inline]
    fn drop(&mut self) {
        if let Some(lock) = self.lock {
            unsafe { lock.unlock() };
        }
    }
}

impl<T: ?Sized, L: RawLock> Cancel for WriteHandle<'_, T, L> {
    #[inline]
    fn cancel(self) {
        drop(self);
    }
}

// Safety: sharing the handle only hands out `&T`
unsafe impl<T: ?Sized + Sync, L: RawLock> Sync for WriteHandle<'_, T, L> {}

impl<T: ?Sized + fmt::Debug, L: RawLock> fmt::Debug for WriteHandle<'_, T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriteHandle").field(&&**self).finish()
    }
}

/// Shared handle over a lock-protected value
///
/// Dereferences to the value. Dropping the handle releases the shared lock.
#[must_use = "if unused the lock is released immediately"]
pub struct ReadHandle<'a, T: ?Sized, L: RawSharedLock> {
    lock: Option<&'a L>,
    value: &'a UnsafeCell<T>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T: ?Sized, L: RawSharedLock> ReadHandle<'a, T, L> {
    /// Wrap an acquired shared lock
    ///
    /// # Safety
    ///
    /// When `lock` is `Some`, the caller must hold it in shared mode; the
    /// handle takes over responsibility for releasing it. When `lock` is
    /// `None`, the caller guarantees no concurrent writer exists.
    #[inline]
    pub(crate) unsafe fn new(lock: Option<&'a L>, value: &'a UnsafeCell<T>) -> Self {
        Self {
            lock,
            value,
            _not_send: PhantomData,
        }
    }

    /// Whether this handle actually holds a lock
    #[inline]
    pub fn is_locking(&self) -> bool {
        self.lock.is_some()
    }
}

impl<T: ?Sized, L: RawSharedLock> Deref for ReadHandle<'_, T, L> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.value.get() }
    }
}

impl<T: ?Sized, L: RawSharedLock> Drop for ReadHandle<'_, T, L> {
    #[inline]
    fn drop(&mut self) {
        if let Some(lock) = self.lock {
            unsafe { lock.unlock_shared() };
        }
    }
}

unsafe impl<T: ?Sized + Sync, L: RawSharedLock> Sync for ReadHandle<'_, T, L> {}

impl<T: ?Sized + fmt::Debug, L: RawSharedLock> fmt::Debug for ReadHandle<'_, T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadHandle").field(&&**self).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{DefaultMutex, DefaultRwLock};

    #[test]
    fn test_write_handle_releases_on_drop() {
        let lock = DefaultMutex::INIT;
        let value = UnsafeCell::new(5);

        lock.lock();
        let mut handle = unsafe { WriteHandle::new(Some(&lock), &value) };
        *handle += 1;
        assert!(handle.is_locking());
        assert!(!lock.try_lock());

        drop(handle);
        assert!(lock.try_lock());
        unsafe { lock.unlock() };
        assert_eq!(value.into_inner(), 6);
    }

    #[test]
    fn test_cancel_releases() {
        let lock = DefaultMutex::INIT;
        let value = UnsafeCell::new(0);

        lock.lock();
        let handle = unsafe { WriteHandle::new(Some(&lock), &value) };
        handle.cancel();
        assert!(lock.try_lock());
        unsafe { lock.unlock() };
    }

    #[test]
    fn test_read_handle_releases_shared() {
        let lock = DefaultRwLock::INIT;
        let value = UnsafeCell::new(String::from("shared"));

        lock.lock_shared();
        let handle = unsafe { ReadHandle::new(Some(&lock), &value) };
        assert_eq!(handle.as_str(), "shared");
        assert!(!RawLock::try_lock(&lock));

        drop(handle);
        assert!(RawLock::try_lock(&lock));
        unsafe { RawLock::unlock(&lock) };
    }

    #[test]
    fn test_pass_through_handle() {
        let value = UnsafeCell::new(1);
        let handle: WriteHandle<'_, i32, DefaultMutex> = unsafe { WriteHandle::new(None, &value) };
        assert!(!handle.is_locking());
        assert_eq!(*handle, 1);
    }
}
