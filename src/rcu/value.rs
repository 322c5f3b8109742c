/*!
 * RCU Value
 *
 * Whole-value read-copy-update: the writer edits a clone and swaps it in
 * when its session ends; the replaced version becomes a zombie until the
 * readers that could see it are gone.
 */

use super::epoch::{Domain, Pinned, ReclaimStats};
use super::guarded::RcuCollection;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicPtr, Ordering};
use std::thread;

/// Single value published by pointer swap
pub struct RcuValue<T> {
    current: AtomicPtr<T>,
    domain: Domain<Box<T>>,
}

unsafe impl<T: Send + Sync> Send for RcuValue<T> {}
unsafe impl<T: Send + Sync> Sync for RcuValue<T> {}

impl<T> RcuValue<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: AtomicPtr::new(Box::into_raw(Box::new(value))),
            domain: Domain::new(),
        }
    }

    /// Pin the published version
    pub fn pin(&self) -> ValuePin<'_, T> {
        let pin = self.domain.pin();
        // Safety: loaded after pinning, so any later replacement retires it
        // into the pinned generation or a newer one
        let version = unsafe { self.current() };
        ValuePin { version, _pin: pin }
    }

    /// Published version, for callers that already exclude writers
    ///
    /// # Safety
    ///
    /// The returned reference must not outlive the caller's pin or write
    /// session.
    #[inline]
    unsafe fn current(&self) -> &T {
        &*self.current.load(Ordering::Acquire)
    }
}

impl<T: Default> Default for RcuValue<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Drop for RcuValue<T> {
    fn drop(&mut self) {
        // Safety: allocated by `Box::into_raw` and never retired
        drop(unsafe { Box::from_raw(*self.current.get_mut()) });
    }
}

impl<T: fmt::Debug> fmt::Debug for RcuValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RcuValue").field(&&*self.pin()).finish()
    }
}

/// Pinned version of an [`RcuValue`]
///
/// Dereferences to the version that was published when the pin was taken;
/// later writers never change what it shows.
pub struct ValuePin<'a, T> {
    version: &'a T,
    _pin: Pinned<Box<T>>,
}

impl<T> Deref for ValuePin<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.version
    }
}

impl<T: fmt::Debug> fmt::Debug for ValuePin<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValuePin").field(self.version).finish()
    }
}

impl<T: Clone> RcuCollection for RcuValue<T> {
    type View = T;
    type Reader<'a> = ValuePin<'a, T> where Self: 'a;
    type Writer<'a> = RcuValueWriter<'a, T> where Self: 'a;

    fn pin(&self) -> Self::Reader<'_> {
        RcuValue::pin(self)
    }

    unsafe fn writer(&self) -> Self::Writer<'_> {
        RcuValueWriter {
            owner: self,
            // Safety: the caller is the only writer, so nothing frees the
            // published version during the clone
            draft: ManuallyDrop::new(self.current().clone()),
            publish: true,
        }
    }

    fn reclaim_stats(&self) -> ReclaimStats {
        self.domain.stats()
    }
}

/// Writer over an [`RcuValue`]
///
/// Edits a private clone that is published when the writer drops, unless it
/// was discarded or its thread is unwinding.
pub struct RcuValueWriter<'a, T> {
    owner: &'a RcuValue<T>,
    draft: ManuallyDrop<T>,
    publish: bool,
}

impl<T> RcuValueWriter<'_, T> {
    /// Drop the draft without publishing it
    pub fn discard(mut self) {
        self.publish = false;
    }

    /// Version readers currently see
    pub fn published(&self) -> &T {
        // Safety: only this writer could retire the published version
        unsafe { self.owner.current() }
    }
}

impl<T> Deref for RcuValueWriter<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.draft
    }
}

impl<T> DerefMut for RcuValueWriter<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.draft
    }
}

impl<T> Drop for RcuValueWriter<'_, T> {
    fn drop(&mut self) {
        let draft = unsafe { ManuallyDrop::take(&mut self.draft) };
        if !self.publish || thread::panicking() {
            return;
        }
        let fresh = Box::into_raw(Box::new(draft));
        let old = self.owner.current.swap(fresh, Ordering::AcqRel);
        // Safety: `old` was the published version and is no longer reachable
        // by new readers
        self.owner.domain.retire(unsafe { Box::from_raw(old) });
        self.owner.domain.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_publishes_on_drop() {
        let value = RcuValue::new(vec![1]);
        let before = value.pin();
        {
            let mut writer = unsafe { value.writer() };
            writer.push(2);
            assert_eq!(*writer.published(), vec![1]);
        }
        assert_eq!(*before, vec![1]);
        assert_eq!(*value.pin(), vec![1, 2]);
        assert_eq!(value.reclaim_stats().pending(), 1);
        drop(before);
        assert_eq!(value.reclaim_stats().pending(), 0);
    }

    #[test]
    fn test_pin_keeps_version_across_writers() {
        let value = RcuValue::new(0u32);
        let first = value.pin();
        for _ in 0..3 {
            let mut writer = unsafe { value.writer() };
            *writer += 1;
        }
        let last = value.pin();
        assert_eq!((*first, *last), (0, 3));
        assert_eq!(value.reclaim_stats().pending(), 3);
        assert_eq!(format!("{value:?}"), "RcuValue(3)");
    }

    #[test]
    fn test_discard_keeps_version() {
        let value = RcuValue::new(String::from("kept"));
        let mut writer = unsafe { value.writer() };
        writer.push_str("-dropped");
        writer.discard();
        assert_eq!(*value.pin(), "kept");
        assert_eq!(value.reclaim_stats().retired, 0);
    }
}
