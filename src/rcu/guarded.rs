/*!
 * RCU Discipline
 *
 * Hosts an RCU-capable collection: readers never block, writers are
 * serialized by a lock and edit the collection in place.
 */

use super::epoch::ReclaimStats;
use crate::access::{SharedAccess, TimedSharedAccess};
use crate::handle::Cancel;
use crate::lock::{DefaultMutex, RawGuard, RawLock, RawTimedLock};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// A structure that can be read under a pin and written by one writer
///
/// # Safety Contract
///
/// Readers reach the structure only through the view returned by
/// [`pin`](Self::pin). Anything a writer unlinks must stay allocated until
/// every view taken before the unlink is dropped.
pub trait RcuCollection {
    /// What a reader sees
    type View: ?Sized;

    /// Pinned reader view that keeps retired parts alive
    type Reader<'a>: Deref<Target = Self::View>
    where
        Self: 'a;

    /// In-place writer; dropping it ends the write session
    type Writer<'a>
    where
        Self: 'a;

    /// Pin the structure for reading
    fn pin(&self) -> Self::Reader<'_>;

    /// Start a write session
    ///
    /// # Safety
    ///
    /// At most one writer may exist at a time, and readers running alongside
    /// it must go through [`pin`](Self::pin). [`RcuGuarded`] upholds both.
    unsafe fn writer(&self) -> Self::Writer<'_>;

    /// Retirement counters for diagnostics
    fn reclaim_stats(&self) -> ReclaimStats;
}

/// Read-copy-update discipline
///
/// # Example
///
/// ```
/// use guarded::{RcuGuarded, RcuValue};
///
/// let config = RcuGuarded::new(RcuValue::new(String::from("v1")));
/// let reader = config.lock_read();
///
/// config.lock_write().push_str("-patched");
///
/// // The reader keeps the version it pinned
/// assert_eq!(*reader, "v1");
/// assert_eq!(*config.lock_read(), "v1-patched");
/// ```
pub struct RcuGuarded<C, M: RawLock = DefaultMutex> {
    collection: C,
    write_lock: M,
}

impl<C: RcuCollection> RcuGuarded<C> {
    #[inline]
    pub fn new(collection: C) -> Self {
        Self::with_lock(collection, DefaultMutex::INIT)
    }
}

impl<C: RcuCollection, M: RawLock> RcuGuarded<C, M> {
    #[inline]
    pub fn with_lock(collection: C, write_lock: M) -> Self {
        Self {
            collection,
            write_lock,
        }
    }

    /// Pin and read the collection; never blocks
    #[inline]
    pub fn lock_read(&self) -> RcuReadHandle<'_, C> {
        RcuReadHandle {
            reader: self.collection.pin(),
        }
    }

    /// Pin and read the collection; never fails
    #[inline]
    pub fn try_lock_read(&self) -> Option<RcuReadHandle<'_, C>> {
        Some(self.lock_read())
    }

    /// Block until no other writer is active, then start a write session
    pub fn lock_write(&self) -> RcuWriteHandle<'_, C, M> {
        self.write_handle(RawGuard::acquire(&self.write_lock))
    }

    /// Start a write session if no other writer is active
    pub fn try_lock_write(&self) -> Option<RcuWriteHandle<'_, C, M>> {
        RawGuard::try_acquire(&self.write_lock).map(|w| self.write_handle(w))
    }

    #[inline]
    fn write_handle<'a>(&'a self, lock: RawGuard<'a, M>) -> RcuWriteHandle<'a, C, M> {
        RcuWriteHandle {
            // Safety: `lock` excludes every other writer
            writer: unsafe { self.collection.writer() },
            _lock: lock,
        }
    }

    /// Retirement counters of the hosted collection
    pub fn reclaim_stats(&self) -> ReclaimStats {
        self.collection.reclaim_stats()
    }

    #[inline]
    pub fn into_inner(self) -> C {
        self.collection
    }
}

impl<C: RcuCollection, M: RawTimedLock> RcuGuarded<C, M> {
    /// Try to start a write session, giving up after `timeout`
    pub fn try_lock_write_for(&self, timeout: Duration) -> Option<RcuWriteHandle<'_, C, M>> {
        RawGuard::try_acquire_for(&self.write_lock, timeout).map(|w| self.write_handle(w))
    }

    /// Try to start a write session, giving up at `deadline`
    pub fn try_lock_write_until(&self, deadline: Instant) -> Option<RcuWriteHandle<'_, C, M>> {
        RawGuard::try_acquire_until(&self.write_lock, deadline).map(|w| self.write_handle(w))
    }
}

impl<C: RcuCollection + Default, M: RawLock> Default for RcuGuarded<C, M> {
    fn default() -> Self {
        Self::with_lock(C::default(), M::INIT)
    }
}

impl<C: RcuCollection, M: RawLock> fmt::Debug for RcuGuarded<C, M>
where
    C::View: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RcuGuarded")
            .field("collection", &&*self.lock_read())
            .finish()
    }
}

impl<C: RcuCollection, M: RawLock> SharedAccess<C::View> for RcuGuarded<C, M> {
    type SharedHandle<'a> = RcuReadHandle<'a, C> where Self: 'a;

    fn lock_shared(&self) -> Self::SharedHandle<'_> {
        self.lock_read()
    }

    fn try_lock_shared(&self) -> Option<Self::SharedHandle<'_>> {
        self.try_lock_read()
    }
}

impl<C: RcuCollection, M: RawLock> TimedSharedAccess<C::View> for RcuGuarded<C, M> {
    fn try_lock_shared_for(&self, _timeout: Duration) -> Option<Self::SharedHandle<'_>> {
        self.try_lock_read()
    }

    fn try_lock_shared_until(&self, _deadline: Instant) -> Option<Self::SharedHandle<'_>> {
        self.try_lock_read()
    }
}

/// Read handle of an [`RcuGuarded`]
///
/// Dereferences to the collection's pinned view. Everything reachable
/// through it stays valid until it drops, even if a writer unlinks it in
/// the meantime.
#[must_use = "if unused the pin is released immediately"]
pub struct RcuReadHandle<'a, C: RcuCollection + 'a> {
    reader: C::Reader<'a>,
}

impl<'a, C: RcuCollection + 'a> Deref for RcuReadHandle<'a, C> {
    type Target = C::View;

    #[inline]
    fn deref(&self) -> &C::View {
        &*self.reader
    }
}

impl<'a, C: RcuCollection + 'a> fmt::Debug for RcuReadHandle<'a, C>
where
    C::View: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RcuReadHandle").field(&&**self).finish()
    }
}

/// Write handle of an [`RcuGuarded`]
///
/// Dereferences to the collection's writer. Dropping it ends the write
/// session, then releases the write lock.
#[must_use = "if unused the write session ends immediately"]
pub struct RcuWriteHandle<'a, C: RcuCollection + 'a, M: RawLock> {
    // Field order matters: the session ends before the lock is released
    writer: C::Writer<'a>,
    _lock: RawGuard<'a, M>,
}

impl<'a, C: RcuCollection + 'a, M: RawLock> Deref for RcuWriteHandle<'a, C, M> {
    type Target = C::Writer<'a>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.writer
    }
}

impl<'a, C: RcuCollection + 'a, M: RawLock> DerefMut for RcuWriteHandle<'a, C, M> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.writer
    }
}

impl<'a, C: RcuCollection + 'a, M: RawLock> Cancel for RcuWriteHandle<'a, C, M> {
    /// In-place edits are already visible; this only ends the session early
    fn cancel(self) {
        drop(self);
    }
}
