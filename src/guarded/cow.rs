/*!
 * Copy-on-Write Discipline
 *
 * Readers hold immutable snapshots; writers work on a private clone and
 * publish it atomically when their handle is released.
 *
 * # Design
 *
 * - The current snapshot lives in an `ArcSwap`, so a shared acquisition is
 *   a single pointer load plus a reference count increment
 * - A writer takes the write lock, clones the published snapshot and edits
 *   the clone; on release the clone replaces the snapshot
 * - Cancelling a write handle drops the clone and publishes nothing
 *
 * A reader that acquired before a publication keeps seeing its snapshot for
 * as long as it holds it.
 *
 * # Performance
 *
 * - **Reads**: never block, even while a writer is active
 * - **Writes**: one clone of the value per acquisition
 * - **Best for**: read-mostly values that are cheap enough to clone
 */

use crate::access::{ExclusiveAccess, SharedAccess, TimedExclusiveAccess, TimedSharedAccess};
use crate::handle::Cancel;
use crate::lock::{DefaultMutex, RawGuard, RawLock, RawTimedLock};
use arc_swap::ArcSwap;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

/// Value published as immutable snapshots
///
/// # Example
///
/// ```
/// use guarded::{Cancel, CowGuarded};
///
/// let routes = CowGuarded::new(vec!["/"]);
/// let before = routes.lock_shared();
///
/// routes.lock().push("/health");
/// assert_eq!(before.len(), 1);
/// assert_eq!(routes.lock_shared().len(), 2);
///
/// let mut draft = routes.lock();
/// draft.clear();
/// draft.cancel();
/// assert_eq!(routes.lock_shared().len(), 2);
/// ```
pub struct CowGuarded<T, M: RawLock = DefaultMutex> {
    write_lock: M,
    current: ArcSwap<T>,
}

impl<T> CowGuarded<T> {
    /// Publish `value` as the first snapshot
    #[inline]
    pub fn new(value: T) -> Self {
        Self::with_lock(value, DefaultMutex::INIT)
    }
}

impl<T, M: RawLock> CowGuarded<T, M> {
    /// Publish `value` with a caller-supplied write lock
    #[inline]
    pub fn with_lock(value: T, write_lock: M) -> Self {
        Self {
            write_lock,
            current: ArcSwap::from_pointee(value),
        }
    }

    /// Current snapshot; never blocks
    #[inline]
    pub fn lock_shared(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Current snapshot; never fails
    #[inline]
    pub fn try_lock_shared(&self) -> Option<Arc<T>> {
        Some(self.lock_shared())
    }

    /// Current snapshot; never waits
    #[inline]
    pub fn try_lock_shared_for(&self, _timeout: Duration) -> Option<Arc<T>> {
        Some(self.lock_shared())
    }

    /// Current snapshot; never waits
    #[inline]
    pub fn try_lock_shared_until(&self, _deadline: Instant) -> Option<Arc<T>> {
        Some(self.lock_shared())
    }

    /// Replace the snapshot wholesale, serialized with other writers
    pub fn store(&self, value: T) {
        let _writer = RawGuard::acquire(&self.write_lock);
        self.current.store(Arc::new(value));
    }

    /// Return the value if no snapshot is still shared, the snapshot otherwise
    pub fn into_inner(self) -> Result<T, Arc<T>> {
        Arc::try_unwrap(self.current.into_inner())
    }
}

impl<T: Clone, M: RawLock> CowGuarded<T, M> {
    #[inline]
    fn write_handle<'a>(&'a self, writer: RawGuard<'a, M>) -> CowWriteHandle<'a, T, M> {
        let draft = T::clone(&self.current.load());
        CowWriteHandle {
            owner: self,
            draft: ManuallyDrop::new(draft),
            publish: true,
            _writer: writer,
        }
    }

    /// Block until the write lock is held, then edit a private clone
    pub fn lock(&self) -> CowWriteHandle<'_, T, M> {
        self.write_handle(RawGuard::acquire(&self.write_lock))
    }

    /// Take the write lock without blocking
    pub fn try_lock(&self) -> Option<CowWriteHandle<'_, T, M>> {
        RawGuard::try_acquire(&self.write_lock).map(|w| self.write_handle(w))
    }

    /// Edit a clone under the write lock, publish it, and return `f`'s result
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut handle = self.lock();
        f(&mut *handle)
    }
}

impl<T: Clone, M: RawTimedLock> CowGuarded<T, M> {
    /// Try to take the write lock, giving up after `timeout`
    pub fn try_lock_for(&self, timeout: Duration) -> Option<CowWriteHandle<'_, T, M>> {
        RawGuard::try_acquire_for(&self.write_lock, timeout).map(|w| self.write_handle(w))
    }

    /// Try to take the write lock, giving up at `deadline`
    pub fn try_lock_until(&self, deadline: Instant) -> Option<CowWriteHandle<'_, T, M>> {
        RawGuard::try_acquire_until(&self.write_lock, deadline).map(|w| self.write_handle(w))
    }
}

impl<T, M: RawLock> From<T> for CowGuarded<T, M> {
    fn from(value: T) -> Self {
        Self::with_lock(value, M::INIT)
    }
}

impl<T: Default, M: RawLock> Default for CowGuarded<T, M> {
    fn default() -> Self {
        Self::from(T::default())
    }
}

impl<T: fmt::Debug, M: RawLock> fmt::Debug for CowGuarded<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CowGuarded")
            .field("value", &**self.current.load())
            .finish()
    }
}

/// Write handle of a [`CowGuarded`]
///
/// Edits a private clone. Dropping the handle publishes the clone; a handle
/// dropped while its thread unwinds from a panic publishes nothing.
#[must_use = "if unused the clone is published unchanged"]
pub struct CowWriteHandle<'a, T, M: RawLock> {
    owner: &'a CowGuarded<T, M>,
    draft: ManuallyDrop<T>,
    publish: bool,
    // Declared last: released after the publication in `drop`
    _writer: RawGuard<'a, M>,
}

impl<T, M: RawLock> Deref for CowWriteHandle<'_, T, M> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.draft
    }
}

impl<T, M: RawLock> DerefMut for CowWriteHandle<'_, T, M> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.draft
    }
}

impl<T, M: RawLock> Drop for CowWriteHandle<'_, T, M> {
    fn drop(&mut self) {
        // Safety: `draft` is taken exactly once, here
        let draft = unsafe { ManuallyDrop::take(&mut self.draft) };
        if self.publish && !thread::panicking() {
            self.owner.current.store(Arc::new(draft));
            trace!("published copy-on-write snapshot");
        } else {
            drop(draft);
            trace!("discarded copy-on-write draft");
        }
    }
}

impl<T, M: RawLock> Cancel for CowWriteHandle<'_, T, M> {
    /// Discard the private clone; the published snapshot stays as it was
    fn cancel(mut self) {
        self.publish = false;
    }
}

impl<T: fmt::Debug, M: RawLock> fmt::Debug for CowWriteHandle<'_, T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CowWriteHandle").field(&*self.draft).finish()
    }
}

impl<T: Clone, M: RawLock> ExclusiveAccess<T> for CowGuarded<T, M> {
    type Handle<'a> = CowWriteHandle<'a, T, M> where Self: 'a;

    fn lock(&self) -> Self::Handle<'_> {
        CowGuarded::lock(self)
    }

    fn try_lock(&self) -> Option<Self::Handle<'_>> {
        CowGuarded::try_lock(self)
    }
}

impl<T: Clone, M: RawTimedLock> TimedExclusiveAccess<T> for CowGuarded<T, M> {
    fn try_lock_for(&self, timeout: Duration) -> Option<Self::Handle<'_>> {
        CowGuarded::try_lock_for(self, timeout)
    }

    fn try_lock_until(&self, deadline: Instant) -> Option<Self::Handle<'_>> {
        CowGuarded::try_lock_until(self, deadline)
    }
}

impl<T, M: RawLock> SharedAccess<T> for CowGuarded<T, M> {
    type SharedHandle<'a> = Arc<T> where Self: 'a;

    fn lock_shared(&self) -> Self::SharedHandle<'_> {
        CowGuarded::lock_shared(self)
    }

    fn try_lock_shared(&self) -> Option<Self::SharedHandle<'_>> {
        CowGuarded::try_lock_shared(self)
    }
}

impl<T, M: RawLock> TimedSharedAccess<T> for CowGuarded<T, M> {
    fn try_lock_shared_for(&self, timeout: Duration) -> Option<Self::SharedHandle<'_>> {
        CowGuarded::try_lock_shared_for(self, timeout)
    }

    fn try_lock_shared_until(&self, deadline: Instant) -> Option<Self::SharedHandle<'_>> {
        CowGuarded::try_lock_shared_until(self, deadline)
    }
}
