/*!
 * Access Traits
 *
 * The uniform contract shared by every discipline. Code written against
 * these traits can switch disciplines without touching call sites:
 *
 * ```
 * use guarded::{CowGuarded, ExclusiveAccess, Guarded, SharedAccess, SharedGuarded};
 *
 * fn bump<D: ExclusiveAccess<u64> + SharedAccess<u64>>(data: &D) -> u64 {
 *     *data.lock() += 1;
 *     *data.lock_shared()
 * }
 *
 * assert_eq!(bump(&Guarded::new(0)), 1);
 * assert_eq!(bump(&SharedGuarded::new(1)), 2);
 * assert_eq!(bump(&CowGuarded::new(2)), 3);
 * ```
 *
 * # Type Safety
 *
 * A failed non-blocking or timed acquisition yields `None`, never an empty
 * handle, so there is nothing to dereference by mistake.
 */

use crate::handle::Cancel;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// Exclusive (mutable) acquisition
pub trait ExclusiveAccess<T: ?Sized> {
    /// Handle granting mutable access
    type Handle<'a>: DerefMut<Target = T> + Cancel
    where
        Self: 'a;

    /// Block until exclusive access is granted
    fn lock(&self) -> Self::Handle<'_>;

    /// Acquire exclusive access without blocking
    fn try_lock(&self) -> Option<Self::Handle<'_>>;
}

/// Exclusive acquisition with bounded waits
pub trait TimedExclusiveAccess<T: ?Sized>: ExclusiveAccess<T> {
    /// Try to acquire, giving up after `timeout`
    fn try_lock_for(&self, timeout: Duration) -> Option<Self::Handle<'_>>;

    /// Try to acquire, giving up at `deadline`
    fn try_lock_until(&self, deadline: Instant) -> Option<Self::Handle<'_>>;
}

/// Shared (read-only) acquisition
pub trait SharedAccess<T: ?Sized> {
    /// Handle granting read access
    type SharedHandle<'a>: Deref<Target = T>
    where
        Self: 'a;

    /// Block until shared access is granted
    fn lock_shared(&self) -> Self::SharedHandle<'_>;

    /// Acquire shared access without blocking
    fn try_lock_shared(&self) -> Option<Self::SharedHandle<'_>>;
}

/// Shared acquisition with bounded waits
pub trait TimedSharedAccess<T: ?Sized>: SharedAccess<T> {
    /// Try to acquire shared access, giving up after `timeout`
    fn try_lock_shared_for(&self, timeout: Duration) -> Option<Self::SharedHandle<'_>>;

    /// Try to acquire shared access, giving up at `deadline`
    fn try_lock_shared_until(&self, deadline: Instant) -> Option<Self::SharedHandle<'_>>;
}
