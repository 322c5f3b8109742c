/*!
 * Atomic Discipline
 *
 * Direct load/store/exchange/compare-exchange with no handle to scope.
 *
 * Two strategies, chosen by the value type:
 * - [`AtomicScalar`]: lock-free for `Copy` scalars the hardware can swap
 * - [`AtomicGuarded`]: any `Clone` value, serialized by a short lock
 *
 * # Performance
 *
 * - **Scalar path**: one atomic instruction per operation
 * - **Lock path**: one uncontended lock round-trip plus a clone on `load`
 */

use super::exclusive::Guarded;
use crate::lock::{DefaultMutex, RawLock};
use crossbeam_utils::atomic::AtomicCell;
use std::fmt;
use std::mem;

/// Atomic cell for arbitrary `Clone` values
///
/// # Example
///
/// ```
/// use guarded::AtomicGuarded;
///
/// let name = AtomicGuarded::new(String::from("primary"));
/// let mut expected = String::from("secondary");
///
/// assert!(!name.compare_exchange(&mut expected, String::from("standby")));
/// assert_eq!(expected, "primary");
/// assert!(name.compare_exchange(&mut expected, String::from("standby")));
/// assert_eq!(name.load(), "standby");
/// ```
pub struct AtomicGuarded<T, M: RawLock = DefaultMutex> {
    inner: Guarded<T, M>,
}

impl<T> AtomicGuarded<T> {
    #[inline]
    pub const fn new(value: T) -> Self {
        Self {
            inner: Guarded::new(value),
        }
    }
}

impl<T, M: RawLock> AtomicGuarded<T, M> {
    #[inline]
    pub const fn with_lock(value: T, lock: M) -> Self {
        Self {
            inner: Guarded::with_lock(value, lock),
        }
    }

    /// Clone of the current value
    #[inline]
    pub fn load(&self) -> T
    where
        T: Clone,
    {
        self.inner.lock().clone()
    }

    #[inline]
    pub fn store(&self, value: T) {
        *self.inner.lock() = value;
    }

    /// Store `value` and return the previous one
    #[inline]
    pub fn exchange(&self, value: T) -> T {
        mem::replace(&mut *self.inner.lock(), value)
    }

    /// Store `desired` if the current value equals `expected`
    ///
    /// On failure `expected` is overwritten with the current value and
    /// `false` is returned.
    pub fn compare_exchange(&self, expected: &mut T, desired: T) -> bool
    where
        T: Clone + PartialEq,
    {
        let mut current = self.inner.lock();
        if *current == *expected {
            *current = desired;
            true
        } else {
            expected.clone_from(&*current);
            false
        }
    }

    /// Replace the value with `f(current)` and return the previous one
    pub fn fetch_update(&self, f: impl FnOnce(&T) -> T) -> T {
        let mut current = self.inner.lock();
        let next = f(&*current);
        mem::replace(&mut *current, next)
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T, M: RawLock> From<T> for AtomicGuarded<T, M> {
    fn from(value: T) -> Self {
        Self::with_lock(value, M::INIT)
    }
}

impl<T: Default, M: RawLock> Default for AtomicGuarded<T, M> {
    fn default() -> Self {
        Self::from(T::default())
    }
}

impl<T: fmt::Debug, M: RawLock> fmt::Debug for AtomicGuarded<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Some(value) => f.debug_tuple("AtomicGuarded").field(&&*value).finish(),
            None => f.debug_tuple("AtomicGuarded").field(&"<locked>").finish(),
        }
    }
}

/// Lock-free atomic cell for `Copy` scalars
///
/// Falls back to a global striped lock inside `AtomicCell` when `T` has no
/// native atomic of matching size; [`is_lock_free`](Self::is_lock_free)
/// reports which path is in use.
///
/// # Example
///
/// ```
/// use guarded::AtomicScalar;
///
/// let version = AtomicScalar::new(1u64);
/// let mut expected = 1;
/// assert!(version.compare_exchange(&mut expected, 2));
/// assert_eq!(version.exchange(5), 2);
/// assert_eq!(version.load(), 5);
/// ```
pub struct AtomicScalar<T> {
    cell: AtomicCell<T>,
}

impl<T: Copy + Eq> AtomicScalar<T> {
    #[inline]
    pub const fn new(value: T) -> Self {
        Self {
            cell: AtomicCell::new(value),
        }
    }

    /// Whether operations compile to native atomic instructions
    #[inline]
    pub fn is_lock_free() -> bool {
        AtomicCell::<T>::is_lock_free()
    }

    #[inline]
    pub fn load(&self) -> T {
        self.cell.load()
    }

    #[inline]
    pub fn store(&self, value: T) {
        self.cell.store(value);
    }

    /// Store `value` and return the previous one
    #[inline]
    pub fn exchange(&self, value: T) -> T {
        self.cell.swap(value)
    }

    /// Store `desired` if the current value equals `expected`
    ///
    /// On failure `expected` is overwritten with the current value and
    /// `false` is returned.
    #[inline]
    pub fn compare_exchange(&self, expected: &mut T, desired: T) -> bool {
        match self.cell.compare_exchange(*expected, desired) {
            Ok(_) => true,
            Err(current) => {
                *expected = current;
                false
            }
        }
    }

    /// Apply `f` until it succeeds or declines with `None`
    ///
    /// Returns the previous value on success.
    #[inline]
    pub fn fetch_update(&self, f: impl FnMut(T) -> Option<T>) -> Result<T, T> {
        self.cell.fetch_update(f)
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.cell.into_inner()
    }
}

impl<T: Copy + Eq + Default> Default for AtomicScalar<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Copy + Eq + fmt::Debug> fmt::Debug for AtomicScalar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicScalar").field(&self.load()).finish()
    }
}
