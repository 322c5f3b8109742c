/*!
 * Deferred Discipline
 *
 * Reader/writer locking plus a queue of pending mutations. Writers never
 * block: a mutation is applied on the spot when the write lock is free and
 * queued otherwise. Queued mutations are applied in submission order by the
 * next thread that finds the write lock free.
 *
 * # Design
 *
 * Draining happens at three points:
 * - after every submission
 * - before every shared acquisition takes its lock
 * - after every shared handle releases its lock
 *
 * The drain loop re-checks the queue after releasing the write lock, so a
 * mutation pushed while another thread was draining is never stranded.
 *
 * # Performance
 *
 * - Submission is a lock-free push plus one `try_lock`
 * - Readers pay an emptiness check on each side of their critical section
 */

use crate::access::{SharedAccess, TimedSharedAccess};
use crate::errors::{GuardedError, GuardedResult};
use crate::lock::{DefaultRwLock, RawGuard, RawLock, RawSharedLock, RawTimedSharedLock};
use crossbeam_queue::SegQueue;
use std::any::Any;
use std::cell::UnsafeCell;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::ptr;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

type Mutation<T> = Box<dyn FnOnce(&mut T) + Send>;

/// Value protected by a reader/writer lock with non-blocking writers
///
/// # Example
///
/// ```
/// use guarded::DeferredGuarded;
///
/// let totals = DeferredGuarded::new(0u64);
/// totals.modify_detach(|v| *v += 5);
/// let doubled = totals.modify_async(|v| {
///     *v *= 2;
///     *v
/// });
///
/// assert_eq!(doubled.wait().unwrap(), 10);
/// assert_eq!(*totals.lock_shared(), 10);
/// ```
pub struct DeferredGuarded<T, L: RawSharedLock = DefaultRwLock> {
    lock: L,
    value: UnsafeCell<T>,
    pending: SegQueue<Mutation<T>>,
}

// Safety: mutations run under the exclusive lock, readers under the shared lock
unsafe impl<T: Send, L: RawSharedLock> Send for DeferredGuarded<T, L> {}
unsafe impl<T: Send + Sync, L: RawSharedLock> Sync for DeferredGuarded<T, L> {}

impl<T> DeferredGuarded<T> {
    /// Protect `value` with the default reader/writer lock
    #[inline]
    pub fn new(value: T) -> Self {
        Self::with_lock(value, DefaultRwLock::INIT)
    }
}

impl<T, L: RawSharedLock> DeferredGuarded<T, L> {
    /// Protect `value` with a caller-supplied lock
    #[inline]
    pub fn with_lock(value: T, lock: L) -> Self {
        Self {
            lock,
            value: UnsafeCell::new(value),
            pending: SegQueue::new(),
        }
    }

    /// Apply every queued mutation and return the value
    pub fn into_inner(mut self) -> T {
        self.drain_owned();
        let mut this = ManuallyDrop::new(self);
        // Safety: `this` is never touched again after its fields are moved
        // out or dropped in place
        unsafe {
            let value = ptr::read(this.value.get());
            ptr::drop_in_place(&mut this.pending);
            ptr::drop_in_place(&mut this.lock);
            value
        }
    }

    /// Number of mutations submitted but not yet applied
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Submit `f` without waiting for it to be applied
    ///
    /// Nobody waits on a detached mutation, so a panic inside `f` is caught
    /// where it runs and logged; the draining thread carries on with the
    /// rest of the queue.
    pub fn modify_detach(&self, f: impl FnOnce(&mut T) + Send + 'static) {
        self.pending.push(Box::new(f));
        self.apply_pending();
    }

    /// Submit `f` and receive its result once it has been applied
    ///
    /// If `f` panics, the panic is caught where it runs and re-raised in the
    /// thread that waits on the returned future.
    pub fn modify_async<R>(&self, f: impl FnOnce(&mut T) -> R + Send + 'static) -> ModifyFuture<R>
    where
        R: Send + 'static,
    {
        let (tx, rx) = flume::bounded(1);
        self.modify_detach(move |value| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(value)));
            // The future may have been dropped; the mutation still counts
            let _ = tx.send(result);
        });
        ModifyFuture { rx }
    }

    /// Apply queued mutations if the write lock can be taken right now
    pub fn apply_pending(&self) {
        while !self.pending.is_empty() {
            let Some(_writer) = RawGuard::try_acquire(&self.lock) else {
                return;
            };
            // Safety: the exclusive lock is held until `_writer` drops
            let value = unsafe { &mut *self.value.get() };
            let applied = drain(&self.pending, value);
            trace!(applied, "applied deferred mutations");
        }
    }

    fn drain_owned(&mut self) {
        let applied = drain(&self.pending, self.value.get_mut());
        if applied > 0 {
            debug!(applied, "applied deferred mutations at teardown");
        }
    }

    #[inline]
    fn read_handle(&self) -> DeferredReadHandle<'_, T, L> {
        DeferredReadHandle {
            owner: self,
            _not_send: PhantomData,
        }
    }

    /// Block until shared access is granted
    ///
    /// Queued mutations that can be applied without waiting are applied first.
    pub fn lock_shared(&self) -> DeferredReadHandle<'_, T, L> {
        self.apply_pending();
        self.lock.lock_shared();
        self.read_handle()
    }

    /// Acquire shared access without blocking
    pub fn try_lock_shared(&self) -> Option<DeferredReadHandle<'_, T, L>> {
        self.apply_pending();
        self.lock.try_lock_shared().then(|| self.read_handle())
    }
}

impl<T, L: RawTimedSharedLock> DeferredGuarded<T, L> {
    /// Try to acquire shared access, giving up after `timeout`
    pub fn try_lock_shared_for(&self, timeout: Duration) -> Option<DeferredReadHandle<'_, T, L>> {
        self.apply_pending();
        self.lock
            .try_lock_shared_for(timeout)
            .then(|| self.read_handle())
    }

    /// Try to acquire shared access, giving up at `deadline`
    pub fn try_lock_shared_until(&self, deadline: Instant) -> Option<DeferredReadHandle<'_, T, L>> {
        self.apply_pending();
        self.lock
            .try_lock_shared_until(deadline)
            .then(|| self.read_handle())
    }
}

/// Apply every queued mutation to `value`, containing panics
fn drain<T>(pending: &SegQueue<Mutation<T>>, value: &mut T) -> usize {
    let mut applied = 0usize;
    while let Some(mutation) = pending.pop() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| mutation(&mut *value))) {
            error!(
                panic = panic_message(payload.as_ref()),
                "detached deferred mutation panicked"
            );
        }
        applied += 1;
    }
    applied
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl<T, L: RawSharedLock> Drop for DeferredGuarded<T, L> {
    fn drop(&mut self) {
        if !thread::panicking() {
            self.drain_owned();
        }
    }
}

impl<T, L: RawSharedLock> From<T> for DeferredGuarded<T, L> {
    fn from(value: T) -> Self {
        Self::with_lock(value, L::INIT)
    }
}

impl<T: Default, L: RawSharedLock> Default for DeferredGuarded<T, L> {
    fn default() -> Self {
        Self::from(T::default())
    }
}

impl<T: fmt::Debug, L: RawSharedLock> fmt::Debug for DeferredGuarded<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DeferredGuarded");
        if self.lock.try_lock_shared() {
            // Read in place; a handle would drain the queue on release
            s.field("value", unsafe { &*self.value.get() });
            unsafe { self.lock.unlock_shared() };
        } else {
            s.field("value", &"<locked>");
        }
        s.field("pending", &self.pending()).finish()
    }
}

impl<T, L: RawSharedLock> SharedAccess<T> for DeferredGuarded<T, L> {
    type SharedHandle<'a> = DeferredReadHandle<'a, T, L> where Self: 'a;

    fn lock_shared(&self) -> Self::SharedHandle<'_> {
        DeferredGuarded::lock_shared(self)
    }

    fn try_lock_shared(&self) -> Option<Self::SharedHandle<'_>> {
        DeferredGuarded::try_lock_shared(self)
    }
}

impl<T, L: RawTimedSharedLock> TimedSharedAccess<T> for DeferredGuarded<T, L> {
    fn try_lock_shared_for(&self, timeout: Duration) -> Option<Self::SharedHandle<'_>> {
        DeferredGuarded::try_lock_shared_for(self, timeout)
    }

    fn try_lock_shared_until(&self, deadline: Instant) -> Option<Self::SharedHandle<'_>> {
        DeferredGuarded::try_lock_shared_until(self, deadline)
    }
}

/// Shared handle of a [`DeferredGuarded`]
///
/// Dropping it releases the shared lock and then applies any mutations that
/// were queued while it was held.
#[must_use = "if unused the lock is released immediately"]
pub struct DeferredReadHandle<'a, T, L: RawSharedLock> {
    owner: &'a DeferredGuarded<T, L>,
    _not_send: PhantomData<*const ()>,
}

impl<T, L: RawSharedLock> Deref for DeferredReadHandle<'_, T, L> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.owner.value.get() }
    }
}

impl<T, L: RawSharedLock> Drop for DeferredReadHandle<'_, T, L> {
    fn drop(&mut self) {
        unsafe { self.owner.lock.unlock_shared() };
        // An unwinding reader leaves the queue to the next acquirer
        if !thread::panicking() {
            self.owner.apply_pending();
        }
    }
}

unsafe impl<T: Sync, L: RawSharedLock> Sync for DeferredReadHandle<'_, T, L> {}

impl<T: fmt::Debug, L: RawSharedLock> fmt::Debug for DeferredReadHandle<'_, T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeferredReadHandle").field(&&**self).finish()
    }
}

/// Result of a mutation submitted with [`DeferredGuarded::modify_async`]
///
/// Resolves once the mutation has been applied. Blocking callers use
/// [`wait`](Self::wait); async callers `.await` it directly.
#[must_use = "the mutation runs regardless, but its result is lost"]
pub struct ModifyFuture<R> {
    rx: flume::Receiver<thread::Result<R>>,
}

impl<R> ModifyFuture<R> {
    /// Whether the result is available without waiting
    #[inline]
    pub fn is_ready(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Block until the mutation has been applied
    pub fn wait(self) -> GuardedResult<R> {
        match self.rx.recv() {
            Ok(result) => Ok(unwind(result)),
            Err(flume::RecvError::Disconnected) => Err(GuardedError::MutationAbandoned),
        }
    }

    /// Block for at most `timeout`
    ///
    /// On [`GuardedError::WaitTimeout`] the future stays valid and may be
    /// waited on again.
    pub fn wait_timeout(&self, timeout: Duration) -> GuardedResult<R> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Ok(unwind(result)),
            Err(flume::RecvTimeoutError::Timeout) => Err(GuardedError::WaitTimeout),
            Err(flume::RecvTimeoutError::Disconnected) => Err(GuardedError::MutationAbandoned),
        }
    }
}

fn unwind<R>(result: thread::Result<R>) -> R {
    match result {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    }
}

impl<R: Send + 'static> IntoFuture for ModifyFuture<R> {
    type Output = GuardedResult<R>;
    type IntoFuture = Pin<Box<dyn Future<Output = GuardedResult<R>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            match self.rx.recv_async().await {
                Ok(result) => Ok(unwind(result)),
                Err(flume::RecvError::Disconnected) => Err(GuardedError::MutationAbandoned),
            }
        })
    }
}

impl<R> fmt::Debug for ModifyFuture<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifyFuture")
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_detach_applies_when_uncontended() {
        let data = DeferredGuarded::new(1);
        data.modify_detach(|v| *v += 1);
        assert_eq!(data.pending(), 0);
        assert_eq!(*data.lock_shared(), 2);
    }

    #[test]
    fn test_queued_while_reading_applied_on_release() {
        let data = DeferredGuarded::new(String::from("a"));
        let reader = data.lock_shared();

        data.modify_detach(|s| s.push('b'));
        data.modify_detach(|s| s.push('c'));
        assert_eq!(data.pending(), 2);
        assert_eq!(reader.as_str(), "a");

        drop(reader);
        assert_eq!(data.pending(), 0);
        assert_eq!(data.lock_shared().as_str(), "abc");
    }

    #[test]
    fn test_async_result_after_release() {
        let data = DeferredGuarded::new(10);
        let reader = data.lock_shared();
        let future = data.modify_async(|v| {
            *v += 5;
            *v
        });

        assert!(!future.is_ready());
        assert_eq!(
            future.wait_timeout(Duration::from_millis(5)),
            Err(GuardedError::WaitTimeout)
        );

        drop(reader);
        assert!(future.is_ready());
        assert_eq!(future.wait(), Ok(15));
    }

    #[test]
    fn test_async_panic_reraised_in_waiter() {
        let data = DeferredGuarded::new(0);
        let future = data.modify_async(|_| -> i32 { panic!("bad mutation") });

        let result = panic::catch_unwind(AssertUnwindSafe(|| future.wait()));
        assert!(result.is_err());

        // The lock was released and the discipline remains usable
        data.modify_detach(|v| *v = 3);
        assert_eq!(*data.lock_shared(), 3);
    }

    #[test]
    fn test_detached_panic_contained() {
        let data = DeferredGuarded::new(Vec::new());
        let reader = data.lock_shared();
        data.modify_detach(|v: &mut Vec<i32>| v.push(1));
        data.modify_detach(|_| panic!("bad detached mutation"));
        data.modify_detach(|v| v.push(3));
        assert_eq!(data.pending(), 3);

        // The reader that drains the queue is not hit by the panic
        drop(reader);
        assert_eq!(data.pending(), 0);
        assert_eq!(*data.lock_shared(), vec![1, 3]);
    }

    #[test]
    fn test_unwinding_reader_leaves_queue() {
        let data = DeferredGuarded::new(0);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _reader = data.lock_shared();
            data.modify_detach(|_| panic!("queued behind the reader"));
            data.modify_detach(|v| *v += 1);
            panic!("reader failed");
        }));
        assert!(result.is_err());
        assert_eq!(data.pending(), 2);

        // The next acquirer drains the queue and survives the bad mutation
        assert_eq!(*data.lock_shared(), 1);
        assert_eq!(data.pending(), 0);
    }

    #[test]
    fn test_drop_applies_queued_work() {
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let data = DeferredGuarded::new(0usize);
        let reader = data.lock_shared();
        let observer = seen.clone();
        data.modify_detach(move |v| {
            *v += 1;
            observer.store(*v, std::sync::atomic::Ordering::SeqCst);
        });
        std::mem::forget(reader);

        // The leaked reader keeps the lock; teardown still applies the queue
        drop(data);
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_into_inner_applies_queue() {
        let data = DeferredGuarded::new(vec![1]);
        let reader = data.try_lock_shared().unwrap();
        data.modify_detach(|v| v.push(2));
        std::mem::forget(reader);
        assert_eq!(data.into_inner(), vec![1, 2]);
    }

    #[test]
    fn test_await_from_executor() {
        let data = DeferredGuarded::new(2);
        let future = data.modify_async(|v| {
            *v *= 21;
            *v
        });
        let value = futures::executor::block_on(async { future.await });
        assert_eq!(value, Ok(42));
    }
}
