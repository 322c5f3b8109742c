/*!
 * Delayed Destructor
 *
 * Pool that holds shared objects until it is the last owner, then frees
 * them when polled. Destruction is never event-driven: callers invoke
 * [`DelayedDestructor::destroy_objects`] at a convenient point.
 */

use super::tripwire::TripWireDetector;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type BeforeDelete<X> = Box<dyn Fn(&Arc<X>) + Send + Sync>;

/// Teardown attempts before remaining objects are released regardless
const TEARDOWN_ATTEMPTS: usize = 5;
const TEARDOWN_PAUSE: Duration = Duration::from_millis(100);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Deferred-destruction pool
pub struct DelayedDestructor<X> {
    pending: Mutex<Vec<Arc<X>>>,
    before_delete: Option<BeforeDelete<X>>,
    tripwire: Option<TripWireDetector>,
}

impl<X> DelayedDestructor<X> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            before_delete: None,
            tripwire: None,
        }
    }

    /// Run `f` on every object just before the pool frees it
    pub fn with_callback(f: impl Fn(&Arc<X>) + Send + Sync + 'static) -> Self {
        let mut this = Self::new();
        this.before_delete = Some(Box::new(f));
        this
    }

    /// Give up teardown retries once `detector` has tripped
    pub fn with_tripwire(mut self, detector: TripWireDetector) -> Self {
        self.tripwire = Some(detector);
        self
    }

    /// Hand an object to the pool
    pub fn add_object(&self, object: Arc<X>) {
        self.pending.lock().push(object);
    }

    /// Objects still held
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free every object the pool alone still owns
    ///
    /// The callback runs outside the pool's lock. Returns the number of
    /// objects left in the pool.
    pub fn destroy_objects(&self) -> usize {
        let mut pending = self.pending.lock();
        self.sweep(&mut pending)
    }

    /// Keep sweeping until the pool is empty or `timeout` has passed
    ///
    /// Returns the number of objects left in the pool.
    pub fn destroy_objects_for(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let Some(mut pending) = self.pending.try_lock_until(deadline) else {
            return self.len();
        };
        loop {
            let remaining = self.sweep(&mut pending);
            let now = Instant::now();
            if remaining == 0 || now >= deadline {
                return remaining;
            }
            drop(pending);
            thread::sleep(POLL_INTERVAL.min(deadline - now));
            pending = match self.pending.try_lock_until(deadline) {
                Some(pending) => pending,
                None => return remaining,
            };
        }
    }

    fn sweep(&self, pending: &mut parking_lot::MutexGuard<'_, Vec<Arc<X>>>) -> usize {
        let (ready, held): (Vec<_>, Vec<_>) = pending
            .drain(..)
            .partition(|object| Arc::strong_count(object) == 1);
        **pending = held;
        let remaining = pending.len();
        if ready.is_empty() {
            return remaining;
        }

        parking_lot::MutexGuard::unlocked(pending, || {
            if let Some(before_delete) = &self.before_delete {
                for object in &ready {
                    before_delete(object);
                }
            }
            debug!(freed = ready.len(), remaining, "delayed destructor sweep");
            drop(ready);
        });
        pending.len()
    }
}

impl<X> Default for DelayedDestructor<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X> Drop for DelayedDestructor<X> {
    fn drop(&mut self) {
        for attempt in 1..=TEARDOWN_ATTEMPTS {
            if self.destroy_objects() == 0 {
                return;
            }
            if self.tripwire.as_ref().is_some_and(|t| t.is_tripped()) {
                return;
            }
            if attempt % 2 == 0 {
                thread::sleep(TEARDOWN_PAUSE);
            } else {
                thread::yield_now();
            }
        }
        let remaining = self.destroy_objects();
        if remaining > 0 {
            warn!(remaining, "delayed destructor released objects still shared elsewhere");
        }
    }
}

impl<X> fmt::Debug for DelayedDestructor<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedDestructor")
            .field("pending", &self.len())
            .field("has_callback", &self.before_delete.is_some())
            .finish()
    }
}
