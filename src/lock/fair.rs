/*!
 * FIFO Reader/Writer Lock
 *
 * Reader/writer lock that grants access strictly in arrival order.
 *
 * # Design
 *
 * Acquirers that cannot enter immediately join a queue. Only the head of the
 * queue may enter:
 * - a reader at the head enters as soon as no writer holds the lock, then
 *   lets the next reader in line through
 * - a writer at the head enters once the active readers have drained
 *
 * A waiter whose deadline passes removes itself from the queue and wakes the
 * others, so an abandoned slot never blocks the line.
 *
 * # Performance
 *
 * - Uncontended fast path is a single mutex round-trip
 * - Every release wakes all queued waiters; only the head makes progress
 * - Best for short critical sections where ordering matters more than throughput
 */

use super::capability::{RawLock, RawSharedLock, RawTimedLock, RawTimedSharedLock};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, Copy)]
struct Waiter {
    ticket: u64,
    mode: Mode,
}

#[derive(Debug)]
struct FairState {
    queue: VecDeque<Waiter>,
    readers: usize,
    writer: bool,
    next_ticket: u64,
}

impl FairState {
    const fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            readers: 0,
            writer: false,
            next_ticket: 0,
        }
    }

    #[inline]
    fn admits(&self, mode: Mode) -> bool {
        match mode {
            Mode::Shared => !self.writer,
            Mode::Exclusive => !self.writer && self.readers == 0,
        }
    }

    #[inline]
    fn enter(&mut self, mode: Mode) {
        match mode {
            Mode::Shared => self.readers += 1,
            Mode::Exclusive => self.writer = true,
        }
    }

    #[inline]
    fn is_head(&self, ticket: u64) -> bool {
        self.queue.front().map(|w| w.ticket) == Some(ticket)
    }

    fn abandon(&mut self, ticket: u64) {
        if let Some(pos) = self.queue.iter().position(|w| w.ticket == ticket) {
            self.queue.remove(pos);
        }
    }
}

/// Reader/writer lock with first-in first-out admission
///
/// # Example
///
/// ```
/// use guarded::{FairRwLock, OrderedGuarded};
///
/// let data: OrderedGuarded<u32, FairRwLock> = OrderedGuarded::new(0);
/// data.modify(|v| *v += 1);
/// assert_eq!(data.read(|v| *v), 1);
/// ```
pub struct FairRwLock {
    state: Mutex<FairState>,
    cond: Condvar,
}

impl FairRwLock {
    /// Create an unlocked FIFO lock
    pub const fn new() -> Self {
        Self {
            state: parking_lot::const_mutex(FairState::new()),
            cond: Condvar::new(),
        }
    }

    /// Number of acquirers currently queued (for diagnostics)
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn try_acquire(&self, mode: Mode) -> bool {
        let mut state = self.state.lock();
        if state.queue.is_empty() && state.admits(mode) {
            state.enter(mode);
            true
        } else {
            false
        }
    }

    fn acquire(&self, mode: Mode, deadline: Option<Instant>) -> bool {
        let mut state = self.state.lock();
        if state.queue.is_empty() && state.admits(mode) {
            state.enter(mode);
            return true;
        }

        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.queue.push_back(Waiter { ticket, mode });

        loop {
            if state.is_head(ticket) && state.admits(mode) {
                state.queue.pop_front();
                state.enter(mode);
                if mode == Mode::Shared {
                    // The next reader in line may be able to join us
                    self.cond.notify_all();
                }
                return true;
            }

            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out() {
                        if state.is_head(ticket) && state.admits(mode) {
                            state.queue.pop_front();
                            state.enter(mode);
                            return true;
                        }
                        state.abandon(ticket);
                        self.cond.notify_all();
                        return false;
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
    }
}

impl Default for FairRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FairRwLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FairRwLock")
            .field("readers", &state.readers)
            .field("writer", &state.writer)
            .field("queued", &state.queue.len())
            .finish()
    }
}

unsafe impl RawLock for FairRwLock {
    const INIT: Self = FairRwLock::new();

    #[inline]
    fn lock(&self) {
        self.acquire(Mode::Exclusive, None);
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.try_acquire(Mode::Exclusive)
    }

    unsafe fn unlock(&self) {
        let mut state = self.state.lock();
        state.writer = false;
        drop(state);
        self.cond.notify_all();
    }
}

unsafe impl RawTimedLock for FairRwLock {
    #[inline]
    fn try_lock_for(&self, timeout: Duration) -> bool {
        self.acquire(Mode::Exclusive, Some(Instant::now() + timeout))
    }

    #[inline]
    fn try_lock_until(&self, deadline: Instant) -> bool {
        self.acquire(Mode::Exclusive, Some(deadline))
    }
}

unsafe impl RawSharedLock for FairRwLock {
    #[inline]
    fn lock_shared(&self) {
        self.acquire(Mode::Shared, None);
    }

    #[inline]
    fn try_lock_shared(&self) -> bool {
        self.try_acquire(Mode::Shared)
    }

    unsafe fn unlock_shared(&self) {
        let mut state = self.state.lock();
        state.readers -= 1;
        let drained = state.readers == 0;
        drop(state);
        if drained {
            self.cond.notify_all();
        }
    }
}

unsafe impl RawTimedSharedLock for FairRwLock {
    #[inline]
    fn try_lock_shared_for(&self, timeout: Duration) -> bool {
        self.acquire(Mode::Shared, Some(Instant::now() + timeout))
    }

    #[inline]
    fn try_lock_shared_until(&self, deadline: Instant) -> bool {
        self.acquire(Mode::Shared, Some(deadline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_readers_share() {
        let lock = FairRwLock::new();
        assert!(lock.try_lock_shared());
        assert!(lock.try_lock_shared());
        assert!(!lock.try_lock());
        unsafe {
            lock.unlock_shared();
            lock.unlock_shared();
        }
        assert!(lock.try_lock());
        assert!(!lock.try_lock_shared());
        unsafe { lock.unlock() };
    }

    #[test]
    fn test_timed_waiter_leaves_queue() {
        let lock = FairRwLock::new();
        lock.lock();

        let start = Instant::now();
        assert!(!lock.try_lock_shared_for(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(lock.queued(), 0);

        unsafe { lock.unlock() };
        assert!(lock.try_lock_shared());
        unsafe { lock.unlock_shared() };
    }

    #[test]
    fn test_queued_writer_blocks_new_readers() {
        let lock = Arc::new(FairRwLock::new());
        lock.lock_shared();

        let writer_lock = lock.clone();
        let writer = thread::spawn(move || {
            writer_lock.lock();
            unsafe { writer_lock.unlock() };
        });

        // Wait until the writer is queued behind the reader
        while lock.queued() == 0 {
            thread::yield_now();
        }

        // A newcomer may not overtake the queued writer
        assert!(!lock.try_lock_shared());

        unsafe { lock.unlock_shared() };
        writer.join().unwrap();
        assert!(lock.try_lock_shared());
        unsafe { lock.unlock_shared() };
    }

    #[test]
    fn test_writers_served_in_arrival_order() {
        let lock = Arc::new(FairRwLock::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        lock.lock();

        let mut handles = Vec::new();
        for id in 0..4 {
            let writer_lock = lock.clone();
            let order = order.clone();
            handles.push(thread::spawn(move || {
                writer_lock.lock();
                order.lock().push(id);
                unsafe { writer_lock.unlock() };
            }));
            // Each writer must be queued before the next one starts
            while lock.queued() != id + 1 {
                thread::yield_now();
            }
        }

        unsafe { lock.unlock() };
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }
}
