/*!
 * Guarded
 *
 * Protected values for state shared between threads. Every discipline wraps
 * one value and hands out scoped handles; the disciplines differ in who
 * blocks whom and how old versions are kept alive.
 *
 * ```
 * use guarded::{CowGuarded, Guarded};
 * use std::sync::Arc;
 * use std::thread;
 *
 * let counter = Arc::new(Guarded::new(0u64));
 * let workers: Vec<_> = (0..2)
 *     .map(|_| {
 *         let counter = counter.clone();
 *         thread::spawn(move || {
 *             for _ in 0..1000 {
 *                 *counter.lock() += 1;
 *             }
 *         })
 *     })
 *     .collect();
 * for worker in workers {
 *     worker.join().unwrap();
 * }
 * assert_eq!(*counter.lock(), 2000);
 *
 * let settings = CowGuarded::new(vec![1, 2]);
 * let snapshot = settings.lock_shared();
 * settings.lock().push(3);
 * assert_eq!(*snapshot, [1, 2]);
 * assert_eq!(*settings.lock_shared(), [1, 2, 3]);
 * ```
 *
 * # Modules
 *
 * - [`guarded`]: lock-based and snapshot disciplines plus atomics
 * - [`rcu`]: read-copy-update with generation-based reclamation
 * - [`lock`]: lock capability traits and the FIFO reader/writer lock
 * - [`sync`]: wait strategies for writers draining readers
 * - [`concurrency`]: tripwires, triggers, latches and object holders
 */

pub mod access;
pub mod concurrency;
pub mod errors;
pub mod guarded;
pub mod handle;
pub mod lock;
pub mod rcu;
pub mod sync;

// Re-exports
pub use access::{ExclusiveAccess, SharedAccess, TimedExclusiveAccess, TimedSharedAccess};
pub use concurrency::{
    Barrier, DelayedDestructor, DelayedFuture, DelayedKey, DelayedObjects, Latch,
    SearchableObjectHolder, TripLine, TripLinePool, TripWireDetector, TripWireTrigger,
    TriggerVariable,
};
pub use errors::{GuardedError, GuardedResult};
pub use guarded::{
    AtomicGuarded, AtomicScalar, CowGuarded, CowWriteHandle, DeferredGuarded,
    DeferredReadHandle, Guarded, GuardedOpt, LrGuarded, LrReadHandle, ModifyFuture,
    OrderedGuarded, SharedGuarded, SharedGuardedOpt,
};
pub use handle::{Cancel, ReadHandle, WriteHandle};
pub use lock::{
    DefaultMutex, DefaultRwLock, FairRwLock, RawLock, RawSharedLock, RawTimedLock,
    RawTimedSharedLock,
};
pub use rcu::{
    RcuCollection, RcuGuarded, RcuList, RcuListWriter, RcuReadHandle, RcuValue,
    RcuValueWriter, RcuWriteHandle, ReclaimStats,
};
pub use sync::{StrategyType, SyncConfig};
