/*!
 * Lock Capabilities
 *
 * Every discipline is generic over the lock it uses. This module defines the
 * capability traits a lock must offer and the FIFO reader/writer lock used by
 * the ordered discipline.
 */

mod capability;
mod fair;
mod guard;

pub use capability::{RawLock, RawSharedLock, RawTimedLock, RawTimedSharedLock};
pub use fair::FairRwLock;
pub(crate) use guard::RawGuard;

/// Default exclusive lock
pub type DefaultMutex = parking_lot::RawMutex;

/// Default reader/writer lock
pub type DefaultRwLock = parking_lot::RawRwLock;
