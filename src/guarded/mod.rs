/*!
 * Protected Value Disciplines
 *
 * Each discipline wraps one value and grants access only through handles
 * (or, for the atomic cells, through direct operations).
 *
 * | Discipline | Readers block on writers | Writers block on readers |
 * |---|---|---|
 * | [`Guarded`] / [`GuardedOpt`] | n/a | n/a |
 * | [`SharedGuarded`] / [`SharedGuardedOpt`] | yes | yes |
 * | [`OrderedGuarded`] | yes, FIFO | yes, FIFO |
 * | [`DeferredGuarded`] | yes | no, mutations queue |
 * | [`CowGuarded`] | no | no |
 * | [`LrGuarded`] | no | waits for readers of the old copy |
 *
 * The RCU discipline lives in [`crate::rcu`].
 */

mod atomic;
mod cow;
mod deferred;
mod exclusive;
mod lr;
mod ordered;
mod shared;

pub use atomic::{AtomicGuarded, AtomicScalar};
pub use cow::{CowGuarded, CowWriteHandle};
pub use deferred::{DeferredGuarded, DeferredReadHandle, ModifyFuture};
pub use exclusive::{Guarded, GuardedOpt};
pub use lr::{LrGuarded, LrReadHandle};
pub use ordered::OrderedGuarded;
pub use shared::{SharedGuarded, SharedGuardedOpt};
