/*!
 * Read-Copy-Update
 *
 * [`RcuGuarded`] hosts a structure implementing [`RcuCollection`]. Readers
 * pin it and never block; a single writer edits it in place and retires
 * what it unlinks. Retired parts are freed once the readers that could
 * still reach them are gone.
 *
 * Two collections ship with the crate:
 * - [`RcuList`], a singly linked list whose iterators survive concurrent
 *   removal of the node they stand on
 * - [`RcuValue`], a single value replaced wholesale on commit
 */

mod epoch;
mod guarded;
mod list;
mod value;

pub use epoch::ReclaimStats;
pub use guarded::{RcuCollection, RcuGuarded, RcuReadHandle, RcuWriteHandle};
pub use list::{Iter, ListPin, RcuList, RcuListWriter};
pub use value::{RcuValue, RcuValueWriter, ValuePin};
