/*!
 * Concurrency Collaborators
 *
 * Small coordination helpers used alongside the protected values:
 * shutdown tripwires, activation triggers, barriers and latches, and
 * holders that share or defer the destruction of objects.
 */

mod barrier;
mod delayed_destructor;
mod delayed_objects;
mod object_holder;
mod trigger;
mod tripwire;

pub use barrier::{Barrier, Latch};
pub use delayed_destructor::DelayedDestructor;
pub use delayed_objects::{DelayedFuture, DelayedKey, DelayedObjects};
pub use object_holder::SearchableObjectHolder;
pub use trigger::TriggerVariable;
pub use tripwire::{TripLine, TripLinePool, TripWireDetector, TripWireTrigger};
