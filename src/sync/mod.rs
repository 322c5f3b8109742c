/*!
 * Synchronization Support
 *
 * Wait strategies used by writers that must wait out readers:
 * - Parking via parking_lot_core for long waits
 * - Backoff spinning for short waits
 * - Adaptive spin-then-park as the default
 *
 * # Architecture
 *
 * [`SyncConfig`] selects the strategy at construction time; the
 * [`ReaderIndicator`] carries it out on a per-slot reader count.
 */

mod config;
mod indicator;

pub use config::{StrategyType, SyncConfig};
pub use indicator::ReaderIndicator;
