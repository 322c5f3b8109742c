/*!
 * Synchronization Configuration
 *
 * Runtime configuration for how writers wait out readers
 */

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Strategy type selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    /// Park the waiting thread until the last reader wakes it
    Park,
    /// Busy-wait with exponential backoff (low latency, burns CPU)
    Spin,
    /// Spin briefly, then park
    Adaptive,
    /// Auto-select based on available parallelism
    Auto,
}

/// Synchronization configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Preferred strategy
    pub strategy: StrategyType,
    /// Spin duration before parking (for Adaptive)
    pub spin_duration: Duration,
    /// Maximum spin iterations before parking (for Adaptive)
    pub max_spins: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyType::Auto,
            spin_duration: Duration::from_micros(10),
            max_spins: 100,
        }
    }
}

impl SyncConfig {
    /// Configuration optimized for low-latency (readers hold slots briefly)
    pub const fn low_latency() -> Self {
        Self {
            strategy: StrategyType::Spin,
            spin_duration: Duration::from_micros(50),
            max_spins: 500,
        }
    }

    /// Configuration optimized for long waits (readers hold slots for a while)
    pub const fn long_wait() -> Self {
        Self {
            strategy: StrategyType::Park,
            spin_duration: Duration::from_micros(1),
            max_spins: 10,
        }
    }

    /// Select best strategy for the current machine
    pub fn select_strategy(&self) -> StrategyType {
        match self.strategy {
            StrategyType::Auto => {
                // Spinning only pays off when the reader can run concurrently
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                if cores > 1 {
                    StrategyType::Adaptive
                } else {
                    StrategyType::Park
                }
            }
            other => other,
        }
    }
}
