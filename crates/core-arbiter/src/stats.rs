//! Arbitration counters
//!
//! Tracks what the coordinator did with every request it saw.

use crate::state::{ArbitrationState, CycleId, Resolution, Trigger};
use serde::{Deserialize, Serialize};

/// Counters accumulated by a coordinator over its lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbiterStats {
    /// Cycles successfully armed
    pub armed: u64,

    /// Cycles that executed because an uncovered sample arrived first
    pub executed_on_sample: u64,

    /// Cycles that executed because the deadline elapsed first
    pub executed_on_timeout: u64,

    /// Cycles executed while the coordinator was stopping
    pub executed_on_shutdown: u64,

    /// Cycles dropped because the sensor was covered
    pub suppressed: u64,

    /// Requests discarded because a cycle was already armed
    pub duplicates_dropped: u64,

    /// Sample or timeout events that arrived for a resolved cycle
    pub stale_events: u64,

    /// Requests executed immediately because the sensor could not be used
    pub failed_open: u64,

    /// Actions that panicked while executing
    pub action_panics: u64,
}

impl ArbiterStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of times an action actually ran
    pub fn total_executed(&self) -> u64 {
        self.executed_on_sample
            + self.executed_on_timeout
            + self.executed_on_shutdown
            + self.failed_open
    }

    /// Total number of armed cycles that reached an outcome
    pub fn total_resolved(&self) -> u64 {
        self.executed_on_sample
            + self.executed_on_timeout
            + self.executed_on_shutdown
            + self.suppressed
    }

    pub(crate) fn record_resolution(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Executed(Trigger::Sample) => self.executed_on_sample += 1,
            Resolution::Executed(Trigger::Timeout) => self.executed_on_timeout += 1,
            Resolution::Executed(Trigger::Shutdown) => self.executed_on_shutdown += 1,
            Resolution::Suppressed => self.suppressed += 1,
        }
    }

    /// Format a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Arbiter: {} armed | executed {} (sample {}, timeout {}, shutdown {}, fail-open {}) | suppressed {} | duplicates {} | stale {} | panics {}",
            self.armed,
            self.total_executed(),
            self.executed_on_sample,
            self.executed_on_timeout,
            self.executed_on_shutdown,
            self.failed_open,
            self.suppressed,
            self.duplicates_dropped,
            self.stale_events,
            self.action_panics
        )
    }
}

/// Point-in-time view of a coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct ArbiterSnapshot {
    pub state: ArbitrationState,
    pub stats: ArbiterStats,
    pub last_resolution: Option<(CycleId, Resolution)>,
}
