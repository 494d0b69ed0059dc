//! Arbitration state, cycle tokens and the deferred action
//!
//! A cycle is one `Armed -> Resolved -> Idle` run. Every accepted `arm` takes
//! a fresh [`CycleId`]; timer and sensor events carry the id of the cycle they
//! were created for, so a late event is recognized by comparing ids rather
//! than by whatever happens to be stored at the time.

use crate::error::ArbiterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tokio::time::Instant;

/// Generation token of one arbitration cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CycleId(u64);

impl CycleId {
    pub(crate) fn first() -> Self {
        CycleId(1)
    }

    pub(crate) fn next(self) -> Self {
        CycleId(self.0.wrapping_add(1))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What made a cycle execute its action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// An uncovered proximity sample arrived before the deadline
    Sample,
    /// The deadline elapsed without a sample
    Timeout,
    /// The coordinator was stopped while the cycle was armed
    Shutdown,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Sample => write!(f, "sample"),
            Trigger::Timeout => write!(f, "timeout"),
            Trigger::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Terminal outcome of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// The action ran exactly once
    Executed(Trigger),
    /// The sensor was covered; the action was dropped without running
    Suppressed,
}

impl Resolution {
    pub fn executed(&self) -> bool {
        matches!(self, Resolution::Executed(_))
    }
}

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbitrationState {
    /// Nothing in flight; the next request will be armed
    Idle,
    /// One cycle is racing its sensor listener against its deadline
    Armed { cycle: CycleId, deadline: Instant },
    /// The cycle has an outcome; the coordinator is about to return to `Idle`
    Resolved {
        cycle: CycleId,
        resolution: Resolution,
    },
}

impl ArbitrationState {
    pub fn is_armed(&self) -> bool {
        matches!(self, ArbitrationState::Armed { .. })
    }
}

/// Result of asking the coordinator to arm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmOutcome {
    /// A new cycle is racing; the action runs later or not at all
    Armed { cycle: CycleId, deadline: Instant },

    /// Another cycle is in flight; the new action was discarded
    AlreadyArmed { cycle: CycleId },

    /// The sensor could not be used; the action already ran synchronously
    FailedOpen { cycle: CycleId, reason: ArbiterError },
}

impl ArmOutcome {
    pub fn cycle(&self) -> CycleId {
        match self {
            ArmOutcome::Armed { cycle, .. }
            | ArmOutcome::AlreadyArmed { cycle }
            | ArmOutcome::FailedOpen { cycle, .. } => *cycle,
        }
    }
}

/// The suppressed wake: a zero-argument action run at most once
pub struct PendingAction {
    run: Box<dyn FnOnce() + Send + 'static>,
}

impl PendingAction {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self { run: Box::new(f) }
    }

    /// Run the action, containing any panic it raises.
    ///
    /// Returns the panic message when the action panicked.
    pub fn execute(self) -> Result<(), String> {
        panic::catch_unwind(AssertUnwindSafe(self.run)).map_err(|payload| {
            if let Some(msg) = payload.downcast_ref::<&str>() {
                (*msg).to_string()
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                msg.clone()
            } else {
                "non-string panic payload".to_string()
            }
        })
    }
}

impl fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAction").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_cycle_ids_increase() {
        let first = CycleId::first();
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.value(), 2);
        assert_eq!(second.to_string(), "#2");
    }

    #[test]
    fn test_pending_action_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let action = PendingAction::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(action.execute().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pending_action_contains_panic() {
        let action = PendingAction::new(|| panic!("screen driver fault"));
        let err = action.execute().unwrap_err();
        assert_eq!(err, "screen driver fault");
    }

    #[test]
    fn test_resolution_executed() {
        assert!(Resolution::Executed(Trigger::Timeout).executed());
        assert!(!Resolution::Suppressed.executed());
    }
}
