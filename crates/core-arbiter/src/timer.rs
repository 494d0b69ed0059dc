//! Timer port and its tokio implementation
//!
//! A scheduled timeout does not call back into the coordinator directly. It
//! posts [`ArbiterEvent::Timeout`] into the same queue the sensor listener
//! posts into, so "whichever fires first" is decided by queue order.

use crate::event::{ArbiterEvent, EventSender};
use crate::lock;
use crate::state::CycleId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::trace;

/// Handle to a scheduled timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// One-shot timer keyed to an arbitration cycle
pub trait TimerPort: Send + Sync {
    /// Post `Timeout { cycle }` after `delay`
    fn schedule_once(&self, delay: Duration, cycle: CycleId) -> TimerHandle;

    /// Make sure the timeout behind `handle` will not be posted
    fn cancel(&self, handle: TimerHandle);
}

/// Timer backed by `tokio::time::sleep` tasks.
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct TokioTimer {
    events: EventSender,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, AbortHandle>>>,
}

impl TokioTimer {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of timeouts scheduled but not yet fired or cancelled
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl TimerPort for TokioTimer {
    fn schedule_once(&self, delay: Duration, cycle: CycleId) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let events = self.events.clone();
        let task_pending = Arc::clone(&self.pending);

        // Hold the map while spawning so the task cannot remove its entry
        // before it has been inserted.
        let mut pending = lock(&self.pending);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            lock(&task_pending).remove(&id);
            trace!(cycle = %cycle, "arbitration deadline elapsed");
            let _ = events.send(ArbiterEvent::Timeout { cycle });
        });
        pending.insert(id, task.abort_handle());

        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(task) = lock(&self.pending).remove(&handle.0) {
            task.abort();
        }
    }
}
