//! Events drained by the arbitration sequencer
//!
//! Requests, sensor samples and timer expiries all travel through one
//! unbounded queue. The sequencer task is the only consumer, which is what
//! serializes every state transition of the coordinator.

use crate::sample::SensorReading;
use crate::state::{ArmOutcome, CycleId, PendingAction};
use crate::stats::ArbiterSnapshot;
use tokio::sync::{mpsc, oneshot};

/// One unit of work for the sequencer
#[derive(Debug)]
pub enum ArbiterEvent {
    /// A wake request that should be arbitrated
    Arm {
        action: PendingAction,
        reply: Option<oneshot::Sender<ArmOutcome>>,
    },

    /// The sensor listener of `cycle` reported a reading
    Sample { cycle: CycleId, reading: SensorReading },

    /// The deadline of `cycle` elapsed
    Timeout { cycle: CycleId },

    /// Report state and counters
    Snapshot { reply: oneshot::Sender<ArbiterSnapshot> },

    /// Resolve anything in flight and exit the sequencer loop
    Shutdown,
}

/// Sending side of the sequencer queue
pub type EventSender = mpsc::UnboundedSender<ArbiterEvent>;

/// Receiving side of the sequencer queue
pub type EventReceiver = mpsc::UnboundedReceiver<ArbiterEvent>;

/// Create a fresh sequencer queue
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
