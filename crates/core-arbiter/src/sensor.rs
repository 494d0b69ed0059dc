//! Proximity sensor port
//!
//! The platform's sensor service is an external collaborator. The coordinator
//! only needs to register a listener for one cycle, unregister it again, and
//! receive the sample event. Accuracy callbacks and sensor discovery are not
//! part of this abstraction.

use crate::error::{ArbiterError, Result};
use crate::event::{ArbiterEvent, EventSender};
use crate::sample::SensorReading;
use crate::state::CycleId;

/// Identifier handed out by a sensor port for a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Listener bound to one arbitration cycle.
///
/// Delivering a sample only posts an event into the sequencer queue, so it is
/// safe to call from whatever thread the sensor service uses.
#[derive(Debug, Clone)]
pub struct SampleListener {
    cycle: CycleId,
    events: EventSender,
}

impl SampleListener {
    pub(crate) fn new(cycle: CycleId, events: EventSender) -> Self {
        Self { cycle, events }
    }

    /// Cycle this listener was registered for
    pub fn cycle(&self) -> CycleId {
        self.cycle
    }

    /// Deliver a raw reading.
    ///
    /// Returns `false` if the sequencer is gone and the sample was dropped.
    pub fn on_sample(&self, distance: f32, max_range: f32) -> bool {
        self.events
            .send(ArbiterEvent::Sample {
                cycle: self.cycle,
                reading: SensorReading::new(distance, max_range),
            })
            .is_ok()
    }
}

/// Capability interface of a proximity sensor
pub trait ProximitySensorPort: Send + Sync {
    /// Whether a proximity sensor is present at all
    fn has_capability(&self) -> bool;

    /// Start delivering samples to `listener`
    fn register(&self, listener: SampleListener) -> Result<ListenerId>;

    /// Stop delivering samples to the listener registered as `id`
    fn unregister(&self, id: ListenerId);
}

/// Port for hosts without a proximity sensor; every registration fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSensor;

impl ProximitySensorPort for NoSensor {
    fn has_capability(&self) -> bool {
        false
    }

    fn register(&self, _listener: SampleListener) -> Result<ListenerId> {
        Err(ArbiterError::SensorUnavailable)
    }

    fn unregister(&self, _id: ListenerId) {}
}
