//! Test doubles for the arbitration ports
//!
//! These stand in for the platform's sensor service and timer so the
//! coordinator, sequencer and gate can be driven deterministically, usually
//! under `#[tokio::test(start_paused = true)]`.

use crate::error::{ArbiterError, Result};
use crate::lock;
use crate::sensor::{ListenerId, ProximitySensorPort, SampleListener};
use crate::state::{CycleId, PendingAction};
use crate::timer::{TimerHandle, TimerPort};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Reading a [`ScriptedSensor`] reports some time after registration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptedSample {
    pub after: Duration,
    pub distance: f32,
    pub max_range: f32,
}

/// Sensor port that replays a fixed script.
///
/// A registered listener receives the scripted sample (if any) after its
/// delay, unless it was unregistered first. Samples can also be pushed by
/// hand with [`ScriptedSensor::deliver`].
#[derive(Debug)]
pub struct ScriptedSensor {
    capability: bool,
    fail_registration: bool,
    script: Option<ScriptedSample>,
    next_id: AtomicU64,
    listeners: Arc<Mutex<HashMap<u64, SampleListener>>>,
    registrations: AtomicUsize,
    unregistrations: AtomicUsize,
}

impl ScriptedSensor {
    fn build(capability: bool, fail_registration: bool, script: Option<ScriptedSample>) -> Self {
        Self {
            capability,
            fail_registration,
            script,
            next_id: AtomicU64::new(1),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            registrations: AtomicUsize::new(0),
            unregistrations: AtomicUsize::new(0),
        }
    }

    /// Sensor that accepts listeners but never reports on its own
    pub fn silent() -> Self {
        Self::build(true, false, None)
    }

    /// Sensor that reports `distance` out of `max_range` after `after`
    pub fn replying(after: Duration, distance: f32, max_range: f32) -> Self {
        Self::build(
            true,
            false,
            Some(ScriptedSample {
                after,
                distance,
                max_range,
            }),
        )
    }

    /// Host without a proximity sensor
    pub fn unavailable() -> Self {
        Self::build(false, false, None)
    }

    /// Sensor that is present but refuses every registration
    pub fn failing_registration() -> Self {
        Self::build(true, true, None)
    }

    /// Push a reading to every currently registered listener.
    ///
    /// Returns how many listeners it was posted to.
    pub fn deliver(&self, distance: f32, max_range: f32) -> usize {
        lock(&self.listeners)
            .values()
            .filter(|listener| listener.on_sample(distance, max_range))
            .count()
    }

    /// Listeners registered and not yet unregistered
    pub fn active_listeners(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Successful registrations so far
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Unregistrations of a live listener so far
    pub fn unregistrations(&self) -> usize {
        self.unregistrations.load(Ordering::SeqCst)
    }
}

impl ProximitySensorPort for ScriptedSensor {
    fn has_capability(&self) -> bool {
        self.capability
    }

    fn register(&self, listener: SampleListener) -> Result<ListenerId> {
        if !self.capability {
            return Err(ArbiterError::SensorUnavailable);
        }
        if self.fail_registration {
            return Err(ArbiterError::RegistrationFailed(
                "scripted registration failure".to_string(),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.listeners).insert(id, listener);
        self.registrations.fetch_add(1, Ordering::SeqCst);

        if let Some(script) = self.script {
            let listeners = Arc::clone(&self.listeners);
            tokio::spawn(async move {
                tokio::time::sleep(script.after).await;
                let listener = lock(&listeners).get(&id).cloned();
                if let Some(listener) = listener {
                    listener.on_sample(script.distance, script.max_range);
                }
            });
        }

        Ok(ListenerId(id))
    }

    fn unregister(&self, id: ListenerId) {
        if lock(&self.listeners).remove(&id.0).is_some() {
            self.unregistrations.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Timer port that only records what it was asked to do
#[derive(Debug, Default)]
pub struct ManualTimer {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, (CycleId, Duration)>>,
    scheduled: AtomicUsize,
    cancellations: AtomicUsize,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeouts scheduled and not cancelled
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Cycles with a pending timeout and their delays
    pub fn pending(&self) -> Vec<(CycleId, Duration)> {
        let mut pending: Vec<_> = lock(&self.pending).values().copied().collect();
        pending.sort_by_key(|(cycle, _)| *cycle);
        pending
    }

    /// Total `schedule_once` calls
    pub fn scheduled(&self) -> usize {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Cancellations of a still-pending timeout
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }
}

impl TimerPort for ManualTimer {
    fn schedule_once(&self, delay: Duration, cycle: CycleId) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.pending).insert(id, (cycle, delay));
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if lock(&self.pending).remove(&handle.0).is_some() {
            self.cancellations.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Counts executions of the actions it hands out and records when they ran
#[derive(Debug, Clone, Default)]
pub struct ActionProbe {
    calls: Arc<AtomicUsize>,
    fired_at: Arc<Mutex<Vec<Instant>>>,
}

impl ActionProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh action that reports to this probe
    pub fn action(&self) -> PendingAction {
        PendingAction::new(self.closure())
    }

    /// Same as [`ActionProbe::action`], as a bare closure
    pub fn closure(&self) -> impl FnOnce() + Send + 'static {
        let calls = Arc::clone(&self.calls);
        let fired_at = Arc::clone(&self.fired_at);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            lock(&fired_at).push(Instant::now());
        }
    }

    /// How many actions from this probe have run
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// When each action ran, in order
    pub fn fired_at(&self) -> Vec<Instant> {
        lock(&self.fired_at).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{event_channel, ArbiterEvent};

    #[tokio::test(start_paused = true)]
    async fn test_scripted_sample_skips_unregistered_listener() {
        let (tx, mut rx) = event_channel();
        let sensor = ScriptedSensor::replying(Duration::from_millis(100), 4.0, 5.0);

        let id = sensor
            .register(SampleListener::new(CycleId::first(), tx))
            .unwrap();
        sensor.unregister(id);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(sensor.unregistrations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_sample_reaches_live_listener() {
        let (tx, mut rx) = event_channel();
        let sensor = ScriptedSensor::replying(Duration::from_millis(100), 4.0, 5.0);

        sensor
            .register(SampleListener::new(CycleId::first(), tx))
            .unwrap();

        match rx.recv().await {
            Some(ArbiterEvent::Sample { cycle, .. }) => assert_eq!(cycle, CycleId::first()),
            other => panic!("Expected Sample event, got {:?}", other),
        }
    }

    #[test]
    fn test_manual_timer_bookkeeping() {
        let timer = ManualTimer::new();
        let handle = timer.schedule_once(Duration::from_millis(500), CycleId::first());
        assert_eq!(timer.pending(), vec![(CycleId::first(), Duration::from_millis(500))]);

        timer.cancel(handle);
        timer.cancel(handle);
        assert_eq!(timer.pending_count(), 0);
        assert_eq!(timer.cancellations(), 1);
    }

    #[test]
    fn test_action_probe_counts() {
        let probe = ActionProbe::new();
        probe.action().execute().unwrap();
        (probe.closure())();
        assert_eq!(probe.calls(), 2);
        assert_eq!(probe.fired_at().len(), 2);
    }
}
