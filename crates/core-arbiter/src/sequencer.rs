//! Sequencer: the single queue every transition runs on
//!
//! The sequencer task owns the [`ArbitrationCoordinator`] and drains one
//! unbounded queue. Wake requests, sensor samples and timer expiries are all
//! posted into that queue, so the coordinator sees them strictly one after
//! another and needs no locking of its own.
//!
//! ```text
//!  WakeRequestGate ──Arm──┐
//!  SampleListener ─Sample─┼──► mpsc queue ──► Sequencer task ──► ArbitrationCoordinator
//!  TokioTimer ───Timeout──┘
//! ```
//!
//! Shutting down resolves the armed cycle (running its action) and runs any
//! request still queued behind the shutdown, so stopping never loses a wake.

use crate::coordinator::{ArbiterConfig, ArbitrationCoordinator};
use crate::error::{ArbiterError, Result};
use crate::event::{event_channel, ArbiterEvent, EventReceiver, EventSender};
use crate::sensor::ProximitySensorPort;
use crate::state::{ArmOutcome, PendingAction};
use crate::stats::{ArbiterSnapshot, ArbiterStats};
use crate::timer::{TimerPort, TokioTimer};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Cloneable sending side of a running sequencer
#[derive(Debug, Clone)]
pub struct ArbiterHandle {
    events: EventSender,
}

impl ArbiterHandle {
    /// Hand a wake request to the sequencer without waiting.
    ///
    /// Gives the action back if the sequencer is no longer running.
    pub fn submit(&self, action: PendingAction) -> std::result::Result<(), PendingAction> {
        match self.events.send(ArbiterEvent::Arm {
            action,
            reply: None,
        }) {
            Ok(()) => Ok(()),
            Err(SendError(ArbiterEvent::Arm { action, .. })) => Err(action),
            Err(_) => Ok(()),
        }
    }

    /// Arm and wait for the coordinator's answer.
    ///
    /// If the sequencer is gone the action runs on the caller before
    /// `SequencerStopped` is returned.
    pub async fn arm(&self, action: PendingAction) -> Result<ArmOutcome> {
        let (reply, outcome) = oneshot::channel();
        let sent = self.events.send(ArbiterEvent::Arm {
            action,
            reply: Some(reply),
        });

        if let Err(SendError(ArbiterEvent::Arm { action, .. })) = sent {
            let _ = action.execute();
            return Err(ArbiterError::SequencerStopped);
        }

        outcome.await.map_err(|_| ArbiterError::SequencerStopped)
    }

    /// Current state and counters of the coordinator
    pub async fn snapshot(&self) -> Result<ArbiterSnapshot> {
        let (reply, snapshot) = oneshot::channel();
        self.events
            .send(ArbiterEvent::Snapshot { reply })
            .map_err(|_| ArbiterError::SequencerStopped)?;
        snapshot.await.map_err(|_| ArbiterError::SequencerStopped)
    }

    /// Ask the sequencer to resolve what is in flight and exit.
    ///
    /// Returns `false` if it had already stopped.
    pub fn shutdown(&self) -> bool {
        self.events.send(ArbiterEvent::Shutdown).is_ok()
    }

    /// Whether the sequencer is still draining its queue
    pub fn is_running(&self) -> bool {
        !self.events.is_closed()
    }
}

/// Task body owning the coordinator
#[derive(Debug)]
pub struct Sequencer {
    coordinator: ArbitrationCoordinator,
    events: EventReceiver,
}

impl Sequencer {
    /// Build a sequencer with a [`TokioTimer`] posting into its queue
    pub fn new(
        config: ArbiterConfig,
        sensor: Arc<dyn ProximitySensorPort>,
    ) -> (Self, ArbiterHandle) {
        Self::with_timer(config, sensor, |events| {
            Arc::new(TokioTimer::new(events)) as Arc<dyn TimerPort>
        })
    }

    /// Build a sequencer with a custom timer port.
    ///
    /// `make_timer` receives the queue the timer must post `Timeout` events to.
    pub fn with_timer<F>(
        config: ArbiterConfig,
        sensor: Arc<dyn ProximitySensorPort>,
        make_timer: F,
    ) -> (Self, ArbiterHandle)
    where
        F: FnOnce(EventSender) -> Arc<dyn TimerPort>,
    {
        let (tx, rx) = event_channel();
        let timer = make_timer(tx.clone());
        let coordinator = ArbitrationCoordinator::new(config, sensor, timer, tx.clone());

        (
            Self {
                coordinator,
                events: rx,
            },
            ArbiterHandle { events: tx },
        )
    }

    /// Spawn a sequencer on `runtime`.
    ///
    /// The join handle yields the final counters once the sequencer has shut
    /// down.
    pub fn spawn(
        config: ArbiterConfig,
        sensor: Arc<dyn ProximitySensorPort>,
        runtime: &Handle,
    ) -> (ArbiterHandle, JoinHandle<ArbiterStats>) {
        let (sequencer, handle) = Self::new(config, sensor);
        let task = runtime.spawn(sequencer.run());
        (handle, task)
    }

    /// Drain the queue until a shutdown request arrives
    pub async fn run(mut self) -> ArbiterStats {
        let config = *self.coordinator.config();
        info!(
            timeout_ms = config.timeout.as_millis() as u64,
            threshold = config.uncovered_threshold,
            "wake arbitration started"
        );

        while let Some(event) = self.events.recv().await {
            match event {
                ArbiterEvent::Arm { action, reply } => {
                    let outcome = self.coordinator.arm(action, config.timeout);
                    if let Some(reply) = reply {
                        let _ = reply.send(outcome);
                    }
                }
                ArbiterEvent::Sample { cycle, reading } => {
                    self.coordinator.on_sample(cycle, reading);
                }
                ArbiterEvent::Timeout { cycle } => {
                    self.coordinator.on_timeout(cycle);
                }
                ArbiterEvent::Snapshot { reply } => {
                    let _ = reply.send(self.coordinator.snapshot());
                }
                ArbiterEvent::Shutdown => break,
            }
        }

        self.drain();

        let stats = self.coordinator.stats().clone();
        info!("{}", stats.summary());
        stats
    }

    fn drain(&mut self) {
        self.coordinator.stop();
        self.events.close();

        while let Ok(event) = self.events.try_recv() {
            match event {
                ArbiterEvent::Arm { action, reply } => {
                    let outcome = self
                        .coordinator
                        .release_immediately(action, ArbiterError::SequencerStopped);
                    if let Some(reply) = reply {
                        let _ = reply.send(outcome);
                    }
                }
                other => debug!(event = ?other, "event discarded during shutdown"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ArbitrationState, Resolution, Trigger};
    use crate::testing::{ActionProbe, ScriptedSensor};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_arm_reports_outcome() {
        let sensor = Arc::new(ScriptedSensor::silent());
        let (handle, task) =
            Sequencer::spawn(ArbiterConfig::default(), sensor, &Handle::current());
        let probe = ActionProbe::new();

        let first = handle.arm(probe.action()).await.unwrap();
        assert!(matches!(first, ArmOutcome::Armed { .. }));

        let second = handle.arm(probe.action()).await.unwrap();
        assert_eq!(
            second,
            ArmOutcome::AlreadyArmed {
                cycle: first.cycle()
            }
        );

        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.state.is_armed());
        assert_eq!(snapshot.stats.duplicates_dropped, 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, ArbitrationState::Idle);
        assert_eq!(
            snapshot.last_resolution,
            Some((first.cycle(), Resolution::Executed(Trigger::Timeout)))
        );
        assert_eq!(probe.calls(), 1);

        assert!(handle.shutdown());
        let stats = task.await.unwrap();
        assert_eq!(stats.executed_on_timeout, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_armed_and_queued_requests() {
        let sensor = Arc::new(ScriptedSensor::silent());
        let (sequencer, handle) = Sequencer::new(ArbiterConfig::default(), sensor.clone());
        let probe = ActionProbe::new();

        // Queue everything before the task ever runs: one request gets armed,
        // the shutdown follows, and a late request sits behind it.
        handle.submit(probe.action()).unwrap();
        handle.shutdown();
        handle.submit(probe.action()).unwrap();

        let stats = sequencer.run().await;

        assert_eq!(probe.calls(), 2);
        assert_eq!(stats.executed_on_shutdown, 1);
        assert_eq!(stats.failed_open, 1);
        assert_eq!(sensor.active_listeners(), 0);
        assert!(!handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_after_stop_returns_action() {
        let sensor = Arc::new(ScriptedSensor::silent());
        let (handle, task) =
            Sequencer::spawn(ArbiterConfig::default(), sensor, &Handle::current());

        handle.shutdown();
        task.await.unwrap();

        let probe = ActionProbe::new();
        let returned = handle.submit(probe.action()).unwrap_err();
        returned.execute().unwrap();
        assert_eq!(probe.calls(), 1);

        assert!(handle.snapshot().await.is_err());
        assert!(!handle.shutdown());
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_arm_after_stop_still_wakes() {
        let sensor = Arc::new(ScriptedSensor::silent());
        let (handle, task) =
            Sequencer::spawn(ArbiterConfig::default(), sensor, &Handle::current());
        handle.shutdown();
        task.await.unwrap();

        let probe = ActionProbe::new();
        assert_eq!(
            handle.arm(probe.action()).await,
            Err(ArbiterError::SequencerStopped)
        );
        assert_eq!(probe.calls(), 1);
    }
}
