//! Arbitration coordinator: the single-slot proximity race
//!
//! The coordinator owns at most one armed cycle. Arming registers a sensor
//! listener and schedules a deadline; whichever of the two reports first
//! resolves the cycle and releases the other:
//!
//! ```text
//!            arm (slot free)
//!   Idle ─────────────────────────► Armed ──┐ arm (slot taken): AlreadyArmed
//!    ▲                                 │  ◄──┘
//!    │                                 │ sample:  unregister, cancel timer,
//!    │                                 │          ratio >= threshold ? run : drop
//!    │                                 │ timeout: unregister, run
//!    │           Resolved ◄────────────┘
//!    └────────────────┘
//! ```
//!
//! # Design
//!
//! This is a pure state machine. It never waits: callers (normally the
//! [`crate::sequencer`] task) feed it `arm`, `on_sample` and `on_timeout`
//! calls one at a time. Every sample and timeout names the [`CycleId`] it
//! belongs to; events for any other cycle are stale and ignored.
//!
//! # Example
//!
//! ```
//! use wakegate_core_arbiter::testing::{ActionProbe, ManualTimer, ScriptedSensor};
//! use wakegate_core_arbiter::{
//!     event_channel, ArbiterConfig, ArbitrationCoordinator, ArmOutcome, Resolution,
//!     SensorReading, Trigger,
//! };
//! use std::sync::Arc;
//!
//! let (events, _queue) = event_channel();
//! let sensor = Arc::new(ScriptedSensor::silent());
//! let timer = Arc::new(ManualTimer::new());
//! let mut coordinator =
//!     ArbitrationCoordinator::new(ArbiterConfig::default(), sensor, timer, events);
//!
//! let probe = ActionProbe::new();
//! let outcome = coordinator.arm(probe.action(), ArbiterConfig::default().timeout);
//! let cycle = match outcome {
//!     ArmOutcome::Armed { cycle, .. } => cycle,
//!     other => panic!("unexpected {:?}", other),
//! };
//!
//! // 4 cm out of a 5 cm range: nothing covering the sensor
//! let resolution = coordinator.on_sample(cycle, SensorReading::new(4.0, 5.0));
//! assert_eq!(resolution, Some(Resolution::Executed(Trigger::Sample)));
//! assert_eq!(probe.calls(), 1);
//! ```

use crate::error::{ArbiterError, Result};
use crate::event::EventSender;
use crate::sample::{ProximitySample, SensorReading, UNCOVERED_RATIO_THRESHOLD};
use crate::sensor::{ListenerId, ProximitySensorPort, SampleListener};
use crate::state::{ArbitrationState, ArmOutcome, CycleId, PendingAction, Resolution, Trigger};
use crate::stats::{ArbiterSnapshot, ArbiterStats};
use crate::timer::{TimerHandle, TimerPort};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Upper bound on how long a wake may be held back
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Tunables for the proximity race
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArbiterConfig {
    /// Deadline after which the wake runs regardless of the sensor
    pub timeout: Duration,

    /// Distance ratio at or above which the sensor counts as uncovered
    pub uncovered_threshold: f32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            uncovered_threshold: UNCOVERED_RATIO_THRESHOLD,
        }
    }
}

impl ArbiterConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(ArbiterError::InvalidConfig(
                "timeout must be greater than 0".to_string(),
            ));
        }

        if !(self.uncovered_threshold > 0.0 && self.uncovered_threshold <= 1.0) {
            return Err(ArbiterError::InvalidConfig(format!(
                "uncovered_threshold must be in (0, 1], got {}",
                self.uncovered_threshold
            )));
        }

        Ok(())
    }
}

/// Resources held by the armed cycle
#[derive(Debug)]
struct ActiveCycle {
    cycle: CycleId,
    deadline: Instant,
    listener: ListenerId,
    timer: TimerHandle,
    action: PendingAction,
}

/// Single-slot coordinator between a sensor listener and a deadline
pub struct ArbitrationCoordinator {
    config: ArbiterConfig,
    sensor: Arc<dyn ProximitySensorPort>,
    timer: Arc<dyn TimerPort>,
    events: EventSender,
    state: ArbitrationState,
    active: Option<ActiveCycle>,
    next_cycle: CycleId,
    last_resolution: Option<(CycleId, Resolution)>,
    stats: ArbiterStats,
}

impl ArbitrationCoordinator {
    /// Create a coordinator.
    ///
    /// `events` is the queue sensor listeners post samples into; it must be
    /// drained by whoever drives this coordinator.
    pub fn new(
        config: ArbiterConfig,
        sensor: Arc<dyn ProximitySensorPort>,
        timer: Arc<dyn TimerPort>,
        events: EventSender,
    ) -> Self {
        Self {
            config,
            sensor,
            timer,
            events,
            state: ArbitrationState::Idle,
            active: None,
            next_cycle: CycleId::first(),
            last_resolution: None,
            stats: ArbiterStats::new(),
        }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    pub fn state(&self) -> ArbitrationState {
        self.state
    }

    pub fn stats(&self) -> &ArbiterStats {
        &self.stats
    }

    pub fn last_resolution(&self) -> Option<(CycleId, Resolution)> {
        self.last_resolution
    }

    pub fn snapshot(&self) -> ArbiterSnapshot {
        ArbiterSnapshot {
            state: self.state,
            stats: self.stats.clone(),
            last_resolution: self.last_resolution,
        }
    }

    /// Arm a new cycle for `action`, or reject it if one is in flight.
    ///
    /// When the sensor cannot be used the action runs before this returns.
    pub fn arm(&mut self, action: PendingAction, timeout: Duration) -> ArmOutcome {
        if let Some(active) = &self.active {
            self.stats.duplicates_dropped += 1;
            debug!(cycle = %active.cycle, "wake request dropped, arbitration already in flight");
            return ArmOutcome::AlreadyArmed {
                cycle: active.cycle,
            };
        }

        let cycle = self.next_cycle;
        self.next_cycle = cycle.next();

        let registration = if self.sensor.has_capability() {
            self.sensor
                .register(SampleListener::new(cycle, self.events.clone()))
        } else {
            Err(ArbiterError::SensorUnavailable)
        };

        let listener = match registration {
            Ok(listener) => listener,
            Err(reason) => return self.fail_open(cycle, action, reason),
        };

        let deadline = Instant::now() + timeout;
        let timer = self.timer.schedule_once(timeout, cycle);

        self.active = Some(ActiveCycle {
            cycle,
            deadline,
            listener,
            timer,
            action,
        });
        self.stats.armed += 1;
        self.transition(ArbitrationState::Armed { cycle, deadline });

        debug!(
            cycle = %cycle,
            timeout_ms = timeout.as_millis() as u64,
            "wake deferred pending proximity check"
        );

        ArmOutcome::Armed { cycle, deadline }
    }

    /// Run `action` right away without arbitration.
    ///
    /// Used when a request cannot be arbitrated at all, e.g. because the
    /// sequencer is shutting down. Does not touch an armed cycle.
    pub fn release_immediately(
        &mut self,
        action: PendingAction,
        reason: ArbiterError,
    ) -> ArmOutcome {
        let cycle = self.next_cycle;
        self.next_cycle = cycle.next();
        self.fail_open(cycle, action, reason)
    }

    /// Handle a sensor reading delivered for `cycle`.
    ///
    /// Returns `None` when the event is stale.
    pub fn on_sample(&mut self, cycle: CycleId, reading: SensorReading) -> Option<Resolution> {
        let active = self.take_active(cycle, "sample")?;

        self.sensor.unregister(active.listener);
        self.timer.cancel(active.timer);

        let sample = ProximitySample::from_reading(reading);
        trace!(
            cycle = %cycle,
            ratio = sample.distance_ratio(),
            remaining_ms = active
                .deadline
                .saturating_duration_since(Instant::now())
                .as_millis() as u64,
            "proximity sample arrived before deadline"
        );

        let resolution = if sample.is_uncovered(self.config.uncovered_threshold) {
            self.run_action(cycle, active.action);
            Resolution::Executed(Trigger::Sample)
        } else {
            drop(active.action);
            Resolution::Suppressed
        };

        Some(self.finish(cycle, resolution))
    }

    /// Handle the deadline of `cycle` elapsing.
    ///
    /// Returns `None` when the event is stale.
    pub fn on_timeout(&mut self, cycle: CycleId) -> Option<Resolution> {
        let active = self.take_active(cycle, "timeout")?;

        // The timer has fired; only the listener is left to release.
        self.sensor.unregister(active.listener);
        self.run_action(cycle, active.action);

        Some(self.finish(cycle, Resolution::Executed(Trigger::Timeout)))
    }

    /// Release anything in flight, running its action.
    ///
    /// A coordinator that is being torn down never swallows a wake.
    pub fn stop(&mut self) -> Option<Resolution> {
        let active = self.active.take()?;
        let cycle = active.cycle;

        self.sensor.unregister(active.listener);
        self.timer.cancel(active.timer);
        self.run_action(cycle, active.action);

        Some(self.finish(cycle, Resolution::Executed(Trigger::Shutdown)))
    }

    fn fail_open(
        &mut self,
        cycle: CycleId,
        action: PendingAction,
        reason: ArbiterError,
    ) -> ArmOutcome {
        warn!(cycle = %cycle, error = %reason, "proximity check unavailable, waking immediately");
        self.stats.failed_open += 1;
        self.run_action(cycle, action);
        ArmOutcome::FailedOpen { cycle, reason }
    }

    fn take_active(&mut self, cycle: CycleId, source: &'static str) -> Option<ActiveCycle> {
        if self.active.as_ref().is_some_and(|active| active.cycle == cycle) {
            return self.active.take();
        }

        self.stats.stale_events += 1;
        debug!(cycle = %cycle, source, "stale arbitration event ignored");
        None
    }

    fn run_action(&mut self, cycle: CycleId, action: PendingAction) {
        if let Err(panic) = action.execute() {
            self.stats.action_panics += 1;
            error!(cycle = %cycle, panic = %panic, "wake action panicked");
        }
    }

    fn finish(&mut self, cycle: CycleId, resolution: Resolution) -> Resolution {
        self.stats.record_resolution(resolution);
        self.last_resolution = Some((cycle, resolution));
        self.transition(ArbitrationState::Resolved { cycle, resolution });

        match resolution {
            Resolution::Executed(trigger) => {
                info!(cycle = %cycle, trigger = %trigger, "wake released")
            }
            Resolution::Suppressed => info!(cycle = %cycle, "wake suppressed, sensor covered"),
        }

        self.transition(ArbitrationState::Idle);
        resolution
    }

    fn transition(&mut self, next: ArbitrationState) {
        trace!(from = ?self.state, to = ?next, "arbitration state change");
        self.state = next;
    }
}

impl std::fmt::Debug for ArbitrationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbitrationCoordinator")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
