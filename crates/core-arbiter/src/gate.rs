//! Wake request gate
//!
//! The gate replaces a direct wake call. It either runs the wake inline (the
//! feature is off, no sensor, or the sequencer is gone) or hands it to the
//! sequencer and tells the caller to return its neutral result.
//!
//! # Lifecycle
//!
//! A gate owns at most one running sequencer. `set_enabled(true)` starts it
//! and caches the sensor handle; `set_enabled(false)` clears the handle and
//! shuts the sequencer down, which releases any armed cycle by running its
//! wake. Dropping the gate does the same.

use crate::coordinator::ArbiterConfig;
use crate::error::{ArbiterError, Result};
use crate::lock;
use crate::sensor::ProximitySensorPort;
use crate::sequencer::{ArbiterHandle, Sequencer};
use crate::state::PendingAction;
use crate::stats::{ArbiterSnapshot, ArbiterStats};
use crate::toggle::FeatureToggle;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// What [`WakeRequestGate::intercept`] did with the wake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interception {
    /// The wake already ran on the calling thread
    Inline,
    /// The wake is being arbitrated; the caller returns its neutral result
    Deferred,
}

struct Running {
    handle: ArbiterHandle,
    task: JoinHandle<ArbiterStats>,
}

/// Entry point for wake requests
pub struct WakeRequestGate {
    toggle: FeatureToggle,
    sensor: Arc<dyn ProximitySensorPort>,
    config: ArbiterConfig,
    runtime: Handle,
    running: Mutex<Option<Running>>,
}

impl WakeRequestGate {
    /// Create a disabled gate.
    ///
    /// The sequencer will be spawned on `runtime` once the gate is enabled.
    pub fn new(
        config: ArbiterConfig,
        sensor: Arc<dyn ProximitySensorPort>,
        runtime: Handle,
    ) -> Self {
        Self {
            toggle: FeatureToggle::new(),
            sensor,
            config,
            runtime,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.toggle.is_enabled()
    }

    /// Whether a sequencer is currently accepting requests
    pub fn is_running(&self) -> bool {
        lock(&self.running)
            .as_ref()
            .is_some_and(|running| running.handle.is_running())
    }

    /// Apply a feature state change.
    ///
    /// Returns `true` if the state changed.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        let changed = self.toggle.set_enabled(enabled);
        if enabled {
            self.start();
        } else {
            self.stop();
        }
        changed
    }

    /// Spawn the sequencer and cache the sensor handle.
    ///
    /// Returns `false` if the gate is disabled or already started.
    pub fn start(&self) -> bool {
        if !self.toggle.is_enabled() {
            return false;
        }

        let mut running = lock(&self.running);
        if running
            .as_ref()
            .is_some_and(|running| running.handle.is_running())
        {
            return false;
        }

        self.toggle.attach_sensor(Arc::clone(&self.sensor));
        let (handle, task) =
            Sequencer::spawn(self.config, Arc::clone(&self.sensor), &self.runtime);
        *running = Some(Running { handle, task });

        info!(
            capability = self.sensor.has_capability(),
            "proximity wake gating started"
        );
        true
    }

    /// Shut the sequencer down.
    ///
    /// Anything armed runs before the sequencer exits. The returned task
    /// yields the final counters.
    pub fn stop(&self) -> Option<JoinHandle<ArbiterStats>> {
        let running = lock(&self.running).take()?;
        running.handle.shutdown();
        info!("proximity wake gating stopped");
        Some(running.task)
    }

    /// Intercept one wake request.
    ///
    /// Never panics out: a panicking wake is contained and logged.
    pub fn intercept<F>(&self, wake: F) -> Interception
    where
        F: FnOnce() + Send + 'static,
    {
        let action = PendingAction::new(wake);

        if !self.toggle.has_capability() {
            debug!(
                enabled = self.toggle.is_enabled(),
                "no proximity check possible, waking inline"
            );
            return run_inline(action);
        }

        let arbiter = lock(&self.running)
            .as_ref()
            .map(|running| running.handle.clone());

        let Some(arbiter) = arbiter else {
            return run_inline(action);
        };

        match arbiter.submit(action) {
            Ok(()) => Interception::Deferred,
            Err(action) => {
                debug!(error = %ArbiterError::SequencerStopped, "waking inline");
                run_inline(action)
            }
        }
    }

    /// State and counters of the running sequencer
    pub async fn snapshot(&self) -> Result<ArbiterSnapshot> {
        let arbiter = lock(&self.running)
            .as_ref()
            .map(|running| running.handle.clone())
            .ok_or(ArbiterError::SequencerStopped)?;
        arbiter.snapshot().await
    }

    /// Apply every value published on `changes` until the sender is dropped.
    ///
    /// The current value is applied first.
    pub async fn follow(self: Arc<Self>, mut changes: watch::Receiver<bool>) {
        let initial = *changes.borrow_and_update();
        self.set_enabled(initial);

        while changes.changed().await.is_ok() {
            let enabled = *changes.borrow_and_update();
            self.set_enabled(enabled);
        }

        debug!("feature toggle source closed");
    }
}

fn run_inline(action: PendingAction) -> Interception {
    if let Err(panic) = action.execute() {
        error!(panic = %panic, "wake action panicked");
    }
    Interception::Inline
}

impl Drop for WakeRequestGate {
    fn drop(&mut self) {
        if let Some(running) = lock(&self.running).take() {
            running.handle.shutdown();
        }
    }
}

impl std::fmt::Debug for WakeRequestGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeRequestGate")
            .field("config", &self.config)
            .field("toggle", &self.toggle)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ActionProbe, ScriptedSensor};
    use std::time::Duration;

    fn gate_with(sensor: ScriptedSensor) -> (WakeRequestGate, Arc<ScriptedSensor>) {
        let sensor = Arc::new(sensor);
        let gate = WakeRequestGate::new(
            ArbiterConfig::default(),
            sensor.clone(),
            Handle::current(),
        );
        (gate, sensor)
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_gate_wakes_inline() {
        let (gate, sensor) = gate_with(ScriptedSensor::silent());
        let probe = ActionProbe::new();

        assert_eq!(gate.intercept(probe.closure()), Interception::Inline);
        assert_eq!(probe.calls(), 1);
        assert_eq!(sensor.registrations(), 0);
        assert!(!gate.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enabled_gate_defers_until_sample() {
        let (gate, sensor) = gate_with(ScriptedSensor::replying(
            Duration::from_millis(100),
            4.0,
            5.0,
        ));
        let probe = ActionProbe::new();
        gate.set_enabled(true);

        assert_eq!(gate.intercept(probe.closure()), Interception::Deferred);
        assert_eq!(probe.calls(), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(probe.calls(), 1);
        assert_eq!(sensor.active_listeners(), 0);

        let snapshot = gate.snapshot().await.unwrap();
        assert_eq!(snapshot.stats.executed_on_sample, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_sensor_wakes_inline_when_enabled() {
        let (gate, sensor) = gate_with(ScriptedSensor::unavailable());
        let probe = ActionProbe::new();
        gate.set_enabled(true);

        assert_eq!(gate.intercept(probe.closure()), Interception::Inline);
        assert_eq!(probe.calls(), 1);
        assert_eq!(sensor.registrations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_releases_armed_wake() {
        let (gate, sensor) = gate_with(ScriptedSensor::silent());
        let probe = ActionProbe::new();
        gate.set_enabled(true);

        assert_eq!(gate.intercept(probe.closure()), Interception::Deferred);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sensor.active_listeners(), 1);

        assert!(gate.set_enabled(false));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(probe.calls(), 1);
        assert_eq!(sensor.active_listeners(), 0);

        // Later requests bypass arbitration entirely
        assert_eq!(gate.intercept(probe.closure()), Interception::Inline);
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_returns_final_stats() {
        let (gate, _sensor) = gate_with(ScriptedSensor::silent());
        let probe = ActionProbe::new();
        gate.set_enabled(true);
        gate.intercept(probe.closure());

        let stats = gate.stop().unwrap().await.unwrap();
        assert_eq!(stats.executed_on_shutdown, 1);
        assert_eq!(probe.calls(), 1);
        assert!(gate.stop().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_panic_is_contained() {
        let (gate, _sensor) = gate_with(ScriptedSensor::silent());
        assert_eq!(gate.intercept(|| panic!("driver fault")), Interception::Inline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_applies_config_changes() {
        let (gate, _sensor) = gate_with(ScriptedSensor::silent());
        let gate = Arc::new(gate);
        let (tx, rx) = watch::channel(false);

        let follower = tokio::spawn(Arc::clone(&gate).follow(rx));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!gate.is_enabled());

        tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(gate.is_enabled());
        assert!(gate.is_running());

        tx.send(false).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!gate.is_enabled());
        assert!(!gate.is_running());

        drop(tx);
        follower.await.unwrap();
    }
}
