/*!
 * Simulation driver
 *
 * Runs the full gate against a scripted proximity sensor so the arbitration
 * can be observed without a device: how many wakes ran, when, and whether
 * they ran on the caller or after the race.
 */

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::info;
use wakegate_core_arbiter::testing::{ActionProbe, ScriptedSensor};
use wakegate_core_arbiter::{ArbiterError, ArbiterStats, Interception, WakeRequestGate};

use crate::config::GuardConfig;
use crate::error::{Result, WakeGateError};

/// Extra wait after the last deadline before the report is taken
pub const SETTLE_MARGIN: Duration = Duration::from_millis(50);

/// One reading the simulated sensor reports after registration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScriptedSample {
    pub after_ms: u64,
    pub distance: f32,
    pub max_range: f32,
}

/// What the simulated device looks like and how it is poked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Reading delivered to every listener; `None` means the sensor stays silent
    pub sample: Option<ScriptedSample>,

    /// Whether the device has a proximity sensor at all
    pub sensor_available: bool,

    /// Sensor present but refusing listeners
    pub registration_fails: bool,

    /// Number of wake requests issued
    pub requests: u32,

    /// Pause between consecutive requests
    pub request_gap_ms: u64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            sample: None,
            sensor_available: true,
            registration_fails: false,
            requests: 1,
            request_gap_ms: 0,
        }
    }
}

impl Scenario {
    fn sensor(&self) -> ScriptedSensor {
        if !self.sensor_available {
            ScriptedSensor::unavailable()
        } else if self.registration_fails {
            ScriptedSensor::failing_registration()
        } else {
            match self.sample {
                Some(sample) => ScriptedSensor::replying(
                    Duration::from_millis(sample.after_ms),
                    sample.distance,
                    sample.max_range,
                ),
                None => ScriptedSensor::silent(),
            }
        }
    }
}

/// Outcome of one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub enabled: bool,
    pub requests: u32,

    /// Requests whose wake ran on the caller
    pub inline: u32,

    /// Requests handed to the sequencer
    pub deferred: u32,

    /// Wakes that actually ran
    pub actions_run: usize,

    /// Milliseconds from the first request to each wake
    pub fired_at_ms: Vec<u64>,

    /// Final sequencer counters; absent when the gate never started
    pub stats: Option<ArbiterStats>,

    pub registrations: usize,
    pub unregistrations: usize,
}

impl SimulationReport {
    /// Wakes dropped because the sensor was covered or a cycle was in flight
    pub fn actions_dropped(&self) -> usize {
        (self.requests as usize).saturating_sub(self.actions_run)
    }

    /// Format a human-readable summary
    pub fn summary(&self) -> String {
        let fired = self
            .fired_at_ms
            .iter()
            .map(|ms| format!("{}ms", ms))
            .collect::<Vec<_>>()
            .join(", ");

        let mut out = format!(
            "Wakegate simulation: {} request(s), {} inline, {} deferred\n  wakes run: {} [{}]\n  wakes dropped: {}\n  sensor listeners: {} registered, {} unregistered",
            self.requests,
            self.inline,
            self.deferred,
            self.actions_run,
            fired,
            self.actions_dropped(),
            self.registrations,
            self.unregistrations
        );
        if let Some(stats) = &self.stats {
            out.push_str("\n  ");
            out.push_str(&stats.summary());
        }
        out
    }
}

/// Run `scenario` against a gate built from `config`.
///
/// Must be called within a tokio runtime. Under paused time the whole run is
/// instantaneous and the reported milliseconds are exact.
pub async fn run_scenario(config: &GuardConfig, scenario: &Scenario) -> Result<SimulationReport> {
    config.validate()?;
    if scenario.requests == 0 {
        return Err(WakeGateError::Config(
            "scenario needs at least one request".to_string(),
        ));
    }

    let arbiter_config = config.arbiter_config();
    let sensor = Arc::new(scenario.sensor());
    let gate = WakeRequestGate::new(arbiter_config, sensor.clone(), Handle::current());
    gate.set_enabled(config.enabled);

    info!(
        enabled = config.enabled,
        requests = scenario.requests,
        timeout_ms = config.timeout_ms,
        "starting simulation"
    );

    let probe = ActionProbe::new();
    let start = Instant::now();
    let mut inline = 0;
    let mut deferred = 0;

    for i in 0..scenario.requests {
        if i > 0 && scenario.request_gap_ms > 0 {
            tokio::time::sleep(Duration::from_millis(scenario.request_gap_ms)).await;
        }
        match gate.intercept(probe.closure()) {
            Interception::Inline => inline += 1,
            Interception::Deferred => deferred += 1,
        }
    }

    tokio::time::sleep(arbiter_config.timeout + SETTLE_MARGIN).await;

    let stats = match gate.stop() {
        Some(task) => Some(
            task.await
                .map_err(|_| WakeGateError::Arbiter(ArbiterError::SequencerStopped))?,
        ),
        None => None,
    };

    let fired_at_ms = probe
        .fired_at()
        .into_iter()
        .map(|at| at.saturating_duration_since(start).as_millis() as u64)
        .collect();

    Ok(SimulationReport {
        enabled: config.enabled,
        requests: scenario.requests,
        inline,
        deferred,
        actions_run: probe.calls(),
        fired_at_ms,
        stats,
        registrations: sensor.registrations(),
        unregistrations: sensor.unregistrations(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(after_ms: u64, distance: f32) -> Option<ScriptedSample> {
        Some(ScriptedSample {
            after_ms,
            distance,
            max_range: 5.0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncovered_sample_report() {
        let scenario = Scenario {
            sample: sample(100, 4.0),
            ..Default::default()
        };
        let report = run_scenario(&GuardConfig::default(), &scenario)
            .await
            .unwrap();

        assert_eq!(report.deferred, 1);
        assert_eq!(report.fired_at_ms, vec![100]);
        assert_eq!(report.registrations, 1);
        assert_eq!(report.unregistrations, 1);
        assert_eq!(report.stats.unwrap().executed_on_sample, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_feature_runs_inline() {
        let config = GuardConfig {
            enabled: false,
            ..Default::default()
        };
        let scenario = Scenario {
            sample: sample(50, 0.3),
            requests: 3,
            ..Default::default()
        };
        let report = run_scenario(&config, &scenario).await.unwrap();

        assert_eq!(report.inline, 3);
        assert_eq!(report.actions_run, 3);
        assert_eq!(report.fired_at_ms, vec![0, 0, 0]);
        assert!(report.stats.is_none());
        assert_eq!(report.registrations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_requests_rejected() {
        let scenario = Scenario {
            requests: 0,
            ..Default::default()
        };
        assert!(run_scenario(&GuardConfig::default(), &scenario)
            .await
            .is_err());
    }

    #[test]
    fn test_summary_lists_fire_times() {
        let report = SimulationReport {
            enabled: true,
            requests: 2,
            inline: 0,
            deferred: 2,
            actions_run: 1,
            fired_at_ms: vec![500],
            stats: None,
            registrations: 1,
            unregistrations: 1,
        };
        let summary = report.summary();
        assert!(summary.contains("wakes run: 1 [500ms]"));
        assert!(summary.contains("wakes dropped: 1"));
    }
}
