//! Simulation Integration Test: config file to report
//!
//! Drives the public `wakegate` API the way the CLI does: load a TOML config,
//! run a scenario on paused time, and check the report and its JSON form.

use wakegate::{run_scenario, GuardConfig, Scenario, ScriptedSample};

fn sample(after_ms: u64, distance: f32) -> Option<ScriptedSample> {
    Some(ScriptedSample {
        after_ms,
        distance,
        max_range: 5.0,
    })
}

#[tokio::test(start_paused = true)]
async fn test_scenarios_from_default_config() -> anyhow::Result<()> {
    let config = GuardConfig::default();

    // Uncovered sample at 100 ms wakes at 100 ms
    let report = run_scenario(
        &config,
        &Scenario {
            sample: sample(100, 4.0),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(report.fired_at_ms, vec![100]);

    // Covered sample at 50 ms suppresses the wake
    let report = run_scenario(
        &config,
        &Scenario {
            sample: sample(50, 0.3),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(report.actions_run, 0);
    assert_eq!(report.stats.as_ref().map(|s| s.suppressed), Some(1));

    // Silent sensor wakes at the deadline
    let report = run_scenario(&config, &Scenario::default()).await?;
    assert_eq!(report.fired_at_ms, vec![500]);

    // Second request 50 ms into the race is dropped
    let report = run_scenario(
        &config,
        &Scenario {
            requests: 2,
            request_gap_ms: 50,
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(report.deferred, 2);
    assert_eq!(report.fired_at_ms, vec![500]);
    assert_eq!(report.stats.as_ref().map(|s| s.duplicates_dropped), Some(1));

    // Refused registration wakes at once
    let report = run_scenario(
        &config,
        &Scenario {
            registration_fails: true,
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(report.fired_at_ms, vec![0]);
    assert_eq!(report.registrations, 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_sensor_wakes_inline() -> anyhow::Result<()> {
    let report = run_scenario(
        &GuardConfig::default(),
        &Scenario {
            sensor_available: false,
            requests: 2,
            ..Default::default()
        },
    )
    .await?;

    assert_eq!(report.inline, 2);
    assert_eq!(report.deferred, 0);
    assert_eq!(report.fired_at_ms, vec![0, 0]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_config_file_drives_timeout() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("wakegate.toml");
    std::fs::write(&path, "timeout_ms = 200\nuncovered_threshold = 0.5\n")?;

    let config = GuardConfig::load_or_default(Some(&path))?;
    assert!(config.enabled);

    let report = run_scenario(&config, &Scenario::default()).await?;
    assert_eq!(report.fired_at_ms, vec![200]);

    // 0.4 is uncovered at the default threshold but covered at 0.5
    let report = run_scenario(
        &config,
        &Scenario {
            sample: sample(20, 2.0),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(report.actions_run, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_report_serializes_to_json() -> anyhow::Result<()> {
    let report = run_scenario(
        &GuardConfig::default(),
        &Scenario {
            sample: sample(100, 4.0),
            ..Default::default()
        },
    )
    .await?;

    let json = serde_json::to_value(&report)?;
    assert_eq!(json["fired_at_ms"][0], 100);
    assert_eq!(json["stats"]["executed_on_sample"], 1);
    assert_eq!(json["deferred"], 1);
    Ok(())
}

#[test]
fn test_init_config_roundtrip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("wakegate").join("wakegate.toml");

    GuardConfig::default().to_file(&path)?;
    let written = std::fs::read_to_string(&path)?;
    assert!(written.contains("timeout_ms = 500"));
    assert_eq!(GuardConfig::from_file(&path)?, GuardConfig::default());
    Ok(())
}
