/*!
 * Wakegate - proximity-gated wake arbitration
 *
 * Holds platform wake requests back for a bounded moment and drops them if
 * the proximity sensor reports the device is covered:
 * - TOML configuration with per-user default location
 * - Structured logging (compact stderr or JSON file)
 * - Simulation driver over a scripted sensor
 *
 * The arbitration itself lives in the `wakegate-core-arbiter` crate.
 */

pub mod config;
pub mod error;
pub mod logging;
pub mod sim;

// Re-export commonly used types
pub use config::{GuardConfig, LogLevel};
pub use error::{Result, WakeGateError};
pub use sim::{run_scenario, Scenario, ScriptedSample, SimulationReport};
pub use wakegate_core_arbiter as arbiter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
