//! Wakegate Core Arbiter: Pure-logic wake arbitration
//!
//! # Overview
//!
//! Some platform wake events (a screen turning on, a lift-to-wake gesture)
//! should not fire while the device is in a pocket or face down. This crate
//! holds such a wake back for a short, bounded time and asks the proximity
//! sensor whether anything is covering it:
//!
//! - **Feature Toggle**: Enables the behavior and caches the sensor handle
//! - **Wake Request Gate**: Entry point replacing the direct wake call
//! - **Arbitration Coordinator**: Single-slot race between one sensor sample and a deadline
//! - **Sequencer**: The one queue every sample, timeout and request goes through
//! - **Ports**: Sensor and timer abstractions with tokio and scripted implementations
//!
//! # Key Principles
//!
//! - **Fail open**: A missing sensor, a refused registration, a late sample or
//!   a stopped sequencer all end with the wake running. Only a covered sensor
//!   suppresses it.
//! - **Bounded**: No wake is held back longer than the configured timeout.
//! - **Single slot**: While one request is in flight, further requests are
//!   dropped rather than queued.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Platform wake path              │
//! └─────────────┬───────────────────────────┘
//!               │ intercept(action)
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       WakeRequestGate                   │  ← disabled / no sensor: run inline
//! │  (FeatureToggle, ArbiterHandle)         │
//! └─────────────┬───────────────────────────┘
//!               │ Arm
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Sequencer task                    │  ← one queue, one consumer
//! │  (Arm, Sample, Timeout, Shutdown)       │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       ArbitrationCoordinator            │  ← Idle → Armed → Resolved → Idle
//! │  (CycleId tokens, stats)                │
//! └──────┬──────────────────────┬───────────┘
//!        │ register             │ schedule_once
//!        ▼                      ▼
//!  ProximitySensorPort      TimerPort
//!        │ Sample               │ Timeout
//!        └──────► back into the sequencer queue
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use wakegate_core_arbiter::{ArbiterConfig, Interception, NoSensor, WakeRequestGate};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let gate = WakeRequestGate::new(
//!     ArbiterConfig::default(),
//!     Arc::new(NoSensor),
//!     tokio::runtime::Handle::current(),
//! );
//! gate.set_enabled(true);
//!
//! match gate.intercept(|| println!("screen on")) {
//!     Interception::Inline => { /* already woke */ }
//!     Interception::Deferred => { /* return the neutral result */ }
//! }
//! # }
//! ```

pub mod coordinator;
pub mod error;
pub mod event;
pub mod gate;
pub mod sample;
pub mod sensor;
pub mod sequencer;
pub mod state;
pub mod stats;
pub mod testing;
pub mod timer;
pub mod toggle;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-export main types for convenience
pub use coordinator::{ArbiterConfig, ArbitrationCoordinator, DEFAULT_TIMEOUT};
pub use error::{ArbiterError, Result};
pub use event::{event_channel, ArbiterEvent, EventReceiver, EventSender};
pub use gate::{Interception, WakeRequestGate};
pub use sample::{ProximitySample, SensorReading, UNCOVERED_RATIO_THRESHOLD};
pub use sensor::{ListenerId, NoSensor, ProximitySensorPort, SampleListener};
pub use sequencer::{ArbiterHandle, Sequencer};
pub use state::{ArbitrationState, ArmOutcome, CycleId, PendingAction, Resolution, Trigger};
pub use stats::{ArbiterSnapshot, ArbiterStats};
pub use timer::{TimerHandle, TimerPort, TokioTimer};
pub use toggle::FeatureToggle;

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use wakegate_core_arbiter::prelude::*;
/// ```
pub mod prelude {
    pub use super::coordinator::{ArbiterConfig, ArbitrationCoordinator};
    pub use super::error::ArbiterError;
    pub use super::gate::{Interception, WakeRequestGate};
    pub use super::sensor::{ProximitySensorPort, SampleListener};
    pub use super::state::{ArmOutcome, PendingAction, Resolution, Trigger};
    pub use super::stats::ArbiterStats;
    pub use super::toggle::FeatureToggle;
}

// Poisoning is ignored; every guarded value stays consistent across an unwind.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
