//! Error types for wake arbitration
//!
//! None of these reach the end user. Every failure in this crate degrades to
//! "wake anyway"; the errors exist so callers and logs can tell why.

use thiserror::Error;

/// Errors produced by the arbitration core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArbiterError {
    /// The proximity sensor capability is not present
    #[error("proximity sensor unavailable")]
    SensorUnavailable,

    /// The sensor port refused the listener
    #[error("sensor listener registration failed: {0}")]
    RegistrationFailed(String),

    /// Configuration rejected by validation
    #[error("invalid arbiter configuration: {0}")]
    InvalidConfig(String),

    /// The sequencer task is no longer draining its queue
    #[error("arbitration sequencer stopped")]
    SequencerStopped,
}

impl ArbiterError {
    /// Whether this error means the sensor capability cannot be used.
    ///
    /// Capability errors turn an `arm` into an immediate execution.
    pub fn is_capability_error(&self) -> bool {
        matches!(
            self,
            ArbiterError::SensorUnavailable | ArbiterError::RegistrationFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ArbiterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_classification() {
        assert!(ArbiterError::SensorUnavailable.is_capability_error());
        assert!(ArbiterError::RegistrationFailed("busy".into()).is_capability_error());
        assert!(!ArbiterError::SequencerStopped.is_capability_error());
        assert!(!ArbiterError::InvalidConfig("x".into()).is_capability_error());
    }

    #[test]
    fn test_display() {
        let err = ArbiterError::RegistrationFailed("no such sensor".to_string());
        assert_eq!(
            err.to_string(),
            "sensor listener registration failed: no such sensor"
        );
    }
}
