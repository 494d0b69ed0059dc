/*!
 * Error types for Wakegate
 */

use std::io;
use thiserror::Error;
use wakegate_core_arbiter::ArbiterError;

pub type Result<T> = std::result::Result<T, WakeGateError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Error)]
pub enum WakeGateError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Config file could not be parsed
    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// Config could not be written
    #[error("Config serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Report could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arbitration core error
    #[error("Arbitration error: {0}")]
    Arbiter(#[from] ArbiterError),
}

impl WakeGateError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            WakeGateError::Config(_)
            | WakeGateError::Io(_)
            | WakeGateError::TomlDe(_)
            | WakeGateError::TomlSer(_)
            | WakeGateError::Json(_)
            | WakeGateError::Arbiter(_) => EXIT_FATAL,
        }
    }

    /// Whether the error came from reading or validating configuration
    pub fn is_config_error(&self) -> bool {
        match self {
            WakeGateError::Config(_) | WakeGateError::TomlDe(_) => true,
            WakeGateError::Arbiter(err) => matches!(err, ArbiterError::InvalidConfig(_)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WakeGateError::Config("timeout_ms must be greater than 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: timeout_ms must be greater than 0"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(WakeGateError::Config("x".into()).exit_code(), EXIT_FATAL);
        assert_eq!(
            WakeGateError::Io(io::Error::other("disk gone")).exit_code(),
            EXIT_FATAL
        );
        assert_ne!(EXIT_SUCCESS, EXIT_FATAL);
    }

    #[test]
    fn test_config_classification() {
        assert!(WakeGateError::Config("bad".into()).is_config_error());
        assert!(
            WakeGateError::from(ArbiterError::InvalidConfig("bad".into())).is_config_error()
        );
        assert!(!WakeGateError::from(ArbiterError::SequencerStopped).is_config_error());
        assert!(!WakeGateError::Io(io::Error::other("x")).is_config_error());
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("enabled = = true");
        let err: WakeGateError = parse.unwrap_err().into();
        assert!(matches!(err, WakeGateError::TomlDe(_)));
        assert!(err.is_config_error());
    }
}
