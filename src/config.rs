/*!
 * Configuration types for Wakegate
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use wakegate_core_arbiter::{ArbiterConfig, UNCOVERED_RATIO_THRESHOLD};

use crate::error::{Result, WakeGateError};

/// Name of the config file inside the per-user config directory
pub const CONFIG_FILE_NAME: &str = "wakegate.toml";

/// Main configuration for the wake guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Gate wakes on the proximity sensor
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Longest a wake may be held back, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Distance ratio at or above which the sensor counts as uncovered
    #[serde(default = "default_uncovered_threshold")]
    pub uncovered_threshold: f32,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log to this file (JSON lines) instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Verbose output (forces debug logging)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: default_timeout_ms(),
            uncovered_threshold: default_uncovered_threshold(),
            log_level: LogLevel::default(),
            log_file: None,
            verbose: false,
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    500
}

fn default_uncovered_threshold() -> f32 {
    UNCOVERED_RATIO_THRESHOLD
}

impl GuardConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GuardConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(WakeGateError::Config(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }

        self.arbiter_config().validate()?;
        Ok(())
    }

    /// Arbitration settings for the core
    pub fn arbiter_config(&self) -> ArbiterConfig {
        ArbiterConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            uncovered_threshold: self.uncovered_threshold,
        }
    }

    /// Per-user config file location, e.g. `~/.config/wakegate/wakegate.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wakegate").join(CONFIG_FILE_NAME))
    }

    /// Load `path`, or the default location, falling back to defaults.
    ///
    /// An explicitly given path must exist; a missing default file is not an
    /// error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }
}
