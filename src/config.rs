//! Engine configuration.
//!
//! Every field has a default, so a configuration file only needs the values it
//! overrides:
//!
//! ```toml
//! # turasm.toml
//! default_speed = 50
//! history_limit = 100000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{EngineError, HALT_STATE, START_STATE};

/// Tunables for a [`TuringMachine`](crate::TuringMachine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run speed (ticks per second) after a load or clear.
    pub default_speed: u32,
    /// Highest accepted speed. At this speed each tick runs a burst of steps.
    pub max_speed: u32,
    /// Steps per tick when running at `max_speed`.
    pub burst_steps: usize,
    pub start_state: String,
    /// State that ends a run.
    pub halt_state: String,
    /// Maximum number of step-back snapshots kept; `None` keeps all of them.
    pub history_limit: Option<usize>,
    /// Step budget of an unthrottled run.
    pub max_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_speed: 10,
            max_speed: 1000,
            burst_steps: 100,
            start_state: START_STATE.to_string(),
            halt_state: HALT_STATE.to_string(),
            history_limit: None,
            max_steps: 10_000_000,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        let config: Self =
            toml::from_str(content).map_err(|e| EngineError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::FileError(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        let config = Self::from_toml_str(&content)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.max_speed == 0 {
            return Err(EngineError::ConfigError(
                "max_speed must be positive".to_string(),
            ));
        }
        if self.default_speed == 0 || self.default_speed > self.max_speed {
            return Err(EngineError::ConfigError(format!(
                "default_speed must be between 1 and {}",
                self.max_speed
            )));
        }
        if self.max_steps == 0 {
            return Err(EngineError::ConfigError(
                "max_steps must be positive".to_string(),
            ));
        }
        if self.burst_steps == 0 {
            return Err(EngineError::ConfigError(
                "burst_steps must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
