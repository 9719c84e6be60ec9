//! Configuration system for the simulator.
//!
//! Engine parameters can be loaded from YAML or JSON files, or assembled
//! with [`SimConfigBuilder`].
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   cycle_limit: 64
//!   cycle_abort_wraps: 3
//!   log_level: info
//!   collect_stats: true
//!
//! drive:
//!   gate_strength: 1
//!   weak_strength: 128
//!   input_strength: 0
//!
//! merge:
//!   enabled: true
//!   max_fanout: 10
//!   max_inputs: 5
//!
//! arena:
//!   block_bytes: 16384
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::arena::DEFAULT_BLOCK_BYTES;
use crate::shape::MAX_INPUTS;
use crate::strength::{DRIVE, DRIVE_MAX, RAIL, WEAK, WEAK_MAX};
use crate::types::Strength;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Level names accepted by `simulation.log_level`.
const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Scheduler parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Node transitions per step before the counter wraps
    #[serde(default = "default_cycle_limit")]
    pub cycle_limit: u32,

    /// Counter wraps that raise the cycle status and stop the step
    #[serde(default = "default_cycle_abort_wraps")]
    pub cycle_abort_wraps: u32,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to count per-event statistics
    #[serde(default = "default_true")]
    pub collect_stats: bool,
}

fn default_cycle_limit() -> u32 {
    64
}

fn default_cycle_abort_wraps() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            cycle_limit: default_cycle_limit(),
            cycle_abort_wraps: default_cycle_abort_wraps(),
            log_level: default_log_level(),
            collect_stats: true,
        }
    }
}

/// Strengths used by the host-facing drive operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveParams {
    /// Strength of `drive_output`
    #[serde(default = "default_gate_strength")]
    pub gate_strength: Strength,

    /// Strength of `weak_drive_output`
    #[serde(default = "default_weak_strength")]
    pub weak_strength: Strength,

    /// Strength of testbench inputs
    #[serde(default = "default_input_strength")]
    pub input_strength: Strength,
}

fn default_gate_strength() -> Strength {
    DRIVE
}

fn default_weak_strength() -> Strength {
    WEAK
}

fn default_input_strength() -> Strength {
    RAIL
}

impl Default for DriveParams {
    fn default() -> Self {
        Self {
            gate_strength: default_gate_strength(),
            weak_strength: default_weak_strength(),
            input_strength: default_input_strength(),
        }
    }
}

/// Transistor merging parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeParams {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Nodes with more connections than this are never merged away
    #[serde(default = "default_max_fanout")]
    pub max_fanout: usize,

    /// Widest network a merge may produce
    #[serde(default = "default_max_inputs")]
    pub max_inputs: usize,
}

fn default_max_fanout() -> usize {
    10
}

fn default_max_inputs() -> usize {
    MAX_INPUTS
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            enabled: true,
            max_fanout: default_max_fanout(),
            max_inputs: default_max_inputs(),
        }
    }
}

/// Storage parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaParams {
    /// Target size of one arena block
    #[serde(default = "default_block_bytes")]
    pub block_bytes: usize,
}

fn default_block_bytes() -> usize {
    DEFAULT_BLOCK_BYTES
}

impl Default for ArenaParams {
    fn default() -> Self {
        Self {
            block_bytes: default_block_bytes(),
        }
    }
}

/// Complete simulator configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationParams,

    #[serde(default)]
    pub drive: DriveParams,

    #[serde(default)]
    pub merge: MergeParams,

    #[serde(default)]
    pub arena: ArenaParams,
}

impl SimConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a [`SimConfigBuilder`] from the defaults.
    pub fn builder() -> SimConfigBuilder {
        SimConfigBuilder::new()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let sim = &self.simulation;
        if sim.cycle_limit == 0 {
            return Err(ConfigError::Validation(
                "cycle_limit must be positive".to_string(),
            ));
        }
        if sim.cycle_abort_wraps == 0 {
            return Err(ConfigError::Validation(
                "cycle_abort_wraps must be at least 1".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&sim.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "unknown log_level '{}'",
                sim.log_level
            )));
        }

        let drive = &self.drive;
        if drive.gate_strength > DRIVE_MAX {
            return Err(ConfigError::Validation(format!(
                "gate_strength {} is outside 0..={DRIVE_MAX}",
                drive.gate_strength
            )));
        }
        if !(WEAK..=WEAK_MAX).contains(&drive.weak_strength) {
            return Err(ConfigError::Validation(format!(
                "weak_strength {} is outside {WEAK}..={WEAK_MAX}",
                drive.weak_strength
            )));
        }
        if drive.input_strength > WEAK_MAX {
            return Err(ConfigError::Validation(format!(
                "input_strength {} does not drive",
                drive.input_strength
            )));
        }

        let merge = &self.merge;
        if !(1..=MAX_INPUTS).contains(&merge.max_inputs) {
            return Err(ConfigError::Validation(format!(
                "max_inputs {} is outside 1..={MAX_INPUTS}",
                merge.max_inputs
            )));
        }

        if self.arena.block_bytes == 0 {
            return Err(ConfigError::Validation(
                "block_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating SimConfig programmatically.
#[derive(Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transitions per counter wrap.
    pub fn cycle_limit(mut self, limit: u32) -> Self {
        self.config.simulation.cycle_limit = limit;
        self
    }

    /// Sets the wraps that stop a step.
    pub fn cycle_abort_wraps(mut self, wraps: u32) -> Self {
        self.config.simulation.cycle_abort_wraps = wraps;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Enables statistics collection.
    pub fn collect_stats(mut self, enable: bool) -> Self {
        self.config.simulation.collect_stats = enable;
        self
    }

    pub fn gate_strength(mut self, strength: Strength) -> Self {
        self.config.drive.gate_strength = strength;
        self
    }

    pub fn weak_strength(mut self, strength: Strength) -> Self {
        self.config.drive.weak_strength = strength;
        self
    }

    pub fn input_strength(mut self, strength: Strength) -> Self {
        self.config.drive.input_strength = strength;
        self
    }

    /// Turns transistor merging on or off.
    pub fn merge(mut self, enabled: bool) -> Self {
        self.config.merge.enabled = enabled;
        self
    }

    pub fn max_fanout(mut self, fanout: usize) -> Self {
        self.config.merge.max_fanout = fanout;
        self
    }

    pub fn max_inputs(mut self, inputs: usize) -> Self {
        self.config.merge.max_inputs = inputs;
        self
    }

    pub fn block_bytes(mut self, bytes: usize) -> Self {
        self.config.arena.block_bytes = bytes;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
