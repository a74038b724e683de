//! Configuration module for persistent settings.
//!
//! This module handles loading, saving, and validating the alarm
//! configuration. A missing or malformed config file is reported as
//! "needs setup" so the interactive wizard runs instead of crashing.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::warn;

/// Alarm configuration, immutable for the lifetime of the sampling loop.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// True when the power gauge cannot report the charging status and the
    /// user signals charging/discharging manually.
    pub manual_switch: bool,
    /// Estimated internal resistance of the battery in ohms.
    pub internal_resistance: f64,
    /// Alarm threshold: terminal voltage below this is under-voltage.
    pub min_voltage: f64,
    /// Alarm threshold: equilibrium voltage above this is over-voltage.
    pub max_voltage: f64,
    /// Alarm threshold: absolute power above this is over-power.
    pub max_power: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manual_switch: false,
            internal_resistance: 0.1,
            min_voltage: 3.8,
            max_voltage: 4.15,
            max_power: 5.0,
        }
    }
}

impl Config {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.internal_resistance.is_finite() || self.internal_resistance < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "internal_resistance ({}) must be a non-negative number",
                self.internal_resistance
            )));
        }

        if !self.min_voltage.is_finite() || !self.max_voltage.is_finite() {
            return Err(ConfigError::ValidationError(
                "voltage thresholds must be finite numbers".to_string(),
            ));
        }

        if self.min_voltage >= self.max_voltage {
            return Err(ConfigError::ValidationError(format!(
                "min_voltage ({}) must be below max_voltage ({})",
                self.min_voltage, self.max_voltage
            )));
        }

        if !self.max_power.is_finite() || self.max_power <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "max_power ({}) must be a positive number",
                self.max_power
            )));
        }

        Ok(())
    }

    /// Human-readable summary printed at startup and by the wizard.
    pub fn describe(&self) -> String {
        format!(
            "Manual switch: {}\n\
             Internal resistance: {:.3} Ω\n\
             Min voltage: {:.3} V\n\
             Max voltage: {:.3} V\n\
             Max power: {:.3} W\n",
            if self.manual_switch { "Enabled" } else { "Disabled" },
            self.internal_resistance,
            self.min_voltage,
            self.max_voltage,
            self.max_power,
        )
    }
}

/// Result of attempting to load the persisted configuration.
pub enum LoadOutcome {
    /// A valid configuration was found on disk.
    Loaded(ConfigManager),
    /// No file, unreadable file, bad JSON, or failed validation: run setup.
    NeedsSetup,
}

/// Configuration manager with file I/O.
pub struct ConfigManager {
    config: RwLock<Config>,
    path: PathBuf,
}

impl ConfigManager {
    /// Load configuration from file.
    ///
    /// Any failure short of a valid config maps to `NeedsSetup`; a damaged
    /// file must trigger reconfiguration, never a crash.
    pub fn load(path: &Path) -> LoadOutcome {
        if !path.exists() {
            return LoadOutcome::NeedsSetup;
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read config file {:?}: {}", path, e);
                return LoadOutcome::NeedsSetup;
            }
        };

        let config: Config = match serde_json::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                warn!("Config file {:?} is damaged ({}), reconfiguring", path, e);
                return LoadOutcome::NeedsSetup;
            }
        };

        if let Err(e) = config.validate() {
            warn!("Config file {:?} is invalid ({}), reconfiguring", path, e);
            return LoadOutcome::NeedsSetup;
        }

        LoadOutcome::Loaded(Self {
            config: RwLock::new(config),
            path: path.to_path_buf(),
        })
    }

    /// Wrap a freshly produced configuration (from the wizard) for saving.
    pub fn with_config(config: Config, path: &Path) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            path: path.to_path_buf(),
        })
    }

    /// Save configuration to file using atomic write.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config = self
            .config
            .read()
            .map_err(|_| ConfigError::ValidationError("Failed to acquire read lock".to_string()))?;

        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&*config)
            .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {}", e)))?;

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Get current configuration.
    pub fn get(&self) -> Config {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|_| Config::default())
    }

    /// Default config path (~/.config/battery-voltage-alarm/config.json).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("battery-voltage-alarm")
            .join("config.json")
    }
}
