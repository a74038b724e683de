//! Error types for the battery voltage alarm daemon.
//!
//! This module defines custom error enums for each component,
//! providing descriptive error messages with context information.

use thiserror::Error;

/// Errors related to the power-supply sensor source.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("No power supply device with a voltage_now endpoint found under '{0}'")]
    DeviceNotFound(String),

    #[error("Mandatory sensor endpoint '{name}' is not readable: {source}")]
    EndpointUnreadable {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors related to configuration management.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to write configuration: {0}")]
    WriteError(#[from] std::io::Error),
}

/// Errors related to the interactive first-run wizard.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Failed to read user input: {0}")]
    InputFailed(#[from] std::io::Error),

    #[error("Setup aborted: input stream closed")]
    InputClosed,

    #[error("Sensor error during setup: {0}")]
    Sensor(#[from] SensorError),
}

/// Top-level daemon errors.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
