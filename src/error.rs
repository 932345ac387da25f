//! Error types for the control engine

use std::io;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AegisError>;

/// Main error type for the control engine
#[derive(Error, Debug)]
pub enum AegisError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Feature not available
    #[error("Feature not available: {0}")]
    FeatureNotAvailable(String),

    /// Invalid value
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Command failed
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Control method exhaustion or apply failure
    #[error("Control error: {0}")]
    Control(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}
