//! Error types for the urus core.

use thiserror::Error;

/// Errors that can occur in urus operations.
#[derive(Error, Debug)]
pub enum UrusError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cloud error: {0}")]
    Cloud(String),

    #[error("Calendar error: {0}")]
    Calendar(String),

    #[error("Calendar provider '{0}' not found in PATH")]
    ProviderNotInstalled(String),

    #[error("Calendar provider request timed out after {0}s")]
    ProviderTimeout(u64),

    #[error("No writable calendars available")]
    NoCalendars,

    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("Invalid backup file: {0}")]
    InvalidBackup(String),

    #[error("Invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("{0}")]
    Hydration(String),

    #[error("Another urus process is using {0}")]
    Locked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for UrusError {
    fn from(e: serde_json::Error) -> Self {
        UrusError::Serialization(e.to_string())
    }
}

/// Result type alias for urus operations.
pub type UrusResult<T> = Result<T, UrusError>;
