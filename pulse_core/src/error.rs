//! Error types for the pulse_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pulse_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The health data store is absent on this platform
    #[error("Health data is not available on this device")]
    DataUnavailable,

    /// The user refused read access to heart-rate data
    #[error("Access to heart-rate data was denied")]
    AuthorizationDenied,

    /// Activation has not finished asking for access
    #[error("Access to heart-rate data has not been granted yet")]
    AuthorizationPending,

    /// The provider could not construct a workout session
    #[error("Unable to create the workout session: {0}")]
    SessionCreation(String),

    /// The provider could not register the sample query
    #[error("Unable to create the heart-rate query: {0}")]
    QueryCreation(String),
}
