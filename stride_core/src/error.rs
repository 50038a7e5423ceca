//! Error types for the stride_core library.

use std::io;
use std::time::Duration;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for stride_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Health provider failure that escaped the adapter boundary
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Failures at the health-data provider boundary.
///
/// Cloneable so one coalesced fetch can hand the same outcome to every waiter.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The user declined the Steps read scope
    #[error("permission to read steps was not granted")]
    PermissionDenied,

    /// Initialization failed or the platform has no health provider
    #[error("health provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The record query itself failed
    #[error("step query failed: {0}")]
    QueryFailure(String),

    /// The provider did not answer within the configured timeout
    #[error("health provider timed out after {0:?}")]
    Timeout(Duration),

    /// The fetch was cancelled before it completed
    #[error("fetch cancelled")]
    Cancelled,
}
