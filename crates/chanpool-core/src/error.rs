//! Core error types for chanpool

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a [`HandleFactory`](crate::traits::HandleFactory).
///
/// A single creation attempt may be awaited by several acquirers at once,
/// so the error is `Clone` and every waiter receives its own copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CreationError {
    /// Endpoint could not be reached
    #[error("Endpoint unavailable: {0}")]
    Unavailable(String),

    /// Credentials were rejected by the service
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Handshake did not complete
    #[error("Handshake failed: {0}")]
    Handshake(String),
}

/// Malformed endpoint string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// Host part is empty
    #[error("Endpoint host is empty")]
    EmptyHost,

    /// Port could not be parsed
    #[error("Invalid endpoint port: {0}")]
    InvalidPort(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
