//! Error types for the custody service

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for custody operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`crate::CustodyService`]
#[derive(Debug, Error)]
pub enum Error {
    /// No key is registered under the requested id
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    /// An authorization policy refused the request
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// The request id was already authorized or is still being authorized
    #[error("Request {0} was already submitted")]
    ReplayedRequest(Uuid),

    /// Invalid service configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key generation or signing failed
    #[error(transparent)]
    Protocol(#[from] frost_core::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
