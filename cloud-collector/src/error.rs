//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication against {endpoint} failed: {message}")]
    Auth { endpoint: String, message: String },

    #[error("Provider query '{operation}' failed: {message}")]
    Query {
        operation: &'static str,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Sink startup failed: {0}")]
    SinkStartup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn auth(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn query(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Query {
            operation,
            message: message.into(),
        }
    }

    pub fn send(msg: impl Into<String>) -> Self {
        Self::Send(msg.into())
    }

    /// Whether this error must terminate the process.
    ///
    /// Only a sink that cannot be started is fatal; every provider-facing
    /// failure is transient and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SinkStartup(_))
    }
}
