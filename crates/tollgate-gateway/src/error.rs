//! Gateway error types.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised while assembling or running the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration could not be turned into a running gateway.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The built-in allowlist failed its self-check.
    #[error("Policy error: {0}")]
    Policy(#[from] tollgate_policy::PolicyError),

    /// A listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A server stopped with an error.
    #[error("server on {addr} failed: {source}")]
    Serve {
        /// Listening address.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
