//! Error taxonomy for the gating pipeline.
//!
//! Each stage reports a typed failure; [`GateError`] unifies them and
//! [`GateError::rejection`] maps every failure onto exactly one HTTP
//! [`Rejection`]. No variant maps to forwarding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller authentication failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header was presented.
    #[error("missing Authorization header")]
    MissingHeader,
    /// The header or key does not have the expected shape.
    #[error("invalid Authorization header format")]
    MalformedHeader,
    /// The key is well-formed but not known to the key store.
    #[error("invalid API key")]
    UnknownKey,
    /// The key is known but has been disabled.
    #[error("API key is disabled")]
    DisabledKey,
}

impl AuthError {
    /// HTTP status for this failure: a disabled key is a known identity
    /// being refused (403), everything else is unauthenticated (401).
    #[must_use]
    pub fn status(self) -> u16 {
        match self {
            Self::DisabledKey => 403,
            Self::MissingHeader | Self::MalformedHeader | Self::UnknownKey => 401,
        }
    }
}

/// Ways an operator confirmation can end without approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmationRefusal {
    /// The operator explicitly rejected the request.
    #[error("Request rejected by operator")]
    Rejected,
    /// No decision arrived before the confirmation timeout.
    #[error("Confirmation timed out")]
    TimedOut,
}

/// Failures while obtaining a credential or talking to the backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached or the exchange failed mid-flight.
    #[error("backend unreachable: {0}")]
    Transport(String),
    /// No valid backend credential could be obtained.
    #[error("backend credential unavailable: {0}")]
    Credential(String),
    /// The backend answered with a 4xx/5xx status.
    #[error("backend error {status}: {message}")]
    Upstream {
        /// Status returned by the backend.
        status: u16,
        /// Human-readable message extracted from the backend payload.
        message: String,
        /// The backend's JSON error payload, if any.
        details: Option<serde_json::Value>,
    },
}

/// Gateway-internal failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyError {
    /// The request could not be normalized.
    #[error("malformed request: {message}")]
    MalformedRequest {
        /// What was wrong with the request.
        message: String,
    },
    /// An internal invariant was violated or a collaborator failed.
    #[error("internal error: {message}")]
    Internal {
        /// Description for logs and the caller.
        message: String,
    },
    /// The gateway is shutting down.
    #[error("service unavailable: {message}")]
    Unavailable {
        /// Description for logs and the caller.
        message: String,
    },
}

impl ProxyError {
    /// Shorthand for [`ProxyError::MalformedRequest`].
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Shorthand for [`ProxyError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Shorthand for [`ProxyError::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Failures reported by collaborator adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// The key store could not be read or written.
    #[error("key store error: {0}")]
    KeyStore(String),
}

/// Result type for collaborator adapters.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<CoreError> for ProxyError {
    fn from(err: CoreError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Any failure a request can meet on its way through the pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GateError {
    /// Authentication failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The policy denied the operation.
    #[error("operation denied: {reason}")]
    PolicyDenied {
        /// Why the operation was denied.
        reason: String,
    },
    /// The operator did not approve.
    #[error(transparent)]
    Confirmation(#[from] ConfirmationRefusal),
    /// Credential or backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// Gateway-internal failure.
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Result type for pipeline stages.
pub type GateResult<T> = Result<T, GateError>;

impl GateError {
    /// Map this failure to the response the caller receives.
    #[must_use]
    pub fn rejection(&self) -> Rejection {
        match self {
            Self::Auth(err) => Rejection::new(err.status(), ErrorKind::AuthError, err.to_string()),
            Self::PolicyDenied { reason } => Rejection::new(
                403,
                ErrorKind::Forbidden,
                format!("Operation not permitted: {reason}"),
            ),
            Self::Confirmation(refusal) => {
                Rejection::new(403, ErrorKind::Forbidden, refusal.to_string())
            },
            Self::Backend(BackendError::Upstream {
                status,
                message,
                details,
            }) => Rejection {
                status: *status,
                kind: ErrorKind::BackendError,
                message: message.clone(),
                details: details.clone(),
            },
            Self::Backend(err) => Rejection::new(502, ErrorKind::BackendError, err.to_string()),
            Self::Proxy(err) => {
                let status = match err {
                    ProxyError::MalformedRequest { .. } => 422,
                    ProxyError::Internal { .. } => 500,
                    ProxyError::Unavailable { .. } => 503,
                };
                Rejection::new(status, ErrorKind::ProxyError, err.to_string())
            },
        }
    }
}

/// Error category reported in the rejection envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Authentication failure.
    AuthError,
    /// Policy denial or operator refusal.
    Forbidden,
    /// Malformed input or gateway-internal failure.
    ProxyError,
    /// Credential, transport, or upstream failure.
    BackendError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthError => write!(f, "auth_error"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::ProxyError => write!(f, "proxy_error"),
            Self::BackendError => write!(f, "backend_error"),
        }
    }
}

/// A terminal rejection: status code plus the JSON envelope body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// HTTP status code.
    #[serde(skip)]
    pub status: u16,
    /// Error category.
    #[serde(rename = "error")]
    pub kind: ErrorKind,
    /// Human-readable message. Never contains secrets or bodies.
    pub message: String,
    /// Structured details, present only for backend errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Rejection {
    /// Create a rejection without details.
    pub fn new(status: u16, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status, self.kind, self.message)
    }
}
