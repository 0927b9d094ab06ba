//! Per-request context for log correlation.

use std::time::{Duration, Instant};
use uuid::Uuid;

/// Identifies one caller request across the log lines it produces.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: Uuid,
    /// HTTP method as received.
    pub method: String,
    /// Request path as received.
    pub path: String,
    started: Instant,
}

impl RequestContext {
    /// Start timing a request.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method: method.into(),
            path: path.into(),
            started: Instant::now(),
        }
    }

    /// Time since the request arrived.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time in whole milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// First eight characters of the request id.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.request_id.simple().to_string().chars().take(8).collect()
    }

    /// A span carrying the request's identity. The `caller` field is
    /// recorded once the caller has been authenticated.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.short_id(),
            method = %self.method,
            path = %self.path,
            caller = tracing::field::Empty,
        )
    }
}
