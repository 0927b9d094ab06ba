use tollgate_core::ProxyError;

/// Failures of the confirmation machinery itself, as opposed to an operator
/// saying no.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmationError {
    /// The gateway is shutting down; in-flight and queued confirmations fail.
    #[error("confirmation aborted: gateway is shutting down")]
    ShuttingDown,

    /// The decision channel could not present the prompt or read an answer.
    #[error("confirmation channel failed: {0}")]
    Channel(#[from] ChannelError),
}

/// Result type for confirmation operations.
pub type ConfirmationResult<T> = Result<T, ConfirmationError>;

impl From<ConfirmationError> for ProxyError {
    fn from(err: ConfirmationError) -> Self {
        match err {
            ConfirmationError::ShuttingDown => Self::unavailable(err.to_string()),
            ConfirmationError::Channel(_) => Self::internal(err.to_string()),
        }
    }
}

/// Failures of a decision channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The operator input stream ended.
    #[error("operator input closed")]
    Closed,

    /// Writing the prompt failed.
    #[error("failed to present prompt: {0}")]
    Io(String),
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
