use std::path::PathBuf;
use tollgate_core::CoreError;

/// Errors from the key file and key administration.
#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    /// The key file or its lock could not be read or written.
    #[error("key file I/O error at {path}: {message}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        message: String,
    },

    /// The key file exists but is not valid.
    #[error("key file {path} is corrupt: {message}")]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Parse error.
        message: String,
    },

    /// A key name breaks the naming rules.
    #[error("invalid key name: {0}")]
    InvalidName(String),

    /// A key with this name already exists.
    #[error("API key with name '{0}' already exists")]
    DuplicateName(String),
}

/// Result type for key store operations.
pub type KeyStoreResult<T> = Result<T, KeyStoreError>;

impl From<KeyStoreError> for CoreError {
    fn from(err: KeyStoreError) -> Self {
        Self::KeyStore(err.to_string())
    }
}
