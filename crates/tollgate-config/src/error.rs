/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// File path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A config file is not valid TOML or has the wrong shape.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// File path, or `<embedded defaults>`.
        path: String,
        /// Underlying parse error.
        source: toml::de::Error,
    },

    /// A value is out of range or inconsistent with another.
    #[error("invalid configuration for {field}: {message}")]
    ValidationError {
        /// Dotted field path, e.g. `server.port`.
        field: String,
        /// What is wrong.
        message: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
