/// Errors raised while building a policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// A path template could not be parsed.
    #[error("invalid template {template}: {message}")]
    InvalidTemplate {
        /// Template as written.
        template: String,
        /// What is wrong with it.
        message: String,
    },

    /// Two rules could match the same request.
    #[error("ambiguous rules: {first} overlaps {second}")]
    AmbiguousRules {
        /// The earlier rule.
        first: String,
        /// The later rule.
        second: String,
    },

    /// The rule table is empty.
    #[error("policy has no rules")]
    Empty,
}

/// Result type for policy construction.
pub type PolicyResult<T> = Result<T, PolicyError>;
