//! Error types for the throttling service.

use thiserror::Error;

/// Main error type for throttling operations.
///
/// The limiter itself never fails; these cover rule registration,
/// configuration loading and the server surface around it.
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rule was rejected at registration time
    #[error("Invalid rate limit rule '{scope}': {reason}")]
    InvalidRule { scope: String, reason: String },

    /// Lookup of a rule name that is not registered
    #[error("Unknown rate limit rule: {0}")]
    UnknownRule(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for ThrottleError {
    fn from(err: ::config::ConfigError) -> Self {
        ThrottleError::Config(err.to_string())
    }
}

/// Result type alias for throttling operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;
