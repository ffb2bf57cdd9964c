//! Error types for webamon-misp-core

use thiserror::Error;

/// Failure of a single call against the Webamon or MISP API.
///
/// Cloneable so test fakes can script the same failure more than once.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request did not complete within the per-attempt timeout
    #[error("request timed out")]
    Timeout,

    /// The remote host could not be reached
    #[error("connection failed: {0}")]
    Connection(String),

    /// Any other transport-level failure (reset, broken body stream)
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The server answered 2xx but the body was not what we expected
    #[error("malformed response: {0}")]
    Decode(String),

    /// The request could not be built (bad URL, bad header value)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_connect() {
            ApiError::Connection(err.to_string())
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Errors raised while building [`crate::Settings`] from the environment.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more required variables are unset or empty
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingVars(Vec<String>),

    /// A variable is set but cannot be parsed
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },
}

/// Errors raised while loading the query list file.
#[derive(Error, Debug)]
pub enum QueryFileError {
    #[error("queries file not found: {0}")]
    NotFound(String),

    #[error("failed to read queries file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse queries file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("query #{index} is invalid: {reason}")]
    Invalid { index: usize, reason: String },
}
