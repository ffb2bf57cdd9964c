//! Failure taxonomy for external API calls.
//!
//! Every retry decision in the connector goes through [`classify`]; no other
//! code inspects status codes or error messages.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// What the retry wrapper should do with a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Worth another attempt after the configured delay
    Transient,
    /// MISP already holds this attribute; skip without retrying
    Duplicate,
    /// Will not succeed on retry
    Terminal,
}

/// Classify a failed call.
pub fn classify(err: &ApiError) -> FailureClass {
    match err {
        ApiError::Timeout | ApiError::Connection(_) | ApiError::Transport(_) => {
            FailureClass::Transient
        }
        ApiError::Status { status, message } => classify_status(*status, message),
        ApiError::Decode(_) | ApiError::InvalidRequest(_) => FailureClass::Terminal,
    }
}

/// Classify an HTTP error response from its status code and body text.
///
/// The duplicate check runs first: MISP reports an existing attribute as a
/// 403 whose body says "A similar attribute already exists for this event".
pub fn classify_status(status: u16, message: &str) -> FailureClass {
    let msg = message.to_lowercase();

    if msg.contains("already exists") {
        return FailureClass::Duplicate;
    }
    if msg.contains("validation") || msg.contains("invalid") {
        return FailureClass::Terminal;
    }
    match status {
        500..=599 | 408 | 429 => FailureClass::Transient,
        _ => FailureClass::Terminal,
    }
}
