//! Bounded retry around a single external call.
//!
//! The wrapper never returns an `Err`: exhausted or terminal failures come
//! back as [`CallOutcome::Failed`] so callers decide what the failure means
//! for the run.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::classify::{classify, FailureClass};
use crate::error::ApiError;

/// Bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first; never less than one
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Final state of a wrapped call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    Success { value: T, attempts: u32 },
    /// The remote side reported the write as already present
    Duplicate { error: ApiError, attempts: u32 },
    Failed {
        error: ApiError,
        class: FailureClass,
        attempts: u32,
    },
}

impl<T> CallOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            CallOutcome::Success { attempts, .. }
            | CallOutcome::Duplicate { attempts, .. }
            | CallOutcome::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success { .. })
    }

    /// Collapse into a `Result`, returning the server's duplicate response
    /// as the error.
    ///
    /// For calls where "already exists" has no skip meaning (searches,
    /// event creation).
    pub fn into_result(self) -> Result<T, ApiError> {
        match self {
            CallOutcome::Success { value, .. } => Ok(value),
            CallOutcome::Duplicate { error, .. } | CallOutcome::Failed { error, .. } => Err(error),
        }
    }
}

/// Invoke `call` until it succeeds, hits a non-transient failure, or
/// `policy.max_attempts` is used up.
pub async fn retry_call<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> CallOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let err = match call().await {
            Ok(value) => {
                return CallOutcome::Success {
                    value,
                    attempts: attempt,
                }
            }
            Err(err) => err,
        };

        match classify(&err) {
            FailureClass::Duplicate => {
                return CallOutcome::Duplicate {
                    error: err,
                    attempts: attempt,
                }
            }
            FailureClass::Terminal => {
                error!("{} failed (not retryable): {}", operation, err);
                return CallOutcome::Failed {
                    error: err,
                    class: FailureClass::Terminal,
                    attempts: attempt,
                };
            }
            FailureClass::Transient if attempt < max_attempts => {
                warn!(
                    "{} error on attempt {}/{}: {}, retrying in {:?}",
                    operation, attempt, max_attempts, err, policy.delay
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
            FailureClass::Transient => {
                error!(
                    "{} failed after {} attempts: {}",
                    operation, max_attempts, err
                );
                return CallOutcome::Failed {
                    error: err,
                    class: FailureClass::Transient,
                    attempts: attempt,
                };
            }
        }
    }
}
