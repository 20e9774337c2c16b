//! Retry logic with a fixed inter-attempt delay
//!
//! Both deletion targets share one [`RetryPolicy`]: a bounded number of attempts
//! separated by a constant delay. Errors decide for themselves whether another
//! attempt is worthwhile through [`IsRetryable`].
//!
//! # Example
//!
//! ```no_run
//! use cmdb_reconcile::retry::{IsRetryable, retry_with_policy};
//! use cmdb_reconcile::config::RetryPolicy;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() {
//! let policy = RetryPolicy::default();
//! let outcome = retry_with_policy(&policy, || async {
//!     Ok::<_, MyError>(())
//! })
//! .await;
//! assert_eq!(outcome.attempts, 1);
//! # }
//! ```

use crate::config::RetryPolicy;
use crate::error::{DeleteError, Error, TransportError};
use std::future::Future;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (5xx, timeouts, connection resets) should return `true`.
/// Permanent failures (4xx, bad configuration, corrupt data) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            // 408 and 429 are the only 4xx worth another try
            TransportError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            TransportError::Connect(_)
            | TransportError::Timeout(_)
            | TransportError::Interrupted { .. } => true,
            TransportError::BudgetExhausted { .. } | TransportError::AttemptsExhausted { .. } => {
                false
            }
        }
    }
}

impl IsRetryable for DeleteError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeleteError::Server { .. } | DeleteError::Timeout(_) | DeleteError::Connection(_)
        )
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_retryable(),
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::BrokenPipe
            ),
            Error::Config { .. }
            | Error::Auth(_)
            | Error::MalformedData(_)
            | Error::InvalidRecord(_)
            | Error::Serialization(_) => false,
        }
    }
}

/// Result of a retried operation together with the number of attempts it took
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final result: the first success, the first permanent error, or the last transient error
    pub result: Result<T, E>,
    /// Attempts made, including the first one
    pub attempts: u32,
}

/// Execute an async operation, retrying transient failures with a fixed delay
///
/// `policy.max_attempts` counts every attempt, including the first; a value of
/// zero is treated as one. The delay is slept only between attempts, never after
/// the last one.
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "operation succeeded after retry");
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = policy.delay.as_millis(),
                    "operation failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::debug!(
                        error = %e,
                        attempts = attempt,
                        "operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "operation failed with non-retryable error");
                }
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}
