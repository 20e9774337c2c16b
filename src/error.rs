//! Error types for cmdb-reconcile
//!
//! Fatal errors abort a run before or during the download and classify stages.
//! Per-task deletion failures never surface here: they are folded into a
//! [`DeletionResult`](crate::types::DeletionResult) by the orchestrator.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for cmdb-reconcile operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cmdb-reconcile
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "inventory.username")
        key: Option<String>,
    },

    /// Authentication against the inventory platform failed
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Snapshot transfer failed beyond the retry or time budget
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Snapshot could not be decoded or recovered
    #[error("malformed snapshot: {0}")]
    MalformedData(String),

    /// A tagged record failed validation at construction
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Process exit code reported by the command-line entry point
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Auth(_) => 1,
            Error::Transport(_) | Error::Network(_) => 2,
            Error::MalformedData(_) | Error::InvalidRecord(_) | Error::Serialization(_) => 3,
            Error::Config { .. } => 4,
            Error::Io(_) => 5,
        }
    }
}

/// Transfer-level failures while downloading the snapshot
#[derive(Debug, Error)]
pub enum TransportError {
    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Could not establish a connection
    #[error("connection failed: {0}")]
    Connect(String),

    /// Request or read timed out
    #[error("timed out: {0}")]
    Timeout(String),

    /// Stream ended before the server finished sending the body
    #[error("transfer interrupted after {received} bytes: {reason}")]
    Interrupted {
        /// Bytes accumulated before the interruption
        received: u64,
        /// Underlying cause
        reason: String,
    },

    /// The total wall-clock budget ran out
    #[error("time budget of {budget:?} exhausted after {attempts} attempt(s)")]
    BudgetExhausted {
        /// Configured budget
        budget: Duration,
        /// Attempts started before the budget ran out
        attempts: u32,
    },

    /// Every attempt failed with a temporary error and nothing was salvaged
    #[error("all {attempts} attempt(s) failed, last error: {last_error}")]
    AttemptsExhausted {
        /// Attempts made
        attempts: u32,
        /// Display form of the final error
        last_error: String,
    },
}

impl TransportError {
    /// Classify a reqwest error raised while sending or reading
    pub fn from_reqwest(e: &reqwest::Error, received: u64) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Status {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            TransportError::Interrupted {
                received,
                reason: e.to_string(),
            }
        }
    }
}

/// Failure of a single delete attempt against one target
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeleteError {
    /// 4xx response; never retried
    #[error("HTTP {status} (client error): {detail}")]
    Client {
        /// Response status code
        status: u16,
        /// Truncated response body
        detail: String,
    },

    /// 5xx response
    #[error("HTTP {status} (server error)")]
    Server {
        /// Response status code
        status: u16,
    },

    /// Request timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Connection could not be established or was dropped
    #[error("connection error: {0}")]
    Connection(String),

    /// Status outside the success set that is neither 4xx nor 5xx
    #[error("unexpected HTTP {status}")]
    Unexpected {
        /// Response status code
        status: u16,
    },

    /// Task cannot be sent to this target
    #[error("invalid task: {0}")]
    InvalidTask(String),
}

impl DeleteError {
    /// Classify a reqwest send error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            DeleteError::Timeout(e.to_string())
        } else {
            DeleteError::Connection(e.to_string())
        }
    }

    /// HTTP status carried by the error, if a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            DeleteError::Client { status, .. }
            | DeleteError::Server { status }
            | DeleteError::Unexpected { status } => Some(*status),
            DeleteError::Timeout(_) | DeleteError::Connection(_) | DeleteError::InvalidTask(_) => {
                None
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_cli_contract() {
        assert_eq!(Error::Auth("no token".into()).exit_code(), 1);
        assert_eq!(
            Error::Transport(TransportError::Connect("refused".into())).exit_code(),
            2
        );
        assert_eq!(Error::MalformedData("eof".into()).exit_code(), 3);
        assert_eq!(Error::config("bad mode", "mode").exit_code(), 4);
        assert_eq!(
            Error::Io(std::io::Error::other("disk")).exit_code(),
            5,
            "report-writing I/O failures are execution errors"
        );
    }

    #[test]
    fn config_helper_records_key() {
        match Error::config("missing", "inventory.username") {
            Error::Config { message, key } => {
                assert_eq!(message, "missing");
                assert_eq!(key.as_deref(), Some("inventory.username"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn transport_error_messages_are_descriptive() {
        let err = TransportError::BudgetExhausted {
            budget: Duration::from_secs(30),
            attempts: 2,
        };
        assert_eq!(
            err.to_string(),
            "time budget of 30s exhausted after 2 attempt(s)"
        );

        let err = TransportError::Interrupted {
            received: 1024,
            reason: "connection reset".into(),
        };
        assert!(err.to_string().contains("1024 bytes"));
    }

    #[test]
    fn delete_error_display_includes_status() {
        let err = DeleteError::Client {
            status: 404,
            detail: "not found".into(),
        };
        assert_eq!(err.to_string(), "HTTP 404 (client error): not found");
        assert_eq!(
            DeleteError::Server { status: 503 }.to_string(),
            "HTTP 503 (server error)"
        );
        assert_eq!(DeleteError::Server { status: 503 }.status(), Some(503));
        assert_eq!(DeleteError::Timeout("30s".into()).status(), None);
    }
}
