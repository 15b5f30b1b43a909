//! Index client error types.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Connection error during {operation}: {message}")]
    Connection {
        operation: String,
        message: String,
        retryable: bool,
    },
    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },
    #[error("HTTP {status} from {operation}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("Failed to parse {operation} response: {message}")]
    Parse { operation: String, message: String },
    #[error("Invalid index client setup: {0}")]
    Setup(String),
    #[error("Unknown scroll cursor: {0}")]
    UnknownCursor(String),
}

impl IndexError {
    pub fn connection(operation: &str, err: reqwest::Error) -> Self {
        let retryable = err.is_timeout() || err.is_connect() || err.is_request();
        Self::Connection {
            operation: operation.to_string(),
            message: err.to_string(),
            retryable,
        }
    }

    pub fn parse(operation: &str, message: impl ToString) -> Self {
        Self::Parse {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            Self::Status { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            Self::Parse { .. } | Self::Setup(_) | Self::UnknownCursor(_) => false,
        }
    }

    /// HTTP status code, if the index answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> IndexError {
        IndexError::Status {
            operation: "search".to_string(),
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_transient_statuses() {
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(400).is_transient());
        assert!(!status(404).is_transient());
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = IndexError::Timeout {
            operation: "update".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(err.is_transient());
        assert_eq!(err.status(), None);
    }
}
