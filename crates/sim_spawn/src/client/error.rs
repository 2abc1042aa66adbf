use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("could not resolve {endpoint}: {reason}")]
    Resolve { endpoint: String, reason: String },
    #[error("could not connect to {endpoint}: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("connection closed by server")]
    Closed,
    #[error("connection i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("malformed server message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("server error {code}: {message}")]
    Server { code: String, message: String },
}

impl ConnectionError {
    pub(crate) fn unexpected(operation: &str, kind: &str) -> Self {
        ConnectionError::Protocol(format!("unexpected `{kind}` response to {operation}"))
    }
}
