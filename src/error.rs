//! Error types for siumai-transport
//!
//! `TransportError` is the internal error type used with `?` inside the
//! dispatchers. It never crosses the public dispatcher boundary: every
//! variant is folded into an [`OperationError`](crate::result::OperationError)
//! before being handed back to the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status reported for failures that did not originate from an HTTP response.
pub const BAD_REQUEST_STATUS: u16 = 400;

/// Coarse classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The server answered with a non-success status.
    Protocol,
    /// Network, serialization or deserialization failure.
    Transport,
    /// Caller misuse (empty URI, invalid header, ...).
    Argument,
    /// The cancellation token fired before the call finished.
    Cancelled,
}

/// Errors that can occur while building, sending or decoding a request
#[derive(Error, Debug)]
pub enum TransportError {
    /// Non-success HTTP status; body is preserved verbatim
    #[error("HTTP {status}: {body}")]
    Protocol { status: u16, body: String },

    /// Network-level failure reported by the HTTP client
    #[error("HTTP error: {0}")]
    Http(String),

    /// Payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Response body could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O failure while copying a body into or out of a stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid argument supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration (header values, API keys, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl TransportError {
    /// Classify this error for the result surface.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Http(_) | Self::Serialization(_) | Self::Parse(_) | Self::Io(_) => {
                ErrorKind::Transport
            }
            Self::InvalidArgument(_) | Self::Configuration(_) => ErrorKind::Argument,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Status code carried into the result: the server's status for protocol
    /// errors, a bad-request equivalent for everything else.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Protocol { status, .. } => *status,
            _ => BAD_REQUEST_STATUS,
        }
    }

    /// Message carried into the result. Protocol errors keep the raw body.
    pub fn message(&self) -> String {
        match self {
            Self::Protocol { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Self::Io(e.into())
        } else if e.is_data() || e.is_syntax() || e.is_eof() {
            Self::Parse(e.to_string())
        } else {
            Self::Serialization(e.to_string())
        }
    }
}

/// Result type for transport internals
pub type Result<T> = std::result::Result<T, TransportError>;
