//! Error types shared by the clients.
//!
//! Network and server failures never surface as `Err`: they are retried and
//! then reported as a `false` return plus a [`LastError`]. The enums here
//! cover programmer mistakes and construction problems.

use std::fmt;

use thiserror::Error;

use crate::dispatch::Delivery;

/// Failure reported by a [`Transport`](crate::transport::Transport) when no
/// HTTP response was obtained (connection refused, DNS, timeout, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

/// Batch modes, used to describe [`UsageError::WrongBatchMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Idle,
    Logs,
    SingleMetric,
    MultiMetric,
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BatchKind::Idle => "idle",
            BatchKind::Logs => "log batch",
            BatchKind::SingleMetric => "single-metric batch",
            BatchKind::MultiMetric => "multi-metric batch",
        })
    }
}

/// Programmer errors. These fail immediately and never touch the network.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UsageError {
    /// A batch was started while another batch is active.
    #[error("a {0} is already active; call end_batch() first")]
    AlreadyBatching(BatchKind),
    /// An add operation was called with no batch active.
    #[error("no batch is active")]
    NotBatching,
    /// An add operation does not match the active batch mode.
    #[error("operation requires a {expected} but a {active} is active")]
    WrongBatchMode {
        expected: BatchKind,
        active: BatchKind,
    },
    /// An argument was rejected before any request was built.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The payload could not be encoded as JSON.
    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for UsageError {
    fn from(err: serde_json::Error) -> Self {
        UsageError::Serialization(err.to_string())
    }
}

/// Errors raised while building a [`ClientConfig`](crate::config::ClientConfig)
/// or a client from it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("api_key must be provided")]
    MissingApiKey,
    #[error("hostname must be provided for the logger")]
    MissingHostname,
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Status of the most recent send attempt of a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastError {
    /// Failure message; `None` after a successful send.
    pub message: Option<String>,
    /// HTTP status of the last response; `None` when no response arrived.
    pub http_code: Option<u16>,
}

impl LastError {
    /// Overwrite both fields from `delivery`.
    ///
    /// A successful delivery clears the message but keeps its status code.
    pub fn record(&mut self, delivery: &Delivery) {
        self.message = if delivery.ok {
            None
        } else {
            delivery.error.clone()
        };
        self.http_code = delivery.http_code;
    }
}

impl fmt::Display for LastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, self.http_code) {
            (Some(msg), Some(code)) => write!(f, "{msg} (HTTP {code})"),
            (Some(msg), None) => f.write_str(msg),
            (None, Some(code)) => write!(f, "HTTP {code}"),
            (None, None) => f.write_str("no error"),
        }
    }
}

/// Errors produced by entity resolution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntityError {
    /// The service already holds an entity with this name.
    #[error("entity {0:?} already exists")]
    Duplicate(String),
    /// Delivery failed after all retries.
    #[error("entity request failed: {0}")]
    Delivery(LastError),
    /// The service answered with a body that is not an entity.
    #[error("unexpected entity response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Usage(#[from] UsageError),
}
