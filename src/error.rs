//! Error types for Remote Hands.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Durable queue errors. These never escape the registry's dispatch or
/// result-handling paths — persistence failures there are logged and
/// swallowed, the in-memory correlation state stays authoritative.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queued task {id} not found")]
    NotFound { id: String },

    #[error("Queued task {id} is {status}, cannot transition to {target}")]
    InvalidTransition {
        id: String,
        status: String,
        target: String,
    },

    #[error("Storage failed: {0}")]
    Storage(String),
}

/// Dispatch errors delivered through a pending task's future. These are
/// rejections, distinct in kind from the resolved failed result the
/// offline path returns.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Task {task_id} timed out after {timeout:?}")]
    Timeout { task_id: String, timeout: Duration },

    #[error("Worker disconnected")]
    WorkerDisconnected,
}

/// Transport errors from the socket seam.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
