//! Error types for vidgen-batch
//!
//! Item failures are never surfaced through this type: a failed prompt is
//! recorded on its [`WorkItem`](crate::types::WorkItem) as data. `Error` covers
//! rejected calls (bad configuration, invalid state transitions, unknown ids)
//! and the failures that processors and artifact helpers report before they are
//! folded into an item's `error` field.

use crate::types::{BatchState, ItemId, ItemStatus};
use thiserror::Error;

/// Result type alias for vidgen-batch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vidgen-batch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrency")
        key: Option<String>,
    },

    /// Work item not found in the store
    #[error("work item {0} not found")]
    NotFound(ItemId),

    /// Requested status change is not an edge of the item state machine
    #[error("work item {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        /// The item whose transition was rejected
        id: ItemId,
        /// Current status
        from: ItemStatus,
        /// Requested status
        to: ItemStatus,
    },

    /// Operation not allowed in the current batch or item state
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// The operation that was attempted (e.g., "clear", "resume")
        operation: String,
        /// Description of the state that prevents it
        state: String,
    },

    /// The item already has a registered worker
    #[error("work item {0} is already in flight")]
    AlreadyInFlight(ItemId),

    /// The store is full
    #[error("item cap of {cap} reached")]
    CapacityExceeded {
        /// Configured maximum number of items
        cap: usize,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Provider answered with a non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Http {
        /// Response status code
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// Provider answered successfully but no artifact could be recognized
    #[error("ambiguous response: {0}")]
    AmbiguousResponse(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// ZIP packaging error
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// External tool execution failed (ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, unsupported artifact scheme)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Runner is shutting down and no longer accepts commands
    #[error("shutdown in progress")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Shorthand for an operation rejected by the current batch state
    pub(crate) fn invalid_state(operation: &str, state: BatchState) -> Self {
        Error::InvalidState {
            operation: operation.to_string(),
            state: format!("batch is {state}"),
        }
    }
}
