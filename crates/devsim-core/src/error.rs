use std::fmt;

use chrono::{DateTime, Utc};

/// Errors returned by a collaborator (the simulator API or a stand-in).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Entity does not exist on the server.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Could not reach the server.
    #[error("Connection to '{endpoint}' failed")]
    ConnectionFailed {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Request did not complete in time.
    #[error("Operation '{operation}' timed out for {target}")]
    Timeout { operation: String, target: String },

    /// Server answered with a non-success status.
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Other collaborator-specific error.
    #[error("API error: {0}")]
    Other(String),
}

impl ApiError {
    /// Returns true if this error is transient and the call may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::ConnectionFailed { .. } => true,
            ApiError::Timeout { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Errors from loading a historical range into a playback session.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PlaybackError {
    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Failed to load telemetry for '{entity_id}'")]
    Load {
        entity_id: String,
        #[source]
        source: ApiError,
    },

    /// A newer load replaced this one before its response arrived.
    #[error("Load of '{entity_id}' was superseded by a newer load")]
    Superseded { entity_id: String },
}

/// How the visible state was repaired after a rejected mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Canonical state was refetched and is now visible.
    Refetched,
    /// The refetch failed too; the state the mutation replaced was restored.
    RolledBack,
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recovery::Refetched => f.write_str("reloaded from server"),
            Recovery::RolledBack => f.write_str("restored previous state"),
        }
    }
}

/// Errors from an optimistic mutation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MutationError {
    #[error("Update of '{entity_id}' was rejected ({recovery})")]
    Rejected {
        entity_id: String,
        #[source]
        source: ApiError,
        recovery: Recovery,
    },

    #[error("Unknown device: {0}")]
    UnknownEntity(String),
}

/// Outcome of one task in a fan-out that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum TaskError<E> {
    #[error("{0}")]
    Failed(E),

    #[error("task panicked: {0}")]
    Panicked(String),
}
