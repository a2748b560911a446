//! Error types for the replica-set control plane.

use std::time::Duration;

/// Result type alias for control-plane operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing instances and replica-set membership.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Container Runtime Errors
    // =========================================================================
    /// A container runtime call (create/start/inspect/list/remove) failed.
    #[error("container runtime {operation} failed for '{id}': {reason}")]
    Runtime {
        operation: &'static str,
        id: String,
        reason: String,
    },

    /// Container is unknown to the runtime.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Instance name rejected before reaching the runtime.
    #[error("invalid instance name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    // =========================================================================
    // Administrative Channel Errors
    // =========================================================================
    /// The data store's control channel failed or rejected a command.
    #[error("administrative {operation} against {target} failed: {reason}")]
    Administrative {
        operation: &'static str,
        target: String,
        reason: String,
    },

    // =========================================================================
    // Connection Errors
    // =========================================================================
    /// Dialing a freshly started instance never succeeded.
    #[error("could not connect to {address} after {attempts} attempts in {elapsed:?}")]
    Connection {
        address: String,
        attempts: u32,
        elapsed: Duration,
    },

    /// Instance has no network address (container not running).
    #[error("instance '{0}' has no network address")]
    NoAddress(String),

    /// Operation aborted by a cancellation signal.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    // =========================================================================
    // Cluster State Errors
    // =========================================================================
    /// A grow was requested before any primary was recorded.
    #[error("no replica set has been bootstrapped yet")]
    ClusterNotFormed,

    /// A bootstrap was requested while a primary is already recorded.
    #[error("replica set already formed with primary {0}")]
    ClusterAlreadyFormed(String),

    // =========================================================================
    // Timeout Errors
    // =========================================================================
    /// External command exceeded its time bound.
    #[error("operation timed out after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Builds a runtime error for `operation` on container `id`.
    pub(crate) fn runtime(operation: &'static str, id: &str, reason: impl ToString) -> Self {
        Self::Runtime {
            operation,
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Builds an administrative error for `operation` against `target`.
    pub(crate) fn admin(operation: &'static str, target: &str, reason: impl ToString) -> Self {
        Self::Administrative {
            operation,
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for failures of the data store's control channel.
    pub fn is_administrative(&self) -> bool {
        matches!(self, Self::Administrative { .. })
    }
}
