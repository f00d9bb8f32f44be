//! Error types for MiniCube
//!
//! Provides a unified error type hierarchy for the entire system.

use thiserror::Error;

/// Result type alias using MiniCube's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for MiniCube
#[derive(Error, Debug)]
pub enum Error {
    // Malformed shard key, unknown indicator, blank required field
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Builder protocol violations
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Assignment requested against a non-owning node
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // Reference to a column the schema does not have
    #[error("Not found: {0}")]
    NotFound(String),

    // Cluster Errors
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    // Row source Errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO Errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal Errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when a cluster-wide call failed because at least one node failed
    #[must_use]
    pub fn is_partial_failure(&self) -> bool {
        matches!(self, Error::Cluster(ClusterError::PartialFailure { .. }))
    }

    /// True when a cluster-wide call gave up waiting for responses
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Cluster(ClusterError::Timeout { .. }))
    }
}

/// Cluster-related errors
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Partial cluster failure: {failed} of {total} nodes failed: {errors:?}")]
    PartialFailure {
        failed: usize,
        total: usize,
        errors: Vec<String>,
    },

    #[error("Timed out after {waited_ms}ms with {received} of {total} responses")]
    Timeout {
        waited_ms: u64,
        received: usize,
        total: usize,
    },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("No cubes for shard keys: {0}")]
    NoCubes(String),
}

/// Row source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Row source unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed row at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
