//! Error types for termhub.

use thiserror::Error;

use crate::SessionId;

/// Main error type for termhub operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// PTY-related errors
    #[error("PTY error: {0}")]
    PtyError(String),

    /// Operation attempted on a disposed component
    #[error("{0} has been disposed")]
    Disposed(&'static str),

    /// Invalid terminal dimensions
    #[error("Invalid dimensions: {rows}x{cols}")]
    InvalidDimensions {
        /// Number of rows
        rows: u16,
        /// Number of columns
        cols: u16,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
