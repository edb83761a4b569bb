//! Error types for MeetLive core

use thiserror::Error;

/// Result type alias for MeetLive core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in MeetLive core
///
/// Bitstream parsing does not use this type: malformed frames are reported
/// with `None` so the media path can pass the frame through untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid input data (empty buffers, impossible sample rates)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Audio container encoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
