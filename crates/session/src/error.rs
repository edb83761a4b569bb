//! Error types for the meeting session

/// Result type alias using the session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in meeting session operations
///
/// None of these terminate the media session: interceptor failures pass
/// frames through, analysis failures become result tags.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation needs a joined session with ready signaling
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Signaling channel error
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// Malformed or unexpected signaling payload
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Analysis backend call failed
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Operation timeout
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Error from the core codecs
    #[error(transparent)]
    Core(#[from] meetlive_core::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else {
            Error::Analysis(err.to_string())
        }
    }
}
