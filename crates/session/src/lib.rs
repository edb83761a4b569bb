//! MeetLive meeting session controller
//!
//! Client-side core of a MeetLive meeting:
//!
//! - **media**: encoded-frame interceptors that embed the local visual-effect
//!   parameters into outgoing H.264 frames and recover them from incoming ones
//! - **signaling**: the JSON envelope protocol, outbound sinks and an
//!   in-process relay implementing leader arbitration
//! - **session**: the [`MeetingSession`] context object, AI-Live leader
//!   coordination, the serial analysis job queue and the transcript
//! - **analysis**: the analysis backend trait and its HTTP client
//!
//! Exactly one participant per meeting (the AI-Live leader) captures audio,
//! segments it on voice activity and calls the analysis backend; every other
//! participant only receives the broadcast results.

#![warn(clippy::all)]

pub mod analysis;
pub mod config;
pub mod error;
pub mod media;
pub mod session;
pub mod signaling;

pub use config::{AiLiveConfig, FxConfig, SessionConfig};
pub use error::{Error, Result};
pub use session::{AudioCaptureBackend, LiveStatus, MeetingSession};

/// Install the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Call once at
/// startup; a second call fails.
pub fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| Error::InvalidConfig(format!("logging already initialized: {}", e)))?;

    tracing::info!(version = version(), "MeetLive session initialized");
    Ok(())
}

/// Like [`init_logging`], with one JSON object per event.
pub fn init_json_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| Error::InvalidConfig(format!("logging already initialized: {}", e)))?;

    tracing::info!(version = version(), "MeetLive session initialized");
    Ok(())
}

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
