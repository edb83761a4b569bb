//! Core codecs for MeetLive meeting sessions
//!
//! This crate holds the transport-agnostic pieces of the meeting client:
//!
//! - **codec**: H.264 NAL-unit framing, RBSP escaping and the private SEI
//!   extension that carries visual-effect parameters in-band
//! - **fx**: the effect parameter model and render-parameter derivation
//! - **vad**: per-source voice-activity segmentation driven by a fixed tick
//! - **audio**: resampling, WAV encoding and transport packaging of segments
//!
//! Nothing here performs I/O; everything runs synchronously inside the
//! caller's media callback or tick.
//!
//! # Example
//!
//! ```
//! use meetlive_core::codec::{build_sei_unit, extract_from_frame, inject_into_frame};
//! use meetlive_core::fx::{EffectParameters, FilterName};
//!
//! let params = EffectParameters {
//!     filter_enabled: true,
//!     filter_name: FilterName::Warm,
//!     ..Default::default()
//! };
//!
//! let frame = [0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00];
//! let injected = inject_into_frame(&frame, &build_sei_unit(&params)).unwrap();
//! let decoded = extract_from_frame(&injected).unwrap();
//! assert_eq!(decoded.filter_name, FilterName::Warm);
//! ```

#![warn(clippy::all)]

pub mod audio;
pub mod codec;
pub mod error;
pub mod fx;
pub mod vad;

pub use error::{Error, Result};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
