//! Capture pipeline
//!
//! Turns a finished [`VoiceSegment`](crate::vad::VoiceSegment) into the
//! payload the analysis backend accepts: mono 16 kHz, 16-bit PCM WAV,
//! base64 encoded.

mod resample;
mod wav;

pub use resample::resample;
pub use wav::{encode_canonical_audio, f32_to_pcm16, WAV_HEADER_LEN};

use crate::vad::VoiceSegment;
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Rate the analysis backend expects
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Base64-encode a byte buffer for transport in a JSON body.
pub fn package_for_transport(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Root-mean-square level of a block of samples (0.0 for an empty block)
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Audio ready to submit for analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagedAudio {
    /// Base64 of the canonical WAV file
    pub audio_base64: String,
    pub sample_rate: u32,
    /// Number of PCM samples after resampling
    pub sample_count: usize,
}

impl PackagedAudio {
    /// Playback duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.sample_count as u64 * 1000 / self.sample_rate as u64
    }
}

/// Resample → WAV → base64
#[derive(Debug, Clone, Copy)]
pub struct CapturePipeline {
    target_rate: u32,
}

impl Default for CapturePipeline {
    fn default() -> Self {
        Self {
            target_rate: TARGET_SAMPLE_RATE,
        }
    }
}

impl CapturePipeline {
    pub fn new(target_rate: u32) -> Result<Self> {
        if target_rate == 0 {
            return Err(Error::ConfigError(
                "target sample rate must be greater than zero".to_string(),
            ));
        }
        Ok(Self { target_rate })
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Package raw samples captured at `input_rate`.
    pub fn package(&self, samples: &[f32], input_rate: u32) -> Result<PackagedAudio> {
        if samples.is_empty() {
            return Err(Error::InvalidData("no samples to package".to_string()));
        }
        let resampled = resample(samples, input_rate, self.target_rate);
        let wav = encode_canonical_audio(&resampled, self.target_rate);
        Ok(PackagedAudio {
            audio_base64: package_for_transport(&wav),
            sample_rate: self.target_rate,
            sample_count: resampled.len(),
        })
    }

    pub fn package_segment(&self, segment: &VoiceSegment) -> Result<PackagedAudio> {
        self.package(&segment.samples, segment.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_package_for_transport() {
        assert_eq!(package_for_transport(b"RIFF"), "UklGRg==");
    }

    #[test]
    fn test_pipeline_rejects_zero_rate() {
        assert!(CapturePipeline::new(0).is_err());
    }

    #[test]
    fn test_package_resamples_to_target() {
        let pipeline = CapturePipeline::default();
        let packaged = pipeline.package(&vec![0.1; 48_000], 48_000).unwrap();
        assert_eq!(packaged.sample_rate, 16_000);
        assert!((packaged.sample_count as i64 - 16_000).abs() <= 1);
        assert_eq!(packaged.duration_ms(), 1000);

        let wav = STANDARD.decode(&packaged.audio_base64).unwrap();
        assert_eq!(wav.len(), WAV_HEADER_LEN + packaged.sample_count * 2);
        assert_eq!(&wav[0..4], b"RIFF");
    }

    #[test]
    fn test_package_empty_is_error() {
        let pipeline = CapturePipeline::default();
        assert!(matches!(
            pipeline.package(&[], 48_000),
            Err(Error::InvalidData(_))
        ));
    }
}
