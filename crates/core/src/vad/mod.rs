//! Voice-activity segmentation
//!
//! Audio sources (the local microphone and every remote track) feed
//! [`SourceMeters`], which keep a rolling analysis window per source. A fixed
//! tick samples a smoothed RMS level from each meter and hands the levels to
//! the [`Segmenter`] state machine:
//!
//! ```text
//! Idle ──(level ≥ threshold for N ticks)──▶ Recording
//! Recording ──(silence ≥ silence_ms | duration ≥ max_segment_ms | speaker switch)──▶ Idle + VoiceSegment
//! ```
//!
//! A max-duration cutoff re-arms recording on the same source immediately.

mod segmenter;

pub use segmenter::{FlushReason, Segmenter, TickReport, VoiceSegment};

use crate::audio::rms;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Segmenter tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Tick period in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// RMS level at or above which a source counts as voiced
    #[serde(default = "default_rms_threshold")]
    pub rms_threshold: f32,

    /// Silence after the last voiced tick that closes a segment
    #[serde(default = "default_silence_ms")]
    pub silence_ms: u64,

    /// Segments shorter than this are dropped
    #[serde(default = "default_min_segment_ms")]
    pub min_segment_ms: u64,

    /// Segments are cut at this length
    #[serde(default = "default_max_segment_ms")]
    pub max_segment_ms: u64,

    /// Consecutive voiced ticks needed to start recording
    #[serde(default = "default_voice_streak_ticks")]
    pub voice_streak_ticks: u32,

    /// Exponential smoothing of per-tick levels (0 disables)
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,

    /// Samples kept per source for level analysis
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

fn default_tick_ms() -> u64 {
    180
}

fn default_rms_threshold() -> f32 {
    0.012
}

fn default_silence_ms() -> u64 {
    700
}

fn default_min_segment_ms() -> u64 {
    450
}

fn default_max_segment_ms() -> u64 {
    8000
}

fn default_voice_streak_ticks() -> u32 {
    2
}

fn default_smoothing() -> f32 {
    0.6
}

fn default_window_size() -> usize {
    2048
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            rms_threshold: default_rms_threshold(),
            silence_ms: default_silence_ms(),
            min_segment_ms: default_min_segment_ms(),
            max_segment_ms: default_max_segment_ms(),
            voice_streak_ticks: default_voice_streak_ticks(),
            smoothing: default_smoothing(),
            window_size: default_window_size(),
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            return Err(Error::ConfigError("tick_ms must be greater than zero".into()));
        }
        if !self.rms_threshold.is_finite() || self.rms_threshold <= 0.0 {
            return Err(Error::ConfigError(format!(
                "rms_threshold must be a positive number, got {}",
                self.rms_threshold
            )));
        }
        if self.voice_streak_ticks == 0 {
            return Err(Error::ConfigError(
                "voice_streak_ticks must be at least 1".into(),
            ));
        }
        if self.max_segment_ms <= self.min_segment_ms {
            return Err(Error::ConfigError(format!(
                "max_segment_ms ({}) must exceed min_segment_ms ({})",
                self.max_segment_ms, self.min_segment_ms
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(Error::ConfigError(format!(
                "smoothing must be in [0, 1), got {}",
                self.smoothing
            )));
        }
        if self.window_size == 0 {
            return Err(Error::ConfigError("window_size must be greater than zero".into()));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Meter {
    window: VecDeque<f32>,
    sample_rate: u32,
    level: f32,
    /// Samples arrived since the last `levels` call
    fresh: bool,
}

/// Rolling level meters, one per audio source
#[derive(Debug)]
pub struct SourceMeters {
    meters: HashMap<String, Meter>,
    window_size: usize,
    smoothing: f32,
}

impl SourceMeters {
    pub fn new(window_size: usize, smoothing: f32) -> Self {
        Self {
            meters: HashMap::new(),
            window_size: window_size.max(1),
            smoothing: smoothing.clamp(0.0, 0.99),
        }
    }

    /// Start tracking a source. Re-registering resets its window.
    pub fn register(&mut self, key: impl Into<String>, sample_rate: u32) {
        let key = key.into();
        tracing::debug!(source = %key, sample_rate, "tracking audio source");
        self.meters.insert(
            key,
            Meter {
                window: VecDeque::with_capacity(self.window_size),
                sample_rate,
                level: 0.0,
                fresh: false,
            },
        );
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.meters.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.meters.contains_key(key)
    }

    pub fn sample_rate(&self, key: &str) -> Option<u32> {
        self.meters.get(key).map(|m| m.sample_rate)
    }

    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    /// Push samples into a source's window. Returns `false` for unknown keys.
    pub fn ingest(&mut self, key: &str, samples: &[f32]) -> bool {
        let Some(meter) = self.meters.get_mut(key) else {
            return false;
        };
        let keep = samples.len().min(self.window_size);
        let overflow = (meter.window.len() + keep).saturating_sub(self.window_size);
        meter.window.drain(..overflow);
        meter.window.extend(&samples[samples.len() - keep..]);
        meter.fresh = !samples.is_empty();
        true
    }

    /// Update and return the smoothed level of every source.
    ///
    /// A source that delivered nothing since the previous call reads as
    /// silent for this call, so its level decays toward zero.
    pub fn levels(&mut self) -> Vec<(String, f32)> {
        let smoothing = self.smoothing;
        self.meters
            .iter_mut()
            .map(|(key, meter)| {
                let (head, tail) = meter.window.as_slices();
                let n = head.len() + tail.len();
                let instant = if n == 0 || !meter.fresh {
                    0.0
                } else {
                    let ss = rms(head).powi(2) * head.len() as f32
                        + rms(tail).powi(2) * tail.len() as f32;
                    (ss / n as f32).sqrt()
                };
                meter.level = smoothing * meter.level + (1.0 - smoothing) * instant;
                meter.fresh = false;
                (key.clone(), meter.level)
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.meters.clear();
    }
}
