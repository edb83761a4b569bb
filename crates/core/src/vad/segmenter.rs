//! Tick-driven segmentation state machine

use super::{SegmenterConfig, SourceMeters};
use crate::audio::TARGET_SAMPLE_RATE;
use serde::{Deserialize, Serialize};

/// Why a recording was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushReason {
    /// A different source became the loudest voiced source
    Switch,
    /// The source stayed below threshold for `silence_ms`
    Silence,
    /// The recording reached `max_segment_ms`
    Max,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Switch => "switch",
            FlushReason::Silence => "silence",
            FlushReason::Max => "max",
        }
    }
}

/// A closed recording from one source
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSegment {
    pub speaker_key: String,
    /// Tick at which recording started
    pub started_at_ms: u64,
    /// Last tick on which the source was voiced
    pub last_voice_at_ms: u64,
    /// Tick at which the segment was closed
    pub ended_at_ms: u64,
    pub reason: FlushReason,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl VoiceSegment {
    /// Recording duration from start to close
    pub fn duration_ms(&self) -> u64 {
        self.ended_at_ms.saturating_sub(self.started_at_ms)
    }
}

/// Outcome of one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Loudest voiced source this tick, if any
    pub speaker: Option<String>,
    pub level: f32,
    /// Whether `speaker` differs from the previous tick's
    pub speaker_changed: bool,
    /// Segments closed on this tick, in order
    pub segments: Vec<VoiceSegment>,
}

#[derive(Debug, Default)]
struct Recording {
    key: String,
    started_at_ms: u64,
    last_voice_at_ms: u64,
    samples: Vec<f32>,
    sample_rate: u32,
}

/// Voice-activity segmenter over all tracked sources
///
/// Only one source is recorded at a time: the loudest one at or above the
/// threshold. Samples pushed for any other source only feed its meter.
#[derive(Debug)]
pub struct Segmenter {
    config: SegmenterConfig,
    meters: SourceMeters,
    streak: u32,
    capture_key: Option<String>,
    recording: Option<Recording>,
    last_speaker: Option<String>,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        let meters = SourceMeters::new(config.window_size, config.smoothing);
        Self {
            config,
            meters,
            streak: 0,
            capture_key: None,
            recording: None,
            last_speaker: None,
        }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn meters(&self) -> &SourceMeters {
        &self.meters
    }

    pub fn register_source(&mut self, key: impl Into<String>, sample_rate: u32) {
        self.meters.register(key, sample_rate);
    }

    pub fn remove_source(&mut self, key: &str) -> bool {
        self.meters.remove(key)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Source currently being recorded
    pub fn recording_key(&self) -> Option<&str> {
        self.recording.as_ref().map(|r| r.key.as_str())
    }

    /// Feed captured samples for a source.
    ///
    /// Samples always update the source's meter and are buffered only while
    /// that source is being recorded.
    pub fn push_samples(&mut self, key: &str, samples: &[f32]) {
        self.meters.ingest(key, samples);
        if let Some(rec) = self.recording.as_mut() {
            if rec.key == key {
                rec.samples.extend_from_slice(samples);
            }
        }
    }

    /// Sample all meters and advance the state machine.
    pub fn tick_sources(&mut self, now_ms: u64) -> TickReport {
        let levels = self.meters.levels();
        self.tick(now_ms, &levels)
    }

    /// Advance the state machine with externally measured levels.
    pub fn tick(&mut self, now_ms: u64, levels: &[(String, f32)]) -> TickReport {
        let threshold = self.config.rms_threshold;
        let best = levels
            .iter()
            .filter(|(_, level)| *level >= threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        let mut report = TickReport {
            speaker: best.map(|(key, _)| key.clone()),
            level: best.map(|(_, level)| *level).unwrap_or(0.0),
            ..Default::default()
        };
        report.speaker_changed = report.speaker != self.last_speaker;
        self.last_speaker = report.speaker.clone();

        match best {
            Some((key, _)) => self.on_voice(now_ms, key, &mut report.segments),
            None => self.on_quiet(now_ms, &mut report.segments),
        }
        report
    }

    fn on_voice(&mut self, now_ms: u64, key: &str, out: &mut Vec<VoiceSegment>) {
        let switched = self
            .recording
            .as_ref()
            .is_some_and(|rec| rec.key != key);
        if switched {
            out.extend(self.flush(now_ms, FlushReason::Switch));
        }
        if self.capture_key.as_deref() != Some(key) {
            tracing::debug!(source = %key, "capture source switched");
            self.capture_key = Some(key.to_string());
        }

        self.streak = self.streak.saturating_add(1);
        if self.recording.is_none() && self.streak >= self.config.voice_streak_ticks {
            self.start(now_ms, key);
        }

        let Some(rec) = self.recording.as_mut() else {
            return;
        };
        rec.last_voice_at_ms = now_ms;
        if now_ms.saturating_sub(rec.started_at_ms) >= self.config.max_segment_ms {
            out.extend(self.flush(now_ms, FlushReason::Max));
            self.streak = self.config.voice_streak_ticks;
            self.start(now_ms, key);
        }
    }

    fn on_quiet(&mut self, now_ms: u64, out: &mut Vec<VoiceSegment>) {
        self.streak = 0;
        let silent_for = match &self.recording {
            Some(rec) => now_ms.saturating_sub(rec.last_voice_at_ms),
            None => return,
        };
        if silent_for >= self.config.silence_ms {
            out.extend(self.flush(now_ms, FlushReason::Silence));
        }
    }

    fn start(&mut self, now_ms: u64, key: &str) {
        let sample_rate = self.meters.sample_rate(key).unwrap_or(TARGET_SAMPLE_RATE);
        tracing::debug!(source = %key, at_ms = now_ms, "recording started");
        self.recording = Some(Recording {
            key: key.to_string(),
            started_at_ms: now_ms,
            last_voice_at_ms: now_ms,
            samples: Vec::new(),
            sample_rate,
        });
    }

    fn flush(&mut self, now_ms: u64, reason: FlushReason) -> Option<VoiceSegment> {
        let rec = self.recording.take()?;
        self.streak = 0;
        let duration = now_ms.saturating_sub(rec.started_at_ms);
        if duration < self.config.min_segment_ms {
            tracing::debug!(
                source = %rec.key,
                duration_ms = duration,
                reason = reason.as_str(),
                "segment too short, discarded"
            );
            return None;
        }

        tracing::info!(
            source = %rec.key,
            duration_ms = duration,
            samples = rec.samples.len(),
            reason = reason.as_str(),
            "voice segment closed"
        );
        Some(VoiceSegment {
            speaker_key: rec.key,
            started_at_ms: rec.started_at_ms,
            last_voice_at_ms: rec.last_voice_at_ms,
            ended_at_ms: now_ms,
            reason,
            samples: rec.samples,
            sample_rate: rec.sample_rate,
        })
    }

    /// Drop any recording and forget all sources.
    pub fn reset(&mut self) {
        self.meters.clear();
        self.streak = 0;
        self.capture_key = None;
        self.recording = None;
        self.last_speaker = None;
    }
}
