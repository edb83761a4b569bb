//! Serial analysis job queue
//!
//! Jobs run strictly one at a time. For each job the queue publishes a
//! provisional "processing" result, runs speech-to-text and voice
//! authenticity concurrently, runs sentiment on the transcribed text and
//! publishes the final result under the same line id.

use super::transcript::{Transcript, TranscriptLine};
use crate::analysis::{
    with_deadline, AnalysisBackend, EmotionReading, EmotionRequest, SpeechRequest,
    SynthesisRequest, SynthesisVerdict, Transcription,
};
use crate::config::AiLiveConfig;
use crate::signaling::{send_detached, Envelope, ResultPayload, ResultTag, SignalingSink, TagKind};
use crate::Result;
use meetlive_core::audio::PackagedAudio;
use meetlive_core::vad::VoiceSegment;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Text of the provisional result
pub const PROCESSING_TEXT: &str = "Transcribing…";

/// Final text when speech-to-text produced nothing
pub const NO_SPEECH_TEXT: &str = "(no speech recognized)";

/// One captured segment awaiting analysis
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// `live_<uuid>`
    pub line_id: String,
    pub speaker_key: String,
    pub speaker_label: String,
    pub timestamp_ms: i64,
    pub audio_base64: String,
    pub duration_ms: u64,
}

impl Job {
    pub fn new(segment: &VoiceSegment, speaker_label: String, audio: PackagedAudio) -> Self {
        Self {
            line_id: format!("live_{}", uuid::Uuid::new_v4()),
            speaker_key: segment.speaker_key.clone(),
            speaker_label,
            timestamp_ms: segment.started_at_ms as i64,
            audio_base64: audio.audio_base64,
            duration_ms: segment.duration_ms(),
        }
    }
}

/// What a job runs and where its results go
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Envelope sender id
    pub peer_id: String,
    pub meeting_id: Option<u64>,
    pub speech_to_text: bool,
    pub voice_authenticity: bool,
    pub sentiment: bool,
    pub language: Option<String>,
    pub sample_rate: u32,
    pub call_timeout: Duration,
}

impl JobSettings {
    pub fn from_config(config: &AiLiveConfig, peer_id: impl Into<String>, meeting_id: Option<u64>) -> Self {
        Self {
            peer_id: peer_id.into(),
            meeting_id,
            speech_to_text: config.speech_to_text,
            voice_authenticity: config.voice_authenticity,
            sentiment: config.sentiment_effective(),
            language: config.language.clone(),
            sample_rate: config.target_sample_rate,
            call_timeout: config.call_timeout(),
        }
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    running: bool,
    /// Bumped by `clear`; a runner from an older generation stops dequeuing
    generation: u64,
}

struct QueueInner {
    state: Mutex<QueueState>,
    settings: JobSettings,
    backend: Arc<dyn AnalysisBackend>,
    sink: Arc<dyn SignalingSink>,
    transcript: Arc<Mutex<Transcript>>,
}

/// Serial queue of analysis jobs
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl JobQueue {
    pub fn new(
        settings: JobSettings,
        backend: Arc<dyn AnalysisBackend>,
        sink: Arc<dyn SignalingSink>,
        transcript: Arc<Mutex<Transcript>>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                settings,
                backend,
                sink,
                transcript,
            }),
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.inner.settings
    }

    /// Queue a job, starting the runner if idle. Must be called from a Tokio
    /// runtime.
    pub fn submit(&self, job: Job) {
        let generation = {
            let mut state = self.inner.state.lock();
            state.pending.push_back(job);
            if state.running {
                return;
            }
            state.running = true;
            state.generation
        };

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run(generation).await });
    }

    /// Drop queued jobs. The in-flight job, if any, is abandoned.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        state.running = false;
        state.generation += 1;
        if dropped > 0 {
            tracing::debug!(dropped, "analysis queue cleared");
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }
}

impl QueueInner {
    async fn run(self: Arc<Self>, generation: u64) {
        loop {
            let job = {
                let mut state = self.state.lock();
                if state.generation != generation {
                    return;
                }
                match state.pending.pop_front() {
                    Some(job) => job,
                    None => {
                        state.running = false;
                        return;
                    }
                }
            };
            self.process(job, generation).await;
        }
    }

    async fn process(&self, job: Job, generation: u64) {
        tracing::info!(
            line = %job.line_id,
            speaker = %job.speaker_key,
            duration_ms = job.duration_ms,
            "analysis job started"
        );

        self.publish(
            &job,
            PROCESSING_TEXT.to_string(),
            vec![ResultTag::new("Processing", TagKind::Warn)],
            generation,
        );

        let settings = &self.settings;
        let deadline = settings.call_timeout;

        let speech = async {
            if !settings.speech_to_text {
                return None;
            }
            let request = SpeechRequest {
                audio_data: job.audio_base64.clone(),
                format: "wav".to_string(),
                sample_rate: settings.sample_rate,
                language: settings.language.clone(),
                meeting_id: settings.meeting_id,
            };
            Some(with_deadline("speech-to-text", deadline, self.backend.transcribe(&request)).await)
        };

        let synthesis = async {
            if !settings.voice_authenticity {
                return None;
            }
            let request = SynthesisRequest {
                audio_data: job.audio_base64.clone(),
                format: "wav".to_string(),
                sample_rate: settings.sample_rate,
                meeting_id: settings.meeting_id,
            };
            Some(with_deadline("voice authenticity", deadline, self.backend.detect_synthesis(&request)).await)
        };

        let (speech, synthesis) = futures::future::join(speech, synthesis).await;

        let mut tags = Vec::new();
        let mut text = String::new();
        if let Some(result) = speech {
            let (tag, transcribed) = speech_tag(result);
            tags.push(tag);
            text = transcribed;
        }
        if let Some(result) = synthesis {
            tags.push(synthesis_tag(result));
        }

        if settings.sentiment && !text.is_empty() {
            let request = EmotionRequest {
                text: text.clone(),
                meeting_id: settings.meeting_id,
            };
            let result = with_deadline("sentiment", deadline, self.backend.classify_emotion(&request)).await;
            if let Some(tag) = emotion_tag(result) {
                tags.push(tag);
            }
        }

        let final_text = if text.is_empty() {
            NO_SPEECH_TEXT.to_string()
        } else {
            text
        };
        tracing::info!(line = %job.line_id, tags = tags.len(), "analysis job finished");
        self.publish(&job, final_text, tags, generation);
    }

    /// Broadcast a result. The local transcript only takes it while the
    /// queue is still on the job's generation.
    fn publish(&self, job: &Job, text: String, tags: Vec<ResultTag>, generation: u64) {
        let payload = ResultPayload {
            line_id: job.line_id.clone(),
            speaker_key: job.speaker_key.clone(),
            speaker_label: job.speaker_label.clone(),
            timestamp_ms: job.timestamp_ms,
            text,
            tags,
        };
        if self.state.lock().generation == generation {
            self.transcript.lock().upsert(TranscriptLine::from(&payload));
        } else {
            tracing::debug!(line = %job.line_id, "abandoned job result kept out of transcript");
        }

        match Envelope::result(&self.settings.peer_id, &payload) {
            Ok(envelope) => send_detached(&self.sink, envelope),
            Err(e) => tracing::warn!(line = %job.line_id, error = %e, "failed to encode result"),
        }
    }
}

fn percent(confidence: f64) -> i64 {
    (confidence * 100.0).round() as i64
}

fn with_confidence(label: &str, confidence: Option<f64>) -> String {
    match confidence {
        Some(c) => format!("{} {}%", label, percent(c)),
        None => label.to_string(),
    }
}

/// Tag and transcribed text for a speech-to-text outcome
fn speech_tag(result: Result<Transcription>) -> (ResultTag, String) {
    match result {
        Ok(t) => (
            ResultTag::new(with_confidence("ASR", t.confidence), TagKind::Ok),
            t.text.trim().to_string(),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "speech-to-text failed");
            (ResultTag::new("ASR failed", TagKind::Error), String::new())
        }
    }
}

fn synthesis_tag(result: Result<SynthesisVerdict>) -> ResultTag {
    match result {
        Ok(v) => {
            let (label, kind) = if v.is_synthetic {
                ("Likely synthetic", TagKind::Warn)
            } else {
                ("Likely genuine", TagKind::Ok)
            };
            ResultTag::new(with_confidence(label, v.confidence), kind)
        }
        Err(e) => {
            tracing::warn!(error = %e, "voice authenticity check failed");
            ResultTag::new("Synthesis check failed", TagKind::Error)
        }
    }
}

/// An empty emotion label yields no tag.
fn emotion_tag(result: Result<EmotionReading>) -> Option<ResultTag> {
    match result {
        Ok(r) if r.emotion.is_empty() => None,
        Ok(r) => Some(ResultTag::new(
            with_confidence(&format!("Emotion {}", r.emotion), r.confidence),
            TagKind::Ok,
        )),
        Err(e) => {
            tracing::warn!(error = %e, "sentiment failed");
            Some(ResultTag::new("Emotion failed", TagKind::Error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::{ChannelSink, SignalingMessage};
    use crate::Error;
    use async_trait::async_trait;
    use meetlive_core::vad::FlushReason;
    use tokio::sync::mpsc;

    struct FixedBackend {
        text: &'static str,
        fail_synthesis: bool,
    }

    #[async_trait]
    impl AnalysisBackend for FixedBackend {
        async fn transcribe(&self, _request: &SpeechRequest) -> Result<Transcription> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(Transcription {
                text: self.text.to_string(),
                confidence: Some(0.914),
            })
        }

        async fn detect_synthesis(&self, _request: &SynthesisRequest) -> Result<SynthesisVerdict> {
            if self.fail_synthesis {
                return Err(Error::Analysis("HTTP 500 Internal Server Error: boom".into()));
            }
            Ok(SynthesisVerdict {
                is_synthetic: false,
                confidence: Some(0.87),
            })
        }

        async fn classify_emotion(&self, request: &EmotionRequest) -> Result<EmotionReading> {
            assert!(!request.text.is_empty());
            Ok(EmotionReading {
                emotion: "happy".into(),
                confidence: None,
            })
        }
    }

    fn settings() -> JobSettings {
        JobSettings::from_config(&AiLiveConfig::default(), "peer-1", Some(12))
    }

    fn job(n: u64) -> Job {
        let segment = VoiceSegment {
            speaker_key: "local".into(),
            started_at_ms: 1_000 * n,
            last_voice_at_ms: 1_000 * n + 500,
            ended_at_ms: 1_000 * n + 900,
            reason: FlushReason::Silence,
            samples: vec![0.1; 16],
            sample_rate: 16_000,
        };
        let audio = PackagedAudio {
            audio_base64: "UklGRg==".into(),
            sample_rate: 16_000,
            sample_count: 16,
        };
        Job::new(&segment, "Me".into(), audio)
    }

    fn queue(backend: FixedBackend) -> (JobQueue, mpsc::UnboundedReceiver<Envelope>, Arc<Mutex<Transcript>>) {
        let (sink, rx) = ChannelSink::new();
        let transcript = Arc::new(Mutex::new(Transcript::new()));
        let queue = JobQueue::new(settings(), Arc::new(backend), Arc::new(sink), transcript.clone());
        (queue, rx, transcript)
    }

    fn result_of(envelope: Envelope) -> ResultPayload {
        match envelope.decode().unwrap() {
            SignalingMessage::Result(payload) => payload,
            other => panic!("expected result, got {:?}", other),
        }
    }

    #[test]
    fn test_job_fields() {
        let job = job(2);
        assert!(job.line_id.starts_with("live_"));
        assert_eq!(job.timestamp_ms, 2_000);
        assert_eq!(job.duration_ms, 900);
        assert_ne!(job.line_id, self::job(2).line_id);
    }

    #[test]
    fn test_tag_formatting() {
        let (tag, text) = speech_tag(Ok(Transcription {
            text: " hello ".into(),
            confidence: Some(0.914),
        }));
        assert_eq!(tag.text, "ASR 91%");
        assert_eq!(text, "hello");

        let tag = synthesis_tag(Ok(SynthesisVerdict {
            is_synthetic: true,
            confidence: None,
        }));
        assert_eq!(tag, ResultTag::new("Likely synthetic", TagKind::Warn));

        assert_eq!(
            emotion_tag(Ok(EmotionReading {
                emotion: "calm".into(),
                confidence: Some(0.5),
            }))
            .unwrap()
            .text,
            "Emotion calm 50%"
        );
        assert!(emotion_tag(Ok(EmotionReading::default())).is_none());

        let (tag, text) = speech_tag(Err(Error::Timeout("speech-to-text exceeded 60000 ms".into())));
        assert_eq!(tag.kind, TagKind::Error);
        assert!(text.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_provisional_then_final() {
        let (queue, mut rx, transcript) = queue(FixedBackend {
            text: "ni hao",
            fail_synthesis: true,
        });
        let job = job(1);
        queue.submit(job.clone());

        let first = result_of(rx.recv().await.unwrap());
        assert_eq!(first.line_id, job.line_id);
        assert_eq!(first.text, PROCESSING_TEXT);
        assert_eq!(first.tags, vec![ResultTag::new("Processing", TagKind::Warn)]);

        let last = result_of(rx.recv().await.unwrap());
        assert_eq!(last.line_id, job.line_id);
        assert_eq!(last.text, "ni hao");
        let tags: Vec<_> = last.tags.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(tags, vec!["ASR 91%", "Synthesis check failed", "Emotion happy"]);

        let transcript = transcript.lock();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.get(&job.line_id).unwrap().text, "ni hao");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_text_skips_sentiment() {
        let (queue, mut rx, _) = queue(FixedBackend {
            text: "",
            fail_synthesis: false,
        });
        queue.submit(job(1));
        rx.recv().await.unwrap();
        let last = result_of(rx.recv().await.unwrap());
        assert_eq!(last.text, NO_SPEECH_TEXT);
        let tags: Vec<_> = last.tags.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(tags, vec!["ASR 91%", "Likely genuine 87%"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_pending() {
        let (queue, mut rx, _) = queue(FixedBackend {
            text: "x",
            fail_synthesis: false,
        });
        queue.submit(job(1));
        queue.submit(job(2));
        queue.submit(job(3));
        assert!(queue.is_running());

        queue.clear();
        assert_eq!(queue.pending(), 0);
        assert!(!queue.is_running());

        // At most the in-flight job's results arrive
        tokio::time::sleep(Duration::from_secs(5)).await;
        let mut lines = std::collections::HashSet::new();
        while let Ok(env) = rx.try_recv() {
            lines.insert(result_of(env).line_id);
        }
        assert!(lines.len() <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_job_stays_out_of_transcript() {
        let (queue, mut rx, transcript) = queue(FixedBackend {
            text: "late",
            fail_synthesis: false,
        });
        let job = job(1);
        queue.submit(job.clone());

        let first = result_of(rx.recv().await.unwrap());
        assert_eq!(first.text, PROCESSING_TEXT);
        assert_eq!(
            transcript.lock().get(&job.line_id).map(|l| l.text.clone()),
            Some(PROCESSING_TEXT.to_string())
        );

        queue.clear();
        tokio::time::sleep(Duration::from_secs(5)).await;

        // Still broadcast, never applied locally
        let last = result_of(rx.recv().await.unwrap());
        assert_eq!(last.text, "late");
        assert_eq!(
            transcript.lock().get(&job.line_id).map(|l| l.text.clone()),
            Some(PROCESSING_TEXT.to_string())
        );
    }
}
