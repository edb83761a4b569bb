//! Meeting session context
//!
//! [`MeetingSession`] owns all per-meeting client state: local and remote
//! effect parameters, the interceptor registry, the participant roster and
//! the AI-Live machinery (leader coordinator, segmenter, job queue,
//! transcript). Its lifetime runs from [`MeetingSession::join`] to
//! [`MeetingSession::leave`].
//!
//! Locks are `parking_lot` mutexes and are never held across an `.await`.

pub mod jobs;
pub mod leader;
pub mod participants;
pub mod transcript;

pub use jobs::{Job, JobQueue, JobSettings};
pub use leader::{LeaderAction, LeaderCoordinator, LiveStatus};
pub use participants::{Participants, LOCAL_SPEAKER_KEY};
pub use transcript::{Transcript, TranscriptLine};

use crate::analysis::AnalysisBackend;
use crate::config::SessionConfig;
use crate::media::{wall_clock, Clock, FxSync, ReceiverInterceptor, RenderListener, SenderInterceptor};
use crate::signaling::{send_detached, Envelope, LeadershipState, SignalingMessage, SignalingSink};
use crate::Result;
use async_trait::async_trait;
use meetlive_core::audio::CapturePipeline;
use meetlive_core::fx::{EffectParameters, EffectUpdate, RenderParams};
use meetlive_core::vad::{Segmenter, VoiceSegment};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Platform audio capture used while this client leads AI-Live
///
/// Samples reach the session through [`MeetingSession::push_audio`] once
/// `start` succeeds.
#[async_trait]
pub trait AudioCaptureBackend: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self);
}

/// Identity assigned on join
#[derive(Debug, Clone)]
struct Membership {
    peer_id: String,
    meeting_id: Option<u64>,
}

/// Loudest source on the last tick
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSpeaker {
    pub key: String,
    pub label: String,
    pub level: f32,
}

#[derive(Default)]
struct LiveTasks {
    queue: Option<JobQueue>,
    claim_timer: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl LiveTasks {
    fn abort_claim_timer(&mut self) {
        if let Some(handle) = self.claim_timer.take() {
            handle.abort();
        }
    }

    fn abort_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

struct SessionInner {
    config: SessionConfig,
    clock: Clock,
    sink: Arc<dyn SignalingSink>,
    backend: Arc<dyn AnalysisBackend>,
    capture: Arc<dyn AudioCaptureBackend>,
    pipeline: CapturePipeline,

    membership: RwLock<Option<Membership>>,
    fx: Mutex<FxSync>,
    participants: RwLock<Participants>,
    leader: Mutex<LeaderCoordinator>,
    segmenter: Mutex<Segmenter>,
    /// Audio sources known to the platform, re-registered on capture start
    sources: Mutex<HashMap<String, u32>>,
    transcript: Arc<Mutex<Transcript>>,
    active_speaker: Mutex<Option<ActiveSpeaker>>,
    tasks: Mutex<LiveTasks>,
}

/// Per-meeting client session
#[derive(Clone)]
pub struct MeetingSession {
    inner: Arc<SessionInner>,
}

impl MeetingSession {
    pub fn new(
        config: SessionConfig,
        sink: Arc<dyn SignalingSink>,
        backend: Arc<dyn AnalysisBackend>,
        capture: Arc<dyn AudioCaptureBackend>,
    ) -> Result<Self> {
        Self::with_clock(config, sink, backend, capture, wall_clock())
    }

    pub fn with_clock(
        config: SessionConfig,
        sink: Arc<dyn SignalingSink>,
        backend: Arc<dyn AnalysisBackend>,
        capture: Arc<dyn AudioCaptureBackend>,
        clock: Clock,
    ) -> Result<Self> {
        config.validate()?;
        let pipeline = CapturePipeline::new(config.ai_live.target_sample_rate)?;
        let ai = &config.ai_live;
        let leader = LeaderCoordinator::new(ai.claim_backoff_min_ms, ai.claim_backoff_max_ms);

        Ok(Self {
            inner: Arc::new(SessionInner {
                fx: Mutex::new(FxSync::new(config.fx.clone(), clock.clone())),
                segmenter: Mutex::new(Segmenter::new(config.segmenter.clone())),
                leader: Mutex::new(leader),
                config,
                clock,
                sink,
                backend,
                capture,
                pipeline,
                membership: RwLock::new(None),
                participants: RwLock::new(Participants::new()),
                sources: Mutex::new(HashMap::new()),
                transcript: Arc::new(Mutex::new(Transcript::new())),
                active_speaker: Mutex::new(None),
                tasks: Mutex::new(LiveTasks::default()),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // ---- lifecycle ----

    /// Enter a meeting as `peer_id`.
    pub fn join(&self, peer_id: impl Into<String>, meeting_id: Option<u64>) {
        let peer_id = peer_id.into();
        tracing::info!(peer = %peer_id, meeting = ?meeting_id, "joined meeting");
        *self.inner.membership.write() = Some(Membership { peer_id, meeting_id });
    }

    pub fn is_joined(&self) -> bool {
        self.inner.membership.read().is_some()
    }

    /// Leave the meeting: give up AI-Live and reset all session state.
    pub async fn leave(&self) {
        self.disable_ai_live().await;

        {
            let mut tasks = self.inner.tasks.lock();
            tasks.abort_claim_timer();
            tasks.abort_ticker();
            if let Some(queue) = tasks.queue.take() {
                queue.clear();
            }
        }
        self.inner.fx.lock().reset();
        self.inner.participants.write().clear();
        self.inner.leader.lock().reset();
        self.inner.segmenter.lock().reset();
        self.inner.sources.lock().clear();
        self.inner.transcript.lock().clear();
        *self.inner.active_speaker.lock() = None;
        *self.inner.membership.write() = None;
        tracing::info!("left meeting");
    }

    /// Joined and the signaling channel is up
    pub fn signaling_ready(&self) -> bool {
        self.is_joined() && self.inner.sink.is_ready()
    }

    fn peer_id(&self) -> String {
        self.inner
            .membership
            .read()
            .as_ref()
            .map(|m| m.peer_id.clone())
            .unwrap_or_default()
    }

    fn now_ms(&self) -> u64 {
        (self.inner.clock)().max(0) as u64
    }

    // ---- inbound signaling ----

    /// Route one envelope received from the relay.
    pub async fn handle_envelope(&self, envelope: &Envelope) -> Result<()> {
        match envelope.decode()? {
            SignalingMessage::RoomInfo(info) => {
                if !info.session_id.is_empty() {
                    self.inner.leader.lock().set_session_id(info.session_id.clone());
                }
                self.inner.participants.write().replace(&info);
                tracing::debug!(participants = info.participants.len(), "room info received");
                if let Some(state) = &info.ai_live {
                    self.apply_status(state).await;
                }
            }
            SignalingMessage::Status(state) => self.apply_status(&state).await,
            SignalingMessage::Result(payload) => {
                if self.inner.leader.lock().is_enabled() {
                    self.inner.transcript.lock().upsert(TranscriptLine::from(&payload));
                }
            }
            SignalingMessage::Error(err) => {
                tracing::warn!(message = %err.message, details = %err.details, "relay error");
            }
            other => tracing::debug!(?other, "ignoring signaling message"),
        }
        Ok(())
    }

    async fn apply_status(&self, state: &LeadershipState) {
        let ready = self.signaling_ready();
        let actions = self.inner.leader.lock().on_status(state, ready);
        self.execute(actions).await;
    }

    // ---- AI-Live ----

    /// Turn AI-Live on and claim leadership.
    pub async fn enable_ai_live(&self) -> Result<()> {
        let ready = self.signaling_ready();
        let actions = self.inner.leader.lock().enable(ready)?;
        self.execute(actions).await;
        Ok(())
    }

    /// Turn AI-Live off, releasing leadership and stopping capture if held.
    pub async fn disable_ai_live(&self) {
        let actions = self.inner.leader.lock().disable();
        self.execute(actions).await;
    }

    pub fn ai_live_enabled(&self) -> bool {
        self.inner.leader.lock().is_enabled()
    }

    pub fn is_leader(&self) -> bool {
        self.inner.leader.lock().is_leader()
    }

    pub fn status(&self) -> LiveStatus {
        self.inner.leader.lock().status().clone()
    }

    pub fn active_speaker(&self) -> Option<ActiveSpeaker> {
        self.inner.active_speaker.lock().clone()
    }

    /// Snapshot of the transcript lines in arrival order
    pub fn transcript(&self) -> Vec<TranscriptLine> {
        self.inner.transcript.lock().lines().to_vec()
    }

    pub fn clear_transcript(&self) {
        self.inner.transcript.lock().clear();
    }

    pub fn speaker_label(&self, speaker_key: &str) -> String {
        self.inner.participants.read().label_for(speaker_key)
    }

    async fn execute(&self, actions: Vec<LeaderAction>) {
        let mut work: VecDeque<LeaderAction> = actions.into();
        while let Some(action) = work.pop_front() {
            match action {
                LeaderAction::StartCapture => work.extend(self.start_capture().await),
                LeaderAction::StopCapture => self.stop_capture().await,
                other => self.apply_now(other),
            }
        }
    }

    /// Carry out a non-capture action.
    fn apply_now(&self, action: LeaderAction) {
        match action {
            LeaderAction::SendClaim => {
                send_detached(&self.inner.sink, Envelope::claim(&self.peer_id()));
            }
            LeaderAction::SendRelease => {
                send_detached(&self.inner.sink, Envelope::release(&self.peer_id()));
            }
            LeaderAction::ScheduleClaim(delay) => {
                let session = self.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    session.on_claim_timer();
                });
                let mut tasks = self.inner.tasks.lock();
                tasks.abort_claim_timer();
                tasks.claim_timer = Some(handle);
            }
            LeaderAction::CancelClaim => self.inner.tasks.lock().abort_claim_timer(),
            LeaderAction::StartCapture | LeaderAction::StopCapture => {
                tracing::warn!(?action, "capture action outside of execute");
            }
        }
    }

    fn on_claim_timer(&self) {
        let ready = self.signaling_ready();
        let actions = self.inner.leader.lock().on_claim_timer(ready);
        self.inner.tasks.lock().claim_timer = None;
        for action in actions {
            self.apply_now(action);
        }
    }

    async fn start_capture(&self) -> Vec<LeaderAction> {
        {
            let mut segmenter = self.inner.segmenter.lock();
            segmenter.reset();
            for (key, rate) in self.inner.sources.lock().iter() {
                segmenter.register_source(key.clone(), *rate);
            }
        }

        match self.inner.capture.start().await {
            Ok(()) => {
                let follow_up = self.inner.leader.lock().on_capture_started();
                if follow_up.is_empty() {
                    self.start_ticker();
                }
                follow_up
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                self.inner.leader.lock().on_capture_failed(&reason)
            }
        }
    }

    fn start_ticker(&self) {
        let queue = match self.inner.membership.read().as_ref() {
            Some(m) => JobQueue::new(
                JobSettings::from_config(&self.inner.config.ai_live, m.peer_id.clone(), m.meeting_id),
                self.inner.backend.clone(),
                self.inner.sink.clone(),
                self.inner.transcript.clone(),
            ),
            None => {
                tracing::warn!("capture started outside a meeting");
                return;
            }
        };

        let period = Duration::from_millis(self.inner.config.segmenter.tick_ms);
        let session = self.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                session.tick();
            }
        });

        let mut tasks = self.inner.tasks.lock();
        tasks.abort_ticker();
        if let Some(old) = tasks.queue.replace(queue) {
            old.clear();
        }
        tasks.ticker = Some(ticker);
    }

    async fn stop_capture(&self) {
        {
            let mut tasks = self.inner.tasks.lock();
            tasks.abort_ticker();
            if let Some(queue) = tasks.queue.take() {
                queue.clear();
            }
        }
        self.inner.segmenter.lock().reset();
        *self.inner.active_speaker.lock() = None;
        self.inner.capture.stop().await;
        tracing::info!("AI Live capture stopped");
    }

    /// One segmentation step; normally driven by the capture ticker.
    pub fn tick(&self) {
        let now_ms = self.now_ms();
        let report = self.inner.segmenter.lock().tick_sources(now_ms);

        let speaker = report.speaker.map(|key| ActiveSpeaker {
            label: self.speaker_label(&key),
            key,
            level: report.level,
        });
        if report.speaker_changed {
            tracing::debug!(speaker = ?speaker.as_ref().map(|s| &s.key), "active speaker changed");
        }
        *self.inner.active_speaker.lock() = speaker;

        for segment in report.segments {
            self.enqueue_segment(segment);
        }
    }

    fn enqueue_segment(&self, segment: VoiceSegment) {
        let queue = match self.inner.tasks.lock().queue.clone() {
            Some(queue) => queue,
            None => return,
        };
        let audio = match self.inner.pipeline.package_segment(&segment) {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(speaker = %segment.speaker_key, error = %e, "failed to package segment");
                return;
            }
        };
        let label = self.speaker_label(&segment.speaker_key);
        queue.submit(Job::new(&segment, label, audio));
    }

    // ---- audio sources ----

    /// Announce an audio source (`local` or a remote peer id).
    pub fn add_audio_source(&self, key: impl Into<String>, sample_rate: u32) {
        let key = key.into();
        self.inner.sources.lock().insert(key.clone(), sample_rate);
        if self.inner.leader.lock().is_leader() {
            self.inner.segmenter.lock().register_source(key, sample_rate);
        }
    }

    pub fn remove_audio_source(&self, key: &str) {
        self.inner.sources.lock().remove(key);
        self.inner.segmenter.lock().remove_source(key);
    }

    /// Feed captured mono samples of one source.
    pub fn push_audio(&self, key: &str, samples: &[f32]) {
        self.inner.segmenter.lock().push_samples(key, samples);
    }

    // ---- effects ----

    /// Apply a local effect change; returns whether anything changed.
    pub fn set_local_fx(&self, update: &EffectUpdate) -> bool {
        self.inner.fx.lock().update_local(update)
    }

    pub fn local_fx(&self) -> EffectParameters {
        self.inner.fx.lock().local()
    }

    pub fn local_render(&self) -> RenderParams {
        self.inner.fx.lock().local_render()
    }

    pub fn remote_fx(&self, tile_id: &str) -> Option<EffectParameters> {
        self.inner.fx.lock().remote(tile_id)
    }

    pub fn attach_sender(&self) -> Option<Arc<SenderInterceptor>> {
        self.inner.fx.lock().attach_sender()
    }

    pub fn attach_receiver(&self, tile_id: &str) -> Option<Arc<ReceiverInterceptor>> {
        self.inner.fx.lock().attach_receiver(tile_id)
    }

    pub fn detach_receiver(&self, tile_id: &str) -> bool {
        self.inner.fx.lock().detach_receiver(tile_id)
    }

    pub fn set_render_listener(&self, listener: RenderListener) {
        self.inner.fx.lock().set_render_listener(listener);
    }
}
