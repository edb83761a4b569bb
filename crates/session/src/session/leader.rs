//! AI-Live leader coordination
//!
//! [`LeaderCoordinator`] is a pure state machine: every input returns the
//! list of [`LeaderAction`]s the session has to carry out (send a claim,
//! arm a timer, start capture, ...). It never touches the network or a
//! clock itself.

use crate::signaling::LeadershipState;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Side effect requested by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderAction {
    /// Send `AI_LIVE_CLAIM {enable: true}`
    SendClaim,
    /// Send `AI_LIVE_CLAIM {enable: false}`
    SendRelease,
    /// Arm the re-claim timer; call `on_claim_timer` when it fires
    ScheduleClaim(Duration),
    /// Disarm the pending re-claim timer
    CancelClaim,
    StartCapture,
    StopCapture,
}

/// AI-Live status surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveStatus {
    Off,
    /// Claim sent after enabling, no status seen yet
    Claiming,
    /// Nobody leads; a re-claim is pending
    Waiting,
    /// Leadership granted, capture initializing
    Starting,
    Running,
    /// Another participant leads
    Following(String),
    Unavailable(String),
}

impl std::fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiveStatus::Off => write!(f, "off"),
            LiveStatus::Claiming => write!(f, "claiming"),
            LiveStatus::Waiting => write!(f, "waiting"),
            LiveStatus::Starting => write!(f, "starting"),
            LiveStatus::Running => write!(f, "running"),
            LiveStatus::Following(name) => write!(f, "following {}", name),
            LiveStatus::Unavailable(reason) => write!(f, "unavailable: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Idle,
    Starting,
    Running,
}

/// Per-session leader state machine
#[derive(Debug)]
pub struct LeaderCoordinator {
    session_id: String,
    enabled: bool,
    /// Cleared for the rest of the session once capture fails to start
    capable: bool,
    capture: Capture,
    claim_pending: bool,
    backoff_min_ms: u64,
    backoff_max_ms: u64,
    rng: StdRng,
    status: LiveStatus,
}

impl LeaderCoordinator {
    pub fn new(backoff_min_ms: u64, backoff_max_ms: u64) -> Self {
        Self::with_rng(backoff_min_ms, backoff_max_ms, StdRng::from_entropy())
    }

    /// Deterministic backoff, for tests
    pub fn with_seed(backoff_min_ms: u64, backoff_max_ms: u64, seed: u64) -> Self {
        Self::with_rng(backoff_min_ms, backoff_max_ms, StdRng::seed_from_u64(seed))
    }

    fn with_rng(backoff_min_ms: u64, backoff_max_ms: u64, rng: StdRng) -> Self {
        Self {
            session_id: String::new(),
            enabled: false,
            capable: true,
            capture: Capture::Idle,
            claim_pending: false,
            backoff_min_ms: backoff_min_ms.min(backoff_max_ms),
            backoff_max_ms,
            rng,
            status: LiveStatus::Off,
        }
    }

    /// Relay-assigned id of this client, from `ROOM_INFO`
    pub fn set_session_id(&mut self, session_id: impl Into<String>) {
        self.session_id = session_id.into();
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_capable(&self) -> bool {
        self.capable
    }

    /// Whether this client currently holds capture (starting or running)
    pub fn is_leader(&self) -> bool {
        self.capture != Capture::Idle
    }

    pub fn is_capturing(&self) -> bool {
        self.capture == Capture::Running
    }

    pub fn claim_pending(&self) -> bool {
        self.claim_pending
    }

    pub fn status(&self) -> &LiveStatus {
        &self.status
    }

    fn backoff(&mut self) -> Duration {
        Duration::from_millis(self.rng.gen_range(self.backoff_min_ms..=self.backoff_max_ms))
    }

    fn cancel_claim(&mut self, actions: &mut Vec<LeaderAction>) {
        if self.claim_pending {
            self.claim_pending = false;
            actions.push(LeaderAction::CancelClaim);
        }
    }

    fn stop_capture(&mut self, actions: &mut Vec<LeaderAction>) {
        if self.capture != Capture::Idle {
            self.capture = Capture::Idle;
            actions.push(LeaderAction::StopCapture);
        }
    }

    /// Turn AI-Live on: claim leadership.
    pub fn enable(&mut self, signaling_ready: bool) -> Result<Vec<LeaderAction>> {
        if self.enabled {
            return Ok(Vec::new());
        }
        if !signaling_ready {
            return Err(Error::NotReady(
                "join the meeting and connect signaling first".to_string(),
            ));
        }
        self.enabled = true;
        self.capable = true;
        self.status = LiveStatus::Claiming;
        tracing::info!("AI Live enabled, claiming leadership");
        Ok(vec![LeaderAction::SendClaim])
    }

    /// Turn AI-Live off, releasing leadership if held.
    pub fn disable(&mut self) -> Vec<LeaderAction> {
        if !self.enabled {
            return Vec::new();
        }
        self.enabled = false;
        self.status = LiveStatus::Off;

        let mut actions = Vec::new();
        self.cancel_claim(&mut actions);
        if self.is_leader() {
            actions.push(LeaderAction::SendRelease);
            self.stop_capture(&mut actions);
        }
        tracing::info!("AI Live disabled");
        actions
    }

    /// React to a meeting-wide leadership update.
    pub fn on_status(&mut self, state: &LeadershipState, signaling_ready: bool) -> Vec<LeaderAction> {
        let mut actions = Vec::new();

        if !self.enabled {
            self.stop_capture(&mut actions);
            return actions;
        }

        if !state.has_leader() {
            self.stop_capture(&mut actions);
            self.status = LiveStatus::Waiting;
            if signaling_ready && self.capable && !self.claim_pending {
                self.claim_pending = true;
                let delay = self.backoff();
                tracing::debug!(delay_ms = delay.as_millis() as u64, "no AI Live leader, re-claim scheduled");
                actions.push(LeaderAction::ScheduleClaim(delay));
            }
            return actions;
        }

        let is_me = !self.session_id.is_empty() && state.leader_session_id == self.session_id;
        if is_me {
            self.cancel_claim(&mut actions);
            if !self.capable {
                self.stop_capture(&mut actions);
                self.status =
                    LiveStatus::Unavailable("audio capture unavailable, leadership released".to_string());
                actions.push(LeaderAction::SendRelease);
                return actions;
            }
            if self.capture == Capture::Idle {
                self.capture = Capture::Starting;
                self.status = LiveStatus::Starting;
                tracing::info!("AI Live leadership granted, starting capture");
                actions.push(LeaderAction::StartCapture);
            }
            return actions;
        }

        self.cancel_claim(&mut actions);
        if self.is_leader() {
            tracing::info!(leader = %state.leader_session_id, "AI Live leadership lost");
        }
        self.stop_capture(&mut actions);
        self.status = LiveStatus::Following(state.leader_label());
        actions
    }

    /// The re-claim timer fired.
    pub fn on_claim_timer(&mut self, signaling_ready: bool) -> Vec<LeaderAction> {
        if !self.claim_pending {
            return Vec::new();
        }
        self.claim_pending = false;
        if self.enabled && signaling_ready && self.capable {
            vec![LeaderAction::SendClaim]
        } else {
            Vec::new()
        }
    }

    /// Capture came up.
    ///
    /// A capture that finishes starting after leadership was given up is
    /// torn down again.
    pub fn on_capture_started(&mut self) -> Vec<LeaderAction> {
        if self.capture != Capture::Starting {
            return vec![LeaderAction::StopCapture];
        }
        self.capture = Capture::Running;
        self.status = LiveStatus::Running;
        tracing::info!("AI Live capture running");
        Vec::new()
    }

    /// Capture failed to start: release and stay incapable for this session.
    pub fn on_capture_failed(&mut self, reason: &str) -> Vec<LeaderAction> {
        tracing::warn!(reason, "AI Live capture failed to start");
        self.capable = false;
        let was_leader = self.is_leader();
        self.capture = Capture::Idle;
        if !self.enabled {
            return Vec::new();
        }
        self.status = LiveStatus::Unavailable(reason.to_string());
        if was_leader {
            vec![LeaderAction::SendRelease]
        } else {
            Vec::new()
        }
    }

    /// Forget everything, as on leaving the meeting.
    pub fn reset(&mut self) {
        self.session_id.clear();
        self.enabled = false;
        self.capable = true;
        self.capture = Capture::Idle;
        self.claim_pending = false;
        self.status = LiveStatus::Off;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> LeaderCoordinator {
        let mut c = LeaderCoordinator::with_seed(250, 700, 7);
        c.set_session_id("s-me");
        c
    }

    fn led_by(session_id: &str, username: &str) -> LeadershipState {
        LeadershipState {
            enabled: true,
            leader_session_id: session_id.into(),
            leader_username: username.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_enable_requires_signaling() {
        let mut c = coordinator();
        assert!(matches!(c.enable(false), Err(Error::NotReady(_))));
        assert!(!c.is_enabled());

        assert_eq!(c.enable(true).unwrap(), vec![LeaderAction::SendClaim]);
        assert_eq!(c.status(), &LiveStatus::Claiming);
        assert!(c.enable(true).unwrap().is_empty());
    }

    #[test]
    fn test_granted_then_running() {
        let mut c = coordinator();
        c.enable(true).unwrap();

        let actions = c.on_status(&led_by("s-me", "me"), true);
        assert_eq!(actions, vec![LeaderAction::StartCapture]);
        assert_eq!(c.status().to_string(), "starting");

        // Repeated status while starting does not restart capture
        assert!(c.on_status(&led_by("s-me", "me"), true).is_empty());

        assert!(c.on_capture_started().is_empty());
        assert!(c.is_capturing());
        assert_eq!(c.status().to_string(), "running");
        assert!(c.on_status(&led_by("s-me", "me"), true).is_empty());
    }

    #[test]
    fn test_vacant_schedules_single_reclaim() {
        let mut c = coordinator();
        c.enable(true).unwrap();

        let vacant = LeadershipState::default();
        let actions = c.on_status(&vacant, true);
        assert_eq!(actions.len(), 1);
        match actions[0] {
            LeaderAction::ScheduleClaim(delay) => {
                assert!(delay >= Duration::from_millis(250));
                assert!(delay <= Duration::from_millis(700));
            }
            ref other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(c.status().to_string(), "waiting");

        // At most one pending claim
        assert!(c.on_status(&vacant, true).is_empty());

        assert_eq!(c.on_claim_timer(true), vec![LeaderAction::SendClaim]);
        assert!(!c.claim_pending());
        assert!(c.on_claim_timer(true).is_empty());
    }

    #[test]
    fn test_vacant_without_signaling_does_not_schedule() {
        let mut c = coordinator();
        c.enable(true).unwrap();
        assert!(c.on_status(&LeadershipState::default(), false).is_empty());
    }

    #[test]
    fn test_follower_stops_capture() {
        let mut c = coordinator();
        c.enable(true).unwrap();
        c.on_status(&led_by("s-me", "me"), true);
        c.on_capture_started();

        let actions = c.on_status(&led_by("s-other", "alice"), true);
        assert_eq!(actions, vec![LeaderAction::StopCapture]);
        assert_eq!(c.status().to_string(), "following alice");
        assert!(!c.is_leader());
    }

    #[test]
    fn test_leader_elsewhere_cancels_pending_claim() {
        let mut c = coordinator();
        c.enable(true).unwrap();
        c.on_status(&LeadershipState::default(), true);
        assert!(c.claim_pending());

        let actions = c.on_status(&led_by("s-other", "alice"), true);
        assert_eq!(actions, vec![LeaderAction::CancelClaim]);
        assert!(c.on_claim_timer(true).is_empty());
    }

    #[test]
    fn test_capture_failure_releases_and_sticks() {
        let mut c = coordinator();
        c.enable(true).unwrap();
        c.on_status(&led_by("s-me", "me"), true);

        assert_eq!(
            c.on_capture_failed("no microphone"),
            vec![LeaderAction::SendRelease]
        );
        assert!(!c.is_capable());
        assert_eq!(c.status().to_string(), "unavailable: no microphone");

        // Incapable clients never re-claim
        assert!(c.on_status(&LeadershipState::default(), true).is_empty());

        // A stale grant is released again
        let actions = c.on_status(&led_by("s-me", "me"), true);
        assert_eq!(actions, vec![LeaderAction::SendRelease]);
    }

    #[test]
    fn test_disable_while_leader() {
        let mut c = coordinator();
        c.enable(true).unwrap();
        c.on_status(&led_by("s-me", "me"), true);
        c.on_capture_started();

        assert_eq!(
            c.disable(),
            vec![LeaderAction::SendRelease, LeaderAction::StopCapture]
        );
        assert_eq!(c.status(), &LiveStatus::Off);
        assert!(c.disable().is_empty());
    }

    #[test]
    fn test_disable_cancels_pending_claim() {
        let mut c = coordinator();
        c.enable(true).unwrap();
        c.on_status(&LeadershipState::default(), true);
        assert_eq!(c.disable(), vec![LeaderAction::CancelClaim]);
    }

    #[test]
    fn test_late_capture_start_is_torn_down() {
        let mut c = coordinator();
        c.enable(true).unwrap();
        c.on_status(&led_by("s-me", "me"), true);
        c.disable();
        assert_eq!(c.on_capture_started(), vec![LeaderAction::StopCapture]);
    }

    #[test]
    fn test_status_ignored_while_disabled() {
        let mut c = coordinator();
        assert!(c.on_status(&led_by("s-me", "me"), true).is_empty());
        assert_eq!(c.status(), &LiveStatus::Off);
    }

    #[test]
    fn test_reset() {
        let mut c = coordinator();
        c.enable(true).unwrap();
        c.on_status(&led_by("s-me", "me"), true);
        c.on_capture_failed("denied");
        c.reset();
        assert!(c.is_capable());
        assert!(!c.is_enabled());
        assert!(c.session_id().is_empty());
    }
}
