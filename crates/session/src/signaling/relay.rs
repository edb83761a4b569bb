//! In-process relay with deterministic leader arbitration
//!
//! Arbitration rules:
//!
//! - a claim is accepted iff nobody leads or the claimant already leads
//! - a release is honoured only from the current leader
//! - a leader disconnect clears leadership
//! - results are rebroadcast only when sent by the current leader
//!
//! Every leadership change bumps a fencing `epoch`. The full leadership
//! state is broadcast after every claim, accepted or not.

use super::protocol::{
    Envelope, LeadershipState, Participant, RoomInfo, SignalingMessage,
};
use super::sink::SignalingSink;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Identity of one connected client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMember {
    pub session_id: String,
    pub peer_id: String,
    pub user_id: Option<u64>,
    pub username: String,
}

struct Connection {
    member: RelayMember,
    tx: mpsc::UnboundedSender<Envelope>,
}

#[derive(Default)]
struct RelayState {
    connections: Vec<Connection>,
    leadership: LeadershipState,
    epoch: u64,
}

impl RelayState {
    fn broadcast(&self, envelope: &Envelope) {
        for conn in &self.connections {
            let _ = conn.tx.send(envelope.clone());
        }
    }

    fn send_to(&self, session_id: &str, envelope: Envelope) {
        if let Some(conn) = self.connections.iter().find(|c| c.member.session_id == session_id) {
            let _ = conn.tx.send(envelope);
        }
    }

    fn member(&self, session_id: &str) -> Option<&RelayMember> {
        self.connections
            .iter()
            .find(|c| c.member.session_id == session_id)
            .map(|c| &c.member)
    }

    fn is_leader(&self, session_id: &str) -> bool {
        self.leadership.leader_session_id == session_id
    }

    fn clear_leadership(&mut self) {
        self.leadership = LeadershipState {
            enabled: false,
            updated_at: Some(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };
        self.epoch += 1;
    }

    fn broadcast_status(&self) -> Result<()> {
        self.broadcast(&Envelope::status(&self.leadership)?);
        Ok(())
    }
}

/// A single meeting room's relay
#[derive(Clone, Default)]
pub struct LeaderRelay {
    state: Arc<Mutex<RelayState>>,
}

impl LeaderRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a client; it immediately receives a `ROOM_INFO` envelope.
    pub fn connect(&self, member: RelayMember) -> Result<(RelaySink, mpsc::UnboundedReceiver<Envelope>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        state.connections.retain(|c| c.member.session_id != member.session_id);
        state.connections.push(Connection {
            member: member.clone(),
            tx,
        });

        let participants = state
            .connections
            .iter()
            .map(|c| Participant {
                user_id: c.member.user_id,
                username: Some(c.member.username.clone()),
                session_id: Some(c.member.session_id.clone()),
                peer_id: Some(c.member.peer_id.clone()),
                is_self: c.member.session_id == member.session_id,
            })
            .collect();
        let info = RoomInfo {
            session_id: member.session_id.clone(),
            participants,
            ai_live: Some(state.leadership.clone()),
        };
        state.send_to(&member.session_id, Envelope::room_info(&info)?);
        tracing::debug!(session = %member.session_id, "relay member connected");

        Ok((
            RelaySink {
                relay: self.clone(),
                session_id: member.session_id,
            },
            rx,
        ))
    }

    /// Drop a client; a departing leader releases leadership.
    pub fn disconnect(&self, session_id: &str) {
        let mut state = self.state.lock();
        state.connections.retain(|c| c.member.session_id != session_id);
        if state.is_leader(session_id) {
            tracing::info!(session = %session_id, "leader disconnected, leadership cleared");
            state.clear_leadership();
            if let Err(e) = state.broadcast_status() {
                tracing::warn!(error = %e, "failed to broadcast leadership");
            }
        }
    }

    /// Process one envelope sent by `session_id`.
    pub fn handle(&self, session_id: &str, envelope: Envelope) -> Result<()> {
        let message = envelope.decode()?;
        let mut state = self.state.lock();
        let Some(member) = state.member(session_id).cloned() else {
            return Err(Error::SignalingError(format!(
                "session {} is not connected",
                session_id
            )));
        };

        match message {
            SignalingMessage::Claim(claim) if claim.enable => {
                let vacant = state.leadership.leader_session_id.is_empty();
                if vacant || state.is_leader(session_id) {
                    if vacant {
                        state.epoch += 1;
                        tracing::info!(session = %session_id, epoch = state.epoch, "leadership granted");
                    }
                    state.leadership = LeadershipState {
                        enabled: true,
                        leader_session_id: member.session_id.clone(),
                        leader_user_id: member.user_id,
                        leader_username: member.username.clone(),
                        updated_at: Some(chrono::Utc::now().to_rfc3339()),
                    };
                }
                state.broadcast_status()
            }
            SignalingMessage::Claim(_) => {
                if state.is_leader(session_id) {
                    tracing::info!(session = %session_id, "leadership released");
                    state.clear_leadership();
                }
                state.broadcast_status()
            }
            SignalingMessage::Result(_) => {
                if state.is_leader(session_id) {
                    state.broadcast(&envelope);
                } else {
                    state.send_to(
                        session_id,
                        Envelope::error(
                            "AI Live denied",
                            "only the AI Live leader can broadcast results",
                        ),
                    );
                }
                Ok(())
            }
            other => {
                tracing::debug!(?other, "relay ignoring message");
                Ok(())
            }
        }
    }

    /// Current leadership and fencing epoch
    pub fn leadership(&self) -> (LeadershipState, u64) {
        let state = self.state.lock();
        (state.leadership.clone(), state.epoch)
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.state.lock().member(session_id).is_some()
    }
}

/// Client-side sink bound to one relay connection
#[derive(Clone)]
pub struct RelaySink {
    relay: LeaderRelay,
    session_id: String,
}

impl RelaySink {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl SignalingSink for RelaySink {
    async fn send(&self, envelope: Envelope) -> Result<()> {
        self.relay.handle(&self.session_id, envelope)
    }

    fn is_ready(&self) -> bool {
        self.relay.is_connected(&self.session_id)
    }
}
