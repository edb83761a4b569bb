//! Signaling envelope and AI-Live payload types
//!
//! Every message on the signaling channel is a JSON envelope:
//!
//! ```json
//! {"id": "...", "type": 15, "peer_id": "...", "payload": {...}, "timestamp": "..."}
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Numeric envelope types used by this client
pub mod message_type {
    pub const ERROR: u32 = 13;
    pub const ROOM_INFO: u32 = 14;
    pub const AI_LIVE_CLAIM: u32 = 15;
    pub const AI_LIVE_STATUS: u32 = 16;
    pub const AI_LIVE_RESULT: u32 = 17;
}

/// Signaling envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: u32,

    #[serde(default)]
    pub peer_id: String,

    #[serde(default)]
    pub payload: serde_json::Value,

    /// RFC 3339 send time
    #[serde(default)]
    pub timestamp: String,
}

/// `AI_LIVE_CLAIM` payload; `enable: false` is a release
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimPayload {
    pub enable: bool,
}

/// `AI_LIVE_STATUS` payload: the meeting-wide leadership state
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeadershipState {
    #[serde(default)]
    pub enabled: bool,

    /// Empty when nobody leads
    #[serde(default)]
    pub leader_session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_user_id: Option<u64>,

    #[serde(default)]
    pub leader_username: String,

    /// Relay bookkeeping, ignored by clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl LeadershipState {
    pub fn has_leader(&self) -> bool {
        self.enabled && !self.leader_session_id.is_empty()
    }

    /// Human-readable leader name for status lines
    pub fn leader_label(&self) -> String {
        if !self.leader_username.is_empty() {
            return self.leader_username.clone();
        }
        match self.leader_user_id {
            Some(id) => format!("user_{}", id),
            None => "another participant".to_string(),
        }
    }
}

/// Severity of a result tag
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    #[default]
    Info,
    Ok,
    Warn,
    Error,
}

/// Short annotation attached to a transcript line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultTag {
    pub text: String,
    #[serde(default)]
    pub kind: TagKind,
}

impl ResultTag {
    pub fn new(text: impl Into<String>, kind: TagKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// `AI_LIVE_RESULT` payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultPayload {
    pub line_id: String,

    #[serde(default)]
    pub speaker_key: String,

    #[serde(default)]
    pub speaker_label: String,

    #[serde(default)]
    pub timestamp_ms: i64,

    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub tags: Vec<ResultTag>,
}

/// One participant as listed in `ROOM_INFO`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,

    #[serde(default)]
    pub is_self: bool,
}

/// `ROOM_INFO` payload sent by the relay after joining
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomInfo {
    #[serde(default)]
    pub session_id: String,

    #[serde(default)]
    pub participants: Vec<Participant>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_live: Option<LeadershipState>,
}

/// `ERROR` payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub details: String,
}

/// Decoded envelope payload
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingMessage {
    Claim(ClaimPayload),
    Status(LeadershipState),
    Result(ResultPayload),
    RoomInfo(RoomInfo),
    Error(ErrorPayload),
    /// Any type this client does not handle
    Other(u32),
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn envelope_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4())
}

impl Envelope {
    fn build(id_prefix: &str, kind: u32, peer_id: &str, payload: serde_json::Value) -> Self {
        Self {
            id: envelope_id(id_prefix),
            kind,
            peer_id: peer_id.to_string(),
            payload,
            timestamp: now_rfc3339(),
        }
    }

    /// Request leadership
    pub fn claim(peer_id: &str) -> Self {
        Self::build(
            "ai_live_claim",
            message_type::AI_LIVE_CLAIM,
            peer_id,
            serde_json::json!({ "enable": true }),
        )
    }

    /// Give up leadership
    pub fn release(peer_id: &str) -> Self {
        Self::build(
            "ai_live_release",
            message_type::AI_LIVE_CLAIM,
            peer_id,
            serde_json::json!({ "enable": false }),
        )
    }

    pub fn result(peer_id: &str, payload: &ResultPayload) -> Result<Self> {
        Ok(Self::build(
            "ai_live_result",
            message_type::AI_LIVE_RESULT,
            peer_id,
            serde_json::to_value(payload)?,
        ))
    }

    pub fn status(state: &LeadershipState) -> Result<Self> {
        Ok(Self::build(
            "ai_live_status",
            message_type::AI_LIVE_STATUS,
            "",
            serde_json::to_value(state)?,
        ))
    }

    pub fn room_info(info: &RoomInfo) -> Result<Self> {
        Ok(Self::build(
            "room_info",
            message_type::ROOM_INFO,
            "",
            serde_json::to_value(info)?,
        ))
    }

    pub fn error(message: &str, details: &str) -> Self {
        Self::build(
            "error",
            message_type::ERROR,
            "",
            serde_json::json!({ "message": message, "details": details }),
        )
    }

    /// Parse an envelope from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::ProtocolError(format!("bad envelope: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the payload according to the envelope type.
    ///
    /// A claim without a readable `enable` flag counts as a claim.
    pub fn decode(&self) -> Result<SignalingMessage> {
        let payload = self.payload.clone();
        let decode_err = |e: serde_json::Error| {
            Error::ProtocolError(format!("type {} payload: {}", self.kind, e))
        };

        Ok(match self.kind {
            message_type::AI_LIVE_CLAIM => {
                let enable = payload
                    .get("enable")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true);
                SignalingMessage::Claim(ClaimPayload { enable })
            }
            message_type::AI_LIVE_STATUS => {
                SignalingMessage::Status(serde_json::from_value(payload).map_err(decode_err)?)
            }
            message_type::AI_LIVE_RESULT => {
                SignalingMessage::Result(serde_json::from_value(payload).map_err(decode_err)?)
            }
            message_type::ROOM_INFO => {
                SignalingMessage::RoomInfo(serde_json::from_value(payload).map_err(decode_err)?)
            }
            message_type::ERROR => {
                SignalingMessage::Error(serde_json::from_value(payload).map_err(decode_err)?)
            }
            other => SignalingMessage::Other(other),
        })
    }
}
