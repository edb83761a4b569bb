//! Encoded-frame interception
//!
//! The platform media pipeline hands every encoded video frame to a
//! [`FrameTransform`] before packetization (sender side) or after
//! depacketization (receiver side). The transforms here are synchronous and
//! never drop or delay a frame: on any codec failure the original frame is
//! returned untouched.

mod interceptor;

pub use interceptor::{
    FxSync, ReceiverInterceptor, RemoteEffects, RenderListener, SenderInterceptor,
};

use bytes::Bytes;
use std::sync::Arc;

/// Encoded frame type as reported by the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Key,
    Delta,
}

/// One encoded H.264 video frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedVideoFrame {
    pub kind: FrameKind,
    /// Access unit bytes, Annex B or length-prefixed
    pub data: Bytes,
    /// RTP timestamp (90 kHz)
    pub rtp_timestamp: u32,
}

impl EncodedVideoFrame {
    pub fn new(kind: FrameKind, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            data: data.into(),
            rtp_timestamp: 0,
        }
    }

    pub fn is_key(&self) -> bool {
        self.kind == FrameKind::Key
    }
}

/// Per-frame transform registered with the platform pipeline
pub trait FrameTransform: Send + Sync {
    fn transform(&self, frame: EncodedVideoFrame) -> EncodedVideoFrame;
}

/// Wall-clock source in Unix milliseconds
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn wall_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}
