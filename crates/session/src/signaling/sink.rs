//! Outbound signaling

use super::protocol::Envelope;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outbound half of the signaling channel
#[async_trait]
pub trait SignalingSink: Send + Sync {
    /// Deliver one envelope to the relay
    async fn send(&self, envelope: Envelope) -> Result<()>;

    /// Whether the channel is connected
    fn is_ready(&self) -> bool;
}

/// Sink that forwards envelopes into an mpsc channel
///
/// The receiving end is typically the websocket writer task.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SignalingSink for ChannelSink {
    async fn send(&self, envelope: Envelope) -> Result<()> {
        self.tx
            .send(envelope)
            .map_err(|_| Error::SignalingError("signaling channel closed".to_string()))
    }

    fn is_ready(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Send without waiting; failures are logged and dropped.
///
/// Claims, releases and results are all idempotent, so a lost send is only
/// ever a missed update.
pub fn send_detached(sink: &Arc<dyn SignalingSink>, envelope: Envelope) {
    let sink = sink.clone();
    tokio::spawn(async move {
        let id = envelope.id.clone();
        if let Err(e) = sink.send(envelope).await {
            tracing::warn!(envelope = %id, error = %e, "signaling send failed");
        }
    });
}
