//! Sender/receiver interceptors and their per-session registry

use super::{Clock, EncodedVideoFrame, FrameKind, FrameTransform};
use crate::config::FxConfig;
use bytes::Bytes;
use meetlive_core::codec::{build_sei_unit, extract_from_frame, inject_into_frame};
use meetlive_core::fx::{EffectParameters, EffectUpdate, LocalEffects, RenderParams};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Called with `(tile_id, params)` whenever a tile's effects are refreshed
pub type RenderListener = Arc<dyn Fn(&str, RenderParams) + Send + Sync>;

#[derive(Debug, Default)]
struct InjectState {
    last_version: Option<u64>,
    last_at_ms: i64,
}

/// Embeds the local effect parameters into outgoing frames
pub struct SenderInterceptor {
    local: Arc<RwLock<LocalEffects>>,
    refresh_ms: i64,
    clock: Clock,
    state: Mutex<InjectState>,
}

impl SenderInterceptor {
    fn should_inject(&self, kind: FrameKind, version: u64, now_ms: i64, state: &InjectState) -> bool {
        if state.last_version != Some(version) {
            return true;
        }
        kind == FrameKind::Key && now_ms - state.last_at_ms >= self.refresh_ms
    }

    /// Version carried by the last injected SEI, if any
    pub fn last_injected_version(&self) -> Option<u64> {
        self.state.lock().last_version
    }
}

impl FrameTransform for SenderInterceptor {
    fn transform(&self, mut frame: EncodedVideoFrame) -> EncodedVideoFrame {
        let now_ms = (self.clock)();
        let params = self.local.read().current().clone();

        let mut state = self.state.lock();
        if !self.should_inject(frame.kind, params.version, now_ms, &state) {
            return frame;
        }

        match inject_into_frame(&frame.data, &build_sei_unit(&params)) {
            Some(out) => {
                frame.data = Bytes::from(out);
                state.last_version = Some(params.version);
                state.last_at_ms = now_ms;
            }
            None => {
                tracing::debug!(
                    len = frame.data.len(),
                    "unrecognized frame container, passing through"
                );
            }
        }
        frame
    }
}

/// Cached effect parameters of remote tiles
#[derive(Default)]
pub struct RemoteEffects {
    tiles: Mutex<HashMap<String, EffectParameters>>,
    listener: RwLock<Option<RenderListener>>,
}

impl RemoteEffects {
    pub fn get(&self, tile_id: &str) -> Option<EffectParameters> {
        self.tiles.lock().get(tile_id).cloned()
    }

    /// Store decoded parameters, bumping the tile's own version.
    fn update(&self, tile_id: &str, mut params: EffectParameters, now_ms: i64) -> EffectParameters {
        let mut tiles = self.tiles.lock();
        params.version = tiles.get(tile_id).map(|p| p.version + 1).unwrap_or(1);
        if params.updated_at_ms == 0 {
            params.updated_at_ms = now_ms;
        }
        tiles.insert(tile_id.to_string(), params.clone());
        params
    }

    fn remove(&self, tile_id: &str) -> bool {
        self.tiles.lock().remove(tile_id).is_some()
    }

    fn notify(&self, tile_id: &str, params: &EffectParameters) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener(tile_id, RenderParams::from(params));
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.lock().is_empty()
    }
}

/// Recovers remote effect parameters from incoming frames of one tile
pub struct ReceiverInterceptor {
    tile_id: String,
    remote: Arc<RemoteEffects>,
    clock: Clock,
}

impl ReceiverInterceptor {
    pub fn tile_id(&self) -> &str {
        &self.tile_id
    }
}

impl FrameTransform for ReceiverInterceptor {
    fn transform(&self, frame: EncodedVideoFrame) -> EncodedVideoFrame {
        if let Some(params) = extract_from_frame(&frame.data) {
            let stored = self.remote.update(&self.tile_id, params, (self.clock)());
            self.remote.notify(&self.tile_id, &stored);
        }
        frame
    }
}

/// Per-session effect synchronization state
///
/// Owns the local parameters, the single sender interceptor and one receiver
/// interceptor per remote tile. Attaching is idempotent.
pub struct FxSync {
    config: FxConfig,
    clock: Clock,
    local: Arc<RwLock<LocalEffects>>,
    remote: Arc<RemoteEffects>,
    sender: Option<Arc<SenderInterceptor>>,
    receivers: HashMap<String, Arc<ReceiverInterceptor>>,
    unsupported_reported: bool,
}

impl FxSync {
    pub fn new(config: FxConfig, clock: Clock) -> Self {
        Self {
            config,
            clock,
            local: Arc::new(RwLock::new(LocalEffects::new())),
            remote: Arc::new(RemoteEffects::default()),
            sender: None,
            receivers: HashMap::new(),
            unsupported_reported: false,
        }
    }

    /// Whether encoded-frame transforms can be attached at all
    pub fn is_supported(&self) -> bool {
        self.config.encoded_transforms
    }

    fn check_supported(&mut self) -> bool {
        if self.config.encoded_transforms {
            return true;
        }
        if !self.unsupported_reported {
            self.unsupported_reported = true;
            tracing::warn!("encoded frame transforms unavailable, effect metadata disabled");
        }
        false
    }

    /// Sender interceptor for the outgoing video pipeline.
    ///
    /// Returns the existing interceptor on repeated calls and `None` when
    /// transforms are unsupported.
    pub fn attach_sender(&mut self) -> Option<Arc<SenderInterceptor>> {
        if !self.check_supported() {
            return None;
        }
        if let Some(sender) = &self.sender {
            return Some(sender.clone());
        }
        let sender = Arc::new(SenderInterceptor {
            local: self.local.clone(),
            refresh_ms: self.config.keyframe_refresh_ms as i64,
            clock: self.clock.clone(),
            state: Mutex::new(InjectState::default()),
        });
        tracing::info!("effect metadata sender attached");
        self.sender = Some(sender.clone());
        Some(sender)
    }

    /// Receiver interceptor for one remote tile.
    pub fn attach_receiver(&mut self, tile_id: &str) -> Option<Arc<ReceiverInterceptor>> {
        if !self.check_supported() || tile_id.is_empty() {
            return None;
        }
        if let Some(existing) = self.receivers.get(tile_id) {
            return Some(existing.clone());
        }
        let receiver = Arc::new(ReceiverInterceptor {
            tile_id: tile_id.to_string(),
            remote: self.remote.clone(),
            clock: self.clock.clone(),
        });
        tracing::debug!(tile = tile_id, "effect metadata receiver attached");
        self.receivers.insert(tile_id.to_string(), receiver.clone());
        Some(receiver)
    }

    /// Forget a tile: drop its receiver and cached parameters.
    pub fn detach_receiver(&mut self, tile_id: &str) -> bool {
        let had_receiver = self.receivers.remove(tile_id).is_some();
        let had_cache = self.remote.remove(tile_id);
        had_receiver || had_cache
    }

    pub fn set_render_listener(&self, listener: RenderListener) {
        *self.remote.listener.write() = Some(listener);
    }

    /// Apply a local effect change; returns whether anything changed.
    pub fn update_local(&self, update: &EffectUpdate) -> bool {
        let now_ms = (self.clock)();
        self.local.write().apply(update, now_ms)
    }

    pub fn local(&self) -> EffectParameters {
        self.local.read().current().clone()
    }

    /// Render parameters for the local preview
    pub fn local_render(&self) -> RenderParams {
        RenderParams::from(self.local.read().current())
    }

    pub fn remote(&self, tile_id: &str) -> Option<EffectParameters> {
        self.remote.get(tile_id)
    }

    pub fn remote_effects(&self) -> &Arc<RemoteEffects> {
        &self.remote
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers.len()
    }

    /// Drop every interceptor and cached parameter.
    ///
    /// Interceptors already handed to the platform keep working on the old
    /// state; the local version stays monotonic.
    pub fn reset(&mut self) {
        let now_ms = (self.clock)();
        self.local.write().reset(now_ms);
        self.sender = None;
        self.receivers.clear();
        self.remote.tiles.lock().clear();
        *self.remote.listener.write() = None;
        self.unsupported_reported = false;
    }
}
