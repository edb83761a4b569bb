//! Visual-effect parameter model
//!
//! The session owns one [`LocalEffects`] instance; remote tiles keep a cached
//! [`EffectParameters`] refreshed from in-band SEI. Only parameters live
//! here, never pixels. [`RenderParams`] derives what the renderer needs.

mod render;

pub use render::RenderParams;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound of beauty / slim strengths
pub const MAX_STRENGTH: u8 = 100;

/// Beauty preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeautyType {
    #[default]
    Natural,
    Smooth,
    Strong,
    Bright,
    Soft,
}

impl BeautyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BeautyType::Natural => "natural",
            BeautyType::Smooth => "smooth",
            BeautyType::Strong => "strong",
            BeautyType::Bright => "bright",
            BeautyType::Soft => "soft",
        }
    }
}

/// Colour filter preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterName {
    #[default]
    None,
    Warm,
    Cool,
    Gray,
    Vivid,
    Retro,
    Film,
    Soft,
    Cyber,
}

impl FilterName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterName::None => "none",
            FilterName::Warm => "warm",
            FilterName::Cool => "cool",
            FilterName::Gray => "gray",
            FilterName::Vivid => "vivid",
            FilterName::Retro => "retro",
            FilterName::Film => "film",
            FilterName::Soft => "soft",
            FilterName::Cyber => "cyber",
        }
    }
}

/// Error returned when parsing an unknown preset name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPreset(pub String);

impl fmt::Display for UnknownPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown effect preset '{}'", self.0)
    }
}

impl std::error::Error for UnknownPreset {}

impl FromStr for BeautyType {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "natural" => Ok(BeautyType::Natural),
            "smooth" => Ok(BeautyType::Smooth),
            "strong" => Ok(BeautyType::Strong),
            "bright" => Ok(BeautyType::Bright),
            "soft" => Ok(BeautyType::Soft),
            other => Err(UnknownPreset(other.to_string())),
        }
    }
}

impl FromStr for FilterName {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(FilterName::None),
            "warm" => Ok(FilterName::Warm),
            "cool" => Ok(FilterName::Cool),
            "gray" => Ok(FilterName::Gray),
            "vivid" => Ok(FilterName::Vivid),
            "retro" => Ok(FilterName::Retro),
            "film" => Ok(FilterName::Film),
            "soft" => Ok(FilterName::Soft),
            "cyber" => Ok(FilterName::Cyber),
            other => Err(UnknownPreset(other.to_string())),
        }
    }
}

impl fmt::Display for BeautyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for FilterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round a raw strength and clamp it to `0..=100`.
///
/// Non-finite input maps to 0.
pub fn clamp_strength(raw: f64) -> u8 {
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(0.0, MAX_STRENGTH as f64) as u8
}

/// Effect parameters for one video tile
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EffectParameters {
    pub beauty_enabled: bool,
    pub filter_enabled: bool,
    pub beauty_type: BeautyType,
    /// Beauty strength, 0-100
    pub beauty_strength: u8,
    /// Face slimming strength, 0-100
    pub slim_strength: u8,
    pub filter_name: FilterName,
    /// Monotonic version, bumped on every local change
    pub version: u64,
    /// Wall-clock time of the last change in milliseconds
    pub updated_at_ms: i64,
}

impl EffectParameters {
    /// Clamp strengths into range.
    pub fn clamped(mut self) -> Self {
        self.beauty_strength = self.beauty_strength.min(MAX_STRENGTH);
        self.slim_strength = self.slim_strength.min(MAX_STRENGTH);
        self
    }

    /// Whether any visual effect would be applied.
    pub fn is_active(&self) -> bool {
        (self.beauty_enabled && self.beauty_strength > 0)
            || self.slim_strength > 0
            || (self.filter_enabled && self.filter_name != FilterName::None)
    }

    /// Compare the fields carried in-band, ignoring version and timestamp.
    pub fn same_effect(&self, other: &EffectParameters) -> bool {
        self.beauty_enabled == other.beauty_enabled
            && self.filter_enabled == other.filter_enabled
            && self.beauty_type == other.beauty_type
            && self.beauty_strength == other.beauty_strength
            && self.slim_strength == other.slim_strength
            && self.filter_name == other.filter_name
    }
}

/// Partial update of the local effect parameters
///
/// Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectUpdate {
    pub beauty_enabled: Option<bool>,
    pub filter_enabled: Option<bool>,
    pub beauty_type: Option<BeautyType>,
    pub beauty_strength: Option<f64>,
    pub slim_strength: Option<f64>,
    pub filter_name: Option<FilterName>,
}

/// The session-owned local effect parameters
#[derive(Debug, Clone, Default)]
pub struct LocalEffects {
    params: EffectParameters,
}

impl LocalEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current parameters
    pub fn current(&self) -> &EffectParameters {
        &self.params
    }

    /// Current version
    pub fn version(&self) -> u64 {
        self.params.version
    }

    /// Apply a partial update.
    ///
    /// Returns `true` and bumps the version if anything changed.
    pub fn apply(&mut self, update: &EffectUpdate, now_ms: i64) -> bool {
        let p = &mut self.params;
        let mut changed = false;

        if let Some(v) = update.beauty_enabled {
            changed |= std::mem::replace(&mut p.beauty_enabled, v) != v;
        }
        if let Some(v) = update.filter_enabled {
            changed |= std::mem::replace(&mut p.filter_enabled, v) != v;
        }
        if let Some(v) = update.beauty_type {
            changed |= std::mem::replace(&mut p.beauty_type, v) != v;
        }
        if let Some(raw) = update.beauty_strength.filter(|r| r.is_finite()) {
            let v = clamp_strength(raw);
            changed |= std::mem::replace(&mut p.beauty_strength, v) != v;
        }
        if let Some(raw) = update.slim_strength.filter(|r| r.is_finite()) {
            let v = clamp_strength(raw);
            changed |= std::mem::replace(&mut p.slim_strength, v) != v;
        }
        if let Some(v) = update.filter_name {
            changed |= std::mem::replace(&mut p.filter_name, v) != v;
        }

        if changed {
            p.version += 1;
            p.updated_at_ms = now_ms;
            tracing::debug!(version = p.version, "local effect parameters changed");
        }
        changed
    }

    /// Drop back to defaults, keeping the version monotonic.
    pub fn reset(&mut self, now_ms: i64) {
        let version = self.params.version + 1;
        self.params = EffectParameters {
            version,
            updated_at_ms: now_ms,
            ..Default::default()
        };
    }
}
