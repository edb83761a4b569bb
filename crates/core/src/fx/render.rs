//! Render-parameter derivation
//!
//! Maps effect parameters onto the values the tile renderer consumes: a
//! soften pass (blur radius + brightness lift scaled by beauty strength) and
//! a tone filter chosen by the filter preset.

use super::{BeautyType, EffectParameters, FilterName};
use serde::{Deserialize, Serialize};

/// Parameters handed to the renderer on refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderParams {
    /// Soften blur radius in pixels (0 = no soften pass)
    pub blur_px: f32,
    /// Brightness multiplier (1.0 = unchanged)
    pub brightness: f32,
    /// Tone filter applied after softening
    pub tone: FilterName,
    /// Face slimming strength, 0-100
    pub slim_strength: u8,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            blur_px: 0.0,
            brightness: 1.0,
            tone: FilterName::None,
            slim_strength: 0,
        }
    }
}

/// (max blur px, max brightness lift) at strength 100
fn soften_limits(beauty_type: BeautyType) -> (f32, f32) {
    match beauty_type {
        BeautyType::Natural => (0.9, 0.06),
        BeautyType::Smooth => (1.4, 0.08),
        BeautyType::Strong => (2.2, 0.10),
        BeautyType::Bright => (0.8, 0.12),
        BeautyType::Soft => (1.2, 0.09),
    }
}

fn tone_css(tone: FilterName) -> &'static str {
    match tone {
        FilterName::None => "",
        FilterName::Warm => "sepia(0.22) saturate(1.25) hue-rotate(-8deg)",
        FilterName::Cool => "saturate(1.15) hue-rotate(12deg)",
        FilterName::Gray => "grayscale(1)",
        FilterName::Vivid => "contrast(1.12) saturate(1.45)",
        FilterName::Retro => "sepia(0.38) contrast(1.05) saturate(0.85)",
        FilterName::Film => "contrast(1.08) saturate(0.9) brightness(0.98)",
        FilterName::Soft => "blur(0.6px) saturate(1.1)",
        FilterName::Cyber => "contrast(1.25) saturate(1.35) hue-rotate(18deg)",
    }
}

impl From<&EffectParameters> for RenderParams {
    fn from(fx: &EffectParameters) -> Self {
        let beauty = if fx.beauty_enabled {
            fx.beauty_strength.min(100) as f32 / 100.0
        } else {
            0.0
        };
        let (blur_max, brighten_max) = soften_limits(fx.beauty_type);
        let tone = if fx.filter_enabled {
            fx.filter_name
        } else {
            FilterName::None
        };

        Self {
            blur_px: beauty * blur_max,
            brightness: 1.0 + beauty * brighten_max,
            tone,
            slim_strength: fx.slim_strength.min(100),
        }
    }
}

impl RenderParams {
    /// Whether the soften pass does anything
    pub fn has_soften(&self) -> bool {
        self.blur_px > 0.0
    }

    /// CSS filter string equivalent of these parameters ("" when idle)
    pub fn css_filter(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(2);
        if self.has_soften() {
            parts.push(format!(
                "blur({:.2}px) brightness({:.3})",
                self.blur_px, self.brightness
            ));
        }
        let tone = tone_css(self.tone);
        if !tone.is_empty() {
            parts.push(tone.to_string());
        }
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_parameters_render_nothing() {
        let params = RenderParams::from(&EffectParameters::default());
        assert_eq!(params, RenderParams::default());
        assert_eq!(params.css_filter(), "");
    }

    #[test]
    fn test_disabled_effects_contribute_nothing() {
        let fx = EffectParameters {
            beauty_enabled: false,
            beauty_strength: 80,
            filter_enabled: false,
            filter_name: FilterName::Vivid,
            ..Default::default()
        };
        assert_eq!(RenderParams::from(&fx).css_filter(), "");
    }

    #[test]
    fn test_strong_beauty_with_warm_tone() {
        let fx = EffectParameters {
            beauty_enabled: true,
            beauty_type: BeautyType::Strong,
            beauty_strength: 50,
            filter_enabled: true,
            filter_name: FilterName::Warm,
            ..Default::default()
        };
        let params = RenderParams::from(&fx);
        assert!((params.blur_px - 1.1).abs() < 1e-6);
        assert!((params.brightness - 1.05).abs() < 1e-6);
        assert_eq!(
            params.css_filter(),
            "blur(1.10px) brightness(1.050) sepia(0.22) saturate(1.25) hue-rotate(-8deg)"
        );
    }
}
