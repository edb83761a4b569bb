//! Configuration types for the meeting session

use crate::{Error, Result};
use meetlive_core::vad::SegmenterConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level session configuration
///
/// Every section is optional in TOML; missing keys take their defaults.
///
/// ```toml
/// [fx]
/// encoded_transforms = true
///
/// [ai_live]
/// analysis_base_url = "https://meet.example.com"
/// sentiment = false
///
/// [segmenter]
/// silence_ms = 900
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub fx: FxConfig,

    #[serde(default)]
    pub ai_live: AiLiveConfig,

    #[serde(default)]
    pub segmenter: SegmenterConfig,
}

/// In-band effect metadata settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxConfig {
    /// Whether the platform exposes encoded-frame transforms
    #[serde(default = "default_true")]
    pub encoded_transforms: bool,

    /// Re-inject unchanged parameters on key frames after this long
    #[serde(default = "default_keyframe_refresh_ms")]
    pub keyframe_refresh_ms: u64,
}

/// AI-Live analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiLiveConfig {
    /// Base URL of the analysis API (http:// or https://)
    #[serde(default = "default_analysis_base_url")]
    pub analysis_base_url: String,

    #[serde(default = "default_true")]
    pub speech_to_text: bool,

    #[serde(default = "default_true")]
    pub voice_authenticity: bool,

    /// Only effective together with `speech_to_text`
    #[serde(default = "default_true")]
    pub sentiment: bool,

    /// Speech-to-text language hint
    #[serde(default = "default_language")]
    pub language: Option<String>,

    /// Deadline for each analysis call
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    #[serde(default = "default_claim_backoff_min_ms")]
    pub claim_backoff_min_ms: u64,

    #[serde(default = "default_claim_backoff_max_ms")]
    pub claim_backoff_max_ms: u64,

    /// Sample rate segments are resampled to before upload
    #[serde(default = "default_target_sample_rate")]
    pub target_sample_rate: u32,
}

fn default_true() -> bool {
    true
}

fn default_keyframe_refresh_ms() -> u64 {
    1500
}

fn default_analysis_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_language() -> Option<String> {
    Some("zh".to_string())
}

fn default_call_timeout_ms() -> u64 {
    60_000
}

fn default_claim_backoff_min_ms() -> u64 {
    250
}

fn default_claim_backoff_max_ms() -> u64 {
    700
}

fn default_target_sample_rate() -> u32 {
    meetlive_core::audio::TARGET_SAMPLE_RATE
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            encoded_transforms: true,
            keyframe_refresh_ms: default_keyframe_refresh_ms(),
        }
    }
}

impl Default for AiLiveConfig {
    fn default() -> Self {
        Self {
            analysis_base_url: default_analysis_base_url(),
            speech_to_text: true,
            voice_authenticity: true,
            sentiment: true,
            language: default_language(),
            call_timeout_ms: default_call_timeout_ms(),
            claim_backoff_min_ms: default_claim_backoff_min_ms(),
            claim_backoff_max_ms: default_claim_backoff_max_ms(),
            target_sample_rate: default_target_sample_rate(),
        }
    }
}

impl AiLiveConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Sentiment runs on transcribed text, so it needs speech-to-text.
    pub fn sentiment_effective(&self) -> bool {
        self.sentiment && self.speech_to_text
    }
}

impl SessionConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SessionConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.fx.keyframe_refresh_ms == 0 {
            return Err(Error::InvalidConfig(
                "fx.keyframe_refresh_ms must be greater than zero".to_string(),
            ));
        }

        let ai = &self.ai_live;
        if !ai.analysis_base_url.starts_with("http://")
            && !ai.analysis_base_url.starts_with("https://")
        {
            return Err(Error::InvalidConfig(format!(
                "ai_live.analysis_base_url must start with http:// or https://, got {}",
                ai.analysis_base_url
            )));
        }

        if ai.call_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "ai_live.call_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if ai.claim_backoff_min_ms > ai.claim_backoff_max_ms {
            return Err(Error::InvalidConfig(format!(
                "ai_live.claim_backoff_min_ms ({}) exceeds claim_backoff_max_ms ({})",
                ai.claim_backoff_min_ms, ai.claim_backoff_max_ms
            )));
        }

        if ai.target_sample_rate == 0 {
            return Err(Error::InvalidConfig(
                "ai_live.target_sample_rate must be greater than zero".to_string(),
            ));
        }

        self.segmenter
            .validate()
            .map_err(|e| Error::InvalidConfig(format!("segmenter: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ai_live.call_timeout(), Duration::from_secs(60));
        assert_eq!(config.segmenter.tick_ms, 180);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = SessionConfig::from_toml_str("").unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = SessionConfig::from_toml_str(
            r#"
            [ai_live]
            analysis_base_url = "https://meet.example.com"
            sentiment = false

            [segmenter]
            silence_ms = 900
            "#,
        )
        .unwrap();

        assert_eq!(config.ai_live.analysis_base_url, "https://meet.example.com");
        assert!(!config.ai_live.sentiment);
        assert!(config.ai_live.speech_to_text);
        assert_eq!(config.segmenter.silence_ms, 900);
        assert_eq!(config.segmenter.tick_ms, 180);
        assert_eq!(config.fx.keyframe_refresh_ms, 1500);
    }

    #[test]
    fn test_sentiment_requires_speech_to_text() {
        let mut config = AiLiveConfig::default();
        assert!(config.sentiment_effective());
        config.speech_to_text = false;
        assert!(!config.sentiment_effective());
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = SessionConfig::default();
        config.ai_live.analysis_base_url = "ftp://nope".to_string();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = SessionConfig::default();
        config.ai_live.claim_backoff_min_ms = 900;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.segmenter.tick_ms = 0;
        assert!(config.validate().is_err());

        assert!(SessionConfig::from_toml_str("[fx]\nencoded_transforms = 3").is_err());
    }

    #[test]
    fn test_analysis_client_from_config() {
        let config = SessionConfig::from_toml_str(
            r#"
            [ai_live]
            analysis_base_url = "https://meet.example.com/"
            call_timeout_ms = 15000
            "#,
        )
        .unwrap();

        let client = crate::analysis::HttpAnalysisClient::from_config(&config.ai_live).unwrap();
        assert_eq!(client.base_url(), "https://meet.example.com");

        let mut bad = AiLiveConfig::default();
        bad.analysis_base_url = "meet.example.com".to_string();
        assert!(crate::analysis::HttpAnalysisClient::from_config(&bad).is_err());
    }
}
