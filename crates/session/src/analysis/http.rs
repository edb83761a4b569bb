//! HTTP/JSON analysis client
//!
//! Endpoints, all `POST` with a JSON body:
//!
//! - `{base}/api/v1/ai/asr`
//! - `{base}/api/v1/ai/synthesis`
//! - `{base}/api/v1/ai/emotion`
//!
//! Responses are accepted either bare or wrapped as `{"data": {...}}`.

use super::{
    AnalysisBackend, EmotionReading, EmotionRequest, SpeechRequest, SynthesisRequest,
    SynthesisVerdict, Transcription,
};
use crate::config::AiLiveConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ASR_PATH: &str = "/api/v1/ai/asr";
const SYNTHESIS_PATH: &str = "/api/v1/ai/synthesis";
const EMOTION_PATH: &str = "/api/v1/ai/emotion";

/// HTTP client for the analysis API
pub struct HttpAnalysisClient {
    /// Base URL (e.g., "https://meet.example.com")
    base_url: String,

    /// Reqwest HTTP client
    client: reqwest::Client,
}

/// Transcription as sent by the service; older builds use `transcription`
#[derive(Debug, Deserialize)]
struct RawTranscription {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    transcription: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

impl From<RawTranscription> for Transcription {
    fn from(raw: RawTranscription) -> Self {
        let text = raw
            .text
            .filter(|t| !t.is_empty())
            .or(raw.transcription)
            .unwrap_or_default();
        Transcription {
            text,
            confidence: raw.confidence,
        }
    }
}

/// Strip an optional `{"data": ...}` wrapper and decode the body.
fn unwrap_data<T: DeserializeOwned>(mut body: serde_json::Value) -> Result<T> {
    let inner = match body.get_mut("data") {
        Some(data) if data.is_object() => data.take(),
        _ => body,
    };
    serde_json::from_value(inner)
        .map_err(|e| Error::Analysis(format!("Failed to parse response: {}", e)))
}

impl HttpAnalysisClient {
    /// Create a new client
    ///
    /// `timeout` bounds each request; the job queue applies its own deadline
    /// on top.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "analysis base_url must start with http:// or https://, got: {}",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Analysis(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    /// Client for `ai_live.analysis_base_url`, each request bounded by
    /// `ai_live.call_timeout_ms`.
    pub fn from_config(config: &AiLiveConfig) -> Result<Self> {
        Self::new(config.analysis_base_url.clone(), config.call_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header("accept", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Analysis(format!(
                "HTTP {} {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
                error_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Analysis(format!("Failed to parse response: {}", e)))?;
        unwrap_data(json)
    }
}

#[async_trait]
impl AnalysisBackend for HttpAnalysisClient {
    async fn transcribe(&self, request: &SpeechRequest) -> Result<Transcription> {
        let raw: RawTranscription = self.post_json(ASR_PATH, request).await?;
        Ok(raw.into())
    }

    async fn detect_synthesis(&self, request: &SynthesisRequest) -> Result<SynthesisVerdict> {
        self.post_json(SYNTHESIS_PATH, request).await
    }

    async fn classify_emotion(&self, request: &EmotionRequest) -> Result<EmotionReading> {
        self.post_json(EMOTION_PATH, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_validation() {
        assert!(HttpAnalysisClient::new("", Duration::from_secs(1)).is_err());
        assert!(HttpAnalysisClient::new("ws://x", Duration::from_secs(1)).is_err());
        let client = HttpAnalysisClient::new("https://meet.example.com/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "https://meet.example.com");
    }

    #[test]
    fn test_wrapped_and_bare_responses() {
        let wrapped: SynthesisVerdict =
            unwrap_data(json!({"code": 0, "data": {"is_synthetic": true, "confidence": 0.8}})).unwrap();
        assert!(wrapped.is_synthetic);
        assert_eq!(wrapped.confidence, Some(0.8));

        let bare: EmotionReading = unwrap_data(json!({"emotion": "happy"})).unwrap();
        assert_eq!(bare.emotion, "happy");
        assert_eq!(bare.confidence, None);
    }

    #[test]
    fn test_transcription_fallback_field() {
        let raw: RawTranscription =
            unwrap_data(json!({"data": {"transcription": "ni hao", "confidence": 0.91}})).unwrap();
        let t = Transcription::from(raw);
        assert_eq!(t.text, "ni hao");
        assert_eq!(t.confidence, Some(0.91));

        let raw: RawTranscription = unwrap_data(json!({"text": "hello", "transcription": "x"})).unwrap();
        assert_eq!(Transcription::from(raw).text, "hello");
    }

    #[test]
    fn test_malformed_response() {
        let result: Result<SynthesisVerdict> = unwrap_data(json!({"is_synthetic": "maybe"}));
        assert!(matches!(result, Err(Error::Analysis(_))));
    }
}
