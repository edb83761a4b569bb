//! Analysis backend
//!
//! Three calls per captured segment: speech-to-text and voice authenticity on
//! the audio, sentiment on the transcribed text.

mod http;

pub use http::HttpAnalysisClient;

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Speech-to-text request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SpeechRequest {
    /// Base64 WAV
    pub audio_data: String,
    pub format: String,
    pub sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<u64>,
}

/// Voice-authenticity request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SynthesisRequest {
    pub audio_data: String,
    pub format: String,
    pub sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<u64>,
}

/// Sentiment request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmotionRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SynthesisVerdict {
    #[serde(default)]
    pub is_synthetic: bool,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct EmotionReading {
    #[serde(default)]
    pub emotion: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Remote analysis service
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn transcribe(&self, request: &SpeechRequest) -> Result<Transcription>;

    async fn detect_synthesis(&self, request: &SynthesisRequest) -> Result<SynthesisVerdict>;

    async fn classify_emotion(&self, request: &EmotionRequest) -> Result<EmotionReading>;
}

/// Run `fut` with a deadline, mapping expiry to [`Error::Timeout`].
pub async fn with_deadline<T, F>(what: &str, deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "{} exceeded {} ms",
            what,
            deadline.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_request_body() {
        let req = SpeechRequest {
            audio_data: "UklGRg==".into(),
            format: "wav".into(),
            sample_rate: 16_000,
            language: Some("zh".into()),
            meeting_id: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["format"], "wav");
        assert_eq!(json["sample_rate"], 16_000);
        assert_eq!(json["language"], "zh");
        assert!(json.get("meeting_id").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok::<_, Error>(())
        };
        let result = with_deadline("asr", Duration::from_secs(60), slow).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_deadline_passes_result() {
        let result = with_deadline("asr", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
