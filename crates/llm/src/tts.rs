//! Text-to-speech backend.

use async_trait::async_trait;
use podsmith_common::{PodsmithError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// One synthesis request. `input` is always a single sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub model: String,
    pub voice: String,
    pub input: String,
    pub speed: f32,
    pub format: String,
}

#[async_trait]
pub trait SpeechClient: Send + Sync {
    /// Synthesize one utterance and return the encoded audio bytes.
    async fn speak(&self, request: SpeechRequest) -> Result<Vec<u8>>;
}

#[derive(Serialize)]
struct SpeechWireRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    speed: f32,
    response_format: &'a str,
}

pub struct HttpSpeechClient {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpSpeechClient {
    pub fn new(base_url: Option<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }
}

#[async_trait]
impl SpeechClient for HttpSpeechClient {
    async fn speak(&self, request: SpeechRequest) -> Result<Vec<u8>> {
        let url = format!("{}/v1/audio/speech", self.base_url);
        let body = SpeechWireRequest {
            model: &request.model,
            voice: &request.voice,
            input: &request.input,
            speed: request.speed,
            response_format: &request.format,
        };

        let mut http_req = self.http_client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| PodsmithError::Backend(format!("Speech request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(PodsmithError::Backend(format!(
                "Speech API error {status}: {body_text}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PodsmithError::Backend(format!("Failed to read speech bytes: {e}")))?;

        if bytes.is_empty() {
            return Err(PodsmithError::Backend(
                "Speech API returned empty audio".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_request_uses_response_format_field() {
        let request = SpeechRequest {
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            input: "Hello there.".to_string(),
            speed: 1.0,
            format: "mp3".to_string(),
        };
        let body = SpeechWireRequest {
            model: &request.model,
            voice: &request.voice,
            input: &request.input,
            speed: request.speed,
            response_format: &request.format,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "tts-1");
        assert_eq!(json["voice"], "alloy");
        assert_eq!(json["response_format"], "mp3");
        assert_eq!(json["speed"], 1.0);
        assert!(json.get("format").is_none());
    }

    #[test]
    fn speech_request_roundtrip() {
        let request = SpeechRequest {
            model: "tts-1".to_string(),
            voice: "echo".to_string(),
            input: "One sentence.".to_string(),
            speed: 1.0,
            format: "mp3".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();
        let deserialized: SpeechRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.voice, "echo");
        assert_eq!(deserialized.input, "One sentence.");
    }
}
