use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use podsmith_common::{PodsmithError, Result};
use serde::{Deserialize, Serialize};

use crate::assistant::{AssistantClient, AssistantConfig};
use crate::client::{LlmClient, LlmRequest, LlmResponse};
use crate::openai::ChatCompletionClient;
use crate::retry::{RetryConfig, RetryingClient};
use crate::tts::{HttpSpeechClient, SpeechClient};

/// Configuration for both model backends and the speech backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Model for the generic chat backend
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Shared API key; falls back to `OPENAI_API_KEY` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Assistant-run polling knobs; the key and URL are shared with chat
    #[serde(default = "default_poll_interval_ms")]
    pub assistant_poll_interval_ms: u64,
    #[serde(default = "default_run_timeout_secs")]
    pub assistant_run_timeout_secs: u64,
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    8
}

fn default_poll_interval_ms() -> u64 {
    750
}

fn default_run_timeout_secs() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            api_key: None,
            api_url: None,
            timeout_secs: default_timeout_secs(),
            max_concurrent_requests: default_max_concurrent(),
            retry: RetryConfig::default(),
            assistant_poll_interval_ms: default_poll_interval_ms(),
            assistant_run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

impl BackendConfig {
    /// The configured key, or the process environment's.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

/// Caps in-flight requests against the model backend.
pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl SemaphoredClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent)),
        }
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| PodsmithError::Internal(format!("Semaphore acquire failed: {e}")))?;
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Build the generic chat backend: base client, retry layer, concurrency cap.
pub fn build_chat_client(config: &BackendConfig) -> Arc<dyn LlmClient> {
    let base = ChatCompletionClient::new(
        config.api_url.clone(),
        config.chat_model.clone(),
        config.resolved_api_key(),
        Duration::from_secs(config.timeout_secs),
    );
    let retrying: Box<dyn LlmClient> = Box::new(RetryingClient::new(base, config.retry.clone()));
    Arc::new(SemaphoredClient::new(
        Arc::from(retrying),
        config.max_concurrent_requests,
    ))
}

/// Build the remote assistant backend, if a key is available.
pub fn build_assistant_client(config: &BackendConfig) -> Option<Arc<AssistantClient>> {
    let api_key = config.resolved_api_key()?;
    Some(Arc::new(AssistantClient::new(AssistantConfig {
        api_key,
        api_url: config.api_url.clone(),
        poll_interval_ms: config.assistant_poll_interval_ms,
        run_timeout_secs: config.assistant_run_timeout_secs,
    })))
}

/// Build the speech backend.
pub fn build_speech_client(config: &BackendConfig) -> Arc<dyn SpeechClient> {
    Arc::new(HttpSpeechClient::new(
        config.api_url.clone(),
        config.resolved_api_key(),
        Duration::from_secs(config.timeout_secs),
    ))
}
