//! Remote assistant backend.
//!
//! The preferred backend when a pipeline role has a remote assistant id
//! configured. One call follows the thread protocol: create a thread, append
//! the user message, create a run, poll it to a terminal status, then read
//! the newest assistant message. A run that terminates in `failed`,
//! `cancelled`, or `expired` is a soft failure: the caller is expected to
//! fall back to the generic chat backend.

use podsmith_common::{PodsmithError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::LlmResponse;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Outcome of one assistant run.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run completed and produced an assistant reply.
    Completed(LlmResponse),
    /// The run reached a non-completed terminal status. Soft failure.
    Failed(String),
}

#[derive(Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Deserialize)]
struct RunObject {
    id: String,
    status: String,
    #[serde(default)]
    last_error: Option<RunError>,
    #[serde(default)]
    usage: Option<RunUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct RunError {
    message: String,
}

#[derive(Deserialize)]
struct RunUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Deserialize)]
struct MessageObject {
    role: String,
    content: Vec<MessageContent>,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<MessageText>,
}

#[derive(Deserialize)]
struct MessageText {
    value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Poll interval while a run is in flight
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Give up on a run after this long
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    750
}

fn default_run_timeout_secs() -> u64 {
    120
}

pub struct AssistantClient {
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    run_timeout: Duration,
    http_client: reqwest::Client,
}

impl AssistantClient {
    pub fn new(config: AssistantConfig) -> Self {
        Self {
            base_url: config
                .api_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: config.api_key,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            run_timeout: Duration::from_secs(config.run_timeout_secs),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
    }

    /// Probe whether the assistant service answers at all.
    pub async fn is_available(&self) -> bool {
        match self
            .request(reqwest::Method::GET, "/v1/assistants?limit=1")
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Assistant availability probe failed");
                false
            }
        }
    }

    /// Run one exchange against a remote assistant.
    ///
    /// Hard errors (transport, timeout, unexpected payload) are `Err`; a run
    /// that ends in a non-completed terminal status is `Ok(Failed)`.
    pub async fn run(
        &self,
        assistant_id: &str,
        instructions: Option<&str>,
        content: &str,
    ) -> Result<RunOutcome> {
        let thread_id = self.create_thread().await?;
        self.append_message(&thread_id, content).await?;
        let run = self.create_run(&thread_id, assistant_id, instructions).await?;
        let run = self.wait_for_run(&thread_id, run).await?;

        if run.status != "completed" {
            let reason = run
                .last_error
                .map(|e| e.message)
                .unwrap_or_else(|| format!("run ended with status {}", run.status));
            warn!(assistant_id, status = %run.status, "Assistant run did not complete");
            return Ok(RunOutcome::Failed(reason));
        }

        let content = self.read_reply(&thread_id).await?;
        Ok(RunOutcome::Completed(LlmResponse {
            content,
            model: run.model.unwrap_or_else(|| assistant_id.to_string()),
            usage: run.usage.map(|u| crate::client::TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
            finish_reason: Some("stop".to_string()),
        }))
    }

    async fn create_thread(&self) -> Result<String> {
        let response = self
            .request(reqwest::Method::POST, "/v1/threads")
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| PodsmithError::Backend(format!("Thread create failed: {e}")))?;
        let thread: ThreadObject = Self::parse(response, "thread").await?;
        Ok(thread.id)
    }

    async fn append_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/v1/threads/{thread_id}/messages"),
            )
            .json(&json!({ "role": "user", "content": content }))
            .send()
            .await
            .map_err(|e| PodsmithError::Backend(format!("Message create failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PodsmithError::Backend(format!(
                "Assistant API error {status}: {body}"
            )));
        }
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: Option<&str>,
    ) -> Result<RunObject> {
        let mut body = json!({ "assistant_id": assistant_id });
        if let Some(instructions) = instructions {
            body["additional_instructions"] = json!(instructions);
        }
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/v1/threads/{thread_id}/runs"),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| PodsmithError::Backend(format!("Run create failed: {e}")))?;
        Self::parse(response, "run").await
    }

    async fn wait_for_run(&self, thread_id: &str, mut run: RunObject) -> Result<RunObject> {
        let started = std::time::Instant::now();
        while matches!(run.status.as_str(), "queued" | "in_progress" | "cancelling") {
            if started.elapsed() > self.run_timeout {
                return Err(PodsmithError::Backend(format!(
                    "Assistant run {} timed out after {:?}",
                    run.id, self.run_timeout
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
            let response = self
                .request(
                    reqwest::Method::GET,
                    &format!("/v1/threads/{thread_id}/runs/{}", run.id),
                )
                .send()
                .await
                .map_err(|e| PodsmithError::Backend(format!("Run poll failed: {e}")))?;
            run = Self::parse(response, "run").await?;
        }
        Ok(run)
    }

    async fn read_reply(&self, thread_id: &str) -> Result<String> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/v1/threads/{thread_id}/messages?order=desc&limit=1"),
            )
            .send()
            .await
            .map_err(|e| PodsmithError::Backend(format!("Message list failed: {e}")))?;
        let list: MessageList = Self::parse(response, "message list").await?;

        let message = list
            .data
            .into_iter()
            .find(|m| m.role == "assistant")
            .ok_or_else(|| PodsmithError::Backend("No assistant reply in thread".to_string()))?;

        let text = message
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.map(|t| t.value))
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(PodsmithError::Backend(
                "Assistant reply contained no text".to_string(),
            ));
        }
        Ok(text)
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PodsmithError::Backend(format!(
                "Assistant API error {status}: {body}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PodsmithError::Backend(format!("Failed to parse {what}: {e}")))
    }
}
