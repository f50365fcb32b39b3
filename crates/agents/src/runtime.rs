//! The uniform agent execute contract and backend selection.
//!
//! Every pipeline stage runs its model calls through [`AgentRuntime`]. When
//! the stage has a remote assistant id configured and the assistant service
//! probes available, the call goes through the thread/run protocol; a failed
//! run or any assistant-side error falls back to the generic chat backend
//! automatically.

use std::sync::Arc;

use podsmith_common::{PodsmithError, Result};
use podsmith_llm::{AssistantClient, LlmClient, LlmRequest, RunOutcome};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// The six model-backed pipeline roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Planner,
    Researcher,
    Outliner,
    Scripter,
    ToneAnnotator,
    Editor,
}

impl AgentRole {
    /// Stage name used in progress events, logs, and stage errors.
    pub fn stage_name(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Researcher => "researcher",
            Self::Outliner => "outliner",
            Self::Scripter => "scripter",
            Self::ToneAnnotator => "tone",
            Self::Editor => "editor",
        }
    }
}

/// Optional remote assistant ids, one per role. Unset roles always use the
/// chat fallback.
#[derive(Debug, Clone, Default)]
pub struct RemoteAgentIds {
    pub planner: Option<String>,
    pub researcher: Option<String>,
    pub outliner: Option<String>,
    pub scripter: Option<String>,
    pub tone: Option<String>,
    pub editor: Option<String>,
}

impl RemoteAgentIds {
    pub fn for_role(&self, role: AgentRole) -> Option<&str> {
        match role {
            AgentRole::Planner => self.planner.as_deref(),
            AgentRole::Researcher => self.researcher.as_deref(),
            AgentRole::Outliner => self.outliner.as_deref(),
            AgentRole::Scripter => self.scripter.as_deref(),
            AgentRole::ToneAnnotator => self.tone.as_deref(),
            AgentRole::Editor => self.editor.as_deref(),
        }
    }
}

/// Sampling knobs passed per call.
#[derive(Debug, Clone, Copy)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Sampling {
    pub const fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
        }
    }
}

pub struct AgentRuntime {
    chat: Arc<dyn LlmClient>,
    assistant: Option<Arc<AssistantClient>>,
    remote_ids: RemoteAgentIds,
    /// Availability probe result, evaluated once per process
    assistant_available: OnceCell<bool>,
}

impl AgentRuntime {
    pub fn new(
        chat: Arc<dyn LlmClient>,
        assistant: Option<Arc<AssistantClient>>,
        remote_ids: RemoteAgentIds,
    ) -> Self {
        Self {
            chat,
            assistant,
            remote_ids,
            assistant_available: OnceCell::new(),
        }
    }

    /// Runtime with only the chat backend wired. Used in tests and in
    /// deployments without assistant credentials.
    pub fn chat_only(chat: Arc<dyn LlmClient>) -> Self {
        Self::new(chat, None, RemoteAgentIds::default())
    }

    async fn assistant_is_available(&self, assistant: &AssistantClient) -> bool {
        *self
            .assistant_available
            .get_or_init(|| async {
                let available = assistant.is_available().await;
                debug!(available, "Assistant availability probe");
                available
            })
            .await
    }

    /// Execute one model call for a stage, selecting the backend.
    pub async fn execute(
        &self,
        role: AgentRole,
        system_prompt: &str,
        input: &str,
        sampling: Sampling,
    ) -> Result<String> {
        if let Some(assistant) = &self.assistant {
            if let Some(agent_id) = self.remote_ids.for_role(role) {
                if self.assistant_is_available(assistant).await {
                    match assistant.run(agent_id, Some(system_prompt), input).await {
                        Ok(RunOutcome::Completed(response)) => {
                            return Self::extract(role, response.content);
                        }
                        Ok(RunOutcome::Failed(reason)) => {
                            warn!(
                                stage = role.stage_name(),
                                reason, "Assistant run failed, falling back to chat backend"
                            );
                        }
                        Err(e) => {
                            warn!(
                                stage = role.stage_name(),
                                error = %e,
                                "Assistant call errored, falling back to chat backend"
                            );
                        }
                    }
                }
            }
        }

        let mut request = LlmRequest::system_user(system_prompt, input);
        request.temperature = Some(sampling.temperature);
        request.max_tokens = Some(sampling.max_tokens);

        let response = self.chat.complete(request).await?;
        Self::extract(role, response.content)
    }

    fn extract(role: AgentRole, content: String) -> Result<String> {
        let cleaned = strip_code_fence(content.trim());
        if cleaned.is_empty() {
            return Err(PodsmithError::agent(
                role.stage_name(),
                "model returned empty content",
            ));
        }
        Ok(cleaned.to_string())
    }
}

/// Drop a surrounding ``` fence, with or without a language label.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Skip the language label on the opening fence line
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim()
}
