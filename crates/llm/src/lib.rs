//! Model and speech backends for podsmith.
//!
//! Two model backends implement the same contract: a remote assistant
//! service driven over a thread/run protocol (preferred when a role has an
//! assistant id configured) and a generic chat-completion endpoint (the
//! automatic fallback). The speech backend turns single sentences into MP3
//! bytes. Retry and concurrency-capping layers wrap the chat backend.

pub mod assistant;
pub mod client;
pub mod config;
pub mod openai;
pub mod retry;
pub mod tts;

pub use assistant::{AssistantClient, AssistantConfig, RunOutcome};
pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};
pub use config::{
    build_assistant_client, build_chat_client, build_speech_client, BackendConfig,
    SemaphoredClient,
};
pub use openai::ChatCompletionClient;
pub use retry::{RetryConfig, RetryingClient};
pub use tts::{HttpSpeechClient, SpeechClient, SpeechRequest};
