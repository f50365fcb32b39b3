use async_trait::async_trait;
use podsmith_common::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

pub struct RetryingClient<T: LlmClient> {
    inner: T,
    config: RetryConfig,
}

impl<T: LlmClient> RetryingClient<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Client errors that retrying cannot fix. Everything else, timeouts
    /// included, is retryable.
    fn is_non_retryable(error_msg: &str) -> bool {
        let lower = error_msg.to_lowercase();
        lower.contains("400")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("bad request")
            || lower.contains("unauthorized")
            || lower.contains("forbidden")
    }

    /// `base × 2^(attempt-1)` plus up to one second of jitter.
    fn compute_delay(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self.config.base_delay_ms.saturating_mul(1u64 << exponent);
        base.saturating_add(jitter_ms(attempt))
            .min(self.config.max_delay_ms)
    }
}

/// Deterministic sub-second jitter keyed on the attempt number (no rand
/// dependency needed).
fn jitter_ms(attempt: u32) -> u64 {
    let x = attempt.wrapping_mul(2654435761);
    (x % 1000) as u64
}

#[async_trait]
impl<T: LlmClient> LlmClient for RetryingClient<T> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let error_msg = e.to_string();
                    if attempt >= self.config.max_attempts || Self::is_non_retryable(&error_msg) {
                        return Err(e);
                    }

                    let delay = self.compute_delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay,
                        error = %error_msg,
                        "Retrying model request"
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
                }
            }
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
