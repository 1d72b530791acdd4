use async_trait::async_trait;

use crate::domain::error::CoreResult;

/// A single turn's output from the external LLM client.
#[derive(Debug, Clone)]
pub struct LlmCompletion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Port to the external LLM client an [`crate::services::agent_runtime`]
/// drives. Transient failures (rate limits, timeouts) should be reported
/// via `CoreError::Llm { transient: true, .. }` so the caller can retry
/// within budget; permanent failures (bad request, auth) use `transient: false`.
#[async_trait]
pub trait LlmSubstrate: Send + Sync {
    async fn complete(&self, model: &str, system_prompt: &str, user_prompt: &str) -> CoreResult<LlmCompletion>;
}
