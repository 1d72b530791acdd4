//! Deterministic test double for [`LlmSubstrate`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::ports::{LlmCompletion, LlmSubstrate};

/// Replays a fixed queue of responses (or echoes the prompt if the queue is
/// empty), so tests can assert on `AgentRuntime` behavior without a network.
pub struct MockSubstrate {
    responses: Mutex<Vec<String>>,
    calls: AtomicU64,
    fail_next: Mutex<Option<bool>>,
}

impl MockSubstrate {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: AtomicU64::new(0),
            fail_next: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The next `complete()` call returns a transient (if `transient`) or
    /// permanent LLM error instead of consuming a queued response.
    pub fn fail_next_call(&self, transient: bool) {
        *self.fail_next.lock().unwrap() = Some(transient);
    }
}

impl Default for MockSubstrate {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl LlmSubstrate for MockSubstrate {
    async fn complete(&self, _model: &str, _system_prompt: &str, user_prompt: &str) -> CoreResult<LlmCompletion> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(transient) = self.fail_next.lock().unwrap().take() {
            return Err(CoreError::Llm {
                transient,
                message: "mock substrate forced failure".to_string(),
            });
        }

        let text = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                format!("echo: {user_prompt}")
            } else {
                responses.remove(0)
            }
        };

        Ok(LlmCompletion {
            input_tokens: user_prompt.len() as u64 / 4,
            output_tokens: text.len() as u64 / 4,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_when_queue_empty() {
        let substrate = MockSubstrate::default();
        let result = substrate.complete("m", "s", "hello").await.unwrap();
        assert_eq!(result.text, "echo: hello");
    }

    #[tokio::test]
    async fn consumes_queued_responses_in_order() {
        let substrate = MockSubstrate::new(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(substrate.complete("m", "s", "x").await.unwrap().text, "first");
        assert_eq!(substrate.complete("m", "s", "x").await.unwrap().text, "second");
    }

    #[tokio::test]
    async fn forced_failure_reports_transience() {
        let substrate = MockSubstrate::default();
        substrate.fail_next_call(true);
        let err = substrate.complete("m", "s", "x").await.unwrap_err();
        assert!(err.is_transient());
    }
}
