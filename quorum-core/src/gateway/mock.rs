//! Mock provider for tests (mirrors `MockLlm`'s fixed-response design).

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::provider::{CompletionRequest, CompletionResponse, Provider, ProviderCallError, ToolCallRequest};
use super::usage::Usage;

/// Fixed-response provider. Can be configured to fail (to drive breaker and
/// fallback-chain tests) or to succeed with canned content/tool calls.
pub struct MockProvider {
    id: String,
    content: String,
    tool_calls: Vec<ToolCallRequest>,
    fail_with: Option<ProviderCallErrorKind>,
    call_count: AtomicUsize,
}

#[derive(Clone)]
enum ProviderCallErrorKind {
    Transient,
    RateLimited,
    Hard,
}

impl MockProvider {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            tool_calls: vec![],
            fail_with: None,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn always_hard_failure(mut self) -> Self {
        self.fail_with = Some(ProviderCallErrorKind::Hard);
        self
    }

    pub fn always_rate_limited(mut self) -> Self {
        self.fail_with = Some(ProviderCallErrorKind::RateLimited);
        self
    }

    pub fn always_transient_failure(mut self) -> Self {
        self.fail_with = Some(ProviderCallErrorKind::Transient);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, _request: &CompletionRequest) -> Result<CompletionResponse, ProviderCallError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(ProviderCallErrorKind::Transient) => Err(ProviderCallError::Transient("connection reset".into())),
            Some(ProviderCallErrorKind::RateLimited) => Err(ProviderCallError::RateLimited),
            Some(ProviderCallErrorKind::Hard) => Err(ProviderCallError::Hard("500".into())),
            None => Ok(CompletionResponse {
                content: self.content.clone(),
                tool_calls: self.tool_calls.clone(),
                usage: Usage { input_tokens: 10, output_tokens: 5, duration_ms: 1 },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::provider::CompletionRequest;

    fn req() -> CompletionRequest {
        CompletionRequest {
            model: "mock-model".into(),
            messages: vec![],
            tools: vec![],
            max_tokens: 100,
            temperature: 0.5,
        }
    }

    #[tokio::test]
    async fn succeeds_with_canned_content() {
        let provider = MockProvider::new("mock", "hello");
        let resp = provider.send(&req()).await.unwrap();
        assert_eq!(resp.content, "hello");
    }

    #[tokio::test]
    async fn fails_hard_when_configured() {
        let provider = MockProvider::new("mock", "x").always_hard_failure();
        assert!(matches!(provider.send(&req()).await, Err(ProviderCallError::Hard(_))));
    }
}
