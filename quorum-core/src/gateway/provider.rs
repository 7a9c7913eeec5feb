//! `Provider`: adapter trait a model backend implements (spec §4.1).

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::Message;

use super::usage::Usage;

/// One tool schema offered to the model, opaque to the gateway.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool call the model asked for.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One completion chunk streamed back to the caller.
#[derive(Debug, Clone)]
pub struct CompletionChunk {
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Usage,
}

/// Classifies a provider call failure for circuit-breaker accounting
/// (§4.1 "Circuit breaker").
#[derive(Debug, Clone)]
pub enum ProviderCallError {
    /// Connection reset, 5xx, timeout: retried once at the provider level
    /// before it is allowed to count against the breaker.
    Transient(String),
    /// 429-equivalent: never opens the breaker, only sets a cooldown.
    RateLimited,
    /// Non-retriable failure: counts against the breaker's failure window.
    Hard(String),
}

impl std::fmt::Display for ProviderCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderCallError::Transient(m) => write!(f, "transient provider failure: {m}"),
            ProviderCallError::RateLimited => write!(f, "provider rate-limited"),
            ProviderCallError::Hard(m) => write!(f, "provider failure: {m}"),
        }
    }
}

/// A model-backend adapter. Implementations: [`super::mock::MockProvider`]
/// (fixed response, for tests), [`super::openai_provider::OpenAiProvider`]
/// (OpenAI-compatible Chat Completions via `async-openai`).
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    /// Whether this provider accepts a caller-supplied temperature; if not,
    /// the gateway silently coerces to [`Provider::default_temperature`]
    /// (§4.1).
    fn accepts_temperature(&self) -> bool {
        true
    }

    fn default_temperature(&self) -> f32 {
        0.7
    }

    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderCallError>;

    /// Streaming variant. When `chunk_tx` is `Some`, implementations should
    /// forward token deltas as they arrive; the full response is still
    /// returned at the end. Default implementation calls [`Provider::send`]
    /// and forwards the full content as a single chunk.
    async fn send_stream(
        &self,
        request: &CompletionRequest,
        chunk_tx: Option<mpsc::Sender<CompletionChunk>>,
    ) -> Result<CompletionResponse, ProviderCallError> {
        let response = self.send(request).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                let _ = tx.send(CompletionChunk { content: response.content.clone() }).await;
            }
        }
        Ok(response)
    }
}
