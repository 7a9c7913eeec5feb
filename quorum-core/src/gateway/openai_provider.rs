//! OpenAI-compatible Chat Completions provider (spec §4.1 "Providers").
//!
//! Works against the real OpenAI API or any OpenAI-compatible endpoint
//! (`OPENAI_BASE_URL`). Supports tool schemas and the inline-`<think>`
//! stripping some providers require before the content is usable.

use async_trait::async_trait;
use tracing::debug;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, ChatCompletionTool, ChatCompletionTools,
        CreateChatCompletionRequestArgs, FunctionObject,
    },
    Client,
};

use crate::domain::MessageKind;

use super::provider::{CompletionRequest, CompletionResponse, Provider, ProviderCallError, ToolCallRequest};
use super::usage::Usage;

/// Strips a leading `<think>...</think>` block some providers prepend to
/// their response before the user-visible content (spec §4.1 "a provider
/// that emits inline `<think>` blocks that must be stripped before
/// returning").
pub fn strip_think_block(content: &str) -> String {
    let trimmed = content.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<think>") {
        if let Some(end) = rest.find("</think>") {
            return rest[end + "</think>".len()..].trim_start().to_string();
        }
    }
    content.to_string()
}

pub struct OpenAiProvider {
    id: String,
    client: Client<OpenAIConfig>,
    accepts_temperature: bool,
    strip_think: bool,
}

impl OpenAiProvider {
    pub fn new(id: impl Into<String>, config: OpenAIConfig) -> Self {
        Self {
            id: id.into(),
            client: Client::with_config(config),
            accepts_temperature: true,
            strip_think: false,
        }
    }

    /// For providers that emit inline `<think>` blocks (§4.1).
    pub fn with_think_stripping(mut self) -> Self {
        self.strip_think = true;
        self
    }

    pub fn with_fixed_temperature(mut self) -> Self {
        self.accepts_temperature = false;
        self
    }

    fn messages_to_request(messages: &[crate::domain::Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .filter_map(|m| match m.kind {
                MessageKind::System => Some(ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(m.content.clone()),
                )),
                _ => Some(ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(
                    m.content.clone(),
                ))),
            })
            .collect()
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn accepts_temperature(&self) -> bool {
        self.accepts_temperature
    }

    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderCallError> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&request.model).max_tokens(request.max_tokens);
        if self.accepts_temperature {
            builder.temperature(request.temperature);
        }
        builder.messages(Self::messages_to_request(&request.messages));

        if !request.tools.is_empty() {
            let tools: Vec<ChatCompletionTool> = request
                .tools
                .iter()
                .map(|t| ChatCompletionTool {
                    r#type: Default::default(),
                    function: FunctionObject {
                        name: t.name.clone(),
                        description: Some(t.description.clone()),
                        parameters: Some(t.parameters.clone()),
                        strict: None,
                    },
                })
                .collect();
            builder.tools(ChatCompletionTools::from(tools));
        }

        let req = builder.build().map_err(|e| ProviderCallError::Hard(e.to_string()))?;
        debug!(provider = %self.id, model = %request.model, "sending chat completion request");

        let response = self.client.chat().create(req).await.map_err(classify_openai_error)?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| ProviderCallError::Hard("empty choices in response".to_string()))?;

        let mut content = choice.message.content.clone().unwrap_or_default();
        if self.strip_think {
            content = strip_think_block(&content);
        }

        let tool_calls = choice
            .message
            .tool_calls
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                duration_ms: 0,
            })
            .unwrap_or_default();

        Ok(CompletionResponse { content, tool_calls, usage })
    }
}

/// Maps an `async-openai` error onto the breaker-relevant taxonomy: network
/// resets and 5xx/timeouts are transient (retried once before counting),
/// anything else is hard (§4.1).
fn classify_openai_error(err: async_openai::error::OpenAIError) -> ProviderCallError {
    match &err {
        async_openai::error::OpenAIError::Reqwest(e) if e.is_timeout() || e.is_connect() => {
            ProviderCallError::Transient(err.to_string())
        }
        async_openai::error::OpenAIError::ApiError(api_err) => {
            if api_err.code.as_deref() == Some("rate_limit_exceeded") {
                ProviderCallError::RateLimited
            } else {
                ProviderCallError::Hard(err.to_string())
            }
        }
        _ => ProviderCallError::Hard(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_think_block() {
        let raw = "<think>internal reasoning</think>the real answer";
        assert_eq!(strip_think_block(raw), "the real answer");
    }

    #[test]
    fn leaves_content_without_think_block_untouched() {
        let raw = "just an answer";
        assert_eq!(strip_think_block(raw), "just an answer");
    }
}
