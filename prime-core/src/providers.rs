//! Provider Abstraction (C7).
//!
//! A model-agnostic `LlmProvider` trait covering both OpenAI-compatible
//! and Anthropic-style backends. Each call site picks one of two modes:
//! non-streaming structured (when tools are in scope) or streaming
//! text-only (when they aren't), per the agent runner's turn logic.

use crate::error::ProviderError;
use crate::optimizer::estimate_text_tokens;
use crate::tools::ToolDefinition;
use crate::types::{Message, MessageRole};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub max_output_tokens: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone)]
pub enum StreamEvent {
    Token(String),
    Done { usage: TokenUsage },
}

/// Model-agnostic LLM backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Non-streaming structured completion. Used whenever `request.tools`
    /// is non-empty, since tool-calling responses need a full payload.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Streaming text-only completion. Used only when `request.tools` is empty.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError>;

    fn model_name(&self) -> &str;
    fn context_window(&self) -> i64;
    fn supports_tools(&self) -> bool;
    fn cost_per_token(&self) -> (f64, f64);

    /// Falls back to the char/4 estimator (§4.5) when the provider has no
    /// exact tokenizer available.
    fn estimate_tokens(&self, messages: &[Message]) -> i64 {
        messages.iter().map(|m| estimate_text_tokens(&m.content)).sum()
    }
}

/// In-memory provider used by tests and the CLI's offline mode. Returns
/// queued responses in order, falling back to an empty completion.
pub struct MockLlmProvider {
    model: String,
    context_window: i64,
    responses: std::sync::Mutex<Vec<CompletionResponse>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            context_window: 128_000,
            responses: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn queue_response(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().push(response);
    }

    pub fn text_response(text: impl Into<String>) -> CompletionResponse {
        CompletionResponse {
            content: text.into(),
            tool_calls: Vec::new(),
            usage: TokenUsage::default(),
            stop_reason: StopReason::EndTurn,
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(MockLlmProvider::text_response(""))
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let response = self.complete(request).await?;
        for word in response.content.split_inclusive(' ') {
            let _ = tx.send(StreamEvent::Token(word.to_string())).await;
        }
        let _ = tx.send(StreamEvent::Done { usage: response.usage }).await;
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> i64 {
        self.context_window
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn cost_per_token(&self) -> (f64, f64) {
        (0.0, 0.0)
    }
}

/// Maps a history slice into the role-tagged `messages` field of a
/// completion request, matching the `system`/`user`/`assistant` roles
/// providers expect.
pub fn build_request(
    system_prompt: String,
    history: Vec<Message>,
    tools: Vec<ToolDefinition>,
    max_output_tokens: i64,
) -> CompletionRequest {
    CompletionRequest {
        system_prompt,
        messages: history,
        tools,
        max_output_tokens,
    }
}

pub fn role_label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_default_response_is_empty() {
        let provider = MockLlmProvider::new();
        let response = provider.complete(CompletionRequest::default()).await.unwrap();
        assert_eq!(response.content, "");
    }

    #[tokio::test]
    async fn mock_provider_returns_queued_responses_in_order() {
        let provider = MockLlmProvider::new();
        provider.queue_response(MockLlmProvider::text_response("first"));
        provider.queue_response(MockLlmProvider::text_response("second"));
        let a = provider.complete(CompletionRequest::default()).await.unwrap();
        let b = provider.complete(CompletionRequest::default()).await.unwrap();
        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");
    }

    #[tokio::test]
    async fn streaming_emits_tokens_then_done() {
        let provider = MockLlmProvider::new();
        provider.queue_response(MockLlmProvider::text_response("hello world"));
        let (tx, mut rx) = mpsc::channel(16);
        provider
            .complete_streaming(CompletionRequest::default(), tx)
            .await
            .unwrap();
        let mut saw_done = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, StreamEvent::Done { .. }) {
                saw_done = true;
            }
        }
        assert!(saw_done);
    }
}
