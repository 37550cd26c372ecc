//! Agent Runner (C8) — the iterative tool-calling loop.
//!
//! Drives a provider through turns, dispatching any requested tool calls
//! via the [`crate::tools::ToolRegistry`] and feeding results back, until
//! the model produces a final answer or the turn cap is hit.

use crate::error::ProviderError;
use crate::event_bus::EventBus;
use crate::providers::{CompletionRequest, LlmProvider, StopReason, StreamEvent, TokenUsage, ToolCall};
use crate::tools::ToolRegistry;
use crate::types::{ContentType, Message, MessageRole};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const MAX_TURNS: u32 = 12;

#[derive(Debug, Clone)]
pub struct RunResult {
    pub text: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub turns_used: u32,
}

pub struct AgentRunner {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
}

impl AgentRunner {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self { provider, tools }
    }

    /// Run the structured tool-calling loop. `session_id` tags messages
    /// appended for the tool-call/tool-result exchange.
    pub async fn run(
        &self,
        system_prompt: String,
        mut history: Vec<Message>,
        session_id: Uuid,
        max_output_tokens: i64,
    ) -> Result<RunResult, ProviderError> {
        let tool_defs = self.tools.list_definitions();
        let mut usage = TokenUsage::default();

        for turn in 1..=MAX_TURNS {
            let request = CompletionRequest {
                system_prompt: system_prompt.clone(),
                messages: history.clone(),
                tools: tool_defs.clone(),
                max_output_tokens,
            };
            let response = self.provider.complete(request).await?;
            usage.input_tokens += response.usage.input_tokens;
            usage.output_tokens += response.usage.output_tokens;

            if response.stop_reason != StopReason::ToolUse || response.tool_calls.is_empty() {
                return Ok(RunResult {
                    text: response.content,
                    model: self.provider.model_name().to_string(),
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    turns_used: turn,
                });
            }

            history.push(assistant_tool_call_message(session_id, &response.content, &response.tool_calls));
            for call in &response.tool_calls {
                let result = self.tools.execute(&call.name, call.arguments.clone()).await;
                let result_text = match result {
                    Ok(text) => text,
                    Err(err) => err.to_string(),
                };
                history.push(tool_result_message(session_id, result_text));
            }
        }

        Ok(RunResult {
            text: "Reached maximum tool-use iterations.".to_string(),
            model: self.provider.model_name().to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            turns_used: MAX_TURNS,
        })
    }

    /// Streaming text-only mode (no tool calls in scope): relays each
    /// token to `event_bus` as `stream.chunk` as it arrives, in addition
    /// to returning the accumulated text. Callers use this path whenever
    /// the agent has `code_execution_enabled == false`; tool-calling runs
    /// always go through [`Self::run`] instead.
    pub async fn run_streaming(
        &self,
        system_prompt: String,
        history: Vec<Message>,
        session_id: Uuid,
        max_output_tokens: i64,
        event_bus: &EventBus,
    ) -> Result<RunResult, ProviderError> {
        let request = CompletionRequest {
            system_prompt,
            messages: history,
            tools: Vec::new(),
            max_output_tokens,
        };
        let (tx, mut rx) = mpsc::channel(32);
        let provider = self.provider.clone();
        let driver = tokio::spawn(async move { provider.complete_streaming(request, tx).await });

        let mut text = String::new();
        let mut usage = TokenUsage::default();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Token(token) => {
                    text.push_str(&token);
                    event_bus
                        .publish("stream.chunk", serde_json::json!({ "session_id": session_id, "text": token }))
                        .await;
                }
                StreamEvent::Done { usage: done_usage } => usage = done_usage,
            }
        }
        driver.await.map_err(|e| ProviderError::Request { message: e.to_string() })??;

        Ok(RunResult {
            text,
            model: self.provider.model_name().to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            turns_used: 1,
        })
    }
}

fn assistant_tool_call_message(session_id: Uuid, content: &str, calls: &[ToolCall]) -> Message {
    Message {
        id: Uuid::new_v4(),
        session_id,
        role: MessageRole::Assistant,
        content: content.to_string(),
        content_type: ContentType::Text,
        meta: serde_json::json!({ "tool_calls": calls.iter().map(|c| serde_json::json!({
            "id": c.id, "name": c.name, "arguments": c.arguments
        })).collect::<Vec<_>>() }),
        created_at: Utc::now(),
    }
}

fn tool_result_message(session_id: Uuid, result: String) -> Message {
    Message {
        id: Uuid::new_v4(),
        session_id,
        role: MessageRole::Tool,
        content: result,
        content_type: ContentType::Text,
        meta: serde_json::Value::Null,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionResponse, MockLlmProvider};

    fn final_answer(text: &str) -> CompletionResponse {
        CompletionResponse {
            content: text.to_string(),
            tool_calls: vec![],
            usage: TokenUsage { input_tokens: 10, output_tokens: 5 },
            stop_reason: StopReason::EndTurn,
        }
    }

    #[tokio::test]
    async fn returns_final_answer_without_tool_calls() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(final_answer("hello"));
        let runner = AgentRunner::new(provider, Arc::new(ToolRegistry::new()));
        let result = runner.run("system".into(), vec![], Uuid::new_v4(), 256).await.unwrap();
        assert_eq!(result.text, "hello");
        assert_eq!(result.turns_used, 1);
    }

    #[tokio::test]
    async fn caps_at_max_turns_when_model_keeps_calling_tools() {
        let provider = Arc::new(MockLlmProvider::new());
        for _ in 0..(MAX_TURNS as usize + 2) {
            provider.queue_response(CompletionResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    id: "1".into(),
                    name: "unknown_tool".into(),
                    arguments: serde_json::json!({}),
                }],
                usage: TokenUsage::default(),
                stop_reason: StopReason::ToolUse,
            });
        }
        let runner = AgentRunner::new(provider, Arc::new(ToolRegistry::new()));
        let result = runner.run("system".into(), vec![], Uuid::new_v4(), 256).await.unwrap();
        assert_eq!(result.turns_used, MAX_TURNS);
        assert_eq!(result.text, "Reached maximum tool-use iterations.");
    }

    #[tokio::test]
    async fn tool_failure_reports_back_to_model_without_aborting() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(CompletionResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "1".into(),
                name: "missing".into(),
                arguments: serde_json::json!({}),
            }],
            usage: TokenUsage::default(),
            stop_reason: StopReason::ToolUse,
        });
        provider.queue_response(final_answer("recovered"));
        let runner = AgentRunner::new(provider, Arc::new(ToolRegistry::new()));
        let result = runner.run("system".into(), vec![], Uuid::new_v4(), 256).await.unwrap();
        assert_eq!(result.text, "recovered");
        assert_eq!(result.turns_used, 2);
    }
}
