//! Tool Registry & Executor (C6).
//!
//! A static catalog of backends behind one `Tool` trait. Two on-wire
//! shapes (OpenAI function-calling, Anthropic tool-use) are derived from
//! the same `ToolDefinition` at the provider boundary so they can never
//! drift out of lock-step.

use crate::error::ToolError;
use crate::types::RiskLevel;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// OpenAI-compatible function-calling shape.
    pub fn to_openai_function(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }

    /// Anthropic tool-use shape.
    pub fn to_anthropic_tool(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.parameters,
        })
    }
}

/// Trait every tool backend implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;
    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError>;
    fn risk_level(&self) -> RiskLevel;

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// When true, the agent runner falls back to non-streaming mode for
    /// any turn where this tool is in scope, because the tool's output
    /// must be inspected before the assistant continues.
    fn disables_streaming(&self) -> bool {
        true
    }
}

/// Normalizes camelCase/snake_case argument aliases before dispatch, e.g.
/// `oldText` <-> `old_text`. Known alias pairs are merged with snake_case
/// taking precedence if both are present.
pub fn normalize_aliases(mut args: serde_json::Value) -> serde_json::Value {
    const ALIASES: &[(&str, &str)] = &[
        ("oldText", "old_text"),
        ("newText", "new_text"),
        ("filePath", "file_path"),
        ("dirPath", "dir_path"),
        ("workingDir", "working_dir"),
    ];
    if let serde_json::Value::Object(map) = &mut args {
        for (camel, snake) in ALIASES {
            if !map.contains_key(*snake) {
                if let Some(v) = map.remove(*camel) {
                    map.insert((*snake).to_string(), v);
                    continue;
                }
            }
            map.remove(*camel);
        }
    }
    args
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered { name });
        }
        debug!(tool = %name, "registering tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch by name with alias normalization and a per-tool timeout.
    /// Unknown tools are the caller's signal to fall through to a skills
    /// registry before giving up.
    pub async fn execute(&self, name: &str, args: serde_json::Value) -> Result<String, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;
        let args = normalize_aliases(args);
        let timeout = tool.timeout();
        info!(tool = %name, timeout_secs = timeout.as_secs(), "executing tool");
        match tokio::time::timeout(timeout, tool.execute(args)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                name: name.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"old_text": {"type": "string"}}})
        }
        async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
            Ok(args["old_text"].as_str().unwrap_or_default().to_string())
        }
        fn risk_level(&self) -> RiskLevel {
            RiskLevel::Low
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "never finishes"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _args: serde_json::Value) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("done".into())
        }
        fn risk_level(&self) -> RiskLevel {
            RiskLevel::Low
        }
        fn timeout(&self) -> Duration {
            Duration::from_millis(10)
        }
    }

    #[tokio::test]
    async fn register_and_execute_round_trips() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool)).unwrap();
        let out = reg.execute("echo", serde_json::json!({"oldText": "hi"})).await.unwrap();
        assert_eq!(out, "hi");
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool)).unwrap();
        let err = reg.register(Arc::new(EchoTool)).unwrap_err();
        assert!(matches!(err, ToolError::AlreadyRegistered { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let reg = ToolRegistry::new();
        let err = reg.execute("nope", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(SlowTool)).unwrap();
        let err = reg.execute("slow", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[test]
    fn alias_normalization_prefers_snake_case_when_both_present() {
        let args = serde_json::json!({"old_text": "snake", "oldText": "camel"});
        let normalized = normalize_aliases(args);
        assert_eq!(normalized["old_text"], "snake");
        assert!(normalized.get("oldText").is_none());
    }

    #[test]
    fn definition_derives_both_wire_shapes() {
        let def = ToolDefinition {
            name: "echo".into(),
            description: "d".into(),
            parameters: serde_json::json!({"type": "object"}),
        };
        assert_eq!(def.to_openai_function()["function"]["name"], "echo");
        assert_eq!(def.to_anthropic_tool()["name"], "echo");
    }
}
