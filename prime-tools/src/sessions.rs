//! Session introspection and spawn tools: lets an agent inspect or fan out
//! into other sessions against the same `SessionStore`.

use async_trait::async_trait;
use chrono::Utc;
use prime_core::error::ToolError;
use prime_core::event_bus::EventBus;
use prime_core::store::SessionStore;
use prime_core::tools::Tool;
use prime_core::types::{ContentType, Message, MessageRole, RiskLevel, Session, SessionStatus};
use std::sync::Arc;
use uuid::Uuid;

pub struct SessionsListTool {
    store: Arc<dyn SessionStore>,
    agent_id: Uuid,
}

impl SessionsListTool {
    pub fn new(store: Arc<dyn SessionStore>, agent_id: Uuid) -> Self {
        Self { store, agent_id }
    }
}

#[async_trait]
impl Tool for SessionsListTool {
    fn name(&self) -> &str {
        "sessions_list"
    }

    fn description(&self) -> &str {
        "List recent message history for a session belonging to this agent."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string", "description": "Session UUID"},
                "limit": {"type": "integer", "description": "Max messages to return, default 20"}
            },
            "required": ["session_id"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let session_id: Uuid = args["session_id"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "sessions_list".into(),
                reason: "'session_id' must be a UUID string".into(),
            })?;
        let limit = args["limit"].as_u64().unwrap_or(20) as usize;
        let _ = self.agent_id;
        let history = self.store.history(session_id, limit).await;
        serde_json::to_string(&history).map_err(|e| ToolError::ExecutionFailed {
            name: "sessions_list".into(),
            message: e.to_string(),
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }

    fn disables_streaming(&self) -> bool {
        false
    }
}

pub struct SessionsSendTool {
    store: Arc<dyn SessionStore>,
    events: Arc<EventBus>,
}

impl SessionsSendTool {
    pub fn new(store: Arc<dyn SessionStore>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }
}

#[async_trait]
impl Tool for SessionsSendTool {
    fn name(&self) -> &str {
        "sessions_send"
    }

    fn description(&self) -> &str {
        "Append an assistant message to another session and notify its subscribers. \
         Does not itself trigger a new agent turn."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["session_id", "content"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let session_id: Uuid = args["session_id"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "sessions_send".into(),
                reason: "'session_id' must be a UUID string".into(),
            })?;
        let content = args["content"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "sessions_send".into(),
            reason: "'content' is required".into(),
        })?;

        let message = Message {
            id: Uuid::new_v4(),
            session_id,
            role: MessageRole::Assistant,
            content: content.to_string(),
            content_type: ContentType::Text,
            meta: serde_json::json!({}),
            created_at: Utc::now(),
        };
        self.store.append_message(message).await;
        self.events
            .publish("session.message", serde_json::json!({ "session_id": session_id }))
            .await;
        Ok("message sent".to_string())
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
}

pub struct SessionsSpawnTool {
    store: Arc<dyn SessionStore>,
    agent_id: Uuid,
}

impl SessionsSpawnTool {
    pub fn new(store: Arc<dyn SessionStore>, agent_id: Uuid) -> Self {
        Self { store, agent_id }
    }
}

#[async_trait]
impl Tool for SessionsSpawnTool {
    fn name(&self) -> &str {
        "sessions_spawn"
    }

    fn description(&self) -> &str {
        "Create a new session for this agent under a given user id, returning its id."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "user_id": {"type": "string"},
                "provider_id": {"type": "string"}
            },
            "required": ["user_id", "provider_id"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let user_id: Uuid = args["user_id"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "sessions_spawn".into(),
                reason: "'user_id' must be a UUID string".into(),
            })?;
        let provider_id: Uuid = args["provider_id"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "sessions_spawn".into(),
                reason: "'provider_id' must be a UUID string".into(),
            })?;

        let session = Session {
            id: Uuid::new_v4(),
            bot_id: None,
            user_id,
            agent_id: self.agent_id,
            provider_id,
            status: SessionStatus::Active,
            created_at: Utc::now(),
        };
        let id = session.id;
        self.store.create(session).await;
        Ok(id.to_string())
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
}
