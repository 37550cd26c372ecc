//! Scheduling and integration tools: cron/webhook trigger management
//! against the `TriggerStore`, plus a gateway health probe.
//!
//! Triggers created here are persisted immediately but are only picked up
//! by an already-running `CronScheduler`/`WebhookDispatcher` on their next
//! reload pass; see DESIGN.md for the known gap.

use async_trait::async_trait;
use prime_core::error::ToolError;
use prime_core::store::TriggerStore;
use prime_core::tools::Tool;
use prime_core::types::{CronTrigger, RiskLevel, WebhookTrigger};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct CronAddTool {
    store: Arc<dyn TriggerStore>,
    agent_id: Uuid,
}

impl CronAddTool {
    pub fn new(store: Arc<dyn TriggerStore>, agent_id: Uuid) -> Self {
        Self { store, agent_id }
    }
}

#[async_trait]
impl Tool for CronAddTool {
    fn name(&self) -> &str {
        "cron_add"
    }

    fn description(&self) -> &str {
        "Register a new cron trigger that sends a message to this agent on a schedule."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "schedule": {"type": "string", "description": "A 5/6-field cron expression"},
                "message": {"type": "string"}
            },
            "required": ["name", "schedule", "message"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let name = args["name"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "cron_add".into(),
            reason: "'name' is required".into(),
        })?;
        let schedule = args["schedule"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "cron_add".into(),
            reason: "'schedule' is required".into(),
        })?;
        let message = args["message"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "cron_add".into(),
            reason: "'message' is required".into(),
        })?;

        if schedule.parse::<cron::Schedule>().is_err() {
            return Err(ToolError::InvalidArguments {
                name: "cron_add".into(),
                reason: format!("'{schedule}' is not a valid cron expression"),
            });
        }

        let trigger = CronTrigger {
            id: Uuid::new_v4(),
            agent_id: self.agent_id,
            name: name.to_string(),
            schedule: schedule.to_string(),
            message: message.to_string(),
            active: true,
        };
        let id = trigger.id;
        self.store.create_cron(trigger).await;
        Ok(id.to_string())
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
}

pub struct CronRemoveTool {
    store: Arc<dyn TriggerStore>,
}

impl CronRemoveTool {
    pub fn new(store: Arc<dyn TriggerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CronRemoveTool {
    fn name(&self) -> &str {
        "cron_remove"
    }

    fn description(&self) -> &str {
        "Deactivate a cron trigger by id."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"id": {"type": "string"}},
            "required": ["id"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let id: Uuid = args["id"].as_str().and_then(|s| s.parse().ok()).ok_or_else(|| {
            ToolError::InvalidArguments { name: "cron_remove".into(), reason: "'id' must be a UUID string".into() }
        })?;
        if self.store.deactivate_cron(id).await {
            Ok("deactivated".to_string())
        } else {
            Err(ToolError::ExecutionFailed { name: "cron_remove".into(), message: format!("no cron trigger {id}") })
        }
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
}

pub struct CronListTool {
    store: Arc<dyn TriggerStore>,
    agent_id: Uuid,
}

impl CronListTool {
    pub fn new(store: Arc<dyn TriggerStore>, agent_id: Uuid) -> Self {
        Self { store, agent_id }
    }
}

#[async_trait]
impl Tool for CronListTool {
    fn name(&self) -> &str {
        "cron_list"
    }

    fn description(&self) -> &str {
        "List this agent's cron triggers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: serde_json::Value) -> Result<String, ToolError> {
        let mine: Vec<_> = self
            .store
            .all_cron_triggers()
            .await
            .into_iter()
            .filter(|t| t.agent_id == self.agent_id)
            .collect();
        serde_json::to_string(&mine).map_err(|e| ToolError::ExecutionFailed {
            name: "cron_list".into(),
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

pub struct WebhookRegisterTool {
    store: Arc<dyn TriggerStore>,
    agent_id: Uuid,
}

impl WebhookRegisterTool {
    pub fn new(store: Arc<dyn TriggerStore>, agent_id: Uuid) -> Self {
        Self { store, agent_id }
    }
}

#[async_trait]
impl Tool for WebhookRegisterTool {
    fn name(&self) -> &str {
        "webhook_register"
    }

    fn description(&self) -> &str {
        "Register an inbound webhook path that turns a POSTed payload into a message to this agent."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "path": {"type": "string", "description": "e.g. /hooks/my-integration"},
                "message_template": {"type": "string", "description": "May reference payload fields"},
                "secret": {"type": "string", "description": "Optional HMAC-SHA256 signing secret"}
            },
            "required": ["name", "path", "message_template"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let name = args["name"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "webhook_register".into(),
            reason: "'name' is required".into(),
        })?;
        let path = args["path"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "webhook_register".into(),
            reason: "'path' is required".into(),
        })?;
        let message_template = args["message_template"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "webhook_register".into(),
            reason: "'message_template' is required".into(),
        })?;
        let secret = args["secret"].as_str().map(str::to_string);

        let existing = self.store.find_webhook_by_path(path).await;
        if existing.is_some() {
            return Err(ToolError::ExecutionFailed {
                name: "webhook_register".into(),
                message: format!("a webhook is already registered at '{path}'"),
            });
        }

        let trigger = WebhookTrigger {
            id: Uuid::new_v4(),
            agent_id: self.agent_id,
            name: name.to_string(),
            path: path.to_string(),
            message_template: message_template.to_string(),
            secret,
            active: true,
        };
        let id = trigger.id;
        self.store.create_webhook(trigger).await;
        Ok(id.to_string())
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
}

pub struct WebhookListTool {
    store: Arc<dyn TriggerStore>,
    agent_id: Uuid,
}

impl WebhookListTool {
    pub fn new(store: Arc<dyn TriggerStore>, agent_id: Uuid) -> Self {
        Self { store, agent_id }
    }
}

#[async_trait]
impl Tool for WebhookListTool {
    fn name(&self) -> &str {
        "webhook_list"
    }

    fn description(&self) -> &str {
        "List this agent's registered webhooks. Secrets are never returned, only whether one is set."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: serde_json::Value) -> Result<String, ToolError> {
        let mine: Vec<_> = self
            .store
            .all_webhook_triggers()
            .await
            .into_iter()
            .filter(|t| t.agent_id == self.agent_id)
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "name": t.name,
                    "path": t.path,
                    "message_template": t.message_template,
                    "has_secret": t.secret.is_some(),
                    "active": t.active,
                })
            })
            .collect();
        serde_json::to_string(&mine).map_err(|e| ToolError::ExecutionFailed {
            name: "webhook_list".into(),
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

pub struct GatewayStatusTool {
    base_url: String,
    client: reqwest::Client,
}

impl GatewayStatusTool {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("static reqwest client config is always valid"),
        }
    }
}

#[async_trait]
impl Tool for GatewayStatusTool {
    fn name(&self) -> &str {
        "gateway_status"
    }

    fn description(&self) -> &str {
        "Check whether the Prime gateway's REST surface is reachable and healthy."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: serde_json::Value) -> Result<String, ToolError> {
        let url = format!("{}/healthz", self.base_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => Ok("ok".to_string()),
            Ok(resp) => Ok(format!("unhealthy: status {}", resp.status())),
            Err(e) => Ok(format!("unreachable: {e}")),
        }
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }

    fn disables_streaming(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prime_core::store::memory::InMemoryStore;

    #[tokio::test]
    async fn cron_add_rejects_invalid_schedule() {
        let store: Arc<dyn TriggerStore> = Arc::new(InMemoryStore::new());
        let tool = CronAddTool::new(store, Uuid::new_v4());
        let err = tool
            .execute(serde_json::json!({"name": "x", "schedule": "not a cron", "message": "hi"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn webhook_register_then_list_round_trips() {
        let store: Arc<dyn TriggerStore> = Arc::new(InMemoryStore::new());
        let agent_id = Uuid::new_v4();
        let register = WebhookRegisterTool::new(store.clone(), agent_id);
        register
            .execute(serde_json::json!({"name": "n", "path": "/hooks/x", "message_template": "{{body}}"}))
            .await
            .unwrap();

        let list = WebhookListTool::new(store, agent_id);
        let out = list.execute(serde_json::json!({})).await.unwrap();
        assert!(out.contains("/hooks/x"));
        assert!(!out.contains("has_secret\":true"));
    }
}
