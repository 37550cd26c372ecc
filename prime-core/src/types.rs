//! Core entity types (spec §3).
//!
//! Entities are plain structs with opaque `Uuid` identifiers. Persistence is
//! abstracted behind the repository traits in [`crate::store`]; these types
//! carry no storage-specific behavior.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type Id = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub org_id: Id,
    pub username: String,
    pub telegram_id: Option<i64>,
    pub role: UserRole,
    pub password_hash: Option<String>,
    pub api_token_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: Id,
    pub org_id: Id,
    pub name: String,
    pub token: String,
    pub channels: Vec<String>,
    pub allowed_user_ids: Vec<Id>,
    pub active: bool,
    pub provider_defaults: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ProviderType {
    OpenAI,
    Anthropic,
    DeepSeek,
    Gemini,
    Kimi,
    Mistral,
    Glm,
    Qwen,
    Ollama,
    Http,
    Shell,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::DeepSeek => "deepseek",
            ProviderType::Gemini => "gemini",
            ProviderType::Kimi => "kimi",
            ProviderType::Mistral => "mistral",
            ProviderType::Glm => "glm",
            ProviderType::Qwen => "qwen",
            ProviderType::Ollama => "ollama",
            ProviderType::Http => "http",
            ProviderType::Shell => "shell",
        };
        write!(f, "{s}")
    }
}

/// Per-model cost/sizing config nested under `Provider.config.models`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub max_tokens: Option<i64>,
    pub context_window: Option<i64>,
    pub input_budget_tokens: Option<i64>,
    pub cost_per_1m_input: Option<f64>,
    pub cost_per_1m_output: Option<f64>,
}

/// The `token_optimization` block of `Provider.config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenOptimizationConfig {
    #[serde(default)]
    pub auto_route_enabled: bool,
    #[serde(default)]
    pub route_by_complexity: HashMap<String, String>,
    pub max_output_tokens: Option<i64>,
    pub output_to_input_ratio: Option<f64>,
    pub input_budget_tokens: Option<i64>,
    pub max_message_tokens: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub default_model: Option<String>,
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
    #[serde(default)]
    pub token_optimization: TokenOptimizationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Id,
    pub org_id: Id,
    pub name: String,
    pub provider_type: ProviderType,
    pub config: ProviderConfig,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmPolicy {
    Pairing,
    Allowlist,
    Open,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Id,
    pub org_id: Id,
    pub name: String,
    pub default_provider_id: Id,
    pub workspace_path: Option<String>,
    pub dm_policy: DmPolicy,
    pub allowed_user_ids: Vec<Id>,
    pub group_requires_mention: bool,
    pub system_prompt: String,
    pub web_search_enabled: bool,
    pub memory_enabled: bool,
    pub max_history_messages: usize,
    pub code_execution_enabled: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub id: Id,
    pub agent_id: Id,
    pub bot_id: Option<Id>,
    pub channel: String,
    pub account_id: Option<String>,
    pub peer: Option<String>,
    pub priority: i64,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Id,
    pub bot_id: Option<Id>,
    pub user_id: Id,
    pub agent_id: Id,
    pub provider_id: Id,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    File,
    Image,
    Code,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Id,
    pub session_id: Id,
    pub role: MessageRole,
    pub content: String,
    pub content_type: ContentType,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Indexing,
    Indexed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: Id,
    pub org_id: Id,
    pub agent_id: Option<Id>,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Id,
    pub knowledge_base_id: Id,
    pub filename: String,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Id,
    pub document_id: Id,
    pub knowledge_base_id: Id,
    pub chunk_index: usize,
    pub content: String,
    pub filename: String,
    /// See SPEC_FULL.md §3 — deferred-representation decision for embeddings.
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub key: String,
    pub actor_id: Id,
    pub method: String,
    pub request_hash: String,
    pub status: IdempotencyStatus,
    pub response: Option<serde_json::Value>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    PendingApproval,
    Approved,
    Rejected,
    InProgress,
    Completed,
    Failed,
    Canceled,
}

impl ExecutionStatus {
    /// Rejected/failed/completed are terminal (spec §8 state-machine safety).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Rejected
                | ExecutionStatus::Failed
                | ExecutionStatus::Completed
                | ExecutionStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub id: Id,
    pub connection_id: String,
    pub node_id: String,
    pub node_name: String,
    pub command: String,
    pub params: serde_json::Value,
    pub working_dir: Option<String>,
    pub env_vars: HashMap<String, String>,
    pub status: ExecutionStatus,
    pub requires_approval: bool,
    pub approved_by: Option<Id>,
    pub approval_reason: Option<String>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error_message: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeApprovalQueueEntry {
    pub id: Id,
    pub execution_id: Id,
    pub command: String,
    pub params_summary: String,
    pub risk_level: RiskLevel,
    pub status: ApprovalStatus,
    pub expires_at: DateTime<Utc>,
    pub auto_approved: bool,
    pub auto_approval_rule: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingRequest {
    pub id: Id,
    pub agent_id: Id,
    pub channel: String,
    pub account_id: Option<String>,
    pub peer: String,
    pub expires_at: DateTime<Utc>,
    pub approved: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairedDevice {
    pub id: Id,
    pub agent_id: Id,
    pub channel: String,
    pub account_id: Option<String>,
    pub peer: String,
    pub paired_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceAuthStatus {
    Pending,
    Approved,
    Consumed,
    Denied,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthRequest {
    pub id: Id,
    pub device_code_hash: String,
    pub user_code: String,
    pub status: DeviceAuthStatus,
    pub interval_seconds: u64,
    pub expires_at: DateTime<Utc>,
}

/// A persisted cron trigger (spec §4.13): fires the agent runner with
/// `message` as a user turn against a synthetic session on `schedule`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronTrigger {
    pub id: Id,
    pub agent_id: Id,
    pub name: String,
    pub schedule: String,
    pub message: String,
    pub active: bool,
}

/// A persisted webhook trigger (spec §4.13): an inbound POST to `path` is
/// signature-verified against `secret` (if set) and its JSON payload is
/// interpolated into `message_template` before being dispatched as a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTrigger {
    pub id: Id,
    pub agent_id: Id,
    pub name: String,
    pub path: String,
    pub message_template: String,
    pub secret: Option<String>,
    pub active: bool,
}
