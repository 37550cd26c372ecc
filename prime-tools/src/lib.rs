//! Tool backend implementations for the Prime agent.
//!
//! Each tool is a thin adapter between `prime_core::tools::Tool` and a
//! concrete capability (filesystem, HTTP, the knowledge base, the trigger
//! store, …). Tools are constructed per-agent with exactly the
//! collaborators they need, then registered into a `ToolRegistry` built by
//! [`build_registry`].

pub mod memory;
pub mod scheduling;
pub mod sessions;
pub mod skills;
pub mod web;
pub mod workspace;

#[cfg(feature = "browser")]
pub mod browser;

use prime_core::event_bus::EventBus;
use prime_core::rag::RagService;
use prime_core::store::{KnowledgeBaseStore, SessionStore, TriggerStore};
use prime_core::tools::ToolRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a default tool registry needs to wire up the canonical
/// toolset for one agent.
pub struct ToolContext {
    pub workspace: PathBuf,
    pub agent_id: Uuid,
    pub default_kb_id: Option<Uuid>,
    pub rag: Arc<RagService>,
    pub kb_store: Arc<dyn KnowledgeBaseStore>,
    pub triggers: Arc<dyn TriggerStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub events: Arc<EventBus>,
    pub gateway_base_url: String,
}

/// Registers the canonical toolset (workspace, web, memory, scheduling,
/// skills) into a fresh `ToolRegistry`. Browser tools are added separately
/// by the caller when the `browser` feature and a running browser session
/// are both available.
pub fn build_registry(ctx: &ToolContext) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    let _ = registry.register(Arc::new(workspace::ReadFileTool::new(ctx.workspace.clone())));
    let _ = registry.register(Arc::new(workspace::WriteFileTool::new(ctx.workspace.clone())));
    let _ = registry.register(Arc::new(workspace::EditFileTool::new(ctx.workspace.clone())));
    let _ = registry.register(Arc::new(workspace::ListFilesTool::new(ctx.workspace.clone())));
    let _ = registry.register(Arc::new(workspace::RunCommandTool::new(ctx.workspace.clone())));

    let _ = registry.register(Arc::new(web::WebFetchTool::new()));
    let _ = registry.register(Arc::new(web::SearchWebTool::new()));

    let _ = registry.register(Arc::new(memory::MemorySearchTool::new(ctx.rag.clone(), ctx.agent_id)));
    let _ = registry.register(Arc::new(memory::MemoryGetTool::new(ctx.kb_store.clone())));
    let _ = registry.register(Arc::new(memory::MemoryStoreTool::new(ctx.rag.clone(), ctx.default_kb_id)));
    let _ = registry.register(Arc::new(memory::MemoryForgetTool::new(ctx.kb_store.clone())));

    let _ = registry.register(Arc::new(sessions::SessionsListTool::new(ctx.sessions.clone(), ctx.agent_id)));
    let _ = registry.register(Arc::new(sessions::SessionsSendTool::new(ctx.sessions.clone(), ctx.events.clone())));
    let _ = registry.register(Arc::new(sessions::SessionsSpawnTool::new(ctx.sessions.clone(), ctx.agent_id)));

    let _ = registry.register(Arc::new(scheduling::CronAddTool::new(ctx.triggers.clone(), ctx.agent_id)));
    let _ = registry.register(Arc::new(scheduling::CronRemoveTool::new(ctx.triggers.clone())));
    let _ = registry.register(Arc::new(scheduling::CronListTool::new(ctx.triggers.clone(), ctx.agent_id)));
    let _ = registry.register(Arc::new(scheduling::WebhookRegisterTool::new(ctx.triggers.clone(), ctx.agent_id)));
    let _ = registry.register(Arc::new(scheduling::WebhookListTool::new(ctx.triggers.clone(), ctx.agent_id)));
    let _ = registry.register(Arc::new(scheduling::GatewayStatusTool::new(ctx.gateway_base_url.clone())));

    let _ = registry.register(Arc::new(skills::SkillListTool::new(ctx.workspace.clone())));
    let _ = registry.register(Arc::new(skills::SkillInstallTool::new(ctx.workspace.clone())));
    let _ = registry.register(Arc::new(skills::SkillCreateTool::new(ctx.workspace.clone())));

    registry
}

/// Adds the `browser_*` tools bound to one shared `BrowserSession`. Callers
/// decide when a session is warranted (e.g. an agent with
/// `code_execution_enabled` and a `browser` feature build) rather than
/// launching Chrome unconditionally for every agent.
#[cfg(feature = "browser")]
pub fn register_browser_tools(registry: &mut ToolRegistry, session: Arc<browser::BrowserSession>) {
    let _ = registry.register(Arc::new(browser::BrowserOpenTool::new(session.clone())));
    let _ = registry.register(Arc::new(browser::BrowserNavigateTool::new(session.clone())));
    let _ = registry.register(Arc::new(browser::BrowserClickTool::new(session.clone())));
    let _ = registry.register(Arc::new(browser::BrowserTypeTool::new(session.clone())));
    let _ = registry.register(Arc::new(browser::BrowserFillTool::new(session.clone())));
    let _ = registry.register(Arc::new(browser::BrowserScrollTool::new(session.clone())));
    let _ = registry.register(Arc::new(browser::BrowserSnapshotTool::new(session.clone())));
    let _ = registry.register(Arc::new(browser::BrowserExtractTool::new(session.clone())));
    let _ = registry.register(Arc::new(browser::BrowserCloseTool::new(session)));
}
