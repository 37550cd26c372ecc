//! `prime start` / `prime stop` — boots the gateway WebSocket control
//! plane and REST surface as two axum servers sharing one in-process
//! store, plus the cron ticker and webhook dispatcher.

use anyhow::{Context, Result, bail};
use prime_core::agent_runner::AgentRunner;
use prime_core::binding::BindingResolver;
use prime_core::command_bus::CommandBus;
use prime_core::config::{AppConfig, GatewayConfig};
use prime_core::event_bus::EventBus;
use prime_core::gateway::{GatewayAuth, GatewayServer};
use prime_core::idempotency::IdempotencyService;
use prime_core::nodes::NodeRuntime;
use prime_core::providers::MockLlmProvider;
use prime_core::rag::{NoEmbedder, RagService};
use prime_core::rest::{self, RestState};
use prime_core::sandbox::SubprocessExecutor;
use prime_core::scheduler::{CronScheduler, WebhookDispatcher};
use prime_core::store::memory::InMemoryStore;
use prime_core::store::TriggerStore;
use prime_core::types::{Agent, DmPolicy};
use prime_tools::ToolContext;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use uuid::Uuid;

const PID_FILE: &str = ".prime/prime.pid";

/// Runs the gateway and REST servers until ctrl-c, or (with `background`)
/// forks a detached process and returns immediately.
pub async fn start(config: AppConfig, workspace: &Path, background: bool) -> Result<()> {
    if background {
        return start_background(workspace);
    }
    write_pid_file(workspace)?;
    let result = run_foreground(config, workspace).await;
    let _ = std::fs::remove_file(workspace.join(PID_FILE));
    result
}

fn start_background(workspace: &Path) -> Result<()> {
    let exe = std::env::current_exe().context("resolving current executable")?;
    let log_path = workspace.join(".prime/prime.log");
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = std::fs::File::create(&log_path)?;
    let child = std::process::Command::new(exe)
        .arg("--workspace")
        .arg(workspace)
        .arg("start")
        .stdout(log_file.try_clone()?)
        .stderr(log_file)
        .spawn()
        .context("spawning background server process")?;
    std::fs::create_dir_all(workspace.join(".prime"))?;
    std::fs::write(workspace.join(PID_FILE), child.id().to_string())?;
    println!("started prime in the background (pid {}), logs at {}", child.id(), log_path.display());
    Ok(())
}

fn write_pid_file(workspace: &Path) -> Result<()> {
    let dir = workspace.join(".prime");
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("prime.pid"), std::process::id().to_string())?;
    Ok(())
}

pub async fn stop(workspace: &Path) -> Result<()> {
    let pid_path = workspace.join(PID_FILE);
    let pid = std::fs::read_to_string(&pid_path).with_context(|| format!("reading {}", pid_path.display()))?;
    let pid = pid.trim();
    let status = tokio::process::Command::new("kill").arg("-TERM").arg(pid).status().await.context("sending SIGTERM")?;
    if !status.success() {
        bail!("kill -TERM {pid} exited with {status}");
    }
    std::fs::remove_file(&pid_path).ok();
    println!("stopped prime (pid {pid})");
    Ok(())
}

async fn run_foreground(config: AppConfig, workspace: &Path) -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let event_bus = Arc::new(EventBus::new(config.gateway.mailbox_depth));
    let rag = Arc::new(RagService::new(store.clone(), Arc::new(NoEmbedder)));
    let sandbox = Arc::new(SubprocessExecutor::new(workspace.to_path_buf()));
    let node_runtime = Arc::new(NodeRuntime::new(store.clone(), sandbox, event_bus.clone()));

    let idempotency = Arc::new(IdempotencyService::new(store.clone()));
    let binding_resolver = Arc::new(BindingResolver::new(store.clone()));
    let command_bus = Arc::new(CommandBus::new(idempotency, binding_resolver));

    let jwt_secret = config.secrets.jwt_secret.clone();
    if jwt_secret.is_none() {
        tracing::warn!("no JWT_SECRET configured; gateway is running in open auth mode, for local development only");
    }
    let auth = Arc::new(GatewayAuth::new(jwt_secret));
    let gateway = Arc::new(GatewayServer::new(config.gateway.clone(), auth, command_bus, event_bus.clone()));

    // A single demo agent backs cron/webhook dispatch and the
    // `gateway_status` tool's default registry until a real persistence
    // collaborator supplies configured agents (see DESIGN.md).
    let demo_agent = default_agent();
    let gateway_base_url = format!("http://{}:{}", config.rest.host, config.rest.port);
    let tool_ctx = ToolContext {
        workspace: workspace.to_path_buf(),
        agent_id: demo_agent.id,
        default_kb_id: None,
        rag: rag.clone(),
        kb_store: store.clone(),
        triggers: store.clone(),
        sessions: store.clone(),
        events: event_bus.clone(),
        gateway_base_url,
    };
    let registry = Arc::new(prime_tools::build_registry(&tool_ctx));
    let runner = Arc::new(AgentRunner::new(Arc::new(MockLlmProvider::new()), registry));

    let mut runners = std::collections::HashMap::new();
    runners.insert(demo_agent.id, runner.clone());
    let cron_scheduler = Arc::new(CronScheduler::new(store.clone(), runners, event_bus.clone()));
    cron_scheduler.load_all(store.active_cron_triggers().await).await;

    let webhooks = Arc::new(WebhookDispatcher::new(store.clone(), store.clone(), runner));

    let rest_state: rest::SharedRest = Arc::new(RestState {
        node_runtime,
        rag,
        webhooks,
        device_auth: store.clone(),
        pairing: store.clone(),
        triggers: store.clone(),
    });

    let gateway_router = gateway.clone().into_router().layer(
        TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO)).on_failure(DefaultOnFailure::new().level(Level::ERROR)),
    );
    let rest_router = rest::router(rest_state).layer(
        TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO)).on_failure(DefaultOnFailure::new().level(Level::ERROR)),
    );

    let gateway_addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let rest_addr = format!("{}:{}", config.rest.host, config.rest.port);

    let gateway_listener = tokio::net::TcpListener::bind(&gateway_addr).await.with_context(|| format!("binding gateway on {gateway_addr}"))?;
    let rest_listener = tokio::net::TcpListener::bind(&rest_addr).await.with_context(|| format!("binding REST on {rest_addr}"))?;

    info!(gateway = %gateway_addr, rest = %rest_addr, "prime server starting");

    let cron_tick = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            cron_scheduler.run_due().await;
        }
    });

    let gateway_serve = tokio::spawn(async move { axum::serve(gateway_listener, gateway_router).await });
    let rest_serve = tokio::spawn(async move { axum::serve(rest_listener, rest_router).await });

    tokio::select! {
        res = gateway_serve => { res??; }
        res = rest_serve => { res??; }
        _ = tokio::signal::ctrl_c() => { info!("received ctrl-c, shutting down"); }
    }
    cron_tick.abort();
    Ok(())
}

fn default_agent() -> Agent {
    Agent {
        id: Uuid::new_v4(),
        org_id: Uuid::new_v4(),
        name: "default".to_string(),
        default_provider_id: Uuid::new_v4(),
        workspace_path: None,
        dm_policy: DmPolicy::Open,
        allowed_user_ids: Vec::new(),
        group_requires_mention: true,
        system_prompt: "You are Prime, a helpful assistant.".to_string(),
        web_search_enabled: true,
        memory_enabled: true,
        max_history_messages: 20,
        code_execution_enabled: false,
        active: true,
    }
}
