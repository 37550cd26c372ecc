//! Node Execution & Approval (C11).
//!
//! Risk-classifies a requested command, checks the calling node's
//! capability set, decides whether it can be auto-approved or must sit in
//! the approval queue, and executes it through the [`crate::sandbox`]
//! once cleared.

use crate::error::CapabilityError;
use crate::event_bus::EventBus;
use crate::sandbox::SandboxExecutor;
use crate::store::NodeExecutionStore;
use crate::types::{ApprovalStatus, ExecutionStatus, NodeApprovalQueueEntry, NodeExecution, RiskLevel};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// Global override: when set, every execution skips the approval queue.
/// Mirrors the original runtime's process-wide `AUTO_APPROVE_ALL` flag.
pub static AUTO_APPROVE_ALL: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

const TRUSTED_COMMANDS: &[&str] = &[
    "ls", "cat", "head", "tail", "grep", "find", "pwd", "echo", "git", "status", "diff", "log",
    "show", "python", "python3", "pip", "npm", "yarn", "node", "cd", "mkdir", "touch", "code",
    "cursor", "vim", "nano", "less", "more",
];

struct RiskTables {
    critical: Vec<Regex>,
    high: Vec<Regex>,
    medium: Vec<Regex>,
}

fn risk_tables() -> &'static RiskTables {
    static TABLES: OnceLock<RiskTables> = OnceLock::new();
    TABLES.get_or_init(|| RiskTables {
        critical: compile(&[
            r"rm\s+-rf\s+/",
            r"mkfs\.",
            r"dd\s+if=.*of=/dev",
            r":\(\)\s*\{\s*:\|\s*:\s*&\s*\}",
            r"curl.*\|.*sh",
            r"wget.*\|.*sh",
            r"curl.*\|.*bash",
        ]),
        high: compile(&[
            r"sudo\s+",
            r"rm\s+-rf",
            r"chmod\s+-R",
            r"chown\s+-R",
            r"docker\s+run\s+--privileged",
            r"kubectl\s+(delete|apply)",
        ]),
        medium: compile(&[r"git\s+(push|force)", r"scp\s+", r"rsync\s+.*--delete", r"docker\s+(build|run)"]),
    })
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(&format!("(?i){p}")).unwrap()).collect()
}

/// Risk classification over `command + " " + args`, matching the most
/// severe tier that has a hit; otherwise [`RiskLevel::Low`].
pub fn assess_risk(command: &str, args: &str) -> RiskLevel {
    let full = format!("{command} {args}").to_lowercase();
    let tables = risk_tables();
    if tables.critical.iter().any(|r| r.is_match(&full)) {
        return RiskLevel::Critical;
    }
    if tables.high.iter().any(|r| r.is_match(&full)) {
        return RiskLevel::High;
    }
    if tables.medium.iter().any(|r| r.is_match(&full)) {
        return RiskLevel::Medium;
    }
    RiskLevel::Low
}

/// Checks that `node_caps` authorizes executing a command of `risk`.
pub fn check_capabilities(node_caps: &[String], risk: RiskLevel) -> Result<(), CapabilityError> {
    if node_caps.iter().any(|c| c == "*" || c == "admin") {
        return Ok(());
    }
    if risk == RiskLevel::Critical && !node_caps.iter().any(|c| c == "exec.critical") {
        return Err(CapabilityError::Insufficient { risk_level: risk.to_string() });
    }
    if risk == RiskLevel::High && !node_caps.iter().any(|c| c == "exec.high") {
        return Err(CapabilityError::Insufficient { risk_level: risk.to_string() });
    }
    if !node_caps.iter().any(|c| c == "exec" || c == "exec.*") {
        return Err(CapabilityError::Insufficient { risk_level: risk.to_string() });
    }
    Ok(())
}

/// Decides auto-approval per spec §4.10: explicit `auto_approve`
/// capability, or trusted-node + low-risk + allowlisted first token, or a
/// custom rule regex.
pub fn can_auto_approve(
    node_caps: &[String],
    command: &str,
    risk: RiskLevel,
    auto_approve_rules: &[String],
) -> Option<&'static str> {
    if node_caps.iter().any(|c| c == "auto_approve" || c == "exec.auto_approve") {
        return Some("capability_auto_approve");
    }
    if node_caps.iter().any(|c| c == "trusted") && risk == RiskLevel::Low {
        if let Some(base_cmd) = command.split_whitespace().next() {
            if TRUSTED_COMMANDS.contains(&base_cmd) {
                return Some("trusted_command");
            }
        }
    }
    for rule in auto_approve_rules {
        if let Ok(re) = Regex::new(&format!("(?i){rule}")) {
            if re.is_match(command) {
                return Some("rule_match");
            }
        }
    }
    None
}

pub const QUEUE_TTL_HOURS: i64 = 24;

pub struct NodeRuntime {
    store: Arc<dyn NodeExecutionStore>,
    sandbox: Arc<dyn SandboxExecutor>,
    event_bus: Arc<EventBus>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExecutionRequest {
    pub connection_id: String,
    pub node_id: String,
    pub node_name: String,
    pub node_caps: Vec<String>,
    pub command: String,
    pub args: String,
    pub params: serde_json::Value,
    pub working_dir: Option<String>,
    pub env_vars: HashMap<String, String>,
    pub idempotency_key: Option<String>,
    pub auto_approve_rules: Vec<String>,
}

pub enum RequestOutcome {
    Executed(NodeExecution),
    PendingApproval(NodeApprovalQueueEntry),
}

impl NodeRuntime {
    pub fn new(store: Arc<dyn NodeExecutionStore>, sandbox: Arc<dyn SandboxExecutor>, event_bus: Arc<EventBus>) -> Self {
        Self { store, sandbox, event_bus }
    }

    pub async fn request_execution(&self, req: ExecutionRequest) -> Result<RequestOutcome, CapabilityError> {
        let risk = assess_risk(&req.command, &req.args);
        check_capabilities(&req.node_caps, risk)?;

        let auto_approve_all = AUTO_APPROVE_ALL.load(std::sync::atomic::Ordering::Relaxed);
        let auto_rule = can_auto_approve(&req.node_caps, &req.command, risk, &req.auto_approve_rules);

        let needs_queue = !auto_approve_all
            && (matches!(risk, RiskLevel::High | RiskLevel::Critical) || auto_rule.is_none());

        let now = chrono::Utc::now();
        let execution = NodeExecution {
            id: Uuid::new_v4(),
            connection_id: req.connection_id.clone(),
            node_id: req.node_id.clone(),
            node_name: req.node_name.clone(),
            command: req.command.clone(),
            params: req.params.clone(),
            working_dir: req.working_dir.clone(),
            env_vars: req.env_vars.clone(),
            status: if needs_queue { ExecutionStatus::PendingApproval } else { ExecutionStatus::Approved },
            requires_approval: needs_queue,
            approved_by: None,
            approval_reason: if needs_queue { None } else { auto_rule.map(str::to_string).or(Some("auto_approve_all".into())) },
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error_message: None,
            idempotency_key: req.idempotency_key.clone(),
            created_at: now,
        };
        self.store.insert_execution(execution.clone()).await;

        if needs_queue {
            let entry = NodeApprovalQueueEntry {
                id: Uuid::new_v4(),
                execution_id: execution.id,
                command: req.command.clone(),
                params_summary: req.params.to_string(),
                risk_level: risk,
                status: ApprovalStatus::Pending,
                expires_at: now + chrono::Duration::hours(QUEUE_TTL_HOURS),
                auto_approved: false,
                auto_approval_rule: None,
                created_at: now,
            };
            self.store.insert_queue_entry(entry.clone()).await;
            self.event_bus
                .publish(
                    "node.execution.pending_approval",
                    serde_json::json!({ "execution_id": execution.id, "risk_level": risk.to_string() }),
                )
                .await;
            return Ok(RequestOutcome::PendingApproval(entry));
        }

        self.event_bus
            .publish("node.execution.approved", serde_json::json!({ "execution_id": execution.id }))
            .await;
        let executed = self.execute_approved(execution).await;
        Ok(RequestOutcome::Executed(executed))
    }

    pub async fn approve_execution(&self, queue_id: Uuid, approved_by: Uuid) -> Option<NodeExecution> {
        let mut entry = self.store.get_queue_entry(queue_id).await?;
        if entry.status != ApprovalStatus::Pending || entry.expires_at <= chrono::Utc::now() {
            return None;
        }
        entry.status = ApprovalStatus::Approved;
        self.store.update_queue_entry(entry.clone()).await;

        let mut execution = self.store.get_execution(entry.execution_id).await?;
        execution.status = ExecutionStatus::Approved;
        execution.approved_by = Some(approved_by);
        self.store.update_execution(execution.clone()).await;

        self.event_bus
            .publish("node.execution.approved", serde_json::json!({ "execution_id": execution.id }))
            .await;
        Some(self.execute_approved(execution).await)
    }

    pub async fn reject_execution(&self, queue_id: Uuid, reason: Option<String>) -> Option<NodeExecution> {
        let mut entry = self.store.get_queue_entry(queue_id).await?;
        entry.status = ApprovalStatus::Rejected;
        self.store.update_queue_entry(entry.clone()).await;

        let mut execution = self.store.get_execution(entry.execution_id).await?;
        execution.status = ExecutionStatus::Rejected;
        execution.approval_reason = reason;
        self.store.update_execution(execution.clone()).await;
        self.event_bus
            .publish("node.execution.rejected", serde_json::json!({ "execution_id": execution.id }))
            .await;
        Some(execution)
    }

    pub async fn list_pending_approvals(&self, limit: usize) -> Vec<NodeApprovalQueueEntry> {
        self.store.list_pending_approvals(limit).await
    }

    pub async fn get_execution(&self, id: Uuid) -> Option<NodeExecution> {
        self.store.get_execution(id).await
    }

    /// Re-run an execution that is `Approved` but has not yet been
    /// dispatched through the sandbox (REST `/node-executions/{id}/run`).
    pub async fn run_execution(&self, id: Uuid) -> Option<NodeExecution> {
        let execution = self.store.get_execution(id).await?;
        if execution.status != ExecutionStatus::Approved {
            return None;
        }
        Some(self.execute_approved(execution).await)
    }

    async fn execute_approved(&self, mut execution: NodeExecution) -> NodeExecution {
        execution.status = ExecutionStatus::InProgress;
        self.store.update_execution(execution.clone()).await;
        self.event_bus
            .publish("node.execution.started", serde_json::json!({ "execution_id": execution.id }))
            .await;

        let working_dir = execution.working_dir.as_deref().map(Path::new);
        match self.sandbox.execute(&execution.command, working_dir, &execution.env_vars).await {
            Ok(output) => {
                execution.exit_code = Some(output.exit_code);
                execution.stdout = output.stdout;
                execution.stderr = output.stderr;
                execution.status = if output.exit_code == 0 { ExecutionStatus::Completed } else { ExecutionStatus::Failed };
                self.event_bus
                    .publish(
                        if execution.status == ExecutionStatus::Completed { "node.execution.completed" } else { "node.execution.failed" },
                        serde_json::json!({ "execution_id": execution.id, "exit_code": execution.exit_code }),
                    )
                    .await;
            }
            Err(e) => {
                execution.status = ExecutionStatus::Failed;
                execution.error_message = Some(e.to_string());
                self.event_bus
                    .publish("node.execution.failed", serde_json::json!({ "execution_id": execution.id, "error": e.to_string() }))
                    .await;
            }
        }
        self.store.update_execution(execution.clone()).await;
        execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{SandboxError, SandboxOutput};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;

    struct FakeSandbox {
        exit_code: i32,
    }

    #[async_trait]
    impl SandboxExecutor for FakeSandbox {
        async fn execute(
            &self,
            _command: &str,
            _working_dir: Option<&Path>,
            _env: &HashMap<String, String>,
        ) -> Result<SandboxOutput, SandboxError> {
            Ok(SandboxOutput { exit_code: self.exit_code, stdout: "ok".into(), stderr: String::new() })
        }
    }

    fn request(command: &str, caps: Vec<&str>) -> ExecutionRequest {
        ExecutionRequest {
            connection_id: "c1".into(),
            node_id: "n1".into(),
            node_name: "node".into(),
            node_caps: caps.into_iter().map(str::to_string).collect(),
            command: command.to_string(),
            args: String::new(),
            params: serde_json::json!({}),
            working_dir: None,
            env_vars: HashMap::new(),
            idempotency_key: None,
            auto_approve_rules: vec![],
        }
    }

    #[test]
    fn assess_risk_classifies_known_patterns() {
        assert_eq!(assess_risk("rm -rf /", ""), RiskLevel::Critical);
        assert_eq!(assess_risk("sudo apt-get install x", ""), RiskLevel::High);
        assert_eq!(assess_risk("git push --force", ""), RiskLevel::Medium);
        assert_eq!(assess_risk("ls -la", ""), RiskLevel::Low);
    }

    #[test]
    fn check_capabilities_requires_exec_critical_for_critical_risk() {
        let err = check_capabilities(&["exec".to_string()], RiskLevel::Critical).unwrap_err();
        assert!(matches!(err, CapabilityError::Insufficient { .. }));
        assert!(check_capabilities(&["exec.critical".to_string()], RiskLevel::Critical).is_ok());
        assert!(check_capabilities(&["admin".to_string()], RiskLevel::Critical).is_ok());
    }

    #[test]
    fn trusted_low_risk_command_auto_approves() {
        let caps = vec!["trusted".to_string(), "exec".to_string()];
        let reason = can_auto_approve(&caps, "ls -la", RiskLevel::Low, &[]);
        assert_eq!(reason, Some("trusted_command"));
    }

    #[test]
    fn untrusted_first_token_does_not_auto_approve() {
        let caps = vec!["trusted".to_string(), "exec".to_string()];
        let reason = can_auto_approve(&caps, "banana -la", RiskLevel::Low, &[]);
        assert_eq!(reason, None);
    }

    #[tokio::test]
    async fn low_risk_trusted_command_executes_without_queue() {
        let store = Arc::new(InMemoryStore::new());
        let sandbox = Arc::new(FakeSandbox { exit_code: 0 });
        let bus = Arc::new(EventBus::new(8));
        let runtime = NodeRuntime::new(store, sandbox, bus);
        let req = request("ls -la", vec!["trusted", "exec"]);
        match runtime.request_execution(req).await.unwrap() {
            RequestOutcome::Executed(exec) => assert_eq!(exec.status, ExecutionStatus::Completed),
            RequestOutcome::PendingApproval(_) => panic!("expected immediate execution"),
        }
    }

    #[tokio::test]
    async fn high_risk_command_queues_for_approval() {
        let store = Arc::new(InMemoryStore::new());
        let sandbox = Arc::new(FakeSandbox { exit_code: 0 });
        let bus = Arc::new(EventBus::new(8));
        let runtime = NodeRuntime::new(store, sandbox, bus);
        let req = request("sudo rm something", vec!["exec.high", "exec"]);
        match runtime.request_execution(req).await.unwrap() {
            RequestOutcome::PendingApproval(entry) => assert_eq!(entry.risk_level, RiskLevel::High),
            RequestOutcome::Executed(_) => panic!("expected queue"),
        }
    }

    #[tokio::test]
    async fn approval_then_execution_marks_completed() {
        let store = Arc::new(InMemoryStore::new());
        let sandbox = Arc::new(FakeSandbox { exit_code: 0 });
        let bus = Arc::new(EventBus::new(8));
        let runtime = NodeRuntime::new(store, sandbox, bus);
        let req = request("sudo rm something", vec!["exec.high", "exec"]);
        let queue_id = match runtime.request_execution(req).await.unwrap() {
            RequestOutcome::PendingApproval(entry) => entry.id,
            _ => panic!("expected queue"),
        };
        let executed = runtime.approve_execution(queue_id, Uuid::new_v4()).await.unwrap();
        assert_eq!(executed.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn nonzero_exit_marks_failed() {
        let store = Arc::new(InMemoryStore::new());
        let sandbox = Arc::new(FakeSandbox { exit_code: 1 });
        let bus = Arc::new(EventBus::new(8));
        let runtime = NodeRuntime::new(store, sandbox, bus);
        let req = request("ls -la", vec!["trusted", "exec"]);
        match runtime.request_execution(req).await.unwrap() {
            RequestOutcome::Executed(exec) => assert_eq!(exec.status, ExecutionStatus::Failed),
            RequestOutcome::PendingApproval(_) => panic!("expected execution"),
        }
    }
}
