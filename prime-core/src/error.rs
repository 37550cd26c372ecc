//! Error taxonomy for the Prime core library.
//!
//! One `thiserror` enum per subsystem, aggregated into [`PrimeError`], mirroring
//! the per-concern error split used throughout the gateway and services.

/// Top-level error type for `prime-core`.
#[derive(Debug, thiserror::Error)]
pub enum PrimeError {
    #[error("idempotency error: {0}")]
    Idempotency(#[from] IdempotencyError),

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("command bus error: {0}")]
    CommandBus(#[from] CommandBusError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("rest error: {0}")]
    Rest(#[from] RestError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PrimeError {
    /// Wire error code per spec §6/§7, used by the command bus and REST layer.
    pub fn code(&self) -> &'static str {
        match self {
            PrimeError::Idempotency(IdempotencyError::Conflict) => "idempotency_conflict",
            PrimeError::Idempotency(IdempotencyError::InProgress) => "idempotency_in_progress",
            PrimeError::Idempotency(IdempotencyError::Required) => "idempotency_required",
            PrimeError::Policy(_) => "dm_denied",
            PrimeError::Capability(_) => "node_capability_denied",
            PrimeError::Gateway(GatewayError::AuthFailed) => "auth_failed",
            PrimeError::Gateway(GatewayError::Protocol(_)) => "protocol_error",
            PrimeError::Gateway(GatewayError::ScopeDenied) => "scope_denied",
            PrimeError::CommandBus(CommandBusError::ScopeDenied) => "scope_denied",
            PrimeError::CommandBus(CommandBusError::Unknown(_)) => "not_found",
            PrimeError::Provider(_) => "provider_error",
            PrimeError::Sandbox(_) => "sandbox_error",
            PrimeError::Scheduler(_) => "internal_error",
            PrimeError::Rest(RestError::InvalidCredentials) => "invalid_credentials",
            PrimeError::Rest(_) => "command_failed",
            PrimeError::NotFound(_) => "not_found",
            PrimeError::Config(_) | PrimeError::Io(_) | PrimeError::Serialization(_) => {
                "internal_error"
            }
            _ => "command_failed",
        }
    }
}

/// Result alias used throughout `prime-core`.
pub type Result<T> = std::result::Result<T, PrimeError>;

/// Errors from the Idempotency Service (C2).
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdempotencyError {
    #[error("a side-effect method was called without an idempotency key")]
    Required,
    #[error("request is still in progress for this idempotency key")]
    InProgress,
    #[error("idempotency key reused with different request parameters")]
    Conflict,
}

/// Errors from DM Policy evaluation (C4).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PolicyError {
    #[error("sender is not authorized to message this agent: {reason}")]
    Denied { reason: String },
}

/// Errors from node capability checks (C11).
#[derive(Debug, Clone, thiserror::Error)]
pub enum CapabilityError {
    #[error("node lacks required capability for {risk_level} risk command")]
    Insufficient { risk_level: String },
}

/// Errors surfaced by the WebSocket gateway (C13).
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("authentication failed")]
    AuthFailed,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("scope denied")]
    ScopeDenied,
}

/// Errors from the Command Bus (C12).
#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandBusError {
    #[error("unknown method: {0}")]
    Unknown(String),
    #[error("caller scope does not authorize this method")]
    ScopeDenied,
    #[error("{0}")]
    Idempotency(#[from] IdempotencyError),
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

/// Errors from LLM provider interactions (C7).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("request to provider failed: {message}")]
    Request { message: String },
    #[error("failed to parse provider response: {message}")]
    ResponseParse { message: String },
    #[error("provider returned no usable completion")]
    Empty,
}

/// Errors from tool registration and execution (C6).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("tool not found: {name}")]
    NotFound { name: String },
    #[error("tool already registered: {name}")]
    AlreadyRegistered { name: String },
    #[error("invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },
    #[error("tool '{name}' execution failed: {message}")]
    ExecutionFailed { name: String, message: String },
    #[error("tool '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },
    #[error("path '{path}' escapes the workspace root")]
    PathEscape { path: String },
}

/// Errors from sandboxed/subprocess command execution (C16).
#[derive(Debug, Clone, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to spawn command: {message}")]
    Spawn { message: String },
    #[error("command execution failed: {message}")]
    Execution { message: String },
}

/// Errors from cron/webhook trigger scheduling (C14).
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expression}': {message}")]
    InvalidCronExpression { expression: String, message: String },
    #[error("webhook verification failed: {message}")]
    WebhookVerificationFailed { message: String },
    #[error("no webhook trigger registered for path '{path}'")]
    UnknownWebhookPath { path: String },
}

/// Errors from the REST surface's own concerns (C15), distinct from the
/// service errors it wraps.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RestError {
    #[error("device authorization is still pending user approval")]
    DeviceAuthPending,
    #[error("device authorization was denied")]
    DeviceAuthDenied,
    #[error("device authorization code has expired")]
    DeviceAuthExpired,
    #[error("invalid user code")]
    InvalidUserCode,
    #[error("invalid credentials")]
    InvalidCredentials,
}

/// Errors from configuration loading.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
    #[error("missing required environment variable: {var}")]
    EnvVarMissing { var: String },
}
