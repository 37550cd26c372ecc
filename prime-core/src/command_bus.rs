//! Command Bus (C12).
//!
//! A single `dispatch` entry point gates every RPC method behind a scope
//! check and, for side-effecting methods, an idempotency key.

use crate::binding::BindingResolver;
use crate::error::{CommandBusError, IdempotencyError};
use crate::idempotency::{IdempotencyService, Reservation};
use crate::policy::{Decision, MessageContext, PolicyEngine};
use crate::types::Agent;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Claims extracted from a gateway connection's authenticated session.
#[derive(Debug, Clone)]
pub struct UserClaims {
    pub user_id: Uuid,
    pub scopes: Vec<String>,
}

impl UserClaims {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope || s == "*")
    }
}

#[derive(Debug, Clone, Copy)]
struct MethodSpec {
    name: &'static str,
    required_scope: &'static str,
    side_effect: bool,
}

const METHODS: &[MethodSpec] = &[
    MethodSpec { name: "health.get", required_scope: "health.read", side_effect: false },
    MethodSpec { name: "tasks.list", required_scope: "tasks.read", side_effect: false },
    MethodSpec { name: "tasks.create", required_scope: "tasks.write", side_effect: true },
    MethodSpec { name: "tasks.retry", required_scope: "tasks.write", side_effect: true },
    MethodSpec { name: "bindings.resolve", required_scope: "routing.read", side_effect: false },
    MethodSpec { name: "policy.dm_check", required_scope: "policy.read", side_effect: false },
];

fn lookup(method: &str) -> Result<&'static MethodSpec, CommandBusError> {
    METHODS.iter().find(|m| m.name == method).ok_or_else(|| CommandBusError::Unknown(method.to_string()))
}

/// Request frame fields relevant to dispatch (transport-agnostic).
pub struct CommandRequest {
    pub method: String,
    pub params: Value,
    pub idempotency_key: Option<String>,
}

pub struct CommandBus {
    idempotency: Arc<IdempotencyService>,
    binding_resolver: Arc<BindingResolver>,
}

impl CommandBus {
    pub fn new(idempotency: Arc<IdempotencyService>, binding_resolver: Arc<BindingResolver>) -> Self {
        Self { idempotency, binding_resolver }
    }

    pub async fn dispatch(&self, req: CommandRequest, claims: &UserClaims) -> Result<Value, CommandBusError> {
        let spec = lookup(&req.method)?;
        if !claims.has_scope(spec.required_scope) {
            return Err(CommandBusError::ScopeDenied);
        }

        if spec.side_effect {
            let key = req.idempotency_key.as_deref().ok_or(IdempotencyError::Required)?;
            match self
                .idempotency
                .reserve_or_get(key, claims.user_id, &req.method, &req.params)
                .await
                .map_err(CommandBusError::from)?
            {
                Reservation::Replay(response) => return Ok(response),
                Reservation::Proceed => {}
            }
            let result = self.execute(&req.method, &req.params, claims).await;
            match &result {
                Ok(response) => self.idempotency.complete(key, claims.user_id, response.clone()).await,
                Err(_) => self.idempotency.fail(key, claims.user_id).await,
            }
            result
        } else {
            self.execute(&req.method, &req.params, claims).await
        }
    }

    async fn execute(&self, method: &str, params: &Value, _claims: &UserClaims) -> Result<Value, CommandBusError> {
        match method {
            "health.get" => Ok(serde_json::json!({ "status": "ok" })),
            "bindings.resolve" => {
                let channel = params["channel"].as_str().ok_or_else(|| invalid("channel"))?;
                let bot_id = params["bot_id"].as_str().and_then(|s| Uuid::parse_str(s).ok());
                let account_id = params["account_id"].as_str();
                let peer = params["peer"].as_str();
                let binding = self.binding_resolver.resolve(channel, bot_id, account_id, peer).await;
                Ok(serde_json::json!({ "binding": binding }))
            }
            "policy.dm_check" => {
                let agent: Agent = serde_json::from_value(params["agent"].clone())
                    .map_err(|e| CommandBusError::InvalidParams(e.to_string()))?;
                let sender_user_id = params["sender_user_id"]
                    .as_str()
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| invalid("sender_user_id"))?;
                let ctx = MessageContext {
                    is_group: params["is_group"].as_bool().unwrap_or(false),
                    bot_mentioned: params["bot_mentioned"].as_bool().unwrap_or(false),
                    sender_user_id,
                    is_paired: params["is_paired"].as_bool().unwrap_or(false),
                    peer: params["peer"].as_str().unwrap_or(""),
                };
                let decision = PolicyEngine::evaluate(&agent, &ctx);
                Ok(serde_json::json!({ "allowed": matches!(decision, Decision::Allowed) }))
            }
            "tasks.list" | "tasks.create" | "tasks.retry" => {
                // Task persistence is delegated to the relational store
                // collaborator; this bus only guards scope/idempotency.
                Err(CommandBusError::InvalidParams(format!("{method} requires a task store binding")))
            }
            other => Err(CommandBusError::Unknown(other.to_string())),
        }
    }
}

fn invalid(field: &str) -> CommandBusError {
    CommandBusError::InvalidParams(format!("missing or invalid '{field}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn claims(scopes: &[&str]) -> UserClaims {
        UserClaims { user_id: Uuid::new_v4(), scopes: scopes.iter().map(|s| s.to_string()).collect() }
    }

    fn bus() -> CommandBus {
        let store = Arc::new(InMemoryStore::new());
        let idempotency = Arc::new(IdempotencyService::new(store.clone()));
        let resolver = Arc::new(BindingResolver::new(store));
        CommandBus::new(idempotency, resolver)
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let bus = bus();
        let req = CommandRequest { method: "nope".into(), params: serde_json::json!({}), idempotency_key: None };
        let err = bus.dispatch(req, &claims(&["*"])).await.unwrap_err();
        assert!(matches!(err, CommandBusError::Unknown(_)));
    }

    #[tokio::test]
    async fn missing_scope_is_denied() {
        let bus = bus();
        let req = CommandRequest { method: "health.get".into(), params: serde_json::json!({}), idempotency_key: None };
        let err = bus.dispatch(req, &claims(&["other.scope"])).await.unwrap_err();
        assert!(matches!(err, CommandBusError::ScopeDenied));
    }

    #[tokio::test]
    async fn side_effect_method_without_key_is_rejected() {
        let bus = bus();
        let req = CommandRequest { method: "tasks.create".into(), params: serde_json::json!({}), idempotency_key: None };
        let err = bus.dispatch(req, &claims(&["tasks.write"])).await.unwrap_err();
        assert!(matches!(err, CommandBusError::Idempotency(IdempotencyError::Required)));
    }

    #[tokio::test]
    async fn health_get_succeeds_with_scope() {
        let bus = bus();
        let req = CommandRequest { method: "health.get".into(), params: serde_json::json!({}), idempotency_key: None };
        let result = bus.dispatch(req, &claims(&["health.read"])).await.unwrap();
        assert_eq!(result["status"], "ok");
    }
}
