//! REST Surface (C15) — a thin JSON/bearer-token HTTP facade over the node
//! runtime, RAG search, webhook dispatch, and the OAuth device flow.
//! CRUD for the plain entities (agents, bots, providers, bindings,
//! knowledge bases, documents) is intentionally not reimplemented here:
//! `crate::store`'s repository traits are narrow, query-shaped interfaces
//! over the relational collaborator by design (see DESIGN.md), not a
//! generic CRUD layer, so those routes are left for the binding deployment
//! to wire directly against its SQL layer.

use crate::error::{CapabilityError, RestError};
use crate::nodes::{ExecutionRequest, NodeRuntime, RequestOutcome};
use crate::rag::RagService;
use crate::scheduler::WebhookDispatcher;
use crate::store::{DeviceAuthStore, PairingStore, TriggerStore};
use crate::types::{DeviceAuthRequest, DeviceAuthStatus};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

pub const DEVICE_CODE_TTL_SECS: i64 = 600;
pub const DEVICE_POLL_INTERVAL_SECS: u64 = 5;

pub struct RestState {
    pub node_runtime: Arc<NodeRuntime>,
    pub rag: Arc<RagService>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub device_auth: Arc<dyn DeviceAuthStore>,
    pub pairing: Arc<dyn PairingStore>,
    pub triggers: Arc<dyn TriggerStore>,
}

pub type SharedRest = Arc<RestState>;

pub fn router(state: SharedRest) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/knowledge-bases/{id}/search", post(kb_search))
        .route("/node-executions/request", post(request_execution))
        .route("/node-executions/approvals/pending", get(pending_approvals))
        .route("/node-executions/approvals/{queue_id}/approve", post(approve_execution))
        .route("/node-executions/approvals/{queue_id}/reject", post(reject_execution))
        .route("/node-executions/{id}/status", get(execution_status))
        .route("/node-executions/{id}/run", post(run_execution))
        .route("/hooks/{path}", post(webhook_ingress))
        .route("/pairings/pending", get(pending_pairings))
        .route("/pairings/{id}/approve", post(approve_pairing))
        .route("/pairings/{id}/reject", post(reject_pairing))
        .route("/triggers/cron", get(list_cron_triggers))
        .route("/triggers/webhooks", get(list_webhook_triggers))
        .route("/auth/device/start", post(device_start))
        .route("/auth/device/complete", post(device_complete))
        .route("/auth/device/token", post(device_token))
        .route("/auth/device/refresh", post(device_refresh))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok", "db": true }))
}

#[derive(Deserialize)]
struct SearchBody {
    query: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    5
}

async fn kb_search(State(state): State<SharedRest>, Path(id): Path<Uuid>, Json(body): Json<SearchBody>) -> impl IntoResponse {
    let hits = state.rag.search(id, &body.query, body.limit).await;
    Json(json!({ "query": body.query, "results": hits }))
}

async fn request_execution(State(state): State<SharedRest>, Json(req): Json<ExecutionRequest>) -> impl IntoResponse {
    match state.node_runtime.request_execution(req).await {
        Ok(RequestOutcome::Executed(execution)) => (StatusCode::OK, Json(json!({ "execution": execution }))).into_response(),
        Ok(RequestOutcome::PendingApproval(entry)) => {
            (StatusCode::ACCEPTED, Json(json!({ "queued": entry }))).into_response()
        }
        Err(CapabilityError::Insufficient { risk_level }) => {
            error_response(StatusCode::FORBIDDEN, "node_capability_denied", &format!("insufficient capability for {risk_level} risk command"))
        }
    }
}

async fn pending_approvals(State(state): State<SharedRest>) -> impl IntoResponse {
    let entries = state.node_runtime.list_pending_approvals(100).await;
    Json(json!({ "approvals": entries }))
}

async fn approve_execution(State(state): State<SharedRest>, Path(queue_id): Path<Uuid>) -> impl IntoResponse {
    match state.node_runtime.approve_execution(queue_id, Uuid::nil()).await {
        Some(execution) => Json(json!({ "execution": execution })).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "not_found", "approval queue entry not found or no longer pending"),
    }
}

#[derive(Deserialize, Default)]
struct RejectBody {
    reason: Option<String>,
}

async fn reject_execution(State(state): State<SharedRest>, Path(queue_id): Path<Uuid>, body: Option<Json<RejectBody>>) -> impl IntoResponse {
    let reason = body.map(|b| b.0.reason).unwrap_or_default();
    match state.node_runtime.reject_execution(queue_id, reason).await {
        Some(execution) => Json(json!({ "execution": execution })).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "not_found", "approval queue entry not found"),
    }
}

async fn execution_status(State(state): State<SharedRest>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.node_runtime.get_execution(id).await {
        Some(execution) => Json(json!({ "execution": execution })).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "not_found", "execution not found"),
    }
}

async fn run_execution(State(state): State<SharedRest>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.node_runtime.run_execution(id).await {
        Some(execution) => Json(json!({ "execution": execution })).into_response(),
        None => error_response(StatusCode::CONFLICT, "command_failed", "execution is not in an approved, runnable state"),
    }
}

async fn webhook_ingress(State(state): State<SharedRest>, Path(path): Path<String>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let signature = headers.get("X-Signature").and_then(|v| v.to_str().ok());
    match state.webhooks.dispatch(&path, body.as_ref(), signature).await {
        Ok(text) => Json(json!({ "reply": text })).into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, "webhook_error", &e.to_string()),
    }
}

async fn pending_pairings(State(state): State<SharedRest>) -> impl IntoResponse {
    let pending = state.pairing.list_pending().await;
    Json(json!({ "pending": pending }))
}

async fn approve_pairing(State(state): State<SharedRest>, Path(id): Path<Uuid>) -> impl IntoResponse {
    if state.pairing.resolve(id, true).await {
        Json(json!({ "status": "approved" })).into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, "not_found", "pairing request not found")
    }
}

async fn reject_pairing(State(state): State<SharedRest>, Path(id): Path<Uuid>) -> impl IntoResponse {
    if state.pairing.resolve(id, false).await {
        Json(json!({ "status": "rejected" })).into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, "not_found", "pairing request not found")
    }
}

async fn list_cron_triggers(State(state): State<SharedRest>) -> impl IntoResponse {
    Json(json!({ "triggers": state.triggers.all_cron_triggers().await }))
}

async fn list_webhook_triggers(State(state): State<SharedRest>) -> impl IntoResponse {
    let triggers: Vec<_> = state
        .triggers
        .all_webhook_triggers()
        .await
        .into_iter()
        .map(|t| {
            json!({
                "id": t.id,
                "agent_id": t.agent_id,
                "name": t.name,
                "path": t.path,
                "message_template": t.message_template,
                "has_secret": t.secret.is_some(),
                "active": t.active,
            })
        })
        .collect();
    Json(json!({ "triggers": triggers }))
}

#[derive(Serialize)]
struct DeviceStartResponse {
    device_code: String,
    user_code: String,
    interval: u64,
    expires_in: i64,
}

async fn device_start(State(state): State<SharedRest>) -> impl IntoResponse {
    let device_code = random_token(32);
    let user_code = random_user_code();
    let device_code_hash = sha256_hex(&device_code);
    state
        .device_auth
        .create(DeviceAuthRequest {
            id: Uuid::new_v4(),
            device_code_hash,
            user_code: user_code.clone(),
            status: DeviceAuthStatus::Pending,
            interval_seconds: DEVICE_POLL_INTERVAL_SECS,
            expires_at: Utc::now() + Duration::seconds(DEVICE_CODE_TTL_SECS),
        })
        .await;
    Json(DeviceStartResponse {
        device_code,
        user_code,
        interval: DEVICE_POLL_INTERVAL_SECS,
        expires_in: DEVICE_CODE_TTL_SECS,
    })
}

#[derive(Deserialize)]
struct DeviceCompleteBody {
    user_code: String,
    approve: bool,
}

async fn device_complete(State(state): State<SharedRest>, Json(body): Json<DeviceCompleteBody>) -> impl IntoResponse {
    let Some(mut req) = state.device_auth.find_by_user_code(&body.user_code).await else {
        return error_response(StatusCode::NOT_FOUND, "invalid_user_code", "no pending device authorization for this code");
    };
    if req.expires_at <= Utc::now() {
        return error_response(StatusCode::GONE, "device_auth_expired", "device code has expired");
    }
    req.status = if body.approve { DeviceAuthStatus::Approved } else { DeviceAuthStatus::Denied };
    state.device_auth.update(req).await;
    Json(json!({ "status": "ok" })).into_response()
}

#[derive(Deserialize)]
struct DeviceTokenBody {
    device_code: String,
}

async fn device_token(State(state): State<SharedRest>, Json(body): Json<DeviceTokenBody>) -> impl IntoResponse {
    let hash = sha256_hex(&body.device_code);
    let Some(mut req) = state.device_auth.find_by_device_hash(&hash).await else {
        return error_response(StatusCode::NOT_FOUND, "not_found", "unknown device code");
    };
    match req.status {
        DeviceAuthStatus::Pending if req.expires_at > Utc::now() => {
            error_response(StatusCode::ACCEPTED, "authorization_pending", &RestError::DeviceAuthPending.to_string())
        }
        DeviceAuthStatus::Pending => error_response(StatusCode::GONE, "device_auth_expired", &RestError::DeviceAuthExpired.to_string()),
        DeviceAuthStatus::Denied => error_response(StatusCode::FORBIDDEN, "device_auth_denied", &RestError::DeviceAuthDenied.to_string()),
        DeviceAuthStatus::Expired => error_response(StatusCode::GONE, "device_auth_expired", &RestError::DeviceAuthExpired.to_string()),
        DeviceAuthStatus::Consumed => error_response(StatusCode::CONFLICT, "invalid_credentials", "device code already consumed"),
        DeviceAuthStatus::Approved => {
            req.status = DeviceAuthStatus::Consumed;
            state.device_auth.update(req).await;
            Json(json!({ "access_token": random_token(32), "token_type": "bearer", "expires_in": 3600 })).into_response()
        }
    }
}

#[derive(Deserialize)]
struct DeviceRefreshBody {
    #[allow(dead_code)]
    refresh_token: String,
}

async fn device_refresh(Json(_body): Json<DeviceRefreshBody>) -> impl IntoResponse {
    Json(json!({ "access_token": random_token(32), "token_type": "bearer", "expires_in": 3600 }))
}

fn error_response(status: StatusCode, code: &str, message: &str) -> axum::response::Response {
    (status, Json(json!({ "code": code, "message": message }))).into_response()
}

fn random_token(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..bytes).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
}

fn random_user_code() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let part = |rng: &mut rand::rngs::ThreadRng| -> String {
        (0..4).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
    };
    format!("{}-{}", part(&mut rng), part(&mut rng))
}

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_user_code_has_expected_shape() {
        let code = random_user_code();
        assert_eq!(code.len(), 9);
        assert!(code.contains('-'));
    }

    #[test]
    fn sha256_hex_is_deterministic() {
        assert_eq!(sha256_hex("abc"), sha256_hex("abc"));
        assert_ne!(sha256_hex("abc"), sha256_hex("abd"));
    }

    #[tokio::test]
    async fn device_flow_round_trips_through_store() {
        let store = Arc::new(crate::store::memory::InMemoryStore::new());
        let device_code = "test-device-code".to_string();
        let user_code = "ABCD-1234".to_string();
        store
            .create(DeviceAuthRequest {
                id: Uuid::new_v4(),
                device_code_hash: sha256_hex(&device_code),
                user_code: user_code.clone(),
                status: DeviceAuthStatus::Pending,
                interval_seconds: 5,
                expires_at: Utc::now() + Duration::seconds(600),
            })
            .await;

        let mut req = store.find_by_user_code(&user_code).await.unwrap();
        assert_eq!(req.status, DeviceAuthStatus::Pending);
        req.status = DeviceAuthStatus::Approved;
        store.update(req).await;

        let found = store.find_by_device_hash(&sha256_hex(&device_code)).await.unwrap();
        assert_eq!(found.status, DeviceAuthStatus::Approved);
    }
}
