//! Gateway server: axum `/ws/events` route, per-connection mailbox,
//! heartbeat/idle-timeout task, and RPC dispatch through the command bus.

use super::auth::GatewayAuth;
use super::connection::ConnectionManager;
use super::protocol::{ClientFrame, ConnectParams, ServerFrame};
use crate::command_bus::{CommandBus, CommandRequest, UserClaims};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::event_bus::{EventBus, Subscription};
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Status surfaced by the REST `/status` endpoint and CLI `status` verb.
pub trait StatusProvider: Send + Sync {
    fn is_healthy(&self) -> bool;
}

pub struct GatewayServer {
    pub config: GatewayConfig,
    pub auth: Arc<GatewayAuth>,
    pub connections: Arc<Mutex<ConnectionManager>>,
    pub command_bus: Arc<CommandBus>,
    pub event_bus: Arc<EventBus>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

pub type SharedGateway = Arc<GatewayServer>;

impl GatewayServer {
    pub fn new(
        config: GatewayConfig,
        auth: Arc<GatewayAuth>,
        command_bus: Arc<CommandBus>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let max_connections = config.max_connections;
        Self {
            config,
            auth,
            connections: Arc::new(Mutex::new(ConnectionManager::new(max_connections))),
            command_bus,
            event_bus,
            started_at: chrono::Utc::now(),
        }
    }

    pub fn into_router(self: Arc<Self>) -> Router {
        Router::new().route("/ws/events", get(ws_upgrade)).with_state(self)
    }
}

impl StatusProvider for GatewayServer {
    fn is_healthy(&self) -> bool {
        true
    }
}

async fn ws_upgrade(State(gateway): State<SharedGateway>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(gateway, socket))
}

async fn handle_socket(gateway: SharedGateway, socket: WebSocket) {
    let connection_id = {
        let mut conns = gateway.connections.lock().await;
        match conns.add_connection() {
            Some(id) => id,
            None => {
                warn!("gateway connection limit reached, rejecting socket");
                return;
            }
        }
    };

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(gateway.config.mailbox_depth);

    let nonce = gateway.auth.issue_nonce(connection_id);
    let _ = tx.send(ServerFrame::challenge(&nonce)).await;

    let writer_gateway = gateway.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else { continue };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        writer_gateway.connections.lock().await.remove_connection(&connection_id);
    });

    let mut claims: Option<UserClaims> = None;
    let mut event_sub: Option<Subscription> = None;

    let mut heartbeat = tokio::time::interval(Duration::from_secs(gateway.config.heartbeat_interval_secs.max(1)));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await; // first tick fires immediately, skip it

    loop {
        tokio::select! {
            maybe_msg = stream.next() => {
                let Some(Ok(msg)) = maybe_msg else { break };
                let Message::Text(text) = msg else { continue };
                gateway.connections.lock().await.touch(&connection_id);

                let frame: Result<ClientFrame, _> = serde_json::from_str(&text);
                let Ok(ClientFrame::Req { id, method, params, idempotency_key }) = frame else {
                    let _ = tx.send(ServerFrame::error(None, "protocol_error", "malformed request frame")).await;
                    continue;
                };

                if claims.is_none() {
                    if method != "connect" {
                        let _ = tx.send(ServerFrame::error(Some(id), "auth_failed", "connect required first")).await;
                        continue;
                    }
                    match authenticate(&gateway, connection_id, &params).await {
                        Ok(c) => {
                            gateway.connections.lock().await.authenticate(&connection_id, c.user_id, c.scopes.clone());
                            let _ = tx.send(ServerFrame::Res { id, payload: serde_json::json!({"connectionId": connection_id}) }).await;
                            let _ = tx.send(ServerFrame::connected(&connection_id.to_string(), &c.user_id.to_string())).await;
                            event_sub = Some(gateway.event_bus.subscribe().await);
                            info!(%connection_id, user_id = %c.user_id, "gateway connection authenticated");
                            claims = Some(c);
                        }
                        Err(e) => {
                            let _ = tx.send(ServerFrame::error(Some(id), "auth_failed", e.to_string())).await;
                        }
                    }
                    continue;
                }

                let claims_ref = claims.as_ref().expect("checked above");
                let req = CommandRequest { method, params, idempotency_key };
                match gateway.command_bus.dispatch(req, claims_ref).await {
                    Ok(payload) => {
                        let _ = tx.send(ServerFrame::Res { id, payload }).await;
                    }
                    Err(e) => {
                        let code = crate::error::PrimeError::from(e.clone()).code().to_string();
                        let _ = tx.send(ServerFrame::error(Some(id), &code, e.to_string())).await;
                    }
                }
            }
            event = recv_subscribed(&mut event_sub) => {
                let Some(event) = event else { continue };
                if tx.send(ServerFrame::Event { event: event.topic, data: event.payload }).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if tx.send(ServerFrame::heartbeat()).await.is_err() {
                    break;
                }
                let idle = gateway.connections.lock().await.idle_connections(gateway.config.idle_timeout_secs);
                if idle.contains(&connection_id) {
                    info!(%connection_id, "closing idle gateway connection");
                    break;
                }
            }
        }
    }

    if let Some(sub) = event_sub.take() {
        gateway.event_bus.unsubscribe(sub.id).await;
    }
    gateway.connections.lock().await.remove_connection(&connection_id);
    writer.abort();
    debug!(%connection_id, "gateway connection closed");
}

/// Awaits the next bus event once subscribed, otherwise never resolves —
/// lets the caller `select!` this alongside the socket/heartbeat branches
/// before and after authentication without special-casing the loop shape.
async fn recv_subscribed(sub: &mut Option<Subscription>) -> Option<crate::event_bus::Event> {
    match sub {
        Some(sub) => sub.rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn authenticate(gateway: &SharedGateway, connection_id: Uuid, params: &serde_json::Value) -> Result<UserClaims, GatewayError> {
    let parsed: ConnectParams = serde_json::from_value(params.clone())
        .map_err(|e| GatewayError::Protocol(e.to_string()))?;
    let claims = gateway.auth.authenticate(connection_id, &parsed.nonce, parsed.token.as_deref())?;
    Ok(UserClaims { user_id: claims.sub, scopes: claims.scopes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingResolver;
    use crate::idempotency::IdempotencyService;
    use crate::store::memory::InMemoryStore;

    fn test_server() -> GatewayServer {
        let store = Arc::new(InMemoryStore::new());
        let idempotency = Arc::new(IdempotencyService::new(store.clone()));
        let resolver = Arc::new(BindingResolver::new(store));
        let bus = Arc::new(CommandBus::new(idempotency, resolver));
        let event_bus = Arc::new(EventBus::default());
        let auth = Arc::new(GatewayAuth::new(None));
        GatewayServer::new(GatewayConfig::default(), auth, bus, event_bus)
    }

    #[test]
    fn fresh_server_is_healthy() {
        let server = test_server();
        assert!(server.is_healthy());
    }

    #[tokio::test]
    async fn connection_manager_starts_empty() {
        let server = test_server();
        assert_eq!(server.connections.lock().await.active_count(), 0);
    }
}
