//! Wire shapes for the `/ws/events` control plane (spec §4.12/§6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Req {
        id: String,
        method: String,
        #[serde(default)]
        params: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        idempotency_key: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Event {
        event: String,
        #[serde(alias = "payload")]
        data: Value,
    },
    Res {
        id: String,
        payload: Value,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        code: String,
        message: String,
    },
}

impl ServerFrame {
    pub fn challenge(nonce: &str) -> Self {
        ServerFrame::Event {
            event: "connect.challenge".to_string(),
            data: serde_json::json!({ "nonce": nonce }),
        }
    }

    pub fn connected(connection_id: &str, user_id: &str) -> Self {
        ServerFrame::Event {
            event: "presence.connected".to_string(),
            data: serde_json::json!({ "connection_id": connection_id, "user_id": user_id }),
        }
    }

    pub fn heartbeat() -> Self {
        ServerFrame::Event { event: "heartbeat".to_string(), data: Value::Null }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        ServerFrame::Error { id, code: code.to_string(), message: message.into() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectParams {
    pub nonce: String,
    pub token: Option<String>,
    pub client: Option<ClientInfo>,
    #[serde(rename = "minProtocol")]
    pub min_protocol: u32,
    #[serde(rename = "maxProtocol")]
    pub max_protocol: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
    pub platform: String,
}

pub const PROTOCOL_VERSION: u32 = 1;
/// WebSocket close code used when the handshake or framing fails.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1008;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn req_frame_round_trips_through_json() {
        let json = serde_json::json!({
            "type": "req",
            "id": "r1",
            "method": "health.get",
            "params": {},
        });
        let frame: ClientFrame = serde_json::from_value(json).unwrap();
        match frame {
            ClientFrame::Req { id, method, .. } => {
                assert_eq!(id, "r1");
                assert_eq!(method, "health.get");
            }
        }
    }

    #[test]
    fn challenge_event_has_nonce_payload() {
        let frame = ServerFrame::challenge("abc123");
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["event"], "connect.challenge");
        assert_eq!(json["data"]["nonce"], "abc123");
    }
}
