//! Raw WebSocket client for `prime gateway call <method>`, speaking the
//! same connect-handshake + request/response framing as
//! `prime_core::gateway::protocol`.

use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

pub async fn call(ws_url: &str, method: &str, params: Value) -> Result<Value> {
    let (mut stream, _) = connect_async(ws_url).await.with_context(|| format!("connecting to {ws_url}"))?;

    let nonce = loop {
        let Some(msg) = stream.next().await else { bail!("connection closed before challenge") };
        let Message::Text(text) = msg? else { continue };
        let frame: Value = serde_json::from_str(&text)?;
        if frame["type"] == "event" && frame["event"] == "connect.challenge" {
            break frame["data"]["nonce"].as_str().unwrap_or_default().to_string();
        }
    };

    let connect_req = json!({
        "type": "req",
        "id": "connect-1",
        "method": "connect",
        "params": {
            "nonce": nonce,
            "token": null,
            "client": {"name": "prime-cli", "version": env!("CARGO_PKG_VERSION"), "platform": std::env::consts::OS},
            "minProtocol": 1,
            "maxProtocol": 1,
        },
    });
    stream.send(Message::Text(connect_req.to_string().into())).await?;
    await_response(&mut stream, "connect-1").await?;

    let call_id = "call-1";
    let req = json!({ "type": "req", "id": call_id, "method": method, "params": params });
    stream.send(Message::Text(req.to_string().into())).await?;
    let result = await_response(&mut stream, call_id).await?;

    let _ = stream.close(None).await;
    Ok(result)
}

async fn await_response(
    stream: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    expect_id: &str,
) -> Result<Value> {
    loop {
        let Some(msg) = stream.next().await else { bail!("connection closed awaiting response to {expect_id}") };
        let Message::Text(text) = msg? else { continue };
        let frame: Value = serde_json::from_str(&text)?;
        match frame["type"].as_str() {
            Some("res") if frame["id"] == expect_id => return Ok(frame["payload"].clone()),
            Some("error") if frame["id"] == expect_id || frame["id"].is_null() => {
                bail!("{}: {}", frame["code"].as_str().unwrap_or("error"), frame["message"].as_str().unwrap_or(""));
            }
            _ => continue,
        }
    }
}
