//! End-to-end tests for the WebSocket transport.
//!
//! The router is served on an ephemeral port and driven by a real WebSocket
//! client, so upgrades, framing and connection teardown are all exercised.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use mcp_toolhost::mcp::transport::websocket::{self, WebSocketState};
use mcp_toolhost::mcp::{ProtocolEngine, ServerInfo};
use mcp_toolhost::tools::{builtin_plugins, ToolRegistry};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (SocketAddr, WebSocketState) {
    let registry = ToolRegistry::new(builtin_plugins());
    registry.discover();
    let engine = ProtocolEngine::new(Arc::new(registry), ServerInfo::default());
    let state = WebSocketState::new(engine);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = websocket::router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    client
}

async fn next_reply(client: &mut Client) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("reply within deadline")
        .unwrap()
        .unwrap();
    match frame {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected frame: {other:?}"),
    }
}

async fn wait_until_empty(state: &WebSocketState) {
    for _ in 0..200 {
        if state.clients().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session was not removed after close");
}

#[tokio::test]
async fn test_replies_follow_arrival_order() {
    let (addr, state) = start_server().await;
    let mut client = connect(addr).await;

    let frames = [
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"protocolVersion": "2024-11-05", "clientInfo": {"name": "ws-test"}}
        }),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "echo", "arguments": {"text": "over ws"}}
        }),
    ];
    for frame in &frames {
        client.send(Message::Text(frame.to_string())).await.unwrap();
    }
    // Binary frames holding UTF-8 are treated like text
    let ping = json!({"jsonrpc": "2.0", "id": 3, "method": "ping"});
    client.send(Message::Binary(ping.to_string().into_bytes())).await.unwrap();

    // The notification produces no frame, so replies go 1, 2, 3
    let init = next_reply(&mut client).await;
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");

    let call = next_reply(&mut client).await;
    assert_eq!(call["id"], 2);
    assert_eq!(call["result"]["content"][0]["text"], "Echo: over ws");

    let pong = next_reply(&mut client).await;
    assert_eq!(pong["id"], 3);
    assert_eq!(pong["result"], json!({}));

    assert_eq!(state.clients().len(), 1);
    assert_eq!(state.clients().ready_count(), 1);

    client.close(None).await.unwrap();
    wait_until_empty(&state).await;
}

#[tokio::test]
async fn test_each_connection_has_its_own_session() {
    let (addr, state) = start_server().await;
    let mut ready = connect(addr).await;
    let mut fresh = connect(addr).await;

    ready
        .send(Message::Text(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {"protocolVersion": "2024-11-05", "clientInfo": {"name": "a"}}
            })
            .to_string(),
        ))
        .await
        .unwrap();
    next_reply(&mut ready).await;

    fresh
        .send(Message::Text(json!({"jsonrpc": "2.0", "id": 9, "method": "tools/list"}).to_string()))
        .await
        .unwrap();
    let reply = next_reply(&mut fresh).await;
    assert_eq!(reply["id"], 9);
    assert_eq!(reply["error"]["code"], -32002);

    assert_eq!(state.clients().len(), 2);
    drop(ready);
    fresh.close(None).await.unwrap();
    wait_until_empty(&state).await;
}

#[tokio::test]
async fn test_malformed_frames_get_error_replies() {
    let (addr, state) = start_server().await;
    let mut client = connect(addr).await;

    client.send(Message::Text("{not json".to_string())).await.unwrap();
    let reply = next_reply(&mut client).await;
    assert_eq!(reply["error"]["code"], -32700);
    assert!(reply["id"].is_null());

    client.send(Message::Binary(vec![0xff, 0xfe, 0xfd])).await.unwrap();
    let reply = next_reply(&mut client).await;
    assert_eq!(reply["error"]["code"], -32700);

    client.close(None).await.unwrap();
    wait_until_empty(&state).await;
}
