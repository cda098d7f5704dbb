//! Integration tests for MCP protocol handling.
//!
//! These tests verify the MCP server's JSON-RPC 2.0 protocol implementation,
//! including request/response handling, error responses, and lifecycle management.

use std::sync::Arc;

use serde_json::{json, Value};

use mcp_toolhost::mcp::protocol::{parse_message, IncomingMessage, JsonRpcReply, RequestId};
use mcp_toolhost::mcp::{ProtocolEngine, ServerInfo, Session, SessionState};
use mcp_toolhost::tools::{builtin_plugins, ToolRegistry};

fn engine() -> ProtocolEngine {
    let registry = ToolRegistry::new(builtin_plugins());
    registry.discover();
    ProtocolEngine::new(Arc::new(registry), ServerInfo::default())
}

fn to_json(reply: &JsonRpcReply) -> Value {
    serde_json::to_value(reply).unwrap()
}

async fn send(engine: &ProtocolEngine, session: &Session, message: &Value) -> Option<Value> {
    engine
        .handle_text(session, &message.to_string())
        .await
        .map(|reply| to_json(&reply))
}

async fn ready_session(engine: &ProtocolEngine) -> Session {
    let session = Session::new("test");
    let init = json!({
        "jsonrpc": "2.0",
        "id": 0,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "clientInfo": {"name": "test-client", "version": "1.0.0"}
        }
    });
    send(engine, &session, &init).await.unwrap();
    let ack = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
    assert!(send(engine, &session, &ack).await.is_none());
    assert_eq!(session.state(), SessionState::Ready);
    session
}

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Notification(notif) = result.unwrap() {
        assert_eq!(notif.method, "notifications/initialized");
    } else {
        panic!("Expected Notification");
    }
}

#[test]
fn test_parse_null_id_is_request() {
    let json = r#"{"jsonrpc": "2.0", "id": null, "method": "ping"}"#;

    match parse_message(json).unwrap() {
        IncomingMessage::Request(req) => assert_eq!(req.id, RequestId::Null),
        IncomingMessage::Notification(_) => panic!("Expected Request"),
    }
}

#[test]
fn test_parse_invalid_json() {
    let err = parse_message("not valid json").unwrap_err();
    assert_eq!(err.error.code, -32700);
    assert!(err.id.is_none());
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let json = r#"{
        "id": 1,
        "method": "test"
    }"#;

    let err = parse_message(json).unwrap_err();
    assert_eq!(err.error.code, -32600);
    assert_eq!(err.id, Some(RequestId::Number(1)));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_full_handshake() {
    let engine = engine();
    let session = Session::new("lifecycle");
    assert_eq!(session.state(), SessionState::Uninitialized);

    let reply = send(
        &engine,
        &session,
        &json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            }
        }),
    )
    .await
    .unwrap();

    assert_eq!(reply["jsonrpc"], "2.0");
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(reply["result"]["capabilities"], json!({"tools": {}}));
    assert_eq!(reply["result"]["serverInfo"]["name"], "mcp-toolhost");
    assert_eq!(session.state(), SessionState::Initializing);

    let ack = send(
        &engine,
        &session,
        &json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
    assert!(ack.is_none());
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_requests_before_handshake_are_rejected() {
    let engine = engine();
    let session = Session::new("early");

    for method in ["tools/list", "tools/call", "ping"] {
        let reply = send(
            &engine,
            &session,
            &json!({"jsonrpc": "2.0", "id": 7, "method": method, "params": {}}),
        )
        .await
        .unwrap();
        assert_eq!(reply["error"]["code"], -32002, "{method}");
        assert_eq!(reply["id"], 7);
    }
    assert_eq!(session.state(), SessionState::Uninitialized);
}

#[tokio::test]
async fn test_tools_list_blocked_until_initialized_notification() {
    let engine = engine();
    let session = Session::new("half");

    send(
        &engine,
        &session,
        &json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"protocolVersion": "2024-11-05", "clientInfo": {"name": "c"}}
        }),
    )
    .await
    .unwrap();

    let reply = send(
        &engine,
        &session,
        &json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
    )
    .await
    .unwrap();
    assert_eq!(reply["error"]["code"], -32002);
}

#[tokio::test]
async fn test_initialize_requires_protocol_version() {
    let engine = engine();
    let session = Session::new("bad-init");

    let reply = send(
        &engine,
        &session,
        &json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"clientInfo": {"name": "c"}}
        }),
    )
    .await
    .unwrap();

    assert_eq!(reply["error"]["code"], -32602);
    assert_eq!(session.state(), SessionState::Uninitialized);
}

#[tokio::test]
async fn test_reinitialize_keeps_ready_state() {
    let engine = engine();
    let session = ready_session(&engine).await;

    let reply = send(
        &engine,
        &session,
        &json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "initialize",
            "params": {"protocolVersion": "2024-11-05", "clientInfo": {"name": "second"}}
        }),
    )
    .await
    .unwrap();

    assert!(reply.get("result").is_some());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.client_info().unwrap()["name"], "second");
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let engine = engine();
    let ready = ready_session(&engine).await;
    let fresh = Session::new("other");

    let list = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
    assert!(send(&engine, &ready, &list).await.unwrap().get("result").is_some());
    assert_eq!(
        send(&engine, &fresh, &list).await.unwrap()["error"]["code"],
        -32002
    );
}

// =============================================================================
// Tool Tests
// =============================================================================

#[tokio::test]
async fn test_tools_list_matches_snapshot() {
    let engine = engine();
    let session = ready_session(&engine).await;

    let reply = send(
        &engine,
        &session,
        &json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
    )
    .await
    .unwrap();

    let tools = reply["result"]["tools"].as_array().unwrap();
    let snapshot = engine.registry().snapshot();
    assert_eq!(tools.len(), snapshot.len());

    let echo = tools.iter().find(|t| t["name"] == "echo").unwrap();
    assert_eq!(echo["inputSchema"]["type"], "object");
    assert_eq!(echo["inputSchema"]["properties"]["text"]["type"], "string");
    assert_eq!(echo["inputSchema"]["required"], json!(["text"]));
}

#[tokio::test]
async fn test_tools_call_echo() {
    let engine = engine();
    let session = ready_session(&engine).await;

    let reply = send(
        &engine,
        &session,
        &json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "echo", "arguments": {"text": "hi"}}
        }),
    )
    .await
    .unwrap();

    assert_eq!(
        reply["result"],
        json!({"content": [{"type": "text", "text": "Echo: hi"}]})
    );
}

#[tokio::test]
async fn test_tools_call_method_tool_normalises_integer() {
    let engine = engine();
    let session = ready_session(&engine).await;

    let reply = send(
        &engine,
        &session,
        &json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": {"name": "add", "arguments": {"a": 2, "b": 3}}
        }),
    )
    .await
    .unwrap();

    assert_eq!(reply["result"]["content"][0]["text"], "5");
}

#[tokio::test]
async fn test_tools_call_defaults_are_filled() {
    let engine = engine();
    let session = ready_session(&engine).await;

    let reply = send(
        &engine,
        &session,
        &json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "tools/call",
            "params": {"name": "random_number", "arguments": {"min_val": 100}}
        }),
    )
    .await
    .unwrap();
    assert_eq!(
        reply["result"]["content"][0]["text"],
        "Random number between 100 and 100: 100"
    );
}

#[tokio::test]
async fn test_tools_call_errors() {
    let engine = engine();
    let session = ready_session(&engine).await;

    let cases = [
        (json!({"name": "nope", "arguments": {}}), -32601),
        (json!({"name": "echo", "arguments": {}}), -32602),
        (json!({"name": "echo", "arguments": {"text": 1}}), -32602),
        (json!({"name": "echo", "arguments": {"text": "x", "extra": 1}}), -32602),
        (json!({"name": "echo", "arguments": [1]}), -32602),
        (json!({"arguments": {}}), -32602),
        (
            json!({"name": "calculate", "arguments": {"operation": "divide", "a": 1, "b": 0}}),
            -32603,
        ),
    ];

    for (id, (params, code)) in cases.into_iter().enumerate() {
        let reply = send(
            &engine,
            &session,
            &json!({"jsonrpc": "2.0", "id": id, "method": "tools/call", "params": params}),
        )
        .await
        .unwrap();
        assert_eq!(reply["error"]["code"], code, "case {id}: {reply}");
        assert_eq!(reply["id"], id);
    }
}

// =============================================================================
// Error Response Tests
// =============================================================================

#[tokio::test]
async fn test_unknown_method() {
    let engine = engine();
    let session = ready_session(&engine).await;

    let reply = send(
        &engine,
        &session,
        &json!({"jsonrpc": "2.0", "id": "abc", "method": "resources/list"}),
    )
    .await
    .unwrap();
    assert_eq!(reply["error"]["code"], -32601);
    assert_eq!(reply["id"], "abc");
}

#[tokio::test]
async fn test_malformed_frames() {
    let engine = engine();
    let session = Session::new("garbage");

    let reply = engine.handle_text(&session, "{not json").await.unwrap();
    let reply = to_json(&reply);
    assert_eq!(reply["error"]["code"], -32700);
    assert!(reply["id"].is_null());

    let reply = engine.handle_text(&session, "[1, 2]").await.unwrap();
    assert_eq!(to_json(&reply)["error"]["code"], -32600);
}

#[tokio::test]
async fn test_unknown_notification_is_dropped() {
    let engine = engine();
    let session = Session::new("quiet");

    let reply = send(
        &engine,
        &session,
        &json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {}}),
    )
    .await;
    assert!(reply.is_none());
    assert_eq!(session.state(), SessionState::Uninitialized);
}

#[tokio::test]
async fn test_ping_after_handshake() {
    let engine = engine();
    let session = ready_session(&engine).await;

    let reply = send(
        &engine,
        &session,
        &json!({"jsonrpc": "2.0", "id": null, "method": "ping"}),
    )
    .await
    .unwrap();
    assert_eq!(reply["result"], json!({}));
    assert!(reply["id"].is_null());
}

#[tokio::test]
async fn test_non_integer_ids_are_echoed() {
    let engine = engine();
    let session = ready_session(&engine).await;

    let reply = send(&engine, &session, &json!({"jsonrpc": "2.0", "id": 1.5, "method": "ping"}))
        .await
        .unwrap();
    assert_eq!(reply["id"], json!(1.5));
    assert_eq!(reply["result"], json!({}));

    let reply = engine
        .handle_text(&session, r#"{"jsonrpc": "2.0", "id": 18446744073709551615, "method": "ping"}"#)
        .await
        .unwrap();
    let text = serde_json::to_string(&reply).unwrap();
    assert!(text.contains(r#""id":18446744073709551615"#), "{text}");

    let reply = send(&engine, &session, &json!({"jsonrpc": "2.0", "id": 2.5, "method": "no/such"}))
        .await
        .unwrap();
    assert_eq!(reply["error"]["code"], -32601);
    assert_eq!(reply["id"], json!(2.5));
}
