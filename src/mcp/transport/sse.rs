//! Server-Sent-Events transport.
//!
//! Serves every HTTP route plus:
//!
//! - `GET /stream/tools/:name?<args>` and `POST /stream/tools/:name`: run a
//!   tool, streaming `started`, `progress`, `result` (or `error`) and
//!   `completed` events
//! - `GET /stream/mcp?method=..&<params>`: run one JSON-RPC method against
//!   the caller's HTTP session, streaming `started`, `result`, `completed`
//! - `GET /streams`: streams currently open
//!
//! Every event carries an `id` that increments within its stream. The
//! producer yields to the scheduler between events.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::mcp::engine::ProtocolEngine;
use crate::mcp::protocol::{JsonRpcReply, JsonRpcRequest, RequestId};
use crate::mcp::transport::http::{self, HttpState};
use crate::mcp::transport::TransportKind;

/// Header carrying the stream identifier.
const STREAM_HEADER: &str = "x-stream-id";

/// Buffered events per stream before the producer waits for the client.
const STREAM_BUFFER: usize = 16;

/// Public view of one open stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    /// Stream identifier.
    pub stream_id: String,
    /// `tool` or `mcp`.
    pub kind: &'static str,
    /// Tool name or JSON-RPC method.
    pub target: String,
    /// When the stream opened.
    pub started_at: DateTime<Utc>,
    /// Events sent so far.
    pub message_count: u64,
}

#[derive(Debug)]
struct StreamEntry {
    kind: &'static str,
    target: String,
    started_at: DateTime<Utc>,
    sent: Arc<AtomicU64>,
}

/// Open streams, by id.
#[derive(Debug, Default)]
pub struct StreamTracker {
    streams: RwLock<IndexMap<String, StreamEntry>>,
}

impl StreamTracker {
    /// Number of open streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    /// Whether no streams are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }

    /// Views of every open stream.
    #[must_use]
    pub fn list(&self) -> Vec<StreamInfo> {
        self.streams
            .read()
            .iter()
            .map(|(id, entry)| StreamInfo {
                stream_id: id.clone(),
                kind: entry.kind,
                target: entry.target.clone(),
                started_at: entry.started_at,
                message_count: entry.sent.load(Ordering::Relaxed),
            })
            .collect()
    }

    fn open(&self, kind: &'static str, target: &str) -> (String, Arc<AtomicU64>) {
        let id = Uuid::new_v4().to_string();
        let sent = Arc::new(AtomicU64::new(0));
        self.streams.write().insert(
            id.clone(),
            StreamEntry {
                kind,
                target: target.to_string(),
                started_at: Utc::now(),
                sent: Arc::clone(&sent),
            },
        );
        tracing::debug!(stream = %id, kind, target, "Stream opened");
        (id, sent)
    }

    fn close(&self, id: &str) {
        if self.streams.write().shift_remove(id).is_some() {
            tracing::debug!(stream = %id, "Stream closed");
        }
    }
}

/// Sends numbered events into one stream.
struct EventSink {
    tx: mpsc::Sender<Result<Event, Infallible>>,
    sent: Arc<AtomicU64>,
}

impl EventSink {
    /// Sends one event. Returns `false` once the client has gone away.
    async fn emit(&self, event: &str, data: &Value) -> bool {
        let id = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = Event::default()
            .id(id.to_string())
            .event(event)
            .data(data.to_string());
        let delivered = self.tx.send(Ok(frame)).await.is_ok();
        tokio::task::yield_now().await;
        delivered
    }
}

/// Builds the SSE router.
pub fn router(state: HttpState) -> Router {
    http::routes()
        .route(
            "/stream/tools/:name",
            get(stream_tool_get_handler).post(stream_tool_post_handler),
        )
        .route("/stream/mcp", get(stream_mcp_handler))
        .route("/streams", get(streams_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serves the SSE transport.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or serving fails.
pub async fn serve(engine: ProtocolEngine, host: &str, port: u16) -> std::io::Result<()> {
    let state = HttpState::new(engine, TransportKind::Sse);
    let sweeper = state.spawn_session_sweeper();
    let result = http::serve_router(router(state), host, port).await;
    sweeper.abort();
    result
}

/// Types a query-string value: all digits become an integer, `true`/`false`
/// a boolean, anything else stays a string.
#[must_use]
pub fn query_value(raw: &str) -> Value {
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::from(n);
        }
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn typed_query(query: HashMap<String, String>, skip: &str) -> Map<String, Value> {
    let mut sorted: Vec<(String, String)> = query.into_iter().filter(|(k, _)| k != skip).collect();
    sorted.sort();
    sorted
        .into_iter()
        .map(|(key, raw)| {
            let value = query_value(&raw);
            (key, value)
        })
        .collect()
}

/// Shapes flat query parameters for `method`. For `tools/call`, every key
/// except `name` is moved under `arguments`.
fn mcp_params(method: &str, mut params: Map<String, Value>) -> Value {
    if method == "tools/call" && !params.contains_key("arguments") {
        let name = params.remove("name");
        let arguments = Value::Object(std::mem::take(&mut params));
        if let Some(name) = name {
            params.insert("name".to_string(), name);
        }
        params.insert("arguments".to_string(), arguments);
    }
    Value::Object(params)
}

fn sse_response(
    rx: mpsc::Receiver<Result<Event, Infallible>>,
    stream_id: &str,
) -> Response {
    let mut response = Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::default())
        .into_response();
    if let Ok(value) = HeaderValue::from_str(stream_id) {
        response.headers_mut().insert(STREAM_HEADER, value);
    }
    response
}

/// `GET /stream/tools/:name`
async fn stream_tool_get_handler(
    State(state): State<HttpState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    stream_tool(state, name, Value::Object(typed_query(query, ""))).await
}

/// `POST /stream/tools/:name`
async fn stream_tool_post_handler(
    State(state): State<HttpState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let arguments = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                return (
                    axum::http::StatusCode::BAD_REQUEST,
                    Json(json!({"error": format!("Invalid JSON body: {e}")})),
                )
                    .into_response()
            }
        }
    };
    stream_tool(state, name, arguments).await
}

async fn stream_tool(state: HttpState, name: String, arguments: Value) -> Response {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let streams = Arc::clone(state.streams());
    let (stream_id, sent) = streams.open("tool", &name);
    let registry = Arc::clone(state.engine().registry());
    let sink = EventSink { tx, sent };

    tracing::info!(stream = %stream_id, tool = %name, "Starting tool stream");

    let id = stream_id.clone();
    tokio::spawn(async move {
        let started = Instant::now();
        let mut open = sink
            .emit(
                "started",
                &json!({"tool": name, "arguments": arguments, "stream_id": id}),
            )
            .await;

        if open {
            open = sink
                .emit(
                    "progress",
                    &json!({"message": format!("Executing {name}..."), "progress": 0.3}),
                )
                .await;
        }

        if open {
            open = match registry.execute(&name, arguments).await {
                Ok(result) => {
                    sink.emit(
                        "result",
                        &json!({"tool": name, "result": result.to_value(), "status": "completed"}),
                    )
                    .await
                }
                Err(error) => {
                    tracing::debug!(stream = %id, tool = %name, %error, "Tool stream failed");
                    sink.emit(
                        "error",
                        &json!({"tool": name, "code": error.code().code(), "error": error.to_string()}),
                    )
                    .await
                }
            };
        }

        if open {
            sink.emit(
                "completed",
                &json!({
                    "message": "Tool execution completed",
                    "duration_ms": u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                }),
            )
            .await;
        }

        streams.close(&id);
    });

    sse_response(rx, &stream_id)
}

/// `GET /stream/mcp`
async fn stream_mcp_handler(
    State(state): State<HttpState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let method = query
        .get("method")
        .cloned()
        .unwrap_or_else(|| "tools/list".to_string());
    let params = mcp_params(&method, typed_query(query, "method"));

    let (key, session) = state.session_for(&headers, peer.map(|ConnectInfo(addr)| addr));
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let streams = Arc::clone(state.streams());
    let (stream_id, sent) = streams.open("mcp", &method);
    let engine = state.engine().clone();
    let sink = EventSink { tx, sent };

    let id = stream_id.clone();
    tokio::spawn(async move {
        let mut open = sink
            .emit("started", &json!({"method": method, "params": params, "session": key}))
            .await;

        if open {
            let request = JsonRpcRequest::new(RequestId::String(id.clone()), method.clone(), Some(params));
            let reply = engine.handle_request(&session, request).await;
            let (result, error) = match reply {
                JsonRpcReply::Success(resp) => (resp.result, Value::Null),
                JsonRpcReply::Error(err) => (
                    Value::Null,
                    serde_json::to_value(&err.error).unwrap_or(Value::Null),
                ),
            };
            open = sink
                .emit("result", &json!({"method": method, "result": result, "error": error}))
                .await;
        }

        if open {
            sink.emit("completed", &json!({"message": "MCP method completed"}))
                .await;
        }

        streams.close(&id);
    });

    sse_response(rx, &stream_id)
}

/// `GET /streams`
async fn streams_handler(State(state): State<HttpState>) -> Json<Value> {
    let streams = state.streams().list();
    Json(json!({
        "active_streams": streams.len(),
        "streams": streams,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_values_are_typed() {
        assert_eq!(query_value("42"), json!(42));
        assert_eq!(query_value("true"), json!(true));
        assert_eq!(query_value("False"), json!(false));
        assert_eq!(query_value("-3"), json!("-3"));
        assert_eq!(query_value("hello"), json!("hello"));
        assert_eq!(query_value(""), json!(""));
    }

    #[test]
    fn typed_query_skips_method() {
        let query: HashMap<String, String> = [
            ("method".to_string(), "tools/call".to_string()),
            ("name".to_string(), "echo".to_string()),
            ("n".to_string(), "7".to_string()),
        ]
        .into_iter()
        .collect();
        let params = typed_query(query, "method");
        assert_eq!(Value::Object(params), json!({"n": 7, "name": "echo"}));
    }

    #[test]
    fn tools_call_params_are_nested() {
        let mut flat = Map::new();
        flat.insert("name".into(), json!("echo"));
        flat.insert("text".into(), json!("hi"));
        assert_eq!(
            mcp_params("tools/call", flat.clone()),
            json!({"name": "echo", "arguments": {"text": "hi"}})
        );
        assert_eq!(mcp_params("tools/list", flat.clone()), Value::Object(flat));
    }

    #[tokio::test]
    async fn tracker_opens_and_closes() {
        let tracker = StreamTracker::default();
        let (id, sent) = tracker.open("tool", "echo");
        sent.fetch_add(2, Ordering::Relaxed);

        let list = tracker.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message_count, 2);
        assert_eq!(list[0].target, "echo");

        tracker.close(&id);
        assert!(tracker.is_empty());
    }
}
