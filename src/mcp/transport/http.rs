//! HTTP transport.
//!
//! | Route                | Purpose                                        |
//! |----------------------|------------------------------------------------|
//! | `POST /mcp`          | One JSON-RPC message per request               |
//! | `DELETE /mcp`        | End the caller's session                       |
//! | `GET /tools`         | Registry listing                               |
//! | `POST /tools/:name`  | Direct execution, arguments as the JSON body   |
//! | `GET /health`        | Liveness and counts                            |
//! | `GET /stats`         | Registry and session statistics                |
//! | `POST /reload`       | Re-run tool discovery                          |
//!
//! HTTP carries no connection, so each request is matched to a session by the
//! `Mcp-Session-Id` header, or failing that by a hash of the client address
//! and `User-Agent`. The key in use is echoed in the response header.
//! Sessions end on `DELETE /mcp` or after [`SESSION_IDLE_TIMEOUT`] without a
//! request.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::ToolError;
use crate::mcp::engine::ProtocolEngine;
use crate::mcp::protocol::ErrorCode;
use crate::mcp::session::{Session, SessionStore};
use crate::mcp::transport::sse::StreamTracker;
use crate::mcp::transport::TransportKind;

/// Header carrying the session key.
pub const SESSION_HEADER: HeaderName = HeaderName::from_static("mcp-session-id");

/// How long a session may go without a request before it is destroyed.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How often idle sessions are swept.
pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state of the HTTP and SSE routers.
#[derive(Clone)]
pub struct HttpState {
    engine: ProtocolEngine,
    sessions: Arc<SessionStore>,
    streams: Arc<StreamTracker>,
    transport: TransportKind,
    started_at: DateTime<Utc>,
}

impl HttpState {
    /// Creates state for `transport`, with no sessions or streams.
    #[must_use]
    pub fn new(engine: ProtocolEngine, transport: TransportKind) -> Self {
        Self {
            engine,
            sessions: Arc::new(SessionStore::new()),
            streams: Arc::new(StreamTracker::default()),
            transport,
            started_at: Utc::now(),
        }
    }

    /// The protocol engine.
    #[must_use]
    pub const fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    /// Sessions keyed by client identity.
    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Active SSE streams.
    #[must_use]
    pub const fn streams(&self) -> &Arc<StreamTracker> {
        &self.streams
    }

    /// Starts evicting sessions idle for longer than [`SESSION_IDLE_TIMEOUT`].
    pub fn spawn_session_sweeper(&self) -> tokio::task::JoinHandle<()> {
        self.sessions
            .spawn_sweeper(SESSION_IDLE_TIMEOUT, SESSION_SWEEP_INTERVAL)
    }

    /// Resolves the caller's session.
    pub(crate) fn session_for(
        &self,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> (String, Arc<Session>) {
        let key = session_key(headers, peer);
        let session = self.sessions.get_or_create(&key);
        (key, session)
    }
}

impl std::fmt::Debug for HttpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpState")
            .field("transport", &self.transport)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

/// Derives the session key for a request.
#[must_use]
pub fn session_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(id) = headers
        .get(&SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return id.to_string();
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let ip = peer.map(|addr| addr.ip().to_string()).unwrap_or_default();

    let mut hasher = DefaultHasher::new();
    ip.hash(&mut hasher);
    user_agent.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Builds the HTTP router.
pub fn router(state: HttpState) -> Router {
    routes()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// The HTTP routes, before state is attached. Shared with the SSE router.
pub(crate) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/mcp", post(mcp_handler).delete(end_session_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/:name", post(call_tool_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/reload", post(reload_handler))
}

/// Binds `host:port` and serves `app` until the process is stopped.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or serving fails.
pub async fn serve_router(app: Router, host: &str, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

/// Serves the HTTP transport.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or serving fails.
pub async fn serve(engine: ProtocolEngine, host: &str, port: u16) -> std::io::Result<()> {
    let state = HttpState::new(engine, TransportKind::Http);
    let sweeper = state.spawn_session_sweeper();
    let result = serve_router(router(state), host, port).await;
    sweeper.abort();
    result
}

/// Resolves on SIGINT or SIGTERM.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

fn with_session_header(mut response: Response, key: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(key) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

/// `POST /mcp`
async fn mcp_handler(
    State(state): State<HttpState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (key, session) = state.session_for(&headers, peer.map(|ConnectInfo(addr)| addr));

    let reply = match std::str::from_utf8(&body) {
        Ok(text) => state.engine.handle_text(&session, text).await,
        Err(_) => Some(crate::mcp::protocol::JsonRpcError::parse_error().into()),
    };

    let response = match reply {
        None => StatusCode::NO_CONTENT.into_response(),
        Some(reply) => {
            let status = if reply.error_code() == Some(ErrorCode::ParseError.code()) {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::OK
            };
            (status, Json(reply)).into_response()
        }
    };

    with_session_header(response, &key)
}

/// `DELETE /mcp`
async fn end_session_handler(
    State(state): State<HttpState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let key = session_key(&headers, peer.map(|ConnectInfo(addr)| addr));
    let status = if state.sessions.remove(&key).is_some() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    };
    with_session_header(status.into_response(), &key)
}

/// `GET /tools`
async fn list_tools_handler(State(state): State<HttpState>) -> Json<Value> {
    let snapshot = state.engine.registry().snapshot();
    Json(json!({
        "tools": snapshot.definitions(),
        "count": snapshot.len(),
    }))
}

/// Maps a tool failure onto an HTTP status.
pub(crate) const fn tool_error_status(error: &ToolError) -> StatusCode {
    match error {
        ToolError::NotFound { .. } => StatusCode::NOT_FOUND,
        ToolError::InvalidArguments { .. } => StatusCode::BAD_REQUEST,
        ToolError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ToolError::Execution { .. } | ToolError::Panicked { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// `POST /tools/:name`
async fn call_tool_handler(
    State(state): State<HttpState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let arguments = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => value,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": {
                            "code": ErrorCode::ParseError.code(),
                            "message": format!("Invalid JSON body: {e}"),
                        }
                    })),
                )
                    .into_response()
            }
        }
    };

    match state.engine.registry().execute(&name, arguments).await {
        Ok(result) => Json(json!({
            "tool": name,
            "result": result.to_value(),
        }))
        .into_response(),
        Err(error) => (
            tool_error_status(&error),
            Json(json!({
                "tool": name,
                "error": {
                    "code": error.code().code(),
                    "message": error.to_string(),
                }
            })),
        )
            .into_response(),
    }
}

/// `GET /health`
async fn health_handler(State(state): State<HttpState>) -> Json<Value> {
    let mut body = json!({
        "status": "ok",
        "server": state.engine.server_info().name,
        "version": state.engine.server_info().version,
        "transport": state.transport,
        "tools": state.engine.registry().snapshot().len(),
        "sessions": state.sessions.len(),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
    });
    if state.transport == TransportKind::Sse {
        body["streaming"] = json!({
            "active_streams": state.streams.len(),
            "endpoints": ["/stream/tools/:name", "/stream/mcp"],
        });
    }
    Json(body)
}

/// `GET /stats`
async fn stats_handler(State(state): State<HttpState>) -> Json<Value> {
    Json(json!({
        "server": {
            "name": state.engine.server_info().name,
            "transport": state.transport,
            "started_at": state.started_at,
        },
        "registry": state.engine.registry().get_stats(),
        "sessions": {
            "total": state.sessions.len(),
            "ready": state.sessions.ready_count(),
            "details": state.sessions.summaries(),
        },
        "streams": {
            "active": state.streams.len(),
        },
    }))
}

/// `POST /reload`
async fn reload_handler(State(state): State<HttpState>) -> Json<Value> {
    tracing::info!("Reloading tools");
    let snapshot = state.engine.registry().discover();
    Json(json!({
        "status": "reloaded",
        "generation": snapshot.generation(),
        "tools": snapshot.names().collect::<Vec<_>>(),
        "failed": snapshot.failed_plugins(),
    }))
}
