//! WebSocket transport.
//!
//! `GET /ws` upgrades to a WebSocket. Each connection gets its own session,
//! keyed by a fresh UUID and destroyed when the socket closes. Text frames
//! (and binary frames holding UTF-8) carry one JSON-RPC message each, and
//! are handled in arrival order.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::mcp::engine::ProtocolEngine;
use crate::mcp::protocol::{JsonRpcError, JsonRpcReply};
use crate::mcp::session::{Session, SessionStore};

/// Shared state of the WebSocket router.
#[derive(Debug, Clone)]
pub struct WebSocketState {
    engine: ProtocolEngine,
    clients: Arc<SessionStore>,
}

impl WebSocketState {
    /// Creates state with no connected clients.
    #[must_use]
    pub fn new(engine: ProtocolEngine) -> Self {
        Self {
            engine,
            clients: Arc::new(SessionStore::new()),
        }
    }

    /// Connected clients, by connection id.
    #[must_use]
    pub const fn clients(&self) -> &Arc<SessionStore> {
        &self.clients
    }
}

/// Builds the WebSocket router.
pub fn router(state: WebSocketState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serves the WebSocket transport.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or serving fails.
pub async fn serve(engine: ProtocolEngine, host: &str, port: u16) -> std::io::Result<()> {
    super::http::serve_router(router(WebSocketState::new(engine)), host, port).await
}

/// Health check endpoint
async fn health_handler(State(state): State<WebSocketState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "server": state.engine.server_info().name,
        "transport": "websocket",
        "tools": state.engine.registry().snapshot().len(),
        "connected_clients": state.clients.len(),
        "initialized_clients": state.clients.ready_count(),
        "clients": state.clients.summaries(),
    }))
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebSocketState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serves one connection until it closes.
async fn handle_socket(mut socket: WebSocket, state: WebSocketState) {
    let session = Arc::new(Session::new(Uuid::new_v4().to_string()));
    state.clients.insert(Arc::clone(&session));
    tracing::info!(session = %session.id(), "Client connected");

    while let Some(frame) = socket.recv().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(session = %session.id(), error = %e, "WebSocket read failed");
                break;
            }
        };

        let reply = match msg {
            Message::Text(text) => state.engine.handle_text(&session, &text).await,
            Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => state.engine.handle_text(&session, text).await,
                Err(_) => Some(JsonRpcReply::from(JsonRpcError::parse_error())),
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let Some(reply) = reply else {
            continue;
        };

        let json = match serde_json::to_string(&reply) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialise reply");
                continue;
            }
        };

        if socket.send(Message::Text(json)).await.is_err() {
            break;
        }
    }

    state.clients.remove(session.id());
    tracing::info!(session = %session.id(), "Client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::engine::ServerInfo;
    use crate::tools::ToolRegistry;

    #[test]
    fn state_starts_empty() {
        let registry = Arc::new(ToolRegistry::new(vec![]));
        let state = WebSocketState::new(ProtocolEngine::new(registry, ServerInfo::default()));
        assert!(state.clients().is_empty());
    }
}
