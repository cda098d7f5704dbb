//! MCP protocol engine.
//!
//! This module implements the MCP server lifecycle, independent of transport:
//!
//! 1. **Initialisation**: `initialize` request, then `initialized` notification
//! 2. **Operation**: `tools/list` and `tools/call` against the registry
//!
//! Every transport decodes a frame, hands it to [`ProtocolEngine::handle`]
//! together with the caller's [`Session`], and writes back the reply, if any.
//! Notifications never produce a reply.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::mcp::protocol::{
    json_type_name, params_object, parse_message, parse_value, ErrorCode, IncomingMessage,
    JsonRpcError, JsonRpcNotification, JsonRpcReply, JsonRpcRequest, JsonRpcResponse, RequestId,
    MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::session::Session;
use crate::tools::ToolRegistry;

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolCapabilities::default()),
        }
    }
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server identity reported by `initialize`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Methods the engine understands.
const INITIALIZE: &str = "initialize";
const TOOLS_LIST: &str = "tools/list";
const TOOLS_CALL: &str = "tools/call";
const PING: &str = "ping";
const INITIALIZED: [&str; 2] = ["initialized", "notifications/initialized"];

/// Routes JSON-RPC messages for any number of sessions.
///
/// Cheap to clone; clones share the registry.
#[derive(Debug, Clone)]
pub struct ProtocolEngine {
    registry: Arc<ToolRegistry>,
    server_info: ServerInfo,
    capabilities: ServerCapabilities,
}

impl ProtocolEngine {
    /// Creates an engine serving `registry`.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, server_info: ServerInfo) -> Self {
        Self {
            registry,
            server_info,
            capabilities: ServerCapabilities::default(),
        }
    }

    /// The registry this engine routes to.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Server identity.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Decodes one text frame and handles it.
    ///
    /// Malformed frames yield an error reply; notifications yield `None`.
    pub async fn handle_text(&self, session: &Session, text: &str) -> Option<JsonRpcReply> {
        match parse_message(text) {
            Ok(msg) => self.handle(session, msg).await,
            Err(error) => {
                debug!(session = %session.id(), code = error.error.code, "Rejected frame");
                Some(error.into())
            }
        }
    }

    /// Handles an already-decoded JSON value.
    pub async fn handle_value(&self, session: &Session, value: Value) -> Option<JsonRpcReply> {
        match parse_value(value) {
            Ok(msg) => self.handle(session, msg).await,
            Err(error) => Some(error.into()),
        }
    }

    /// Handles a parsed message.
    pub async fn handle(&self, session: &Session, msg: IncomingMessage) -> Option<JsonRpcReply> {
        match msg {
            IncomingMessage::Request(req) => Some(self.handle_request(session, req).await),
            IncomingMessage::Notification(ref notif) => {
                Self::handle_notification(session, notif);
                None
            }
        }
    }

    /// Handles a request. Always produces a reply.
    pub async fn handle_request(&self, session: &Session, req: JsonRpcRequest) -> JsonRpcReply {
        debug!(session = %session.id(), method = %req.method, id = %req.id, "Handling request");

        let outcome = match req.method.as_str() {
            INITIALIZE => self.handle_initialize(session, &req),
            TOOLS_LIST | TOOLS_CALL | PING if !session.is_ready() => {
                Err(JsonRpcError::not_initialized(req.id.clone()))
            }
            TOOLS_LIST => Ok(self.handle_tools_list()),
            TOOLS_CALL => self.handle_tools_call(session, &req).await,
            PING => Ok(json!({})),
            method if INITIALIZED.contains(&method) => Err(JsonRpcError::with_message(
                Some(req.id.clone()),
                ErrorCode::InvalidRequest,
                format!("'{method}' must be sent as a notification"),
            )),
            method => Err(JsonRpcError::method_not_found(req.id.clone(), method)),
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(req.id, result).into(),
            Err(error) => error.into(),
        }
    }

    /// Handles a notification. Never produces a reply.
    fn handle_notification(session: &Session, notif: &JsonRpcNotification) {
        if INITIALIZED.contains(&notif.method.as_str()) {
            if session.complete_initialize() {
                debug!(session = %session.id(), "Session ready");
            } else {
                warn!(
                    session = %session.id(),
                    state = %session.state(),
                    "Ignoring initialized notification outside INITIALIZING"
                );
            }
            return;
        }

        debug!(session = %session.id(), method = %notif.method, "Dropping unknown notification");
    }

    /// Handles the initialize request.
    fn handle_initialize(&self, session: &Session, req: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let params = params_object(req.params.as_ref())
            .map_err(|e| JsonRpcError::invalid_params(req.id.clone(), e))?;

        let protocol_version = match params.get("protocolVersion") {
            Some(Value::String(v)) if !v.trim().is_empty() => v.clone(),
            Some(Value::String(_)) | None => {
                return Err(JsonRpcError::invalid_params(
                    req.id.clone(),
                    "Missing protocolVersion",
                ))
            }
            Some(other) => {
                return Err(JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("protocolVersion must be a string, got {}", json_type_name(other)),
                ))
            }
        };

        let client_info = match params.get("clientInfo") {
            Some(info @ Value::Object(_)) => info.clone(),
            Some(other) => {
                return Err(JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("clientInfo must be an object, got {}", json_type_name(other)),
                ))
            }
            None => {
                return Err(JsonRpcError::invalid_params(
                    req.id.clone(),
                    "Missing clientInfo",
                ))
            }
        };

        let client_name = client_info
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let previous = session.begin_initialize(protocol_version.clone(), client_info);

        debug!(
            session = %session.id(),
            client = %client_name,
            client_version = %protocol_version,
            previous_state = %previous,
            "Initialize"
        );

        Ok(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": self.capabilities,
            "serverInfo": self.server_info,
        }))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self) -> Value {
        json!({ "tools": self.registry.snapshot().definitions() })
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(
        &self,
        session: &Session,
        req: &JsonRpcRequest,
    ) -> Result<Value, JsonRpcError> {
        let mut params = params_object(req.params.as_ref())
            .map_err(|e| JsonRpcError::invalid_params(req.id.clone(), e))?;

        let (name, arguments) = call_target(&req.id, &mut params)?;

        match self.registry.execute(&name, arguments).await {
            Ok(result) => Ok(result.to_value()),
            Err(error) => {
                debug!(session = %session.id(), tool = %name, %error, "Tool call failed");
                Err(JsonRpcError::with_message(
                    Some(req.id.clone()),
                    error.code(),
                    error.to_string(),
                ))
            }
        }
    }
}

/// Extracts `name` and `arguments` from tools/call params.
fn call_target(id: &RequestId, params: &mut Map<String, Value>) -> Result<(String, Value), JsonRpcError> {
    let name = match params.remove("name") {
        Some(Value::String(name)) if !name.is_empty() => name,
        _ => return Err(JsonRpcError::invalid_params(id.clone(), "Missing tool name")),
    };

    let arguments = match params.remove("arguments") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(args @ Value::Object(_)) => args,
        Some(other) => {
            return Err(JsonRpcError::invalid_params(
                id.clone(),
                format!("arguments must be an object, got {}", json_type_name(&other)),
            ))
        }
    };

    Ok((name, arguments))
}
