//! JSON-RPC 2.0 message types for MCP protocol.
//!
//! This module defines the core message types used in the Model Context Protocol.
//! All messages follow the JSON-RPC 2.0 specification with MCP-specific extensions.
//!
//! # Message Types
//!
//! - **Request**: A message expecting a response (has `id`, which may be `null`)
//! - **Response**: A reply to a request (success or error)
//! - **Notification**: A one-way message (no `id` key, no response expected)
//!
//! Transports decode frames with [`parse_message`] and write back whatever
//! [`JsonRpcReply`] the engine hands them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "mcp-toolhost";

/// A JSON-RPC 2.0 request ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// Numeric ID outside the `i64` range or with a fractional part.
    /// Echoed back exactly as received.
    Wide(Number),
    /// String request ID.
    String(String),
    /// Explicit `null` ID. Still a request, echoed back as `null`.
    Null,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Wide(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A JSON-RPC 2.0 request message.
///
/// Requests expect a response from the server.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// Unique request identifier.
    pub id: RequestId,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a request, mainly for transports that synthesise calls.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification message (incoming).
///
/// Notifications do not have an ID and do not expect a response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(default)]
    pub params: Option<Value>,
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this response corresponds to.
    pub id: RequestId,

    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// JSON-RPC 2.0 error codes used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method (or tool) does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// The session has not completed the initialize handshake.
    ServerNotInitialized,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerNotInitialized => -32002,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ServerNotInitialized => "Server not initialized",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }
}

/// A JSON-RPC 2.0 error response.
///
/// The `id` is always serialised; it is `null` when the request ID could
/// not be determined.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this error corresponds to (if known).
    pub id: Option<RequestId>,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates a new error response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }

    /// Creates an error response with a custom message.
    #[must_use]
    pub fn with_message(id: Option<RequestId>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(id, JsonRpcErrorData::with_message(code, message))
    }

    /// Creates a parse error response (ID cannot be determined).
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(None, JsonRpcErrorData::from_code(ErrorCode::ParseError))
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, JsonRpcErrorData::from_code(ErrorCode::InvalidRequest))
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::with_message(
            Some(id),
            ErrorCode::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::with_message(Some(id), ErrorCode::InvalidParams, message)
    }

    /// Creates a "server not initialized" error response.
    #[must_use]
    pub fn not_initialized(id: RequestId) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::from_code(ErrorCode::ServerNotInitialized),
        )
    }
}

/// Either kind of reply frame.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonRpcReply {
    /// A `result` frame.
    Success(JsonRpcResponse),
    /// An `error` frame.
    Error(JsonRpcError),
}

impl JsonRpcReply {
    /// Returns the error code if this is an error frame.
    #[must_use]
    pub const fn error_code(&self) -> Option<i32> {
        match self {
            Self::Success(_) => None,
            Self::Error(err) => Some(err.error.code),
        }
    }

    /// Returns the result payload if this is a success frame.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match self {
            Self::Success(resp) => Some(&resp.result),
            Self::Error(_) => None,
        }
    }
}

impl From<JsonRpcResponse> for JsonRpcReply {
    fn from(resp: JsonRpcResponse) -> Self {
        Self::Success(resp)
    }
}

impl From<JsonRpcError> for JsonRpcReply {
    fn from(err: JsonRpcError) -> Self {
        Self::Error(err)
    }
}

/// An incoming message that could be either a request or notification.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A request expecting a response.
    Request(JsonRpcRequest),
    /// A notification (no response expected).
    Notification(JsonRpcNotification),
}

impl IncomingMessage {
    /// Returns the request ID if this is a request.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Notification(_) => None,
        }
    }
}

/// Parses a JSON string into an incoming message.
///
/// # Errors
///
/// Returns a `JsonRpcError` if the JSON is malformed (`-32700`) or is not a
/// structurally valid message (`-32600`). When the request ID can be
/// recovered it is carried on the error.
pub fn parse_message(json: &str) -> Result<IncomingMessage, JsonRpcError> {
    let value: Value = serde_json::from_str(json).map_err(|_| JsonRpcError::parse_error())?;
    parse_value(value)
}

/// Interprets an already-decoded JSON value as an incoming message.
///
/// # Errors
///
/// Returns `-32600` if the value is not a valid request or notification.
pub fn parse_value(value: Value) -> Result<IncomingMessage, JsonRpcError> {
    let Value::Object(mut obj) = value else {
        return Err(JsonRpcError::invalid_request(None));
    };

    // A present `id` key makes this a request, even when the value is null.
    // Ids that are neither string, number nor null cannot be echoed, so the
    // error reply carries `null` as JSON-RPC requires.
    let id = match obj.remove("id") {
        Some(raw) => Some(
            serde_json::from_value::<RequestId>(raw)
                .map_err(|_| JsonRpcError::invalid_request(None))?,
        ),
        None => None,
    };

    let jsonrpc = obj.get("jsonrpc").and_then(Value::as_str);
    if jsonrpc != Some("2.0") {
        return Err(JsonRpcError::invalid_request(id));
    }

    let method = match obj.get("method").and_then(Value::as_str) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => return Err(JsonRpcError::invalid_request(id)),
    };

    let params = obj.remove("params").filter(|p| !p.is_null());

    Ok(match id {
        Some(id) => IncomingMessage::Request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id,
            method,
            params,
        }),
        None => IncomingMessage::Notification(JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method,
            params,
        }),
    })
}

/// Returns the `params` object of a message, treating absence as empty.
///
/// # Errors
///
/// Returns a description if `params` is present but not an object.
pub fn params_object(params: Option<&Value>) -> Result<Map<String, Value>, String> {
    match params {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(format!(
            "params must be an object, got {}",
            json_type_name(other)
        )),
    }
}

/// Human-readable JSON type name for diagnostics.
#[must_use]
pub const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
