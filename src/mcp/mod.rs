//! Model Context Protocol (MCP) server implementation.
//!
//! The protocol engine is shared by every transport; transports only decode
//! frames, find the caller's session and encode replies.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            MCP Server                            │
//! │                                                                  │
//! │   ┌──────────────┐    ┌──────────────────┐    ┌──────────────┐   │
//! │   │  Transport   │───▶│  ProtocolEngine  │───▶│ ToolRegistry │   │
//! │   │ stdio / http │    │ (session state)  │    │  (snapshot)  │   │
//! │   │  ws / sse    │    └──────────────────┘    └──────────────┘   │
//! │   └──────────────┘             │                                 │
//! │          │                     ▼                                 │
//! │          │            ┌──────────────────┐                       │
//! │          └───────────▶│ Session / Store  │                       │
//! │                       └──────────────────┘                       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod engine;
pub mod protocol;
pub mod session;
pub mod transport;

pub use engine::{ProtocolEngine, ServerInfo};
pub use protocol::{JsonRpcError, JsonRpcReply, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use session::{Session, SessionState, SessionStore};
pub use transport::{StdioServer, StdioTransport, TransportKind};
