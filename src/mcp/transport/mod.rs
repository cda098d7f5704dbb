//! Transport adapters.
//!
//! Each adapter decodes frames in its own wire format, hands them to the
//! shared [`ProtocolEngine`](crate::mcp::engine::ProtocolEngine) and encodes
//! the replies:
//!
//! - [`stdio`]: newline-delimited JSON on stdin/stdout, one session
//! - [`http`]: request/response over HTTP, sessions keyed per client
//! - [`websocket`]: one session per WebSocket connection
//! - [`sse`]: the HTTP routes plus Server-Sent-Events streams

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod http;
pub mod sse;
pub mod stdio;
pub mod websocket;

pub use http::HttpState;
pub use stdio::{StdioServer, StdioTransport};

/// Which transport the server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC on stdin/stdout.
    #[default]
    Stdio,
    /// JSON-RPC over HTTP POST plus REST helpers.
    Http,
    /// JSON-RPC over WebSocket text frames.
    #[serde(alias = "ws")]
    #[value(alias = "ws")]
    Websocket,
    /// HTTP plus Server-Sent-Events streaming.
    Sse,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
            Self::Websocket => write!(f, "websocket"),
            Self::Sse => write!(f, "sse"),
        }
    }
}
