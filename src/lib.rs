//! mcp-toolhost: plugin-driven MCP tool server
//!
//! This library hosts tools declared by plugins and exposes them to AI
//! clients over the Model Context Protocol (JSON-RPC 2.0).
//!
//! # Architecture
//!
//! Tool authors declare capabilities; the server does the rest:
//!
//! - **Declaration**: implement [`tools::Tool`], wrap an async function in
//!   [`tools::FunctionTool`], or bind an instance's methods with
//!   [`tools::MethodTools`]
//! - **Schema Inference**: each tool's JSON input schema is derived once
//!   from its declared parameters
//! - **Discovery**: [`tools::ToolRegistry`] collects tools from plugins into
//!   an immutable snapshot, isolating failing plugins
//! - **Protocol**: [`mcp::ProtocolEngine`] runs the per-session handshake
//!   and routes `tools/list` and `tools/call`
//! - **Transports**: stdio, HTTP, WebSocket and SSE adapters share the engine
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol implementation and transports
//! - [`tools`]: Tool declaration, schema inference and the registry

pub mod config;
pub mod error;
pub mod mcp;
pub mod tools;
