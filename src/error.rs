//! Error types for mcp-toolhost.
//!
//! Every error that can reach a client is eventually rendered as a JSON-RPC
//! error object, so the tool-facing errors carry their wire code via
//! [`ToolError::code`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::mcp::protocol::ErrorCode;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while deriving a parameter schema from a declaration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A parameter was declared without a name.
    #[error("parameter at position {position} has an empty name")]
    EmptyName {
        /// Zero-based position in the declaration.
        position: usize,
    },

    /// Two parameters share the same name.
    #[error("parameter '{name}' is declared more than once")]
    DuplicateName {
        /// The repeated parameter name.
        name: String,
    },
}

/// Errors produced while looking up, binding or executing a tool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// No tool with this name is registered.
    #[error("Tool not found: {name}")]
    NotFound {
        /// The requested tool name.
        name: String,
    },

    /// The supplied arguments do not match the tool's parameters.
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments {
        /// The tool being called.
        tool: String,
        /// What was wrong with the arguments.
        message: String,
    },

    /// The handler reported a failure.
    #[error("Tool execution error: {message}")]
    Execution {
        /// Failure description from the handler.
        message: String,
    },

    /// The handler did not finish before the configured deadline.
    #[error("Tool '{tool}' timed out after {limit:?}")]
    Timeout {
        /// The tool being called.
        tool: String,
        /// The deadline that expired.
        limit: Duration,
    },

    /// The handler panicked.
    #[error("Tool '{tool}' panicked during execution")]
    Panicked {
        /// The tool being called.
        tool: String,
    },
}

impl ToolError {
    /// Creates an execution failure. Handlers return this for their own faults.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Creates an argument failure for `tool`.
    #[must_use]
    pub fn invalid_arguments(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Returns the JSON-RPC error code this failure is reported with.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::MethodNotFound,
            Self::InvalidArguments { .. } => ErrorCode::InvalidParams,
            Self::Execution { .. } | Self::Timeout { .. } | Self::Panicked { .. } => {
                ErrorCode::InternalError
            }
        }
    }
}

/// A plugin failed to produce its tool candidates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("plugin '{plugin}' failed to load: {reason}")]
pub struct PluginError {
    /// Name of the failing plugin.
    pub plugin: String,
    /// Why it failed.
    pub reason: String,
}

impl PluginError {
    /// Creates a new plugin error.
    #[must_use]
    pub fn new(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }
}
