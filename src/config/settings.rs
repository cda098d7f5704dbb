//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Every section is optional; missing fields take the defaults below.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::protocol::SERVER_NAME;
use crate::mcp::transport::TransportKind;

/// Log levels accepted in `logging.level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Identity reported in `serverInfo`.
    #[serde(default)]
    pub server: ServerConfig,

    /// Transport selection and listen addresses.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Tool execution settings.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "server.name must not be empty".to_string(),
            });
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }

        if self.tools.timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError {
                message: "tools.timeout_secs must be greater than zero (use null to disable)"
                    .to_string(),
            });
        }

        Ok(())
    }
}

/// Server identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Name reported to clients.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Version reported to clients.
    #[serde(default = "default_server_version")]
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            version: default_server_version(),
        }
    }
}

fn default_server_name() -> String {
    SERVER_NAME.to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Transport configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Which transport to serve.
    #[serde(default)]
    pub kind: TransportKind,

    /// Bind address for the network transports.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the HTTP transport.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Port for the WebSocket transport.
    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,

    /// Port for the SSE transport.
    #[serde(default = "default_sse_port")]
    pub sse_port: u16,
}

impl TransportConfig {
    /// Port configured for `kind`, or `None` for stdio.
    #[must_use]
    pub const fn port_for(&self, kind: TransportKind) -> Option<u16> {
        match kind {
            TransportKind::Stdio => None,
            TransportKind::Http => Some(self.http_port),
            TransportKind::Websocket => Some(self.websocket_port),
            TransportKind::Sse => Some(self.sse_port),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            host: default_host(),
            http_port: default_http_port(),
            websocket_port: default_websocket_port(),
            sse_port: default_sse_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_http_port() -> u16 {
    8000
}

const fn default_websocket_port() -> u16 {
    8001
}

const fn default_sse_port() -> u16 {
    8002
}

/// Tool execution configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Per-call deadline in seconds. `null` disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: Option<u64>,

    /// Plugins excluded from discovery.
    #[serde(default)]
    pub disabled_plugins: Vec<String>,
}

impl ToolsConfig {
    /// The per-call deadline as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            disabled_plugins: Vec::new(),
        }
    }
}

#[allow(clippy::unnecessary_wraps)] // serde default must match the field type
const fn default_timeout_secs() -> Option<u64> {
    Some(30)
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
