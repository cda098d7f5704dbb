//! Tool registry and discovery.
//!
//! Plugins hand their tools to a [`ToolCollector`]; [`ToolRegistry::discover`]
//! validates every candidate, resolves name collisions (first registrant
//! wins) and installs the result as a new [`RegistrySnapshot`]. Snapshots are
//! immutable and swapped atomically, so a reload never disturbs calls that
//! are already running against the previous snapshot.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{PluginError, ToolError};
use crate::tools::result::ToolResult;
use crate::tools::tool::{DeclarationStyle, MethodTools, Tool, ToolDescriptor};

/// A source of tools, enumerated at discovery time.
pub trait ToolPlugin: Send + Sync {
    /// Plugin name, used in diagnostics and `disabled_plugins`.
    fn name(&self) -> &str;

    /// Hands this plugin's tools to `tools`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] if the plugin cannot produce its tools. Any
    /// tools already collected from this plugin are then discarded.
    fn register(&self, tools: &mut ToolCollector) -> Result<(), PluginError>;
}

/// Gathers candidate tools from one plugin.
pub struct ToolCollector {
    plugin: String,
    candidates: Vec<Arc<dyn Tool>>,
}

impl ToolCollector {
    fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            candidates: Vec::new(),
        }
    }

    /// Name of the plugin being collected.
    #[must_use]
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Adds a tool (direct or function-wrapped).
    pub fn tool(&mut self, tool: impl Tool + 'static) -> &mut Self {
        self.candidates.push(Arc::new(tool));
        self
    }

    /// Adds every tool extracted from one instance.
    pub fn methods<T: Send + Sync + 'static>(&mut self, methods: MethodTools<T>) -> &mut Self {
        self.candidates.extend(methods.into_tools());
        self
    }
}

/// A discovery failure: a plugin that failed to load or a rejected tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPlugin {
    /// Plugin the failure came from.
    pub plugin: String,
    /// The rejected tool, if the failure concerns a single tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Why it failed.
    pub reason: String,
}

/// Immutable result of one discovery pass.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    tools: IndexMap<String, ToolDescriptor>,
    failed: Vec<FailedPlugin>,
    generation: u64,
    loaded_at: DateTime<Utc>,
}

impl RegistrySnapshot {
    fn empty() -> Self {
        Self {
            tools: IndexMap::new(),
            failed: Vec::new(),
            generation: 0,
            loaded_at: Utc::now(),
        }
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// All tools, in registration order.
    pub fn tools(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    /// Tool names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Number of loaded tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Failures collected during the pass that built this snapshot.
    #[must_use]
    pub fn failed_plugins(&self) -> &[FailedPlugin] {
        &self.failed
    }

    /// Discovery pass counter; 0 means discovery has never run.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// When this snapshot was built.
    #[must_use]
    pub const fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// The `tools/list` projection.
    #[must_use]
    pub fn definitions(&self) -> Vec<Value> {
        self.tools.values().map(ToolDescriptor::definition).collect()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    /// Loaded tools.
    pub total_tools: usize,
    /// Tools declared by implementing [`Tool`] directly.
    pub direct_tools: usize,
    /// Tools wrapping a function.
    pub function_tools: usize,
    /// Tools extracted from an instance's methods.
    pub method_tools: usize,
    /// Number of discovery failures.
    pub failed_plugins: usize,
    /// Tool names grouped by declaration style.
    pub tools_by_style: IndexMap<DeclarationStyle, Vec<String>>,
    /// The failures themselves.
    pub failed: Vec<FailedPlugin>,
    /// Discovery pass counter.
    pub generation: u64,
    /// When the current snapshot was built.
    pub loaded_at: DateTime<Utc>,
}

/// Owner of the current [`RegistrySnapshot`].
pub struct ToolRegistry {
    plugins: Vec<Arc<dyn ToolPlugin>>,
    disabled: HashSet<String>,
    timeout: Option<Duration>,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    discovery: Mutex<()>,
}

impl ToolRegistry {
    /// Creates a registry over `plugins`. Nothing is loaded until
    /// [`discover`](Self::discover) runs.
    #[must_use]
    pub fn new(plugins: Vec<Arc<dyn ToolPlugin>>) -> Self {
        Self {
            plugins,
            disabled: HashSet::new(),
            timeout: None,
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::empty())),
            discovery: Mutex::new(()),
        }
    }

    /// Excludes the named plugins from discovery.
    #[must_use]
    pub fn with_disabled_plugins<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the per-call deadline. `None` disables it.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The per-call deadline.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs a full discovery pass and installs the result.
    ///
    /// Failures are recorded in the snapshot; the pass itself always
    /// completes. Concurrent passes run one at a time, so every pass gets its
    /// own generation.
    pub fn discover(&self) -> Arc<RegistrySnapshot> {
        let _pass = self.discovery.lock();
        let generation = self.snapshot.read().generation + 1;
        let mut tools: IndexMap<String, ToolDescriptor> = IndexMap::new();
        let mut failed = Vec::new();

        for plugin in &self.plugins {
            let plugin_name = plugin.name().to_string();
            if self.disabled.contains(&plugin_name) {
                debug!(plugin = %plugin_name, "Skipping disabled plugin");
                continue;
            }

            let candidates = match collect(plugin.as_ref()) {
                Ok(candidates) => candidates,
                Err(reason) => {
                    warn!(plugin = %plugin_name, %reason, "Plugin failed to load");
                    failed.push(FailedPlugin {
                        plugin: plugin_name,
                        tool: None,
                        reason,
                    });
                    continue;
                }
            };

            for candidate in candidates {
                let candidate_name = candidate.name().to_string();
                let descriptor = match ToolDescriptor::new(candidate, &plugin_name) {
                    Ok(descriptor) => descriptor,
                    Err(reason) => {
                        warn!(plugin = %plugin_name, %reason, "Rejected tool");
                        failed.push(FailedPlugin {
                            plugin: plugin_name.clone(),
                            tool: Some(candidate_name),
                            reason,
                        });
                        continue;
                    }
                };

                if let Some(existing) = tools.get(descriptor.name()) {
                    let reason = format!(
                        "name conflict: '{}' already registered by plugin '{}'",
                        descriptor.name(),
                        existing.plugin()
                    );
                    warn!(plugin = %plugin_name, %reason, "Rejected tool");
                    failed.push(FailedPlugin {
                        plugin: plugin_name.clone(),
                        tool: Some(descriptor.name().to_string()),
                        reason,
                    });
                    continue;
                }

                debug!(
                    tool = %descriptor.name(),
                    plugin = %plugin_name,
                    style = %descriptor.style(),
                    "Registered tool"
                );
                tools.insert(descriptor.name().to_string(), descriptor);
            }
        }

        let snapshot = Arc::new(RegistrySnapshot {
            tools,
            failed,
            generation,
            loaded_at: Utc::now(),
        });

        info!(
            tools = snapshot.len(),
            failed = snapshot.failed.len(),
            generation,
            "Tool discovery complete"
        );

        *self.snapshot.write() = Arc::clone(&snapshot);
        snapshot
    }

    /// The current snapshot. Holding it keeps it alive across reloads.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Looks up a tool in the current snapshot.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.snapshot.read().get(name).cloned()
    }

    /// Executes `name` with raw `arguments`.
    ///
    /// The handler runs under the configured deadline; a panic inside it is
    /// caught and reported as an error.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] for unknown names, argument binding
    /// failures, handler failures, timeouts and panics.
    pub async fn execute(&self, name: &str, arguments: Value) -> Result<ToolResult, ToolError> {
        let descriptor = self.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;

        debug!(tool = %name, "Executing tool");
        let call = AssertUnwindSafe(descriptor.invoke(arguments)).catch_unwind();

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                warn!(tool = %name, limit = ?limit, "Tool call timed out");
                ToolError::Timeout {
                    tool: name.to_string(),
                    limit,
                }
            })?,
            None => call.await,
        };

        outcome.unwrap_or_else(|_| {
            warn!(tool = %name, "Tool panicked");
            Err(ToolError::Panicked {
                tool: name.to_string(),
            })
        })
    }

    /// Aggregate statistics over the current snapshot.
    #[must_use]
    pub fn get_stats(&self) -> RegistryStats {
        let snapshot = self.snapshot();
        let mut tools_by_style: IndexMap<DeclarationStyle, Vec<String>> = [
            DeclarationStyle::Direct,
            DeclarationStyle::Function,
            DeclarationStyle::Method,
        ]
        .into_iter()
        .map(|style| (style, Vec::new()))
        .collect();

        for tool in snapshot.tools() {
            tools_by_style
                .entry(tool.style())
                .or_default()
                .push(tool.name().to_string());
        }

        let count = |style: DeclarationStyle| tools_by_style.get(&style).map_or(0, Vec::len);

        RegistryStats {
            total_tools: snapshot.len(),
            direct_tools: count(DeclarationStyle::Direct),
            function_tools: count(DeclarationStyle::Function),
            method_tools: count(DeclarationStyle::Method),
            failed_plugins: snapshot.failed.len(),
            failed: snapshot.failed.clone(),
            generation: snapshot.generation,
            loaded_at: snapshot.loaded_at,
            tools_by_style,
        }
    }

    /// Detailed information about one tool, or `None` if it is not loaded.
    #[must_use]
    pub fn get_tool_info(&self, name: &str) -> Option<Value> {
        let tool = self.get(name)?;
        Some(json!({
            "name": tool.name(),
            "description": tool.description(),
            "schema": tool.input_schema().as_ref(),
            "plugin": tool.plugin(),
            "style": tool.style(),
        }))
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("plugins", &self.plugins.len())
            .field("disabled", &self.disabled)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Runs one plugin's registration, containing errors and panics.
fn collect(plugin: &dyn ToolPlugin) -> Result<Vec<Arc<dyn Tool>>, String> {
    let mut collector = ToolCollector::new(plugin.name());
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| plugin.register(&mut collector)));

    match outcome {
        Ok(Ok(())) => Ok(collector.candidates),
        Ok(Err(e)) => Err(e.reason),
        Err(_) => Err("plugin panicked during registration".to_string()),
    }
}
