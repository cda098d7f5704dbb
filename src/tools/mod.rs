//! Tools: declaration, schema inference, registry and built-ins.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   register   ┌───────────────┐   discover   ┌──────────────────┐
//! │  ToolPlugin  │─────────────▶│ ToolCollector │─────────────▶│ RegistrySnapshot │
//! └──────────────┘              └───────────────┘              └──────────────────┘
//!        │                              │                               │
//!        ▼                              ▼                               ▼
//!   Tool / FunctionTool /        ToolDescriptor                 ToolRegistry::execute
//!   MethodTools                  (schema inferred once)         (bind, deadline, catch panic)
//! ```

pub mod builtin;
pub mod registry;
pub mod result;
pub mod schema;
pub mod tool;

pub use builtin::builtin_plugins;
pub use registry::{FailedPlugin, RegistrySnapshot, RegistryStats, ToolCollector, ToolPlugin, ToolRegistry};
pub use result::{IntoToolResult, ToolContent, ToolResult};
pub use schema::{infer_schema, InputSchema, Param, ParamType, PropertySchema, SchemaType};
pub use tool::{bind_arguments, Arguments, DeclarationStyle, FunctionTool, MethodTools, Tool, ToolDescriptor};
