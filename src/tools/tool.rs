//! Tool declarations and capability descriptors.
//!
//! Tools come in three declaration styles, all implementing [`Tool`]:
//!
//! 1. **Direct**: a struct implementing [`Tool`] itself.
//! 2. **Function**: an async closure lifted by [`FunctionTool::new`].
//! 3. **Method**: several async methods of one shared instance, lifted by
//!    [`MethodTools`].
//!
//! The registry turns each into a [`ToolDescriptor`], whose schema is
//! inferred once at construction and shared thereafter.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::mcp::protocol::json_type_name;
use crate::tools::result::{IntoToolResult, ToolResult};
use crate::tools::schema::{infer_schema, InputSchema, Param};

/// How a tool was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationStyle {
    /// A type implementing [`Tool`] directly.
    Direct,
    /// A wrapped async function.
    Function,
    /// A method extracted from a shared instance.
    Method,
}

impl fmt::Display for DeclarationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Function => write!(f, "function"),
            Self::Method => write!(f, "method"),
        }
    }
}

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Declared parameters, in order.
    fn params(&self) -> Vec<Param>;

    /// Declaration style, for diagnostics.
    fn style(&self) -> DeclarationStyle {
        DeclarationStyle::Direct
    }

    /// Runs the tool with already-bound arguments.
    async fn call(&self, args: Arguments) -> Result<ToolResult, ToolError>;
}

/// Arguments after binding: every declared parameter is present, with
/// defaults filled in for omitted optional ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Arguments {
    tool: String,
    values: Map<String, Value>,
}

impl Arguments {
    /// Wraps already-bound values.
    #[must_use]
    pub fn new(tool: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            values,
        }
    }

    /// Deserialises argument `name` as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] if the argument is missing or
    /// cannot be represented as `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ToolError> {
        let value = self.values.get(name).ok_or_else(|| {
            ToolError::invalid_arguments(&self.tool, format!("missing argument '{name}'"))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            ToolError::invalid_arguments(&self.tool, format!("argument '{name}': {e}"))
        })
    }

    /// Like [`get`](Self::get), but absent or `null` yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] if the value has the wrong shape.
    pub fn get_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ToolError> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.get(name).map(Some),
        }
    }

    /// The raw bound values.
    #[must_use]
    pub const fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// The tool these arguments were bound for.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }
}

/// Binds raw `arguments` onto the declared parameters.
///
/// `null` is treated as an empty object. Unknown keys, missing required
/// parameters and type mismatches are argument errors.
///
/// # Errors
///
/// Returns [`ToolError::InvalidArguments`] describing the first mismatch.
pub fn bind_arguments(
    tool: &str,
    params: &[Param],
    arguments: Value,
) -> Result<Arguments, ToolError> {
    let mut supplied = match arguments {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(ToolError::invalid_arguments(
                tool,
                format!("arguments must be an object, got {}", json_type_name(&other)),
            ))
        }
    };

    if let Some(unknown) = supplied
        .keys()
        .find(|key| !params.iter().any(|p| &p.name == *key))
    {
        return Err(ToolError::invalid_arguments(
            tool,
            format!("unexpected argument '{unknown}'"),
        ));
    }

    let mut bound = Map::new();
    for param in params {
        match supplied.remove(&param.name) {
            Some(value) => {
                if !param.ty.accepts(&value) {
                    let nullable = if param.ty.is_nullable() { " or null" } else { "" };
                    return Err(ToolError::invalid_arguments(
                        tool,
                        format!(
                            "argument '{}' must be {}{nullable}, got {}",
                            param.name,
                            param.ty.json_type(),
                            json_type_name(&value)
                        ),
                    ));
                }
                bound.insert(param.name.clone(), value);
            }
            None => match &param.default {
                Some(default) => {
                    bound.insert(param.name.clone(), default.clone());
                }
                None => {
                    return Err(ToolError::invalid_arguments(
                        tool,
                        format!("missing required argument '{}'", param.name),
                    ))
                }
            },
        }
    }

    Ok(Arguments::new(tool, bound))
}

type Handler = Arc<dyn Fn(Arguments) -> BoxFuture<'static, Result<ToolResult, ToolError>> + Send + Sync>;

/// A tool backed by an async function.
pub struct FunctionTool {
    name: String,
    description: String,
    params: Vec<Param>,
    style: DeclarationStyle,
    handler: Handler,
}

impl FunctionTool {
    /// Lifts `handler` into a tool.
    ///
    /// The handler may return anything implementing [`IntoToolResult`].
    pub fn new<F, Fut, R>(
        name: impl Into<String>,
        description: impl Into<String>,
        params: Vec<Param>,
        handler: F,
    ) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ToolError>> + Send + 'static,
        R: IntoToolResult,
    {
        let handler: Handler = Arc::new(move |args| {
            let fut = handler(args);
            async move { fut.await.map(IntoToolResult::into_tool_result) }.boxed()
        });

        Self {
            name: name.into(),
            description: description.into(),
            params,
            style: DeclarationStyle::Function,
            handler,
        }
    }
}

impl fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("style", &self.style)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn params(&self) -> Vec<Param> {
        self.params.clone()
    }

    fn style(&self) -> DeclarationStyle {
        self.style
    }

    async fn call(&self, args: Arguments) -> Result<ToolResult, ToolError> {
        (self.handler)(args).await
    }
}

/// Builder extracting several tools from one shared instance.
///
/// ```
/// use std::sync::Arc;
/// use mcp_toolhost::tools::{MethodTools, Param};
///
/// struct Counter { step: i64 }
///
/// let tools = MethodTools::new(Counter { step: 2 })
///     .method("bump", "Add the step to n", vec![Param::required::<i64>("n")],
///         |this: Arc<Counter>, args| async move {
///             Ok::<_, mcp_toolhost::error::ToolError>(args.get::<i64>("n")? + this.step)
///         })
///     .into_tools();
/// assert_eq!(tools.len(), 1);
/// ```
pub struct MethodTools<T> {
    instance: Arc<T>,
    tools: Vec<Arc<dyn Tool>>,
}

impl<T: Send + Sync + 'static> MethodTools<T> {
    /// Starts extracting tools bound to `instance`.
    #[must_use]
    pub fn new(instance: T) -> Self {
        Self {
            instance: Arc::new(instance),
            tools: Vec::new(),
        }
    }

    /// Adds one method as a tool.
    #[must_use]
    pub fn method<F, Fut, R>(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        params: Vec<Param>,
        method: F,
    ) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ToolError>> + Send + 'static,
        R: IntoToolResult,
    {
        let instance = Arc::clone(&self.instance);
        let mut tool = FunctionTool::new(name, description, params, move |args| {
            method(Arc::clone(&instance), args)
        });
        tool.style = DeclarationStyle::Method;
        self.tools.push(Arc::new(tool));
        self
    }

    /// The shared instance every extracted tool is bound to.
    #[must_use]
    pub fn instance(&self) -> &Arc<T> {
        &self.instance
    }

    /// Finishes extraction.
    #[must_use]
    pub fn into_tools(self) -> Vec<Arc<dyn Tool>> {
        self.tools
    }
}

/// A validated, immutable tool entry in the registry.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    plugin: String,
    style: DeclarationStyle,
    params: Arc<[Param]>,
    schema: Arc<InputSchema>,
    input_schema: Arc<Value>,
    handler: Arc<dyn Tool>,
}

impl ToolDescriptor {
    /// Validates `tool` and computes its schema.
    ///
    /// # Errors
    ///
    /// Returns a reason if the name or description is empty, or if schema
    /// inference rejects the parameter list.
    pub fn new(tool: Arc<dyn Tool>, plugin: impl Into<String>) -> Result<Self, String> {
        let name = tool.name().trim().to_string();
        if name.is_empty() {
            return Err("tool is missing a name".to_string());
        }

        let description = tool.description().trim().to_string();
        if description.is_empty() {
            return Err(format!("tool '{name}' is missing a description"));
        }

        let params = tool.params();
        let schema = infer_schema(&params)
            .map_err(|e| format!("tool '{name}' schema generation failed: {e}"))?;
        let input_schema = schema.to_value();

        Ok(Self {
            name,
            description,
            plugin: plugin.into(),
            style: tool.style(),
            params: params.into(),
            schema: Arc::new(schema),
            input_schema: Arc::new(input_schema),
            handler: tool,
        })
    }

    /// Tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tool description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Plugin the tool came from.
    #[must_use]
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Declaration style.
    #[must_use]
    pub const fn style(&self) -> DeclarationStyle {
        self.style
    }

    /// Declared parameters.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// The inferred schema.
    #[must_use]
    pub fn schema(&self) -> &InputSchema {
        &self.schema
    }

    /// Names of parameters without defaults.
    #[must_use]
    pub fn required_parameters(&self) -> &[String] {
        &self.schema.required
    }

    /// The schema as advertised on the wire. Computed once, shared by every listing.
    #[must_use]
    pub fn input_schema(&self) -> &Arc<Value> {
        &self.input_schema
    }

    /// The `{name, description, inputSchema}` projection used by `tools/list`.
    #[must_use]
    pub fn definition(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": *self.input_schema,
        })
    }

    /// Binds `arguments` and runs the handler.
    ///
    /// # Errors
    ///
    /// Returns binding failures or whatever the handler reports.
    pub async fn invoke(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let args = bind_arguments(&self.name, &self.params, arguments)?;
        self.handler.call(args).await
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("plugin", &self.plugin)
            .field("style", &self.style)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}
