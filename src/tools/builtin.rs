//! Built-in tool plugins.
//!
//! One plugin per declaration style, so a default server always exposes a
//! direct tool, a function-wrapped tool and an instance's methods.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, Utc};
use rand::Rng;
use serde_json::json;

use crate::error::{PluginError, ToolError};
use crate::tools::registry::{ToolCollector, ToolPlugin};
use crate::tools::result::ToolResult;
use crate::tools::schema::Param;
use crate::tools::tool::{Arguments, FunctionTool, MethodTools, Tool};

/// All built-in plugins, in discovery order.
#[must_use]
pub fn builtin_plugins() -> Vec<Arc<dyn ToolPlugin>> {
    vec![
        Arc::new(CorePlugin),
        Arc::new(FunctionsPlugin),
        Arc::new(UtilitiesPlugin),
    ]
}

// ============================================================================
// Direct tools
// ============================================================================

/// Echoes its input back.
#[derive(Debug, Default)]
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo back the input text"
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::required::<String>("text").describe("Text to echo back")]
    }

    async fn call(&self, args: Arguments) -> Result<ToolResult, ToolError> {
        let text: String = args.get("text")?;
        Ok(ToolResult::text(format!("Echo: {text}")))
    }
}

/// Basic arithmetic on two numbers.
#[derive(Debug, Default)]
pub struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Perform basic math operations"
    }

    fn params(&self) -> Vec<Param> {
        vec![
            Param::required::<String>("operation")
                .describe("One of: add, subtract, multiply, divide"),
            Param::required::<f64>("a").describe("First number"),
            Param::required::<f64>("b").describe("Second number"),
        ]
    }

    async fn call(&self, args: Arguments) -> Result<ToolResult, ToolError> {
        let operation: String = args.get("operation")?;
        let a: f64 = args.get("a")?;
        let b: f64 = args.get("b")?;

        let result = match operation.as_str() {
            "add" => a + b,
            "subtract" => a - b,
            "multiply" => a * b,
            "divide" => {
                if b == 0.0 {
                    return Err(ToolError::execution("division by zero"));
                }
                a / b
            }
            other => {
                return Err(ToolError::invalid_arguments(
                    "calculate",
                    format!("unknown operation '{other}' (expected add, subtract, multiply or divide)"),
                ))
            }
        };

        Ok(ToolResult::text(format!("{a} {operation} {b} = {result}")))
    }
}

/// Registers [`EchoTool`] and [`CalculateTool`].
#[derive(Debug, Default)]
pub struct CorePlugin;

impl ToolPlugin for CorePlugin {
    fn name(&self) -> &str {
        "core"
    }

    fn register(&self, tools: &mut ToolCollector) -> Result<(), PluginError> {
        tools.tool(EchoTool).tool(CalculateTool);
        Ok(())
    }
}

// ============================================================================
// Function tools
// ============================================================================

async fn current_time(args: Arguments) -> Result<String, ToolError> {
    let timezone: String = args.get("timezone")?;
    let format: String = args.get("format")?;

    let (iso, readable, plain) = match timezone.to_ascii_lowercase().as_str() {
        "utc" => {
            let now = Utc::now();
            (now.to_rfc3339(), now.format("%Y-%m-%d %H:%M:%S").to_string(), now.to_string())
        }
        "local" => {
            let now = Local::now();
            (now.to_rfc3339(), now.format("%Y-%m-%d %H:%M:%S").to_string(), now.to_string())
        }
        other => {
            return Err(ToolError::invalid_arguments(
                "current_time",
                format!("unsupported timezone '{other}' (expected UTC or local)"),
            ))
        }
    };

    let rendered = match format.as_str() {
        "iso" => iso,
        "readable" => readable,
        _ => plain,
    };
    Ok(format!("Current time: {rendered}"))
}

async fn random_number(args: Arguments) -> Result<String, ToolError> {
    let min: i64 = args.get("min_val")?;
    let max: i64 = args.get("max_val")?;
    if min > max {
        return Err(ToolError::invalid_arguments(
            "random_number",
            format!("min_val ({min}) is greater than max_val ({max})"),
        ));
    }
    let number = rand::thread_rng().gen_range(min..=max);
    Ok(format!("Random number between {min} and {max}: {number}"))
}

async fn reverse_text(args: Arguments) -> Result<ToolResult, ToolError> {
    let text: String = args.get("text")?;
    let reversed: String = text.chars().rev().collect();
    Ok(ToolResult::new()
        .add_text(format!("Original: {text}"))
        .add_text(format!("Reversed: {reversed}")))
}

/// Registers the function-wrapped tools.
#[derive(Debug, Default)]
pub struct FunctionsPlugin;

impl ToolPlugin for FunctionsPlugin {
    fn name(&self) -> &str {
        "functions"
    }

    fn register(&self, tools: &mut ToolCollector) -> Result<(), PluginError> {
        tools
            .tool(FunctionTool::new(
                "current_time",
                "Get the current date and time",
                vec![
                    Param::optional::<String>("timezone", "UTC").describe("UTC or local"),
                    Param::optional::<String>("format", "iso").describe("iso, readable or plain"),
                ],
                current_time,
            ))
            .tool(FunctionTool::new(
                "random_number",
                "Generate a random number in a range",
                vec![
                    Param::optional::<i64>("min_val", 1),
                    Param::optional::<i64>("max_val", 100),
                ],
                random_number,
            ))
            .tool(FunctionTool::new(
                "reverse_text",
                "Reverse any text string",
                vec![Param::required::<String>("text")],
                reverse_text,
            ));
        Ok(())
    }
}

// ============================================================================
// Method tools
// ============================================================================

/// Text helpers sharing one configuration.
#[derive(Debug)]
pub struct TextUtilities {
    max_chars: usize,
}

impl TextUtilities {
    /// Creates the helpers, rejecting input longer than `max_chars`.
    #[must_use]
    pub const fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    fn checked<'a>(&self, tool: &str, text: &'a str) -> Result<&'a str, ToolError> {
        let len = text.chars().count();
        if len > self.max_chars {
            return Err(ToolError::invalid_arguments(
                tool,
                format!("text is {len} characters, limit is {}", self.max_chars),
            ));
        }
        Ok(text)
    }

    /// Extracts `word_count` and `to_upper`.
    #[must_use]
    pub fn into_tools(self) -> MethodTools<Self> {
        MethodTools::new(self)
            .method(
                "word_count",
                "Count words, characters and lines in text",
                vec![Param::required::<String>("text")],
                |this: Arc<Self>, args| async move {
                    let text: String = args.get("text")?;
                    let text = this.checked("word_count", &text)?;
                    Ok::<_, ToolError>(json!({
                        "words": text.split_whitespace().count(),
                        "characters": text.chars().count(),
                        "lines": text.lines().count(),
                    }))
                },
            )
            .method(
                "to_upper",
                "Convert text to upper case",
                vec![Param::required::<String>("text")],
                |this: Arc<Self>, args| async move {
                    let text: String = args.get("text")?;
                    Ok::<_, ToolError>(this.checked("to_upper", &text)?.to_uppercase())
                },
            )
    }
}

impl Default for TextUtilities {
    fn default() -> Self {
        Self::new(100_000)
    }
}

/// Integer helpers.
#[derive(Debug)]
pub struct MathUtilities {
    fibonacci_limit: i64,
}

impl MathUtilities {
    /// Creates the helpers; `fibonacci` refuses positions above `fibonacci_limit`.
    #[must_use]
    pub const fn new(fibonacci_limit: i64) -> Self {
        Self { fibonacci_limit }
    }

    fn fibonacci(&self, n: i64) -> Result<u64, ToolError> {
        if n < 0 {
            return Err(ToolError::invalid_arguments("fibonacci", "n must be non-negative"));
        }
        if n > self.fibonacci_limit {
            return Err(ToolError::invalid_arguments(
                "fibonacci",
                format!("n too large (max {}), got {n}", self.fibonacci_limit),
            ));
        }

        let (mut a, mut b) = (0_u64, 1_u64);
        for _ in 0..n {
            let next = a
                .checked_add(b)
                .ok_or_else(|| ToolError::execution("fibonacci overflowed u64"))?;
            a = b;
            b = next;
        }
        Ok(a)
    }

    /// Extracts `add` and `fibonacci`.
    #[must_use]
    pub fn into_tools(self) -> MethodTools<Self> {
        MethodTools::new(self)
            .method(
                "add",
                "Add two integers",
                vec![Param::required::<i64>("a"), Param::required::<i64>("b")],
                |_this: Arc<Self>, args| async move {
                    let a: i64 = args.get("a")?;
                    let b: i64 = args.get("b")?;
                    a.checked_add(b)
                        .ok_or_else(|| ToolError::execution("integer overflow"))
                },
            )
            .method(
                "fibonacci",
                "Calculate the Fibonacci number at position n",
                vec![Param::required::<i64>("n").describe("Zero-based position")],
                |this: Arc<Self>, args| async move {
                    let n: i64 = args.get("n")?;
                    let value = this.fibonacci(n)?;
                    Ok::<_, ToolError>(format!("Fibonacci({n}) = {value}"))
                },
            )
    }
}

impl Default for MathUtilities {
    fn default() -> Self {
        Self::new(90)
    }
}

/// Registers the method-extracted tools.
#[derive(Debug, Default)]
pub struct UtilitiesPlugin;

impl ToolPlugin for UtilitiesPlugin {
    fn name(&self) -> &str {
        "utilities"
    }

    fn register(&self, tools: &mut ToolCollector) -> Result<(), PluginError> {
        tools
            .methods(TextUtilities::default().into_tools())
            .methods(MathUtilities::default().into_tools());
        Ok(())
    }
}
