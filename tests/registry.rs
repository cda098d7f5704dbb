//! Integration tests for tool discovery and execution.
//!
//! These tests declare tools the way a plugin author would, in all three
//! declaration styles, and drive them through the public registry API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Barrier;

use mcp_toolhost::error::{PluginError, ToolError};
use mcp_toolhost::tools::{
    builtin_plugins, Arguments, DeclarationStyle, FunctionTool, MethodTools, Param, Tool,
    ToolCollector, ToolPlugin, ToolRegistry, ToolResult,
};

// =============================================================================
// Fixtures
// =============================================================================

/// A tool declared by implementing the trait directly.
struct Greet;

#[async_trait]
impl Tool for Greet {
    fn name(&self) -> &str {
        "greet"
    }

    fn description(&self) -> &str {
        "Greets someone"
    }

    fn params(&self) -> Vec<Param> {
        vec![
            Param::required::<String>("who").describe("Who to greet"),
            Param::optional::<bool>("shout", false),
        ]
    }

    async fn call(&self, args: Arguments) -> Result<ToolResult, ToolError> {
        let who: String = args.get("who")?;
        let shout: bool = args.get("shout")?;
        let text = format!("Hello, {who}");
        Ok(ToolResult::text(if shout { text.to_uppercase() } else { text }))
    }
}

/// State shared by method tools.
struct Counter {
    calls: AtomicUsize,
}

struct DemoPlugin;

impl ToolPlugin for DemoPlugin {
    fn name(&self) -> &str {
        "demo"
    }

    fn register(&self, tools: &mut ToolCollector) -> Result<(), PluginError> {
        tools.tool(Greet);

        tools.tool(FunctionTool::new(
            "double",
            "Doubles a number",
            vec![Param::required::<i64>("n")],
            |args| async move {
                let n: i64 = args.get("n")?;
                Ok::<_, ToolError>(n * 2)
            },
        ));

        tools.tool(FunctionTool::new(
            "sleepy",
            "Sleeps for a while",
            vec![Param::optional::<u64>("millis", 500)],
            |args| async move {
                let millis: u64 = args.get("millis")?;
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok::<_, ToolError>("awake")
            },
        ));

        tools.tool(FunctionTool::new(
            "explode",
            "Panics",
            vec![],
            |_args| async move {
                if std::hint::black_box(true) {
                    panic!("handler exploded");
                }
                Ok::<_, ToolError>("unreachable")
            },
        ));

        tools.methods(
            MethodTools::new(Counter {
                calls: AtomicUsize::new(0),
            })
            .method("bump", "Increments the counter", vec![], |counter: Arc<Counter>, _args| async move {
                let calls = counter.calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, ToolError>(json!({"calls": calls}))
            }),
        );

        Ok(())
    }
}

/// Tries to register a name the demo plugin already owns.
struct Shadow;

impl ToolPlugin for Shadow {
    fn name(&self) -> &str {
        "shadow"
    }

    fn register(&self, tools: &mut ToolCollector) -> Result<(), PluginError> {
        tools.tool(FunctionTool::new("greet", "Impostor", vec![], |_args| async {
            Ok::<_, ToolError>("impostor")
        }));
        tools.tool(FunctionTool::new("", "Nameless", vec![], |_args| async {
            Ok::<_, ToolError>("nameless")
        }));
        tools.tool(FunctionTool::new(
            "twice",
            "Declares a parameter twice",
            vec![Param::required::<i64>("x"), Param::required::<i64>("x")],
            |_args| async { Ok::<_, ToolError>("twice") },
        ));
        Ok(())
    }
}

/// Panics while registering.
struct Faulty;

impl ToolPlugin for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    fn register(&self, _tools: &mut ToolCollector) -> Result<(), PluginError> {
        panic!("cannot load");
    }
}

fn demo_registry() -> ToolRegistry {
    let plugins: Vec<Arc<dyn ToolPlugin>> = vec![Arc::new(DemoPlugin), Arc::new(Shadow), Arc::new(Faulty)];
    ToolRegistry::new(plugins).with_timeout(Some(Duration::from_millis(100)))
}

// =============================================================================
// Discovery Tests
// =============================================================================

#[test]
fn test_discovery_isolates_failures() {
    let registry = demo_registry();
    let snapshot = registry.discover();

    let names: Vec<_> = snapshot.names().collect();
    assert_eq!(names, vec!["greet", "double", "sleepy", "explode", "bump"]);
    assert_eq!(snapshot.get("greet").unwrap().description(), "Greets someone");

    let failed = snapshot.failed_plugins();
    assert_eq!(failed.len(), 4);
    assert_eq!(
        failed[0].reason,
        "name conflict: 'greet' already registered by plugin 'demo'"
    );
    assert_eq!(failed[0].plugin, "shadow");
    assert!(failed.iter().any(|f| f.tool.as_deref() == Some("twice")));
    let faulty = failed.iter().find(|f| f.plugin == "faulty").unwrap();
    assert!(faulty.tool.is_none());
}

#[test]
fn test_declaration_styles_are_recorded() {
    let registry = demo_registry();
    registry.discover();

    assert_eq!(registry.get("greet").unwrap().style(), DeclarationStyle::Direct);
    assert_eq!(registry.get("double").unwrap().style(), DeclarationStyle::Function);
    assert_eq!(registry.get("bump").unwrap().style(), DeclarationStyle::Method);

    let stats = registry.get_stats();
    assert_eq!(stats.total_tools, 5);
    assert_eq!(stats.direct_tools, 1);
    assert_eq!(stats.function_tools, 3);
    assert_eq!(stats.method_tools, 1);
    assert_eq!(stats.failed_plugins, 4);
}

#[test]
fn test_schema_is_inferred_from_params() {
    let registry = demo_registry();
    registry.discover();

    let greet = registry.get("greet").unwrap();
    assert_eq!(
        **greet.input_schema(),
        json!({
            "type": "object",
            "properties": {
                "who": {"type": "string", "description": "Who to greet"},
                "shout": {"type": "boolean"}
            },
            "required": ["who"]
        })
    );

    let info = registry.get_tool_info("bump").unwrap();
    assert_eq!(info["plugin"], "demo");
    assert_eq!(info["style"], "method");
    assert_eq!(info["schema"], json!({"type": "object", "properties": {}}));
    assert!(registry.get_tool_info("missing").is_none());
}

#[test]
fn test_disabled_plugins_are_skipped() {
    let registry = ToolRegistry::new(builtin_plugins()).with_disabled_plugins(["utilities"]);
    let snapshot = registry.discover();

    assert!(snapshot.get("echo").is_some());
    assert!(snapshot.get("word_count").is_none());
    assert!(snapshot.failed_plugins().is_empty());
}

#[test]
fn test_reload_swaps_snapshot() {
    let registry = demo_registry();
    let first = registry.discover();
    let second = registry.discover();

    assert_eq!(first.generation() + 1, second.generation());
    assert_eq!(registry.snapshot().generation(), second.generation());
    // Old snapshots stay readable while held
    assert_eq!(first.len(), second.len());
}

#[test]
fn test_empty_registry() {
    let registry = ToolRegistry::new(vec![]);
    let snapshot = registry.discover();
    assert!(snapshot.is_empty());
    assert!(snapshot.definitions().is_empty());
}

// =============================================================================
// Execution Tests
// =============================================================================

#[tokio::test]
async fn test_execute_binds_defaults() {
    let registry = demo_registry();
    registry.discover();

    let result = registry.execute("greet", json!({"who": "Ada"})).await.unwrap();
    assert_eq!(result.to_value()["content"][0]["text"], "Hello, Ada");

    let result = registry
        .execute("greet", json!({"who": "Ada", "shout": true}))
        .await
        .unwrap();
    assert_eq!(result.to_value()["content"][0]["text"], "HELLO, ADA");
}

#[tokio::test]
async fn test_execute_normalises_results() {
    let registry = demo_registry();
    registry.discover();

    let doubled = registry.execute("double", json!({"n": 21})).await.unwrap();
    assert_eq!(doubled.to_value(), json!({"content": [{"type": "text", "text": "42"}]}));

    let bumped = registry.execute("bump", Value::Null).await.unwrap();
    let text = bumped.to_value()["content"][0]["text"].as_str().unwrap().to_string();
    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, json!({"calls": 1}));
}

#[tokio::test]
async fn test_method_tools_share_instance_state() {
    let registry = demo_registry();
    registry.discover();

    for _ in 0..3 {
        registry.execute("bump", json!({})).await.unwrap();
    }
    let result = registry.execute("bump", json!({})).await.unwrap();
    let text = result.to_value()["content"][0]["text"].as_str().unwrap().to_string();
    assert!(text.contains('4'), "{text}");
}

#[tokio::test]
async fn test_execute_rejects_bad_arguments() {
    let registry = demo_registry();
    registry.discover();

    let cases = [
        json!({}),
        json!({"n": "two"}),
        json!({"n": 1.5}),
        json!({"n": 1, "m": 2}),
        json!([1]),
    ];
    for args in cases {
        let err = registry.execute("double", args.clone()).await.unwrap_err();
        assert!(
            matches!(err, ToolError::InvalidArguments { .. }),
            "{args}: {err}"
        );
        assert_eq!(err.code().code(), -32602);
    }
}

#[tokio::test]
async fn test_execute_unknown_tool() {
    let registry = demo_registry();
    registry.discover();

    let err = registry.execute("nope", json!({})).await.unwrap_err();
    assert_eq!(err, ToolError::NotFound { name: "nope".to_string() });
}

#[tokio::test]
async fn test_handler_panic_is_contained() {
    let registry = demo_registry();
    registry.discover();

    let err = registry.execute("explode", json!({})).await.unwrap_err();
    assert!(matches!(err, ToolError::Panicked { .. }));
    assert_eq!(err.code().code(), -32603);

    // The registry keeps serving after a panic
    let ok = registry.execute("double", json!({"n": 1})).await.unwrap();
    assert_eq!(ok.to_value()["content"][0]["text"], "2");
}

#[tokio::test]
async fn test_deadline_cancels_slow_handler() {
    let registry = demo_registry();
    registry.discover();

    let err = registry.execute("sleepy", json!({})).await.unwrap_err();
    assert!(matches!(err, ToolError::Timeout { .. }));
    assert_eq!(err.code().code(), -32603);

    let ok = registry.execute("sleepy", json!({"millis": 1})).await.unwrap();
    assert_eq!(ok.to_value()["content"][0]["text"], "awake");
}

/// Every call waits until all of them are in flight.
struct Rendezvous {
    barrier: Arc<Barrier>,
}

impl ToolPlugin for Rendezvous {
    fn name(&self) -> &str {
        "rendezvous"
    }

    fn register(&self, tools: &mut ToolCollector) -> Result<(), PluginError> {
        let barrier = Arc::clone(&self.barrier);
        tools.tool(FunctionTool::new(
            "meet",
            "Doubles n once every caller has arrived",
            vec![Param::required::<i64>("n")],
            move |args| {
                let barrier = Arc::clone(&barrier);
                async move {
                    let n: i64 = args.get("n")?;
                    barrier.wait().await;
                    Ok::<_, ToolError>(n * 2)
                }
            },
        ));
        Ok(())
    }
}

#[tokio::test]
async fn test_concurrent_calls_interleave() {
    const CALLERS: usize = 5;
    let plugins: Vec<Arc<dyn ToolPlugin>> = vec![Arc::new(Rendezvous {
        barrier: Arc::new(Barrier::new(CALLERS)),
    })];
    // Run one at a time, the first call would time out at the barrier
    let registry = Arc::new(ToolRegistry::new(plugins).with_timeout(Some(Duration::from_secs(5))));
    registry.discover();

    let calls = (0..CALLERS).map(|i| {
        let registry = Arc::clone(&registry);
        async move { registry.execute("meet", json!({"n": i})).await }
    });
    let results = futures::future::join_all(calls).await;

    for (i, result) in results.into_iter().enumerate() {
        let expected = (i * 2).to_string();
        assert_eq!(result.unwrap().to_value()["content"][0]["text"], expected);
    }
}
