//! Tool dispatch through the environment: call-order result appending,
//! opt-in parallelism, error markers, and validation hooks.

mod init_logging;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use skein::{
    AgentFeature, DispatchToolCallsNode, Environment, FeaturePipeline, FeatureStore, FnTool,
    HookFlow, HookResult, LlModel, Message, MessageBody, MockExecutor, Node, ParamDescriptor,
    Prompt, RetryPolicy, Tool, ToolDescriptor, ToolError, ToolParameterType, ToolRegistry,
};

fn environment(tools: ToolRegistry, pipeline: Arc<FeaturePipeline>) -> Environment {
    Environment::new(
        Arc::new(MockExecutor::new()),
        LlModel::full("mock", "scripted"),
        tools,
        pipeline,
        Arc::new(Mutex::new(Prompt::default())),
        CancellationToken::new(),
        "test-strategy",
        "test-run",
        RetryPolicy::none(),
    )
}

/// Tool that sleeps before answering; `parallel_safe` is configurable.
struct Sleepy {
    descriptor: ToolDescriptor,
    delay: Duration,
}

#[async_trait]
impl Tool for Sleepy {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, _args: Value, _env: &Environment) -> Result<Value, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(json!(format!("{} finished", self.descriptor.name)))
    }
}

fn sleepy(name: &str, delay: Duration, parallel_safe: bool) -> Arc<dyn Tool> {
    Arc::new(Sleepy {
        descriptor: ToolDescriptor::new(name, "sleeps then answers").parallel_safe(parallel_safe),
        delay,
    })
}

fn calls(entries: &[(&str, &str)]) -> Value {
    let messages: Vec<Message> = entries
        .iter()
        .map(|(id, tool)| Message::tool_call(*id, *tool, json!({})))
        .collect();
    serde_json::to_value(messages).unwrap()
}

fn result_ids(history: &[Message]) -> Vec<String> {
    history
        .iter()
        .filter_map(|m| match &m.body {
            MessageBody::ToolResult { call_id, .. } => Some(call_id.clone()),
            _ => None,
        })
        .collect()
}

/// **Scenario**: results append in call order even when later calls
/// finish first; here both tools are parallel_safe and the first is slow.
#[tokio::test]
async fn parallel_dispatch_appends_in_call_order() {
    let tools = ToolRegistry::new()
        .with_tool(sleepy("slow", Duration::from_millis(80), true))
        .unwrap()
        .with_tool(sleepy("fast", Duration::from_millis(1), true))
        .unwrap();
    let env = environment(tools, Arc::new(FeaturePipeline::new()));

    let node = DispatchToolCallsNode::new("dispatch");
    let started = std::time::Instant::now();
    node.run(calls(&[("c1", "slow"), ("c2", "fast")]), &env)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result_ids(&env.history()), vec!["c1", "c2"]);
    assert!(
        elapsed < Duration::from_millis(140),
        "parallel-safe calls overlap; took {:?}",
        elapsed
    );
}

/// **Scenario**: parallelism is opt-in: one non-parallel-safe tool forces
/// sequential execution, and call order still holds.
#[tokio::test]
async fn sequential_dispatch_when_not_parallel_safe() {
    let tools = ToolRegistry::new()
        .with_tool(sleepy("slow", Duration::from_millis(30), false))
        .unwrap()
        .with_tool(sleepy("fast", Duration::from_millis(1), true))
        .unwrap();
    let env = environment(tools, Arc::new(FeaturePipeline::new()));

    let node = DispatchToolCallsNode::new("dispatch");
    node.run(calls(&[("c1", "slow"), ("c2", "fast")]), &env)
        .await
        .unwrap();
    assert_eq!(result_ids(&env.history()), vec!["c1", "c2"]);
}

/// **Scenario**: a failing tool yields an error-marked ToolResult; the
/// dispatch keeps going and on_tool_failure fires.
#[tokio::test]
async fn tool_failure_appends_error_marker_and_continues() {
    struct Failures {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl AgentFeature for Failures {
        fn storage_key(&self) -> &str {
            "failures"
        }

        async fn on_tool_failure(
            &self,
            _store: &FeatureStore,
            tool: &ToolDescriptor,
            _args: &Value,
            error: &ToolError,
        ) -> HookResult {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}: {}", tool.name, error));
            Ok(HookFlow::proceed())
        }
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let pipeline = Arc::new(FeaturePipeline::new());
    pipeline
        .install(Arc::new(Failures {
            seen: Arc::clone(&seen),
        }))
        .unwrap();

    let broken = Arc::new(FnTool::from_sync(
        ToolDescriptor::new("broken", "always fails"),
        |_args| {
            Err(ToolError::Execution {
                tool: "broken".into(),
                message: "disk on fire".into(),
            })
        },
    ));
    let tools = ToolRegistry::new()
        .with_tool(broken)
        .unwrap()
        .with_tool(sleepy("fast", Duration::from_millis(1), false))
        .unwrap();
    let env = environment(tools, pipeline);

    let node = DispatchToolCallsNode::new("dispatch");
    let output = node
        .run(calls(&[("c1", "broken"), ("c2", "fast")]), &env)
        .await
        .unwrap();

    let results: Vec<Message> = serde_json::from_value(output).unwrap();
    assert_eq!(results.len(), 2);
    match &results[0].body {
        MessageBody::ToolResult { content, .. } => {
            assert!(content["error"].as_str().unwrap().contains("disk on fire"));
        }
        other => panic!("expected tool result, got {:?}", other),
    }
    assert_eq!(seen.lock().unwrap().len(), 1);
}

/// **Scenario**: argument validation failures fire
/// on_tool_validation_error and never reach the tool.
#[tokio::test]
async fn validation_failure_fires_hook_and_skips_tool() {
    struct Validations {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl AgentFeature for Validations {
        fn storage_key(&self) -> &str {
            "validations"
        }

        async fn on_tool_validation_error(
            &self,
            _store: &FeatureStore,
            tool: &ToolDescriptor,
            _args: &Value,
            message: &str,
        ) -> HookResult {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}: {}", tool.name, message));
            Ok(HookFlow::proceed())
        }
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let pipeline = Arc::new(FeaturePipeline::new());
    pipeline
        .install(Arc::new(Validations {
            seen: Arc::clone(&seen),
        }))
        .unwrap();

    let executed = Arc::new(Mutex::new(0usize));
    let executed_in_tool = Arc::clone(&executed);
    let strict = Arc::new(FnTool::from_sync(
        ToolDescriptor::new("strict", "needs a count").with_required(ParamDescriptor::new(
            "count",
            "How many",
            ToolParameterType::Integer,
        )),
        move |_args| {
            *executed_in_tool.lock().unwrap() += 1;
            Ok(json!("ran"))
        },
    ));
    let tools = ToolRegistry::new().with_tool(strict).unwrap();
    let env = environment(tools, pipeline);

    let err = env
        .call_tool("strict", json!({"count": "three"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Validation { .. }));
    assert_eq!(*executed.lock().unwrap(), 0, "tool body never ran");
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("count"));
}

/// **Scenario**: unknown tool names resolve to an error-marked result, not
/// a run failure.
#[tokio::test]
async fn unknown_tool_becomes_error_marker() {
    let env = environment(ToolRegistry::new(), Arc::new(FeaturePipeline::new()));
    let node = DispatchToolCallsNode::new("dispatch");
    let output = node.run(calls(&[("c1", "ghost")]), &env).await.unwrap();
    let results: Vec<Message> = serde_json::from_value(output).unwrap();
    match &results[0].body {
        MessageBody::ToolResult { content, .. } => {
            assert!(content["error"].as_str().unwrap().contains("unknown tool"));
        }
        other => panic!("expected tool result, got {:?}", other),
    }
}

/// **Scenario**: a tool can call another tool through the environment; the
/// nested result is returned, not appended (no duplicate messages).
#[tokio::test]
async fn nested_tool_call_does_not_double_append() {
    let inner = Arc::new(FnTool::from_sync(
        ToolDescriptor::new("inner", "adds one"),
        |args| Ok(json!(args["n"].as_i64().unwrap_or(0) + 1)),
    ));
    fn delegate<'a>(_args: Value, env: &'a Environment) -> skein::ToolFuture<'a> {
        Box::pin(async move {
            let inner = env.call_tool("inner", json!({"n": 41})).await?;
            Ok(json!({"wrapped": inner}))
        })
    }
    let outer = Arc::new(FnTool::new(
        ToolDescriptor::new("outer", "delegates to inner"),
        Box::new(delegate),
    ));
    let tools = ToolRegistry::new()
        .with_tool(inner)
        .unwrap()
        .with_tool(outer)
        .unwrap();
    let env = environment(tools, Arc::new(FeaturePipeline::new()));

    let node = DispatchToolCallsNode::new("dispatch");
    let output = node.run(calls(&[("c1", "outer")]), &env).await.unwrap();
    let results: Vec<Message> = serde_json::from_value(output).unwrap();
    assert_eq!(results.len(), 1);
    match &results[0].body {
        MessageBody::ToolResult { content, .. } => {
            assert_eq!(content, &json!({"wrapped": 42}));
        }
        other => panic!("expected tool result, got {:?}", other),
    }
    assert_eq!(
        env.history().len(),
        1,
        "only the outer call appended a result"
    );
}

/// Dispatch with null input answers the prompt's trailing unanswered tool
/// calls.
#[tokio::test]
async fn null_input_dispatches_unanswered_calls_from_history() {
    let tools = ToolRegistry::new()
        .with_tool(sleepy("fast", Duration::from_millis(1), false))
        .unwrap();
    let env = environment(tools, Arc::new(FeaturePipeline::new()));
    env.append(Message::tool_call("c9", "fast", json!({})));

    let node = DispatchToolCallsNode::new("dispatch");
    node.run(Value::Null, &env).await.unwrap();
    assert_eq!(result_ids(&env.history()), vec!["c9"]);
}
