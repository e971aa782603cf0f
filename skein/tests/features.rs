//! Feature pipeline over a whole run: installation-order firing,
//! aborts, and handler-error containment.

mod init_logging;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use skein::{
    AgentConfig, AgentError, AgentFeature, AgentRunner, CallLlmNode, Edge, FeatureStore,
    FinishNode, HookFlow, HookResult, LlModel, MockExecutor, NodeContext, RunOutcome, RunStatus,
    StrategyBuilder, SubgraphBuilder,
};

fn chat_strategy() -> Arc<skein::Strategy> {
    let mut main = SubgraphBuilder::new("main");
    main.add_node(Arc::new(CallLlmNode::new("respond")))
        .add_node(Arc::new(FinishNode::new("done")))
        .add_edge(Edge::new("respond", "done"))
        .start("respond")
        .finish("done");
    let mut b = StrategyBuilder::new("chat");
    b.subgraph(main);
    Arc::new(b.build().unwrap())
}

fn runner() -> AgentRunner {
    let executor = Arc::new(MockExecutor::new());
    executor.push_text("ok");
    AgentRunner::new(AgentConfig::new(
        executor,
        LlModel::full("mock", "scripted"),
        chat_strategy(),
    ))
}

/// Feature that appends `"{label}:{hook}"` to a shared log.
struct Tagged {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Tagged {
    fn push(&self, hook: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", self.label, hook));
    }
}

#[async_trait]
impl AgentFeature for Tagged {
    fn storage_key(&self) -> &str {
        self.label
    }

    async fn on_agent_start(
        &self,
        _store: &FeatureStore,
        _strategy: &str,
        _agent_id: &str,
    ) -> HookResult {
        self.push("agent_start");
        Ok(HookFlow::proceed())
    }

    async fn on_strategy_start(&self, _store: &FeatureStore, _strategy: &str) -> HookResult {
        self.push("strategy_start");
        Ok(HookFlow::proceed())
    }

    async fn on_before_node(
        &self,
        _store: &FeatureStore,
        node: &str,
        _context: &NodeContext,
        _input: &Value,
    ) -> HookResult {
        self.push(&format!("before_node({})", node));
        Ok(HookFlow::proceed())
    }

    async fn on_after_node(
        &self,
        _store: &FeatureStore,
        node: &str,
        _context: &NodeContext,
        _input: &Value,
        _output: &Value,
    ) -> HookResult {
        self.push(&format!("after_node({})", node));
        Ok(HookFlow::proceed())
    }

    async fn on_strategy_finish(
        &self,
        _store: &FeatureStore,
        _strategy: &str,
        _result: &Value,
    ) -> HookResult {
        self.push("strategy_finish");
        Ok(HookFlow::proceed())
    }

    async fn on_agent_finish(
        &self,
        _store: &FeatureStore,
        _strategy: &str,
        result: &RunOutcome,
    ) -> HookResult {
        match result {
            RunOutcome::Completed(_) => self.push("agent_finish"),
            RunOutcome::Cancelled => self.push("agent_finish(cancelled)"),
        }
        Ok(HookFlow::proceed())
    }

    async fn on_agent_error(
        &self,
        _store: &FeatureStore,
        _strategy: &str,
        _run_id: &str,
        error: &AgentError,
    ) -> HookResult {
        self.push(&format!("agent_error({})", error));
        Ok(HookFlow::proceed())
    }
}

/// **Scenario**: for every hook, feature A (installed first) fires
/// before feature B.
#[tokio::test]
async fn hooks_fire_in_installation_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let runner = runner();
    runner
        .install_feature(Arc::new(Tagged {
            label: "a",
            log: Arc::clone(&log),
        }))
        .unwrap();
    runner
        .install_feature(Arc::new(Tagged {
            label: "b",
            log: Arc::clone(&log),
        }))
        .unwrap();

    runner.run(json!("hi")).await.unwrap();

    let log = log.lock().unwrap();
    assert!(!log.is_empty());
    // Entries come in (a, b) pairs per hook.
    for pair in log.chunks(2) {
        let hook_a = pair[0].strip_prefix("a:").expect("a fires first");
        let hook_b = pair[1].strip_prefix("b:").expect("b fires second");
        assert_eq!(hook_a, hook_b, "same hook, adjacent: {:?}", pair);
    }
    // The run saw the full lifecycle.
    assert_eq!(log[0], "a:agent_start");
    assert!(log.iter().any(|e| e == "a:before_node(respond)"));
    assert!(log.last().unwrap().ends_with("agent_finish"));
}

/// Feature that aborts before a named node.
struct AbortAt {
    node: &'static str,
}

#[async_trait]
impl AgentFeature for AbortAt {
    fn storage_key(&self) -> &str {
        "abort-at"
    }

    async fn on_before_node(
        &self,
        _store: &FeatureStore,
        node: &str,
        _context: &NodeContext,
        _input: &Value,
    ) -> HookResult {
        if node == self.node {
            Ok(HookFlow::Abort(format!("refusing to run {}", node)))
        } else {
            Ok(HookFlow::proceed())
        }
    }
}

/// **Scenario**: an Abort verdict terminates the run with FeatureAborted
/// and the run status becomes Failed.
#[tokio::test]
async fn abort_terminates_run_as_failed() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let runner = runner();
    runner
        .install_feature(Arc::new(AbortAt { node: "respond" }))
        .unwrap();
    runner
        .install_feature(Arc::new(Tagged {
            label: "obs",
            log: Arc::clone(&log),
        }))
        .unwrap();

    let err = runner.run(json!("hi")).await.unwrap_err();
    match err {
        AgentError::FeatureAborted {
            feature_key,
            reason,
        } => {
            assert_eq!(feature_key, "abort-at");
            assert!(reason.contains("respond"));
        }
        other => panic!("expected FeatureAborted, got {:?}", other),
    }
    assert_eq!(runner.last_run().unwrap().status, RunStatus::Failed);
    let log = log.lock().unwrap();
    assert!(
        log.iter().any(|e| e.starts_with("obs:agent_error")),
        "on_agent_error reported the abort: {:?}",
        log
    );
}

/// Feature whose handler errors (non-fatally) on every before_node.
struct Flaky;

#[async_trait]
impl AgentFeature for Flaky {
    fn storage_key(&self) -> &str {
        "flaky"
    }

    async fn on_before_node(
        &self,
        _store: &FeatureStore,
        _node: &str,
        _context: &NodeContext,
        _input: &Value,
    ) -> HookResult {
        Err(AgentError::Checkpoint("instrumentation bug".into()))
    }
}

/// **Scenario**: non-fatal handler errors are reported through
/// on_agent_error and do not crash the run.
#[tokio::test]
async fn handler_errors_are_contained() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let runner = runner();
    runner.install_feature(Arc::new(Flaky)).unwrap();
    runner
        .install_feature(Arc::new(Tagged {
            label: "obs",
            log: Arc::clone(&log),
        }))
        .unwrap();

    runner.run(json!("hi")).await.unwrap();
    assert_eq!(runner.last_run().unwrap().status, RunStatus::Completed);
    let log = log.lock().unwrap();
    assert!(
        log.iter().any(|e| e.starts_with("obs:agent_error")),
        "handler error was reported: {:?}",
        log
    );
}

/// **Scenario**: runs on separate runners cannot observe each other's
/// feature storage.
#[tokio::test]
async fn feature_storage_is_scoped_per_runner() {
    struct Stamp(&'static str);

    #[async_trait]
    impl AgentFeature for Stamp {
        fn storage_key(&self) -> &str {
            "stamp"
        }

        async fn on_before_node(
            &self,
            store: &FeatureStore,
            _node: &str,
            _context: &NodeContext,
            _input: &Value,
        ) -> HookResult {
            let seen = store.get();
            assert!(
                seen.is_none() || seen.as_ref().and_then(|v| v.as_str()) == Some(self.0),
                "saw another runner's storage: {:?}",
                seen
            );
            store.set(json!(self.0));
            Ok(HookFlow::proceed())
        }
    }

    let first = runner();
    first.install_feature(Arc::new(Stamp("first"))).unwrap();
    let second = runner();
    second.install_feature(Arc::new(Stamp("second"))).unwrap();

    let (a, b) = tokio::join!(first.run(json!("hi")), second.run(json!("hi")));
    a.unwrap();
    b.unwrap();
}
