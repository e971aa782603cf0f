//! The pipeline that dispatches lifecycle events to installed features.
//!
//! Handlers fire in installation order on every hook. Abort verdicts map to
//! `FeatureAborted`; non-fatal handler errors are reported through
//! `on_agent_error` and swallowed so an instrumentation bug cannot kill a
//! run.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{AgentError, ConfigurationError, ToolError};
use crate::executor::LlModel;
use crate::feature::{AgentFeature, FeatureStore, HookFlow, NodeContext, RunOutcome};
use crate::message::Message;
use crate::prompt::Prompt;
use crate::tool::ToolDescriptor;

/// Ordered feature set plus the per-run storage map.
#[derive(Default)]
pub struct FeaturePipeline {
    features: RwLock<Vec<Arc<dyn AgentFeature>>>,
    storage: Arc<DashMap<String, Value>>,
}

macro_rules! dispatch_simple {
    ($self:ident, $strategy:expr, $run_id:expr, |$f:ident, $store:ident| $call:expr) => {{
        for $f in $self.snapshot() {
            let $store = $self.store_for($f.storage_key());
            match $call.await {
                Ok(HookFlow::Continue(_)) => {}
                Ok(HookFlow::Abort(reason)) => {
                    return Err(AgentError::FeatureAborted {
                        feature_key: $f.storage_key().to_string(),
                        reason,
                    })
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => $self.report_handler_error($strategy, $run_id, &e).await,
            }
        }
        Ok(())
    }};
}

impl FeaturePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a feature. At most one instance per storage key.
    pub fn install(&self, feature: Arc<dyn AgentFeature>) -> Result<(), ConfigurationError> {
        let mut features = self.features.write().expect("pipeline features lock");
        if features
            .iter()
            .any(|f| f.storage_key() == feature.storage_key())
        {
            return Err(ConfigurationError::DuplicateFeatureKey(
                feature.storage_key().to_string(),
            ));
        }
        features.push(feature);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.features.read().expect("pipeline features lock").is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn AgentFeature>> {
        self.features
            .read()
            .expect("pipeline features lock")
            .clone()
    }

    fn store_for(&self, key: &str) -> FeatureStore {
        FeatureStore::new(key.to_string(), Arc::clone(&self.storage))
    }

    /// Storage snapshot for checkpoints, sorted by feature key.
    pub fn storage_snapshot(&self) -> Map<String, Value> {
        let mut keys: Vec<String> = self.storage.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        let mut map = Map::new();
        for key in keys {
            if let Some(entry) = self.storage.get(&key) {
                map.insert(key, entry.value().clone());
            }
        }
        map
    }

    /// Drops all per-run storage; called at run start.
    pub fn reset_storage(&self) {
        self.storage.clear();
    }

    /// Seeds storage from a checkpoint.
    pub fn restore_storage(&self, snapshot: &Map<String, Value>) {
        self.storage.clear();
        for (key, value) in snapshot {
            self.storage.insert(key.clone(), value.clone());
        }
    }

    async fn report_handler_error(&self, strategy: &str, run_id: &str, error: &AgentError) {
        warn!(strategy, run_id, %error, "feature handler failed; reporting via on_agent_error");
        self.agent_error(strategy, run_id, error).await;
    }

    pub async fn agent_start(&self, strategy: &str, agent_id: &str) -> Result<(), AgentError> {
        dispatch_simple!(self, strategy, "", |f, store| f.on_agent_start(
            &store, strategy, agent_id
        ))
    }

    /// Terminal result hook; fires on completion and cancellation. Abort
    /// verdicts are meaningless once the run is over and are ignored.
    pub async fn agent_finish(&self, strategy: &str, result: &RunOutcome) {
        for f in self.snapshot() {
            let store = self.store_for(f.storage_key());
            if let Err(e) = f.on_agent_finish(&store, strategy, result).await {
                warn!(strategy, %e, "on_agent_finish handler failed");
            }
        }
    }

    /// Error report hook. Handler failures here are only logged.
    pub async fn agent_error(&self, strategy: &str, run_id: &str, error: &AgentError) {
        for f in self.snapshot() {
            let store = self.store_for(f.storage_key());
            if let Err(e) = f.on_agent_error(&store, strategy, run_id, error).await {
                warn!(strategy, run_id, %e, "on_agent_error handler failed");
            }
        }
    }

    pub async fn strategy_start(&self, strategy: &str, run_id: &str) -> Result<(), AgentError> {
        dispatch_simple!(self, strategy, run_id, |f, store| f.on_strategy_start(
            &store, strategy
        ))
    }

    pub async fn strategy_finish(
        &self,
        strategy: &str,
        run_id: &str,
        result: &Value,
    ) -> Result<(), AgentError> {
        dispatch_simple!(self, strategy, run_id, |f, store| f.on_strategy_finish(
            &store, strategy, result
        ))
    }

    pub async fn before_node(
        &self,
        node: &str,
        context: &NodeContext,
        input: &Value,
    ) -> Result<(), AgentError> {
        dispatch_simple!(self, &context.strategy, &context.run_id, |f, store| f
            .on_before_node(&store, node, context, input))
    }

    pub async fn after_node(
        &self,
        node: &str,
        context: &NodeContext,
        input: &Value,
        output: &Value,
    ) -> Result<(), AgentError> {
        dispatch_simple!(self, &context.strategy, &context.run_id, |f, store| f
            .on_after_node(&store, node, context, input, output))
    }

    /// Runs `on_before_llm` handlers; the returned prompt carries any
    /// replacement a handler made.
    pub async fn before_llm(
        &self,
        strategy: &str,
        run_id: &str,
        mut prompt: Prompt,
        tools: &[ToolDescriptor],
        model: &LlModel,
    ) -> Result<Prompt, AgentError> {
        for f in self.snapshot() {
            let store = self.store_for(f.storage_key());
            match f.on_before_llm(&store, &prompt, tools, model, run_id).await {
                Ok(HookFlow::Continue(None)) => {}
                Ok(HookFlow::Continue(Some(next))) => prompt = next,
                Ok(HookFlow::Abort(reason)) => {
                    return Err(AgentError::FeatureAborted {
                        feature_key: f.storage_key().to_string(),
                        reason,
                    })
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => self.report_handler_error(strategy, run_id, &e).await,
            }
        }
        Ok(prompt)
    }

    pub async fn after_llm(
        &self,
        strategy: &str,
        run_id: &str,
        prompt: &Prompt,
        tools: &[ToolDescriptor],
        model: &LlModel,
        responses: &[Message],
    ) -> Result<(), AgentError> {
        dispatch_simple!(self, strategy, run_id, |f, store| f.on_after_llm(
            &store, prompt, tools, model, responses, run_id
        ))
    }

    /// Runs `on_tool_call` handlers; the returned args carry any replacement.
    /// Aborts surface as [`ToolError::Aborted`] so the tool layer's result
    /// type stays uniform.
    pub async fn tool_call(
        &self,
        tool: &ToolDescriptor,
        mut args: Value,
    ) -> Result<Value, ToolError> {
        for f in self.snapshot() {
            let store = self.store_for(f.storage_key());
            match f.on_tool_call(&store, tool, &args).await {
                Ok(HookFlow::Continue(None)) => {}
                Ok(HookFlow::Continue(Some(next))) => args = next,
                Ok(HookFlow::Abort(reason)) => {
                    return Err(ToolError::Aborted {
                        feature_key: f.storage_key().to_string(),
                        reason,
                    })
                }
                Err(e) if e.is_fatal() => {
                    return Err(ToolError::Execution {
                        tool: tool.name.clone(),
                        message: e.to_string(),
                    })
                }
                Err(e) => {
                    warn!(tool = %tool.name, %e, "on_tool_call handler failed");
                }
            }
        }
        Ok(args)
    }

    pub async fn tool_validation_error(&self, tool: &ToolDescriptor, args: &Value, message: &str) {
        for f in self.snapshot() {
            let store = self.store_for(f.storage_key());
            if let Err(e) = f
                .on_tool_validation_error(&store, tool, args, message)
                .await
            {
                warn!(tool = %tool.name, %e, "on_tool_validation_error handler failed");
            }
        }
    }

    pub async fn tool_failure(&self, tool: &ToolDescriptor, args: &Value, error: &ToolError) {
        for f in self.snapshot() {
            let store = self.store_for(f.storage_key());
            if let Err(e) = f.on_tool_failure(&store, tool, args, error).await {
                warn!(tool = %tool.name, %e, "on_tool_failure handler failed");
            }
        }
    }

    pub async fn tool_result(&self, tool: &ToolDescriptor, args: &Value, result: &Value) {
        for f in self.snapshot() {
            let store = self.store_for(f.storage_key());
            if let Err(e) = f.on_tool_result(&store, tool, args, result).await {
                warn!(tool = %tool.name, %e, "on_tool_result handler failed");
            }
        }
    }
}

impl std::fmt::Debug for FeaturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .snapshot()
            .iter()
            .map(|feature| feature.storage_key().to_string())
            .collect();
        f.debug_struct("FeaturePipeline")
            .field("features", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct KeyOnly(&'static str);

    #[async_trait]
    impl AgentFeature for KeyOnly {
        fn storage_key(&self) -> &str {
            self.0
        }
    }

    /// **Scenario**: at most one feature instance per storage key.
    #[test]
    fn install_rejects_duplicate_key() {
        let pipeline = FeaturePipeline::new();
        pipeline.install(Arc::new(KeyOnly("tracing"))).unwrap();
        match pipeline.install(Arc::new(KeyOnly("tracing"))) {
            Err(ConfigurationError::DuplicateFeatureKey(key)) => assert_eq!(key, "tracing"),
            other => panic!("expected DuplicateFeatureKey, got {:?}", other),
        }
    }

    struct ArgRewriter;

    #[async_trait]
    impl AgentFeature for ArgRewriter {
        fn storage_key(&self) -> &str {
            "rewriter"
        }

        async fn on_tool_call(
            &self,
            _store: &FeatureStore,
            _tool: &ToolDescriptor,
            args: &Value,
        ) -> crate::feature::HookResult<Value> {
            let mut next = args.clone();
            next["rewritten"] = json!(true);
            Ok(HookFlow::Continue(Some(next)))
        }
    }

    /// **Scenario**: Continue(payload) replaces the event payload.
    #[tokio::test]
    async fn tool_call_hook_replaces_args() {
        let pipeline = FeaturePipeline::new();
        pipeline.install(Arc::new(ArgRewriter)).unwrap();
        let descriptor = ToolDescriptor::new("t", "tool");
        let out = pipeline.tool_call(&descriptor, json!({"x": 1})).await.unwrap();
        assert_eq!(out, json!({"x": 1, "rewritten": true}));
    }

    struct Aborter;

    #[async_trait]
    impl AgentFeature for Aborter {
        fn storage_key(&self) -> &str {
            "aborter"
        }

        async fn on_agent_start(
            &self,
            _store: &FeatureStore,
            _strategy: &str,
            _agent_id: &str,
        ) -> crate::feature::HookResult {
            Ok(HookFlow::Abort("policy violation".into()))
        }
    }

    /// **Scenario**: Abort terminates with FeatureAborted carrying the key.
    #[tokio::test]
    async fn abort_maps_to_feature_aborted() {
        let pipeline = FeaturePipeline::new();
        pipeline.install(Arc::new(Aborter)).unwrap();
        match pipeline.agent_start("s", "a").await {
            Err(AgentError::FeatureAborted {
                feature_key,
                reason,
            }) => {
                assert_eq!(feature_key, "aborter");
                assert_eq!(reason, "policy violation");
            }
            other => panic!("expected FeatureAborted, got {:?}", other),
        }
    }

    /// **Scenario**: storage snapshot/restore round-trips sorted by key.
    #[test]
    fn storage_snapshot_round_trip() {
        let pipeline = FeaturePipeline::new();
        pipeline.install(Arc::new(KeyOnly("b"))).unwrap();
        pipeline.install(Arc::new(KeyOnly("a"))).unwrap();
        pipeline.store_for("b").set(json!({"n": 2}));
        pipeline.store_for("a").set(json!({"n": 1}));
        let snapshot = pipeline.storage_snapshot();
        assert_eq!(
            snapshot.keys().collect::<Vec<_>>(),
            vec!["a", "b"],
            "deterministic order"
        );
        pipeline.reset_storage();
        assert!(pipeline.storage_snapshot().is_empty());
        pipeline.restore_storage(&snapshot);
        assert_eq!(pipeline.store_for("a").get(), Some(json!({"n": 1})));
    }
}
