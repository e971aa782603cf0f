//! Installable features: keyed interceptors over every lifecycle event.
//!
//! A feature is installed on an agent with a unique storage key and observes
//! the run through the hook set below. Handlers run in installation order
//! and may be asynchronous. A handler returns [`HookFlow::Continue`]
//! (optionally replacing the event payload where the hook supports it) or
//! [`HookFlow::Abort`], which terminates the run with `FeatureAborted`.
//! Errors raised inside a handler are caught and reported through
//! `on_agent_error`; they only terminate the run when the error kind is
//! fatal.
//!
//! Features receive payloads by value or shared reference and never hold the
//! environment: there are no back-references from a feature to the runner.

mod logging;
mod pipeline;

pub use logging::LoggingFeature;
pub use pipeline::FeaturePipeline;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::{AgentError, ToolError};
use crate::executor::LlModel;
use crate::message::Message;
use crate::prompt::Prompt;
use crate::tool::ToolDescriptor;

/// Handler verdict. `Continue(Some(payload))` replaces the event payload on
/// hooks that support replacement; `Abort` terminates the run.
#[derive(Clone, Debug)]
pub enum HookFlow<T = ()> {
    Continue(Option<T>),
    Abort(String),
}

impl<T> HookFlow<T> {
    /// Plain continue, no payload replacement.
    pub fn proceed() -> Self {
        Self::Continue(None)
    }
}

/// Handler return type.
pub type HookResult<T = ()> = Result<HookFlow<T>, AgentError>;

/// Where a hook fired, for error reporting and correlation.
#[derive(Clone, Debug)]
pub struct NodeContext {
    pub run_id: String,
    pub strategy: String,
    pub subgraph: String,
    /// Iteration counter at the time the node fired.
    pub iteration: usize,
}

/// Terminal outcome delivered to `on_agent_finish`. Cancellation arrives as
/// a marker here; there is no separate cancellation hook.
#[derive(Clone, Debug)]
pub enum RunOutcome {
    Completed(Value),
    Cancelled,
}

/// Per-run storage slot scoped to one feature key.
///
/// The pipeline guarantees at most one feature instance per key per run;
/// concurrent runs use separate pipelines and cannot observe each other's
/// storage.
#[derive(Clone, Debug)]
pub struct FeatureStore {
    key: String,
    map: Arc<DashMap<String, Value>>,
}

impl FeatureStore {
    pub(crate) fn new(key: String, map: Arc<DashMap<String, Value>>) -> Self {
        Self { key, map }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self) -> Option<Value> {
        self.map.get(&self.key).map(|entry| entry.value().clone())
    }

    pub fn set(&self, value: Value) {
        self.map.insert(self.key.clone(), value);
    }

    pub fn clear(&self) {
        self.map.remove(&self.key);
    }

    /// Read-modify-write against the slot; missing slots start as `Null`.
    pub fn update(&self, f: impl FnOnce(Value) -> Value) {
        let current = self.get().unwrap_or(Value::Null);
        self.set(f(current));
    }
}

/// The exhaustive hook set. Every method defaults to a no-op continue;
/// implement only what the feature observes.
#[async_trait]
pub trait AgentFeature: Send + Sync {
    /// Unique storage key identifying this feature within a pipeline.
    fn storage_key(&self) -> &str;

    async fn on_agent_start(
        &self,
        _store: &FeatureStore,
        _strategy: &str,
        _agent_id: &str,
    ) -> HookResult {
        Ok(HookFlow::proceed())
    }

    async fn on_agent_finish(
        &self,
        _store: &FeatureStore,
        _strategy: &str,
        _result: &RunOutcome,
    ) -> HookResult {
        Ok(HookFlow::proceed())
    }

    async fn on_agent_error(
        &self,
        _store: &FeatureStore,
        _strategy: &str,
        _run_id: &str,
        _error: &AgentError,
    ) -> HookResult {
        Ok(HookFlow::proceed())
    }

    async fn on_strategy_start(&self, _store: &FeatureStore, _strategy: &str) -> HookResult {
        Ok(HookFlow::proceed())
    }

    async fn on_strategy_finish(
        &self,
        _store: &FeatureStore,
        _strategy: &str,
        _result: &Value,
    ) -> HookResult {
        Ok(HookFlow::proceed())
    }

    async fn on_before_node(
        &self,
        _store: &FeatureStore,
        _node: &str,
        _context: &NodeContext,
        _input: &Value,
    ) -> HookResult {
        Ok(HookFlow::proceed())
    }

    async fn on_after_node(
        &self,
        _store: &FeatureStore,
        _node: &str,
        _context: &NodeContext,
        _input: &Value,
        _output: &Value,
    ) -> HookResult {
        Ok(HookFlow::proceed())
    }

    /// May replace the outgoing prompt via `Continue(Some(prompt))`.
    async fn on_before_llm(
        &self,
        _store: &FeatureStore,
        _prompt: &Prompt,
        _tools: &[ToolDescriptor],
        _model: &LlModel,
        _run_id: &str,
    ) -> HookResult<Prompt> {
        Ok(HookFlow::proceed())
    }

    async fn on_after_llm(
        &self,
        _store: &FeatureStore,
        _prompt: &Prompt,
        _tools: &[ToolDescriptor],
        _model: &LlModel,
        _responses: &[Message],
        _run_id: &str,
    ) -> HookResult {
        Ok(HookFlow::proceed())
    }

    /// May replace the tool arguments via `Continue(Some(args))`.
    async fn on_tool_call(
        &self,
        _store: &FeatureStore,
        _tool: &ToolDescriptor,
        _args: &Value,
    ) -> HookResult<Value> {
        Ok(HookFlow::proceed())
    }

    async fn on_tool_validation_error(
        &self,
        _store: &FeatureStore,
        _tool: &ToolDescriptor,
        _args: &Value,
        _message: &str,
    ) -> HookResult {
        Ok(HookFlow::proceed())
    }

    async fn on_tool_failure(
        &self,
        _store: &FeatureStore,
        _tool: &ToolDescriptor,
        _args: &Value,
        _error: &ToolError,
    ) -> HookResult {
        Ok(HookFlow::proceed())
    }

    async fn on_tool_result(
        &self,
        _store: &FeatureStore,
        _tool: &ToolDescriptor,
        _args: &Value,
        _result: &Value,
    ) -> HookResult {
        Ok(HookFlow::proceed())
    }
}
