//! Logging feature: turns pipeline hooks into `tracing` events.
//!
//! Event targets follow one consistent hierarchy: agent, then run, then
//! node, then the LLM or tool call under it, with `gen_ai.*`-style field
//! names for the model and tool identifiers.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::{AgentError, ToolError};
use crate::executor::LlModel;
use crate::feature::{AgentFeature, FeatureStore, HookFlow, HookResult, NodeContext, RunOutcome};
use crate::message::Message;
use crate::prompt::Prompt;
use crate::tool::ToolDescriptor;

/// Feature that logs every lifecycle event.
#[derive(Debug, Default)]
pub struct LoggingFeature;

impl LoggingFeature {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentFeature for LoggingFeature {
    fn storage_key(&self) -> &str {
        "logging"
    }

    async fn on_agent_start(
        &self,
        _store: &FeatureStore,
        strategy: &str,
        agent_id: &str,
    ) -> HookResult {
        info!(target: "skein::agent", strategy, agent_id, "agent start");
        Ok(HookFlow::proceed())
    }

    async fn on_agent_finish(
        &self,
        _store: &FeatureStore,
        strategy: &str,
        result: &RunOutcome,
    ) -> HookResult {
        match result {
            RunOutcome::Completed(_) => info!(target: "skein::agent", strategy, "agent finish"),
            RunOutcome::Cancelled => info!(target: "skein::agent", strategy, "agent cancelled"),
        }
        Ok(HookFlow::proceed())
    }

    async fn on_agent_error(
        &self,
        _store: &FeatureStore,
        strategy: &str,
        run_id: &str,
        err: &AgentError,
    ) -> HookResult {
        error!(target: "skein::agent", strategy, run_id, %err, "agent error");
        Ok(HookFlow::proceed())
    }

    async fn on_strategy_start(&self, _store: &FeatureStore, strategy: &str) -> HookResult {
        debug!(target: "skein::run", strategy, "strategy start");
        Ok(HookFlow::proceed())
    }

    async fn on_strategy_finish(
        &self,
        _store: &FeatureStore,
        strategy: &str,
        _result: &Value,
    ) -> HookResult {
        debug!(target: "skein::run", strategy, "strategy finish");
        Ok(HookFlow::proceed())
    }

    async fn on_before_node(
        &self,
        _store: &FeatureStore,
        node: &str,
        context: &NodeContext,
        _input: &Value,
    ) -> HookResult {
        debug!(
            target: "skein::node",
            node,
            subgraph = %context.subgraph,
            iteration = context.iteration,
            "node start"
        );
        Ok(HookFlow::proceed())
    }

    async fn on_after_node(
        &self,
        _store: &FeatureStore,
        node: &str,
        context: &NodeContext,
        _input: &Value,
        _output: &Value,
    ) -> HookResult {
        debug!(
            target: "skein::node",
            node,
            subgraph = %context.subgraph,
            iteration = context.iteration,
            "node complete"
        );
        Ok(HookFlow::proceed())
    }

    async fn on_before_llm(
        &self,
        _store: &FeatureStore,
        prompt: &Prompt,
        tools: &[ToolDescriptor],
        model: &LlModel,
        run_id: &str,
    ) -> HookResult<Prompt> {
        debug!(
            target: "skein::llm",
            run_id,
            "gen_ai.provider" = %model.provider_id,
            "gen_ai.model" = %model.model_id,
            messages = prompt.len(),
            tools = tools.len(),
            "llm call"
        );
        Ok(HookFlow::proceed())
    }

    async fn on_after_llm(
        &self,
        _store: &FeatureStore,
        _prompt: &Prompt,
        _tools: &[ToolDescriptor],
        model: &LlModel,
        responses: &[Message],
        run_id: &str,
    ) -> HookResult {
        debug!(
            target: "skein::llm",
            run_id,
            "gen_ai.model" = %model.model_id,
            responses = responses.len(),
            "llm response"
        );
        Ok(HookFlow::proceed())
    }

    async fn on_tool_call(
        &self,
        _store: &FeatureStore,
        tool: &ToolDescriptor,
        _args: &Value,
    ) -> HookResult<Value> {
        debug!(target: "skein::tool", tool_name = %tool.name, "tool call");
        Ok(HookFlow::proceed())
    }

    async fn on_tool_validation_error(
        &self,
        _store: &FeatureStore,
        tool: &ToolDescriptor,
        _args: &Value,
        message: &str,
    ) -> HookResult {
        error!(target: "skein::tool", reason = message, "gen_ai.tool.name" = %tool.name, "tool arguments rejected");
        Ok(HookFlow::proceed())
    }

    async fn on_tool_failure(
        &self,
        _store: &FeatureStore,
        tool: &ToolDescriptor,
        _args: &Value,
        err: &ToolError,
    ) -> HookResult {
        error!(target: "skein::tool", %err, "gen_ai.tool.name" = %tool.name, "tool failed");
        Ok(HookFlow::proceed())
    }

    async fn on_tool_result(
        &self,
        _store: &FeatureStore,
        tool: &ToolDescriptor,
        _args: &Value,
        _result: &Value,
    ) -> HookResult {
        debug!(target: "skein::tool", tool_name = %tool.name, "tool result");
        Ok(HookFlow::proceed())
    }
}
