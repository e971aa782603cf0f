//! Primitive nodes the engine provides: LLM calls (plain and streaming),
//! tool dispatch, history compression, finish, and subgraph references.
//!
//! All primitives speak the JSON currency. LLM nodes accept either a string
//! (appended as the next turn) or null / a message array (call without
//! appending, e.g. right after tool results landed in the prompt).

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

use crate::environment::Environment;
use crate::error::{AgentError, ToolError};
use crate::message::{Message, MessageBody};
use crate::prompt::{Params, Prompt, ToolChoice};
use crate::strategy::node::Node;

/// Guard helper: true when a JSON message array contains at least one tool
/// call. Typical routing after `call_llm`: tool calls go to dispatch,
/// anything else goes to finish.
pub fn has_tool_calls(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| items.iter().any(|m| m["role"] == "tool_call"))
}

fn append_turn(input: &Value, env: &Environment, as_system: bool) {
    if let Value::String(text) = input {
        let message = if as_system {
            Message::system(text.clone())
        } else {
            Message::user(text.clone())
        };
        env.append(message);
    }
}

/// Appends the input turn (when textual), calls the executor with the run's
/// tool set, and appends every response message. Output: the appended
/// messages as a JSON array.
pub struct CallLlmNode {
    name: String,
    system_turn: bool,
    tool_choice: Option<ToolChoice>,
}

impl CallLlmNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_turn: false,
            tool_choice: None,
        }
    }

    /// Append string inputs as a system turn instead of a user turn.
    pub fn system_turn(mut self) -> Self {
        self.system_turn = true;
        self
    }

    /// Overrides the run params' tool choice for this call site only.
    /// Typical use: `Required` on the opening call of a tool loop, `Auto`
    /// on the call that digests tool results.
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }
}

#[async_trait]
impl Node for CallLlmNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_type(&self) -> &str {
        "Messages"
    }

    async fn run(&self, input: Value, env: &Environment) -> Result<Value, AgentError> {
        append_turn(&input, env, self.system_turn);
        let mut prompt = env.prompt_snapshot();
        if let Some(tool_choice) = &self.tool_choice {
            let params = prompt.params().clone().with_tool_choice(tool_choice.clone());
            prompt = prompt.with_params(params);
        }
        let responses = env.llm_execute(&prompt, env.tool_descriptors()).await?;
        let mut appended = Vec::with_capacity(responses.len());
        for message in responses {
            appended.push(env.append(message));
        }
        serde_json::to_value(appended).map_err(|e| AgentError::NodeInput {
            node: self.name.clone(),
            message: e.to_string(),
        })
    }
}

/// Streaming variant: consumes the token stream, forwarding each fragment to
/// an optional sink in arrival order, then appends the reassembled text as
/// one assistant message. Output: the full text.
pub struct CallLlmStreamingNode {
    name: String,
    system_turn: bool,
    sink: Option<mpsc::Sender<String>>,
}

impl CallLlmStreamingNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_turn: false,
            sink: None,
        }
    }

    pub fn system_turn(mut self) -> Self {
        self.system_turn = true;
        self
    }

    /// Forwards every token to `sink` as it arrives.
    pub fn with_sink(mut self, sink: mpsc::Sender<String>) -> Self {
        self.sink = Some(sink);
        self
    }
}

#[async_trait]
impl Node for CallLlmStreamingNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_type(&self) -> &str {
        "String"
    }

    async fn run(&self, input: Value, env: &Environment) -> Result<Value, AgentError> {
        append_turn(&input, env, self.system_turn);
        let prompt = env.prompt_snapshot();
        let mut stream = env.llm_stream(&prompt).await?;
        let mut text = String::new();
        while let Some(token) = stream.next().await {
            let token = token?;
            if let Some(sink) = &self.sink {
                let _ = sink.send(token.clone()).await;
            }
            text.push_str(&token);
        }
        env.check_cancelled()?;
        env.append(Message::assistant(text.clone()));
        Ok(Value::String(text))
    }
}

struct PendingCall {
    id: String,
    tool: String,
    arguments: Value,
}

/// Resolves and executes tool calls, appending one `ToolResult` message per
/// call in call order. Input: a JSON message array (tool calls are
/// picked out of it) or null (trailing unanswered tool calls from the
/// prompt). Output: the appended `ToolResult` messages.
///
/// Calls run concurrently only when every invoked tool's descriptor is
/// marked `parallel_safe`; results are still collected and appended in
/// call order, not completion order.
pub struct DispatchToolCallsNode {
    name: String,
}

impl DispatchToolCallsNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn pending_calls(&self, input: &Value, env: &Environment) -> Result<Vec<PendingCall>, AgentError> {
        let messages: Vec<Message> = match input {
            Value::Null => env
                .prompt_snapshot()
                .unanswered_tool_calls()
                .into_iter()
                .cloned()
                .collect(),
            other => serde_json::from_value(other.clone()).map_err(|e| AgentError::NodeInput {
                node: self.name.clone(),
                message: format!("expected a message array: {}", e),
            })?,
        };
        Ok(messages
            .into_iter()
            .filter_map(|m| match m.body {
                MessageBody::ToolCall {
                    id,
                    name,
                    arguments,
                } => Some(PendingCall {
                    id,
                    tool: name,
                    arguments,
                }),
                _ => None,
            })
            .collect())
    }

    fn result_message(call: &PendingCall, outcome: Result<Value, ToolError>) -> Result<Message, AgentError> {
        match outcome {
            Ok(content) => Ok(Message::tool_result(&call.id, &call.tool, content)),
            Err(err @ ToolError::Aborted { .. }) => Err(err.into()),
            Err(err) => Ok(Message::tool_result(
                &call.id,
                &call.tool,
                json!({"error": err.to_string()}),
            )),
        }
    }
}

#[async_trait]
impl Node for DispatchToolCallsNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_type(&self) -> &str {
        "Messages"
    }

    async fn run(&self, input: Value, env: &Environment) -> Result<Value, AgentError> {
        let calls = self.pending_calls(&input, env)?;
        if calls.is_empty() {
            return Ok(json!([]));
        }

        let parallel = calls.len() > 1
            && calls.iter().all(|call| {
                env.tool_descriptors()
                    .iter()
                    .any(|d| d.name == call.tool && d.parallel_safe)
            });

        let mut appended = Vec::with_capacity(calls.len());
        if parallel {
            let outcomes = futures::future::join_all(
                calls
                    .iter()
                    .map(|call| env.call_tool(&call.tool, call.arguments.clone())),
            )
            .await;
            for (call, outcome) in calls.iter().zip(outcomes) {
                let message = Self::result_message(call, outcome)?;
                appended.push(env.append(message));
            }
        } else {
            for call in &calls {
                env.check_cancelled()?;
                let outcome = env.call_tool(&call.tool, call.arguments.clone()).await;
                let message = Self::result_message(call, outcome)?;
                appended.push(env.append(message));
            }
        }
        serde_json::to_value(appended).map_err(|e| AgentError::NodeInput {
            node: self.name.clone(),
            message: e.to_string(),
        })
    }
}

/// Callback that produces a summary of the given history prefix.
pub type SummarizeFn = Arc<
    dyn for<'a> Fn(&'a Environment, Vec<Message>) -> BoxFuture<'a, Result<String, AgentError>>
        + Send
        + Sync,
>;

/// Replaces everything but the most recent messages with one summary turn.
/// Input and output are null; the effect is on the run's prompt.
pub struct CompressHistoryNode {
    name: String,
    keep_last: usize,
    summarize: SummarizeFn,
}

impl CompressHistoryNode {
    pub fn new(name: impl Into<String>, keep_last: usize, summarize: SummarizeFn) -> Self {
        Self {
            name: name.into(),
            keep_last,
            summarize,
        }
    }

    /// Default summarizer: asks the run's own model for a compact summary of
    /// the prefix, with tools disabled.
    pub fn with_llm(name: impl Into<String>, keep_last: usize) -> Self {
        Self::new(name, keep_last, Arc::new(llm_summarize))
    }
}

fn llm_summarize<'a>(
    env: &'a Environment,
    prefix: Vec<Message>,
) -> BoxFuture<'a, Result<String, AgentError>> {
    Box::pin(async move {
        let params = Params::default().with_tool_choice(ToolChoice::None);
        let mut prompt = Prompt::new(params);
        prompt.push(Message::system(
            "Summarize the conversation below in a few sentences. \
             Keep facts, decisions, and open tasks.",
        ));
        for message in prefix {
            prompt.push(message);
        }
        prompt.push(Message::user("Produce the summary now."));
        let responses = env.llm_execute(&prompt, &[]).await?;
        Ok(responses
            .iter()
            .rev()
            .find_map(|m| match &m.body {
                MessageBody::Assistant { content, .. } => Some(content.clone()),
                _ => None,
            })
            .unwrap_or_default())
    })
}

#[async_trait]
impl Node for CompressHistoryNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _input: Value, env: &Environment) -> Result<Value, AgentError> {
        let history = env.history();
        if history.len() <= self.keep_last {
            return Ok(Value::Null);
        }
        let prefix = history[..history.len() - self.keep_last].to_vec();
        let summary = (self.summarize)(env, prefix).await?;
        env.compress_history(self.keep_last, Message::system(summary));
        Ok(Value::Null)
    }
}

/// Terminal identity node; marking it as the subgraph's finish node is what
/// ends the walk.
pub struct FinishNode {
    name: String,
}

impl FinishNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Node for FinishNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: Value, _env: &Environment) -> Result<Value, AgentError> {
        Ok(input)
    }
}

/// Node that stands for another subgraph: the interpreter pushes the target
/// with this node's input and resumes here with its output.
pub struct SubgraphNode {
    name: String,
    target: String,
}

impl SubgraphNode {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
        }
    }
}

#[async_trait]
impl Node for SubgraphNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn subgraph_ref(&self) -> Option<&str> {
        Some(&self.target)
    }

    async fn run(&self, _input: Value, _env: &Environment) -> Result<Value, AgentError> {
        // Never executed; the interpreter intercepts subgraph references.
        Err(AgentError::NodeInput {
            node: self.name.clone(),
            message: "subgraph reference executed directly".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_tool_calls_inspects_role_tags() {
        let with = serde_json::to_value(vec![
            Message::assistant("thinking"),
            Message::tool_call("c1", "t", json!({})),
        ])
        .unwrap();
        let without = serde_json::to_value(vec![Message::assistant("done")]).unwrap();
        assert!(has_tool_calls(&with));
        assert!(!has_tool_calls(&without));
        assert!(!has_tool_calls(&Value::Null));
    }
}
