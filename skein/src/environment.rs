//! The agent environment: the only way nodes and tools reach the runtime.
//!
//! The runner owns the environment for the duration of a run; the
//! environment owns the run's prompt and exposes read/write access through
//! methods only. LLM calls, tool dispatch, and stream consumption are the
//! suspension points: each checks cancellation and fires the feature
//! pipeline. Transient LLM errors are retried here, at the LLM boundary,
//! with exponential backoff.
//!
//! Tools MUST NOT hold an `Environment` reference beyond one invocation.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AgentError, ToolError};
use crate::executor::{LlModel, LlmExecutor, RetryPolicy};
use crate::feature::FeaturePipeline;
use crate::message::Message;
use crate::prompt::Prompt;
use crate::stream::TokenStream;
use crate::tool::{ToolDescriptor, ToolRegistry};

/// Run-scoped mediator handed to nodes and tools.
pub struct Environment {
    executor: Arc<dyn LlmExecutor>,
    model: LlModel,
    tools: Arc<ToolRegistry>,
    descriptors: Vec<ToolDescriptor>,
    prompt: Arc<Mutex<Prompt>>,
    pipeline: Arc<FeaturePipeline>,
    cancellation: CancellationToken,
    strategy: String,
    run_id: String,
    request_id: Mutex<String>,
    retry: RetryPolicy,
}

impl Environment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executor: Arc<dyn LlmExecutor>,
        model: LlModel,
        tools: ToolRegistry,
        pipeline: Arc<FeaturePipeline>,
        prompt: Arc<Mutex<Prompt>>,
        cancellation: CancellationToken,
        strategy: impl Into<String>,
        run_id: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        let descriptors = tools.descriptor_snapshot();
        Self {
            executor,
            model,
            tools: Arc::new(tools),
            descriptors,
            prompt,
            pipeline,
            cancellation,
            strategy: strategy.into(),
            run_id: run_id.into(),
            request_id: Mutex::new(Uuid::new_v4().to_string()),
            retry,
        }
    }

    pub fn model(&self) -> &LlModel {
        &self.model
    }

    /// Tool descriptors snapshotted at run start, in registry order.
    pub fn tool_descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    /// Correlation id of the active LLM or tool call.
    pub fn request_id(&self) -> String {
        self.request_id.lock().expect("request id lock").clone()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Cooperative cancellation probe; long-running tools poll this.
    pub fn cancellation_requested(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), AgentError> {
        if self.cancellation.is_cancelled() {
            Err(AgentError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn next_request_id(&self) -> String {
        let id = Uuid::new_v4().to_string();
        *self.request_id.lock().expect("request id lock") = id.clone();
        id
    }

    /// Appends to the run's prompt; the stored message's index is the
    /// previous maximum plus one.
    pub fn append(&self, message: Message) -> Message {
        let mut prompt = self.prompt.lock().expect("prompt lock");
        prompt.push(message).clone()
    }

    /// Read-only snapshot of the conversation history.
    pub fn history(&self) -> Vec<Message> {
        self.prompt.lock().expect("prompt lock").messages().to_vec()
    }

    /// Snapshot of the full prompt (messages and params).
    pub fn prompt_snapshot(&self) -> Prompt {
        self.prompt.lock().expect("prompt lock").clone()
    }

    /// Replaces everything but the last `keep_last` messages with a single
    /// summary turn; indexes are re-stamped from zero.
    pub fn compress_history(&self, keep_last: usize, summary: Message) {
        let mut prompt = self.prompt.lock().expect("prompt lock");
        let messages = prompt.messages();
        if messages.len() <= keep_last {
            return;
        }
        let tail = messages[messages.len() - keep_last..].to_vec();
        let mut rebuilt = Vec::with_capacity(keep_last + 1);
        rebuilt.push(summary);
        rebuilt.extend(tail);
        *prompt = Prompt::from_messages(rebuilt, prompt.params().clone());
    }

    /// One LLM request-reply through the pipeline, with transient errors
    /// retried per the configured policy. `on_before_llm` fires once before
    /// the first attempt; `on_after_llm` fires once, on success only.
    pub async fn llm_execute(
        &self,
        prompt: &Prompt,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<Message>, AgentError> {
        self.check_cancelled()?;
        self.next_request_id();
        let prompt = self
            .pipeline
            .before_llm(
                &self.strategy,
                &self.run_id,
                prompt.clone(),
                tools,
                &self.model,
            )
            .await?;
        let mut attempt = 1u32;
        loop {
            match self.executor.execute(&prompt, &self.model, tools).await {
                Ok(responses) => {
                    self.pipeline
                        .after_llm(
                            &self.strategy,
                            &self.run_id,
                            &prompt,
                            tools,
                            &self.model,
                            &responses,
                        )
                        .await?;
                    self.check_cancelled()?;
                    return Ok(responses);
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        run_id = %self.run_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %err,
                        "transient llm error; backing off"
                    );
                    tokio::select! {
                        _ = self.cancellation.cancelled() => return Err(AgentError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Opens a token stream for the prompt. The stream observes the run's
    /// cancellation token: cancelling ends it and closes the transport.
    pub async fn llm_stream(&self, prompt: &Prompt) -> Result<TokenStream, AgentError> {
        self.check_cancelled()?;
        self.next_request_id();
        let prompt = self
            .pipeline
            .before_llm(
                &self.strategy,
                &self.run_id,
                prompt.clone(),
                &[],
                &self.model,
            )
            .await?;
        let stream = self.executor.execute_streaming(&prompt, &self.model).await?;
        Ok(stream.with_cancellation(self.cancellation.clone()))
    }

    /// Dispatches one tool call through the pipeline: `on_tool_call` (args
    /// may be replaced), descriptor validation, execution, then
    /// `on_tool_result` or `on_tool_failure`. This is also how one tool may
    /// call another safely. The result is returned, not appended; appending
    /// `ToolResult` messages is the dispatch node's job.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        if self.cancellation_requested() {
            return Err(ToolError::Execution {
                tool: name.to_string(),
                message: "run cancelled".into(),
            });
        }
        let tool = Arc::clone(self.tools.get(name).ok_or_else(|| {
            ToolError::Unknown(name.to_string())
        })?);
        let descriptor = tool.descriptor().clone();
        let args = self.pipeline.tool_call(&descriptor, args).await?;
        if let Err(message) = descriptor.validate_args(&args) {
            self.pipeline
                .tool_validation_error(&descriptor, &args, &message)
                .await;
            return Err(ToolError::Validation {
                tool: name.to_string(),
                message,
            });
        }
        self.next_request_id();
        match tool.call(args.clone(), self).await {
            Ok(result) => {
                self.pipeline.tool_result(&descriptor, &args, &result).await;
                Ok(result)
            }
            Err(err) => {
                self.pipeline.tool_failure(&descriptor, &args, &err).await;
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("run_id", &self.run_id)
            .field("strategy", &self.strategy)
            .field("model", &self.model.model_id)
            .field("tools", &self.tools.names())
            .finish()
    }
}
