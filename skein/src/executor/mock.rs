//! Scripted executor for tests and offline runs.
//!
//! Responses are queued up front and popped per call. The mock enforces the
//! same pre-I/O capability checks and tool-choice contract a real executor
//! must, so strategy and runner tests exercise the full path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LlmError;
use crate::executor::{
    Capability, Choice, LlModel, LlmExecutor, ModerationResult,
};
use crate::message::Message;
use crate::prompt::{Prompt, ToolChoice};
use crate::stream::TokenStream;
use crate::tool::ToolDescriptor;

/// Queue-scripted [`LlmExecutor`].
#[derive(Default)]
pub struct MockExecutor {
    replies: Mutex<VecDeque<Result<Vec<Message>, LlmError>>>,
    streams: Mutex<VecDeque<Vec<String>>>,
    choices: Mutex<VecDeque<Vec<Choice>>>,
    moderation: Mutex<ModerationResult>,
    embedding: Mutex<Vec<f64>>,
    execute_calls: AtomicUsize,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a plain assistant reply.
    pub fn push_text(&self, content: impl Into<String>) {
        self.push_messages(vec![Message::assistant(content)]);
    }

    /// Queues a reply consisting of one tool call.
    pub fn push_tool_call(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
    ) {
        self.push_messages(vec![Message::tool_call(id, name, arguments)]);
    }

    /// Queues an arbitrary message batch.
    pub fn push_messages(&self, messages: Vec<Message>) {
        self.replies
            .lock()
            .expect("mock replies lock")
            .push_back(Ok(messages));
    }

    /// Queues a failure for the next `execute` call.
    pub fn push_failure(&self, error: LlmError) {
        self.replies
            .lock()
            .expect("mock replies lock")
            .push_back(Err(error));
    }

    /// Queues a token script for the next `execute_streaming` call.
    pub fn push_stream<I, S>(&self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.streams
            .lock()
            .expect("mock streams lock")
            .push_back(tokens.into_iter().map(Into::into).collect());
    }

    /// Queues alternatives for the next `execute_multiple_choices` call.
    pub fn push_choices(&self, choices: Vec<Choice>) {
        self.choices
            .lock()
            .expect("mock choices lock")
            .push_back(choices);
    }

    pub fn set_moderation(&self, result: ModerationResult) {
        *self.moderation.lock().expect("mock moderation lock") = result;
    }

    pub fn set_embedding(&self, vector: Vec<f64>) {
        *self.embedding.lock().expect("mock embedding lock") = vector;
    }

    /// Total `execute` attempts observed, including retried ones.
    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    fn enforce_tool_choice(
        tool_choice: &ToolChoice,
        messages: Vec<Message>,
    ) -> Result<Vec<Message>, LlmError> {
        match tool_choice {
            ToolChoice::Auto => Ok(messages),
            ToolChoice::None => Ok(messages
                .into_iter()
                .filter(|m| !m.is_tool_call())
                .collect()),
            ToolChoice::Required => {
                if messages.iter().any(Message::is_tool_call) {
                    Ok(messages)
                } else {
                    Err(LlmError::ToolChoiceUnsatisfied(
                        "required a tool call, scripted reply has none".into(),
                    ))
                }
            }
            ToolChoice::Named(expected) => {
                let first_call = messages.iter().find_map(|m| match &m.body {
                    crate::message::MessageBody::ToolCall { name, .. } => Some(name.as_str()),
                    _ => None,
                });
                match first_call {
                    Some(name) if name == expected => Ok(messages),
                    Some(name) => Err(LlmError::ToolChoiceUnsatisfied(format!(
                        "first tool call is {:?}, expected {:?}",
                        name, expected
                    ))),
                    None => Ok(messages),
                }
            }
        }
    }
}

#[async_trait]
impl LlmExecutor for MockExecutor {
    async fn execute(
        &self,
        prompt: &Prompt,
        model: &LlModel,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<Message>, LlmError> {
        model.require(Capability::Completion)?;
        if !tools.is_empty() {
            model.require(Capability::Tools)?;
        }
        let tool_choice = prompt.params().tool_choice.clone();
        if matches!(tool_choice, ToolChoice::Required | ToolChoice::Named(_)) {
            model.require(Capability::ToolChoice)?;
        }
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .replies
            .lock()
            .expect("mock replies lock")
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Permanent("no scripted reply".into())));
        Self::enforce_tool_choice(&tool_choice, scripted?)
    }

    async fn execute_streaming(
        &self,
        _prompt: &Prompt,
        model: &LlModel,
    ) -> Result<TokenStream, LlmError> {
        model.require(Capability::Completion)?;
        let tokens = self
            .streams
            .lock()
            .expect("mock streams lock")
            .pop_front()
            .ok_or_else(|| LlmError::Permanent("no scripted stream".into()))?;
        Ok(TokenStream::from_tokens(tokens))
    }

    async fn execute_multiple_choices(
        &self,
        _prompt: &Prompt,
        model: &LlModel,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<Choice>, LlmError> {
        model.require(Capability::Completion)?;
        model.require(Capability::MultipleChoices)?;
        if !tools.is_empty() {
            model.require(Capability::Tools)?;
        }
        self.choices
            .lock()
            .expect("mock choices lock")
            .pop_front()
            .ok_or_else(|| LlmError::Permanent("no scripted choices".into()))
    }

    async fn moderate(
        &self,
        _prompt: &Prompt,
        model: &LlModel,
    ) -> Result<ModerationResult, LlmError> {
        model.require(Capability::Moderation)?;
        Ok(self.moderation.lock().expect("mock moderation lock").clone())
    }

    async fn embed(&self, _text: &str, model: &LlModel) -> Result<Vec<f64>, LlmError> {
        model.require(Capability::Embed)?;
        let vector = self.embedding.lock().expect("mock embedding lock").clone();
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(LlmError::Permanent("embedding contains non-finite values".into()));
        }
        Ok(vector)
    }
}

impl std::fmt::Debug for MockExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockExecutor")
            .field("execute_calls", &self.execute_calls())
            .finish()
    }
}
