//! Provider-agnostic LLM executor contract.
//!
//! The single surface the core depends on. Concrete vendor clients (HTTP
//! transports, wire shapes) live outside this crate and implement
//! [`LlmExecutor`]; the in-crate [`MockExecutor`] scripts responses for tests
//! and examples.
//!
//! Message ids, tool-call ids, and finish reasons are opaque strings assigned
//! by the executor; the core treats them as identifiers only.

mod capability;
mod mock;
mod retry;

pub use capability::{Capability, LlModel};
pub use mock::MockExecutor;
pub use retry::RetryPolicy;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::message::Message;
use crate::prompt::Prompt;
use crate::stream::TokenStream;
use crate::tool::ToolDescriptor;

/// One alternative returned by `execute_multiple_choices`; index order is
/// the order supplied by the executor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub messages: Vec<Message>,
}

/// Moderation category flagged by a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationCategory {
    Hate,
    Harassment,
    SelfHarm,
    Sexual,
    Violence,
    Illicit,
}

/// Verdict of a moderation call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationResult {
    pub is_harmful: bool,
    #[serde(default)]
    pub categories: HashSet<ModerationCategory>,
}

/// Provider-agnostic executor contract.
///
/// Implementations MUST enforce model capabilities before any network I/O
/// and honor the tool-choice contract:
///
/// - `tool_choice = Required` on a tools-capable model: return at least one
///   `ToolCall` message or fail with `ToolChoiceUnsatisfied`.
/// - `tool_choice = None`: never emit a `ToolCall`.
/// - `tool_choice = Named(n)`: the first tool call, if any, is for `n`.
#[async_trait]
pub trait LlmExecutor: Send + Sync {
    /// Request-reply returning 1..N messages.
    async fn execute(
        &self,
        prompt: &Prompt,
        model: &LlModel,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<Message>, LlmError>;

    /// Text fragments in arrival order. The stream is finite and
    /// non-restartable; dropping the consumer closes the transport.
    async fn execute_streaming(
        &self,
        prompt: &Prompt,
        model: &LlModel,
    ) -> Result<TokenStream, LlmError>;

    /// One [`Choice`] per alternative, index order preserved. Fails with
    /// `CapabilityUnsupported(MultipleChoices)` on models lacking the
    /// capability.
    async fn execute_multiple_choices(
        &self,
        prompt: &Prompt,
        model: &LlModel,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<Choice>, LlmError>;

    /// Harmfulness verdict for the prompt.
    async fn moderate(
        &self,
        prompt: &Prompt,
        model: &LlModel,
    ) -> Result<ModerationResult, LlmError>;

    /// Embedding vector; length is model-defined, values must be finite.
    async fn embed(&self, text: &str, model: &LlModel) -> Result<Vec<f64>, LlmError>;
}
