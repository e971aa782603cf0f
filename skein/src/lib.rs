//! # Skein
//!
//! A runtime for AI agents whose behavior is a **typed directed graph of
//! execution nodes** driving a conversation with LLM providers, interleaved
//! with tool invocations. Build a [`Strategy`] from subgraphs of nodes and
//! guarded edges, bind it to an executor and a tool registry through an
//! [`AgentRunner`], and drive runs to a terminal status with every
//! lifecycle event observable through the feature pipeline.
//!
//! ## Design principles
//!
//! - **Validated graphs**: [`StrategyBuilder`] checks names, reachability,
//!   and declared-type compatibility once; a strategy that builds never
//!   fails structurally mid-run.
//! - **One node at a time**: the interpreter is single-tasked per run, so
//!   the prompt history invariant (`messages[i].index == i`) holds without
//!   locks. Parallelism is opt-in per tool via `parallel_safe`.
//! - **Everything is observable**: agent, strategy, node, LLM, and tool
//!   events flow through the [`FeaturePipeline`] in installation order;
//!   handlers may replace payloads or abort the run.
//! - **Checkpoint anywhere**: node inputs and outputs are JSON values, so a
//!   run snapshots to a portable [`Checkpoint`] at any node boundary.
//!
//! ## Main modules
//!
//! - [`message`] / [`prompt`]: immutable conversation model and request
//!   params ([`Message`], [`Attachment`], [`Prompt`], [`ToolChoice`]).
//! - [`tool`]: descriptors, JSON Schema emission, and the
//!   insertion-ordered [`ToolRegistry`].
//! - [`executor`]: the provider-agnostic [`LlmExecutor`] contract,
//!   [`Capability`] enforcement, [`RetryPolicy`], and the scripted
//!   [`MockExecutor`].
//! - [`strategy`]: [`StrategyBuilder`], primitive nodes ([`CallLlmNode`],
//!   [`DispatchToolCallsNode`], ...), and the [`Interpreter`].
//! - [`feature`]: the [`AgentFeature`] hook set and [`FeaturePipeline`].
//! - [`runner`]: [`AgentRunner`], [`AgentConfig`], and [`Run`] records.
//! - [`checkpoint`]: the snapshot wire shape and the storage contract.
//! - [`stream`]: [`TokenStream`], the markdown event parser, and the
//!   structured [`SectionDecoder`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use skein::{
//!     AgentConfig, AgentRunner, CallLlmNode, Edge, FinishNode, LlModel,
//!     MockExecutor, StrategyBuilder, SubgraphBuilder,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = Arc::new(MockExecutor::new());
//! executor.push_text("hello back");
//!
//! let mut chat = SubgraphBuilder::new("main");
//! chat.add_node(Arc::new(CallLlmNode::new("respond")))
//!     .add_node(Arc::new(FinishNode::new("done")))
//!     .add_edge(Edge::new("respond", "done"))
//!     .start("respond")
//!     .finish("done");
//! let mut strategy = StrategyBuilder::new("chat");
//! strategy.subgraph(chat);
//!
//! let runner = AgentRunner::new(AgentConfig::new(
//!     executor,
//!     LlModel::full("mock", "scripted"),
//!     Arc::new(strategy.build()?),
//! ));
//! let output = runner.run(json!("hello")).await?;
//! println!("{output}");
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod environment;
pub mod error;
pub mod executor;
pub mod feature;
pub mod message;
pub mod prompt;
pub mod runner;
pub mod strategy;
pub mod stream;
pub mod tool;

pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStorage, InMemoryCheckpointStorage,
};
pub use environment::Environment;
pub use error::{AgentError, ConfigurationError, LlmError, ToolError};
pub use executor::{
    Capability, Choice, LlModel, LlmExecutor, MockExecutor, ModerationCategory,
    ModerationResult, RetryPolicy,
};
pub use feature::{
    AgentFeature, FeaturePipeline, FeatureStore, HookFlow, HookResult, LoggingFeature,
    NodeContext, RunOutcome,
};
pub use message::{
    Attachment, AttachmentContent, AttachmentKind, Message, MessageBody, ResponseMetadata,
    TokenUsage,
};
pub use prompt::{Params, Prompt, ReasoningEffort, ToolChoice};
pub use runner::{AgentConfig, AgentRunner, Run, RunStatus};
pub use strategy::{
    generate_dot, generate_text, has_tool_calls, CallLlmNode, CallLlmStreamingNode,
    CompressHistoryNode, DispatchToolCallsNode, Edge, FinishNode, FnNode, Interpreter, Node,
    NodeFn, NodeFuture, Position, StepOutcome, Strategy, StrategyBuilder, Subgraph,
    SubgraphBuilder, SubgraphNode, SummarizeFn, ANY_TYPE,
};
pub use stream::{
    MarkdownHandler, MarkdownParser, Section, SectionDecoder, TokenSender, TokenStream,
};
pub use tool::{
    registry_schema, tool_schema, FnTool, ParamDescriptor, Tool, ToolDescriptor, ToolFn,
    ToolFuture, ToolParameterType, ToolRegistry,
};

/// When running `cargo test -p skein`, initializes tracing from `RUST_LOG`
/// so unit tests in `src/**` can print logs with `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
