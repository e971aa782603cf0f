//! Unified failure model across the LLM, tool, and graph layers.
//!
//! Four enums, one per layer: [`ConfigurationError`] (build-time defects,
//! never emitted mid-run), [`LlmError`] (executor failures with a
//! transient/permanent split), [`ToolError`] (tool lookup, validation, and
//! execution failures), and [`AgentError`] (everything a run can terminate
//! with). `Cancelled` is a terminal, non-error status but travels on the
//! error channel so propagation stays uniform.

use thiserror::Error;

use crate::executor::Capability;

/// Build-time defect in a strategy graph, tool registry, or feature set.
///
/// Detected by `StrategyBuilder::build`, `ToolRegistry::register`/`merge`,
/// and `FeaturePipeline::install`; never emitted mid-run.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A tool with this name is already registered (no silent override).
    #[error("duplicate tool name: {0}")]
    DuplicateToolName(String),

    /// Tool descriptor is malformed (duplicate parameter names, dangling
    /// required property names).
    #[error("invalid descriptor for tool {tool}: {message}")]
    InvalidDescriptor { tool: String, message: String },

    /// A strategy was built with no subgraphs at all.
    #[error("strategy {0} has no subgraphs")]
    EmptyStrategy(String),

    /// Two subgraphs share a name within one strategy.
    #[error("duplicate subgraph name: {0}")]
    DuplicateSubgraph(String),

    /// Two nodes share a name within one subgraph.
    #[error("duplicate node name in subgraph {subgraph}: {node}")]
    DuplicateNodeName { subgraph: String, node: String },

    /// An edge, start/finish marker, or subgraph-ref names a node that was
    /// never added.
    #[error("unknown node in subgraph {subgraph}: {node}")]
    UnknownNode { subgraph: String, node: String },

    /// The strategy entry or a subgraph-ref node names a missing subgraph.
    #[error("unknown subgraph: {0}")]
    UnknownSubgraph(String),

    /// A subgraph has no nodes, or start/finish were never set.
    #[error("subgraph {subgraph} is incomplete: {message}")]
    IncompleteSubgraph { subgraph: String, message: String },

    /// No edge path connects the start node to the finish node.
    #[error("no path from {start} to finish node {finish} in subgraph {subgraph}")]
    NoPathToFinish {
        subgraph: String,
        start: String,
        finish: String,
    },

    /// A node is unreachable from the start node.
    #[error("orphan node in subgraph {subgraph}: {node}")]
    OrphanNode { subgraph: String, node: String },

    /// An edge's transformed output type does not match the target node's
    /// declared input type.
    #[error(
        "type mismatch on edge {from} -> {to} in subgraph {subgraph}: \
         edge produces {produced}, node expects {expected}"
    )]
    TypeMismatch {
        subgraph: String,
        from: String,
        to: String,
        produced: String,
        expected: String,
    },

    /// A feature with this storage key is already installed.
    #[error("duplicate feature key: {0}")]
    DuplicateFeatureKey(String),
}

/// Failure from the LLM executor boundary.
///
/// `Timeout`, `RateLimited`, and `Transient5xx` are retried with exponential
/// backoff at the environment's LLM boundary; everything else surfaces
/// immediately.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The target model lacks a capability the call requires. Checked before
    /// any network I/O.
    #[error("capability unsupported: {0}")]
    CapabilityUnsupported(Capability),

    /// The request timed out (transient).
    #[error("request timed out")]
    Timeout,

    /// The provider rate-limited the request (transient).
    #[error("rate limited")]
    RateLimited,

    /// A 5xx-class server error (transient).
    #[error("transient server error: status {0}")]
    Transient5xx(u16),

    /// Non-retriable provider failure.
    #[error("permanent llm error: {0}")]
    Permanent(String),

    /// `tool_choice = Required` or `Named(..)` could not be satisfied.
    #[error("tool choice unsatisfied: {0}")]
    ToolChoiceUnsatisfied(String),

    /// The streaming transport closed before a normal end marker.
    #[error("stream transport closed: {0}")]
    StreamClosed(String),
}

impl LlmError {
    /// Whether the environment's retry policy applies to this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::Transient5xx(_)
        )
    }
}

/// Failure from tool lookup, validation, or execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool with this name in the registry snapshot.
    #[error("unknown tool: {0}")]
    Unknown(String),

    /// Arguments failed validation against the tool descriptor.
    #[error("invalid arguments for tool {tool}: {message}")]
    Validation { tool: String, message: String },

    /// The tool itself failed.
    #[error("tool {tool} failed: {message}")]
    Execution { tool: String, message: String },

    /// A feature aborted the run from a tool hook. Converted to
    /// [`AgentError::FeatureAborted`] when it crosses back into the
    /// interpreter; never appended to the prompt as a tool result.
    #[error("feature {feature_key} aborted during tool call: {reason}")]
    Aborted { feature_key: String, reason: String },
}

/// Terminal failure of a run.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    #[error("tool: {0}")]
    Tool(ToolError),

    /// No outgoing edge guard matched the node's output.
    #[error("no eligible edge from node: {0}")]
    NoEligibleEdge(String),

    /// The interpreter executed more nodes than `max_iterations` allows.
    #[error("iteration limit exceeded: {0}")]
    IterationLimitExceeded(usize),

    /// Subgraph recursion exceeded `max_subgraph_depth`.
    #[error("subgraph depth exceeded: {0}")]
    SubgraphDepthExceeded(usize),

    /// A feature handler returned `Abort`.
    #[error("feature {feature_key} aborted the run: {reason}")]
    FeatureAborted { feature_key: String, reason: String },

    /// Cooperative cancellation was observed. Terminal but not a failure;
    /// the run status becomes `Cancelled`.
    #[error("run cancelled")]
    Cancelled,

    /// The runner is already driving a run.
    #[error("runner busy")]
    RunnerBusy,

    /// Checkpoint capture or restore failed.
    #[error("checkpoint: {0}")]
    Checkpoint(String),

    /// A node could not decode its input value.
    #[error("node {node} rejected input: {message}")]
    NodeInput { node: String, message: String },
}

impl AgentError {
    /// Errors that terminate the run even when raised inside a feature
    /// handler. Everything else raised by a handler is reported through
    /// `on_agent_error` and swallowed.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Llm(LlmError::CapabilityUnsupported(_)) => true,
            Self::NoEligibleEdge(_)
            | Self::IterationLimitExceeded(_)
            | Self::SubgraphDepthExceeded(_)
            | Self::FeatureAborted { .. }
            | Self::Cancelled => true,
            _ => false,
        }
    }

    /// True for the cancellation marker.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<ToolError> for AgentError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Aborted {
                feature_key,
                reason,
            } => Self::FeatureAborted {
                feature_key,
                reason,
            },
            other => Self::Tool(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: transient classification covers exactly the retried kinds.
    #[test]
    fn llm_error_transient_split() {
        assert!(LlmError::Timeout.is_transient());
        assert!(LlmError::RateLimited.is_transient());
        assert!(LlmError::Transient5xx(503).is_transient());
        assert!(!LlmError::Permanent("bad request".into()).is_transient());
        assert!(!LlmError::ToolChoiceUnsatisfied("calculator".into()).is_transient());
        assert!(!LlmError::CapabilityUnsupported(Capability::Tools).is_transient());
    }

    /// **Scenario**: a tool-layer abort becomes FeatureAborted at the agent layer.
    #[test]
    fn tool_abort_converts_to_feature_aborted() {
        let err: AgentError = ToolError::Aborted {
            feature_key: "guard".into(),
            reason: "blocked".into(),
        }
        .into();
        match err {
            AgentError::FeatureAborted {
                feature_key,
                reason,
            } => {
                assert_eq!(feature_key, "guard");
                assert_eq!(reason, "blocked");
            }
            other => panic!("expected FeatureAborted, got {:?}", other),
        }
    }

    /// **Scenario**: Display of interpreter-level errors names the offending node.
    #[test]
    fn agent_error_display_mentions_node() {
        let s = AgentError::NoEligibleEdge("route".into()).to_string();
        assert!(s.contains("route"), "Display should name the node: {}", s);
        let s = AgentError::IterationLimitExceeded(50).to_string();
        assert!(s.contains("50"), "Display should show the limit: {}", s);
    }

    #[test]
    fn fatality_covers_interpreter_and_capability_errors() {
        assert!(AgentError::Cancelled.is_fatal());
        assert!(AgentError::NoEligibleEdge("n".into()).is_fatal());
        assert!(AgentError::Llm(LlmError::CapabilityUnsupported(Capability::Moderation)).is_fatal());
        assert!(!AgentError::Llm(LlmError::RateLimited).is_fatal());
        assert!(!AgentError::Tool(ToolError::Unknown("t".into())).is_fatal());
    }
}
