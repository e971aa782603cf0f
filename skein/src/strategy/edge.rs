//! Guarded, transforming transitions between nodes.
//!
//! After a node produces its output, the interpreter evaluates that node's
//! outgoing edges in declaration order and takes the first whose guard
//! accepts the output. Declaration order is part of the strategy's contract;
//! the builder and interpreter never reorder edges.

use std::sync::Arc;

use serde_json::Value;

use crate::error::AgentError;
use crate::strategy::node::ANY_TYPE;

type Guard = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
type Transform = Arc<dyn Fn(Value) -> Result<Value, AgentError> + Send + Sync>;

/// Edge from one node to another, with an optional guard over the source
/// output and an optional transform producing the target input.
#[derive(Clone)]
pub struct Edge {
    pub(crate) from: String,
    pub(crate) to: String,
    guard: Option<Guard>,
    transform: Option<Transform>,
    transformed_type: Option<String>,
}

impl Edge {
    /// Unconditional identity edge.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            guard: None,
            transform: None,
            transformed_type: None,
        }
    }

    /// Adds a guard; the edge is taken only when it returns true.
    pub fn when(mut self, guard: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Adds a transform with an undeclared output type (`any`).
    pub fn map(
        self,
        transform: impl Fn(Value) -> Result<Value, AgentError> + Send + Sync + 'static,
    ) -> Self {
        self.map_to(ANY_TYPE, transform)
    }

    /// Adds a transform declaring the type it produces, so the builder can
    /// check it against the target node's input type.
    pub fn map_to(
        mut self,
        produced_type: impl Into<String>,
        transform: impl Fn(Value) -> Result<Value, AgentError> + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self.transformed_type = Some(produced_type.into());
        self
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn is_guarded(&self) -> bool {
        self.guard.is_some()
    }

    /// Whether this edge's guard accepts the source output.
    pub(crate) fn admits(&self, output: &Value) -> bool {
        match &self.guard {
            Some(guard) => guard(output),
            None => true,
        }
    }

    /// Applies the transform (identity when none).
    pub(crate) fn apply(&self, output: Value) -> Result<Value, AgentError> {
        match &self.transform {
            Some(transform) => transform(output),
            None => Ok(output),
        }
    }

    /// Type this edge feeds into its target: the transform's declared type
    /// when transforming, else the source node's output type.
    pub(crate) fn produced_type<'a>(&'a self, source_output_type: &'a str) -> &'a str {
        match &self.transformed_type {
            Some(t) => t.as_str(),
            None => source_output_type,
        }
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("guarded", &self.guard.is_some())
            .field("transformed", &self.transform.is_some())
            .finish()
    }
}
