//! Graph node: one typed unit of work executed by the interpreter.
//!
//! Nodes exchange JSON values so any position in the graph can be
//! checkpointed; declared input/output type names are checked at build time
//! ([`ANY_TYPE`] is compatible with everything). Typed ergonomics come back
//! through [`FnNode::typed`], which wraps a serde-typed closure over the
//! JSON currency.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::environment::Environment;
use crate::error::AgentError;

/// Wildcard type name: compatible with any declared type.
pub const ANY_TYPE: &str = "any";

/// One step in a subgraph: input value in, output value out, with the
/// environment as the only runtime access.
#[async_trait]
pub trait Node: Send + Sync {
    /// Node name, unique within its subgraph.
    fn name(&self) -> &str;

    /// Declared input type name, checked against incoming edges at build time.
    fn input_type(&self) -> &str {
        ANY_TYPE
    }

    /// Declared output type name, checked against outgoing edges at build time.
    fn output_type(&self) -> &str {
        ANY_TYPE
    }

    /// When set, the interpreter does not run this node: it pushes the named
    /// subgraph with this node's input and resumes here with its output.
    fn subgraph_ref(&self) -> Option<&str> {
        None
    }

    /// Executes the node.
    async fn run(&self, input: Value, env: &Environment) -> Result<Value, AgentError>;
}

/// Future returned by a node callback, borrowing the environment.
pub type NodeFuture<'a> = BoxFuture<'a, Result<Value, AgentError>>;

/// Boxed node callback. Closures coerce here when written at the call site
/// (annotate the parameters: `Box::new(|input: Value, env: &Environment| ...)`);
/// fn items always fit.
pub type NodeFn =
    Box<dyn for<'a> Fn(Value, &'a Environment) -> NodeFuture<'a> + Send + Sync>;

/// Closure-backed node.
pub struct FnNode {
    name: String,
    input_type: String,
    output_type: String,
    run: NodeFn,
}

impl FnNode {
    /// Raw value-in/value-out node with wildcard types.
    pub fn value(name: impl Into<String>, run: NodeFn) -> Self {
        Self {
            name: name.into(),
            input_type: ANY_TYPE.to_string(),
            output_type: ANY_TYPE.to_string(),
            run,
        }
    }

    /// Serde-typed node: the input value is decoded to `I`, the callback's
    /// `O` is encoded back to JSON. Decoding failures surface as
    /// `NodeInput` errors naming this node. Pass a fn item (or a boxed
    /// closure via [`FnNode::value`]) for the callback.
    pub fn typed<I, O, F>(
        name: impl Into<String>,
        input_type: impl Into<String>,
        output_type: impl Into<String>,
        run: F,
    ) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: for<'a> Fn(I, &'a Environment) -> BoxFuture<'a, Result<O, AgentError>>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        let node_name = name.clone();
        let run = Arc::new(run);
        let boxed: NodeFn = Box::new(move |value, env| {
            let run = Arc::clone(&run);
            let node = node_name.clone();
            Box::pin(async move {
                let input: I =
                    serde_json::from_value(value).map_err(|e| AgentError::NodeInput {
                        node: node.clone(),
                        message: e.to_string(),
                    })?;
                let output = (*run)(input, env).await?;
                serde_json::to_value(output).map_err(|e| AgentError::NodeInput {
                    node,
                    message: format!("output not serializable: {}", e),
                })
            })
        });
        Self {
            name,
            input_type: input_type.into(),
            output_type: output_type.into(),
            run: boxed,
        }
    }

    /// Synchronous transform with no environment access.
    pub fn map<I, O, F>(
        name: impl Into<String>,
        input_type: impl Into<String>,
        output_type: impl Into<String>,
        run: F,
    ) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I) -> Result<O, AgentError> + Send + Sync + 'static,
    {
        let name = name.into();
        let node_name = name.clone();
        let run = Arc::new(run);
        let boxed: NodeFn = Box::new(move |value, _env| {
            let run = Arc::clone(&run);
            let node = node_name.clone();
            Box::pin(async move {
                let input: I =
                    serde_json::from_value(value).map_err(|e| AgentError::NodeInput {
                        node: node.clone(),
                        message: e.to_string(),
                    })?;
                let output = (*run)(input)?;
                serde_json::to_value(output).map_err(|e| AgentError::NodeInput {
                    node,
                    message: format!("output not serializable: {}", e),
                })
            })
        });
        Self {
            name,
            input_type: input_type.into(),
            output_type: output_type.into(),
            run: boxed,
        }
    }
}

#[async_trait]
impl Node for FnNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_type(&self) -> &str {
        &self.input_type
    }

    fn output_type(&self) -> &str {
        &self.output_type
    }

    async fn run(&self, input: Value, env: &Environment) -> Result<Value, AgentError> {
        (self.run)(input, env).await
    }
}

impl std::fmt::Debug for FnNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnNode")
            .field("name", &self.name)
            .field("input_type", &self.input_type)
            .field("output_type", &self.output_type)
            .finish()
    }
}
