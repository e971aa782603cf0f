//! Strategy graphs: typed nodes, guarded edges, subgraphs, and the
//! interpreter that walks them.
//!
//! Build with [`StrategyBuilder`] / [`SubgraphBuilder`]; invariants are
//! validated once at build time. The [`Interpreter`] runs one node per step:
//! hooks fire around every node, outgoing edges are evaluated in declaration
//! order, and subgraph references push a bounded frame stack.

mod builder;
mod edge;
mod interpreter;
mod node;
mod nodes;
mod subgraph;
mod viz;

pub use builder::{StrategyBuilder, SubgraphBuilder};
pub use edge::Edge;
pub use interpreter::{Interpreter, Position, StepOutcome};
pub use node::{FnNode, Node, NodeFn, NodeFuture, ANY_TYPE};
pub use nodes::{
    has_tool_calls, CallLlmNode, CallLlmStreamingNode, CompressHistoryNode,
    DispatchToolCallsNode, FinishNode, SubgraphNode, SummarizeFn,
};
pub use subgraph::{Strategy, Subgraph};
pub use viz::{generate_dot, generate_text};
