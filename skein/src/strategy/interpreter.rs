//! The strategy interpreter: walks a validated graph node by node.
//!
//! One `step` executes one node (or pushes a referenced subgraph): fire
//! `before_node`, run the node, fire `after_node`, then either unwind a
//! finished subgraph or take the first outgoing edge whose guard admits the
//! output, in declaration order. Nodes of one run never execute
//! concurrently; the driving loop lives in the runner, which checks
//! cancellation and persists position snapshots between steps.

use std::sync::Arc;

use serde_json::Value;

use crate::environment::Environment;
use crate::error::AgentError;
use crate::feature::{FeaturePipeline, NodeContext};
use crate::strategy::subgraph::Strategy;

/// Where the interpreter currently stands; the checkpointable coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    pub subgraph: String,
    pub node: String,
    pub input: Value,
}

/// Result of one interpreter step.
#[derive(Debug)]
pub enum StepOutcome {
    /// More nodes to run.
    Continue,
    /// The entry subgraph's finish node completed; the run is over.
    Finished(Value),
}

struct Frame {
    subgraph: usize,
    node: String,
    input: Option<Value>,
    /// Set while a referenced subgraph runs: (ref node name, its input).
    awaiting: Option<(String, Value)>,
}

/// Single-tasked-per-run graph walker.
pub struct Interpreter {
    strategy: Arc<Strategy>,
    run_id: String,
    stack: Vec<Frame>,
    iterations: usize,
    max_iterations: usize,
    max_subgraph_depth: usize,
}

impl Interpreter {
    /// Positions a fresh interpreter at the entry subgraph's start node.
    pub fn start(
        strategy: Arc<Strategy>,
        run_id: impl Into<String>,
        input: Value,
        max_iterations: usize,
        max_subgraph_depth: usize,
    ) -> Result<Self, AgentError> {
        let entry = strategy
            .subgraph_position(strategy.entry())
            .ok_or_else(|| AgentError::Checkpoint(format!(
                "entry subgraph {:?} missing from strategy",
                strategy.entry()
            )))?;
        let start = strategy.subgraph_at(entry).start_node().to_string();
        Ok(Self {
            strategy,
            run_id: run_id.into(),
            stack: vec![Frame {
                subgraph: entry,
                node: start,
                input: Some(input),
                awaiting: None,
            }],
            iterations: 0,
            max_iterations,
            max_subgraph_depth,
        })
    }

    /// Positions an interpreter at a checkpointed (subgraph, node, input).
    /// The snapshotted subgraph becomes the entry frame; its output is the
    /// run output.
    pub fn resume(
        strategy: Arc<Strategy>,
        run_id: impl Into<String>,
        subgraph: &str,
        node: &str,
        input: Value,
        max_iterations: usize,
        max_subgraph_depth: usize,
    ) -> Result<Self, AgentError> {
        let index = strategy.subgraph_position(subgraph).ok_or_else(|| {
            AgentError::Checkpoint(format!("checkpoint names unknown subgraph {:?}", subgraph))
        })?;
        if strategy.subgraph_at(index).node(node).is_none() {
            return Err(AgentError::Checkpoint(format!(
                "checkpoint names unknown node {:?} in subgraph {:?}",
                node, subgraph
            )));
        }
        Ok(Self {
            strategy,
            run_id: run_id.into(),
            stack: vec![Frame {
                subgraph: index,
                node: node.to_string(),
                input: Some(input),
                awaiting: None,
            }],
            iterations: 0,
            max_iterations,
            max_subgraph_depth,
        })
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Current coordinates, `None` once the stack unwound completely.
    pub fn position(&self) -> Option<Position> {
        let frame = self.stack.last()?;
        Some(Position {
            subgraph: self.strategy.subgraph_at(frame.subgraph).name().to_string(),
            node: frame.node.clone(),
            input: frame.input.clone().unwrap_or(Value::Null),
        })
    }

    /// Runs one node (or pushes a referenced subgraph).
    pub async fn step(
        &mut self,
        env: &Environment,
        pipeline: &FeaturePipeline,
    ) -> Result<StepOutcome, AgentError> {
        env.check_cancelled()?;
        let strategy = Arc::clone(&self.strategy);

        self.iterations += 1;
        if self.iterations > self.max_iterations {
            return Err(AgentError::IterationLimitExceeded(self.max_iterations));
        }

        let (subgraph_index, node_name, input) = {
            let frame = self.stack.last_mut().ok_or_else(|| {
                AgentError::Checkpoint("interpreter stepped past termination".into())
            })?;
            (
                frame.subgraph,
                frame.node.clone(),
                frame.input.take().unwrap_or(Value::Null),
            )
        };
        let subgraph = strategy.subgraph_at(subgraph_index);
        let node = Arc::clone(subgraph.node(&node_name).ok_or_else(|| {
            AgentError::Checkpoint(format!("node {:?} vanished from subgraph", node_name))
        })?);

        let context = NodeContext {
            run_id: self.run_id.clone(),
            strategy: strategy.name().to_string(),
            subgraph: subgraph.name().to_string(),
            iteration: self.iterations,
        };
        pipeline.before_node(&node_name, &context, &input).await?;

        if let Some(target) = node.subgraph_ref() {
            if self.stack.len() >= self.max_subgraph_depth {
                return Err(AgentError::SubgraphDepthExceeded(self.max_subgraph_depth));
            }
            let target_index = strategy.subgraph_position(target).ok_or_else(|| {
                AgentError::Checkpoint(format!("subgraph reference {:?} vanished", target))
            })?;
            let target_start = strategy.subgraph_at(target_index).start_node().to_string();
            if let Some(frame) = self.stack.last_mut() {
                frame.awaiting = Some((node_name, input.clone()));
            }
            self.stack.push(Frame {
                subgraph: target_index,
                node: target_start,
                input: Some(input),
                awaiting: None,
            });
            return Ok(StepOutcome::Continue);
        }

        let output = node.run(input.clone(), env).await?;
        pipeline
            .after_node(&node_name, &context, &input, &output)
            .await?;

        // Unwind finished subgraphs, then pick the next edge.
        let mut subgraph_index = subgraph_index;
        let mut node_name = node_name;
        let output = output;
        loop {
            let subgraph = strategy.subgraph_at(subgraph_index);
            if node_name == subgraph.finish_node() {
                self.stack.pop();
                match self.stack.last_mut() {
                    None => return Ok(StepOutcome::Finished(output)),
                    Some(frame) => {
                        let (ref_node, ref_input) =
                            frame.awaiting.take().ok_or_else(|| {
                                AgentError::Checkpoint(
                                    "subgraph finished without a pending reference".into(),
                                )
                            })?;
                        let caller_index = frame.subgraph;
                        let caller_context = NodeContext {
                            run_id: self.run_id.clone(),
                            strategy: strategy.name().to_string(),
                            subgraph: strategy.subgraph_at(caller_index).name().to_string(),
                            iteration: self.iterations,
                        };
                        pipeline
                            .after_node(&ref_node, &caller_context, &ref_input, &output)
                            .await?;
                        subgraph_index = caller_index;
                        node_name = ref_node;
                        continue;
                    }
                }
            }

            let chosen = subgraph.edges_from(&node_name).find(|e| e.admits(&output));
            return match chosen {
                None => Err(AgentError::NoEligibleEdge(node_name)),
                Some(edge) => {
                    let to = edge.to().to_string();
                    let next_input = edge.apply(output)?;
                    if let Some(frame) = self.stack.last_mut() {
                        frame.subgraph = subgraph_index;
                        frame.node = to;
                        frame.input = Some(next_input);
                    }
                    Ok(StepOutcome::Continue)
                }
            };
        }
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("strategy", &self.strategy.name())
            .field("depth", &self.stack.len())
            .field("iterations", &self.iterations)
            .finish()
    }
}
