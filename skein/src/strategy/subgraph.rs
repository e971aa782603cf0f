//! Validated strategy graphs: named subgraphs of nodes and edges.
//!
//! `Subgraph` and `Strategy` are only constructed through
//! [`StrategyBuilder`](crate::strategy::StrategyBuilder), which enforces the
//! structural invariants; once built they are immutable and shared behind an
//! `Arc` by runners.

use std::collections::HashMap;
use std::sync::Arc;

use crate::strategy::edge::Edge;
use crate::strategy::node::Node;

/// Named, reusable strategy fragment with its own start and finish.
pub struct Subgraph {
    pub(crate) name: String,
    pub(crate) input_type: String,
    pub(crate) output_type: String,
    pub(crate) nodes: Vec<Arc<dyn Node>>,
    pub(crate) node_index: HashMap<String, usize>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) start_node: String,
    pub(crate) finish_node: String,
}

impl Subgraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_type(&self) -> &str {
        &self.input_type
    }

    pub fn output_type(&self) -> &str {
        &self.output_type
    }

    pub fn start_node(&self) -> &str {
        &self.start_node
    }

    pub fn finish_node(&self) -> &str {
        &self.finish_node
    }

    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node>> {
        self.node_index.get(name).map(|i| &self.nodes[*i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<dyn Node>> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Outgoing edges of a node, in declaration order.
    pub fn edges_from<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.from() == name)
    }
}

impl std::fmt::Debug for Subgraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let node_names: Vec<&str> = self.nodes.iter().map(|n| n.name()).collect();
        f.debug_struct("Subgraph")
            .field("name", &self.name)
            .field("nodes", &node_names)
            .field("edges", &self.edges.len())
            .field("start", &self.start_node)
            .field("finish", &self.finish_node)
            .finish()
    }
}

/// A validated, typed graph of nodes and edges defining an agent's behavior.
pub struct Strategy {
    pub(crate) name: String,
    pub(crate) subgraphs: Vec<Subgraph>,
    pub(crate) subgraph_index: HashMap<String, usize>,
    pub(crate) entry: String,
}

impl Strategy {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the entry subgraph.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn subgraph(&self, name: &str) -> Option<&Subgraph> {
        self.subgraph_index.get(name).map(|i| &self.subgraphs[*i])
    }

    pub(crate) fn subgraph_at(&self, index: usize) -> &Subgraph {
        &self.subgraphs[index]
    }

    pub(crate) fn subgraph_position(&self, name: &str) -> Option<usize> {
        self.subgraph_index.get(name).copied()
    }

    pub fn subgraphs(&self) -> impl Iterator<Item = &Subgraph> {
        self.subgraphs.iter()
    }
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.subgraphs.iter().map(|s| s.name()).collect();
        f.debug_struct("Strategy")
            .field("name", &self.name)
            .field("subgraphs", &names)
            .field("entry", &self.entry)
            .finish()
    }
}
