//! Strategy builder: add nodes and edges, then `build()` to validate.
//!
//! Validation enforces the structural invariants once, at build time:
//! unique names, a start and a finish per subgraph, reachability of the
//! finish node, no orphan nodes, edge endpoints that exist, declared-type
//! compatibility along every edge, and resolvable subgraph references.
//! A strategy that builds successfully never fails structurally mid-run.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::ConfigurationError;
use crate::strategy::edge::Edge;
use crate::strategy::node::{Node, ANY_TYPE};
use crate::strategy::subgraph::{Strategy, Subgraph};

fn types_compatible(produced: &str, expected: &str) -> bool {
    produced == ANY_TYPE || expected == ANY_TYPE || produced == expected
}

/// Builder for one subgraph.
pub struct SubgraphBuilder {
    name: String,
    input_type: String,
    output_type: String,
    nodes: Vec<Arc<dyn Node>>,
    edges: Vec<Edge>,
    start: Option<String>,
    finish: Option<String>,
}

impl SubgraphBuilder {
    /// Subgraph with wildcard input/output types.
    pub fn new(name: impl Into<String>) -> Self {
        Self::typed(name, ANY_TYPE, ANY_TYPE)
    }

    /// Subgraph with declared input/output types.
    pub fn typed(
        name: impl Into<String>,
        input_type: impl Into<String>,
        output_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            input_type: input_type.into(),
            output_type: output_type.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            start: None,
            finish: None,
        }
    }

    /// Adds a node; names must be unique within the subgraph.
    pub fn add_node(&mut self, node: Arc<dyn Node>) -> &mut Self {
        self.nodes.push(node);
        self
    }

    /// Adds an edge; edges keep declaration order, which is the evaluation
    /// order at runtime.
    pub fn add_edge(&mut self, edge: Edge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    /// Marks the single start node.
    pub fn start(&mut self, name: impl Into<String>) -> &mut Self {
        self.start = Some(name.into());
        self
    }

    /// Marks the finish node; reaching it terminates the subgraph.
    pub fn finish(&mut self, name: impl Into<String>) -> &mut Self {
        self.finish = Some(name.into());
        self
    }

    fn build(self, all_subgraphs: &HashSet<String>) -> Result<Subgraph, ConfigurationError> {
        let name = self.name;
        if self.nodes.is_empty() {
            return Err(ConfigurationError::IncompleteSubgraph {
                subgraph: name,
                message: "no nodes".into(),
            });
        }

        let mut node_index: HashMap<String, usize> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if node_index.insert(node.name().to_string(), i).is_some() {
                return Err(ConfigurationError::DuplicateNodeName {
                    subgraph: name,
                    node: node.name().to_string(),
                });
            }
        }

        let start = self.start.ok_or_else(|| ConfigurationError::IncompleteSubgraph {
            subgraph: name.clone(),
            message: "start node not set".into(),
        })?;
        let finish = self.finish.ok_or_else(|| ConfigurationError::IncompleteSubgraph {
            subgraph: name.clone(),
            message: "finish node not set".into(),
        })?;
        for marker in [&start, &finish] {
            if !node_index.contains_key(marker) {
                return Err(ConfigurationError::UnknownNode {
                    subgraph: name,
                    node: marker.clone(),
                });
            }
        }

        for edge in &self.edges {
            for endpoint in [edge.from(), edge.to()] {
                if !node_index.contains_key(endpoint) {
                    return Err(ConfigurationError::UnknownNode {
                        subgraph: name,
                        node: endpoint.to_string(),
                    });
                }
            }
        }

        for node in &self.nodes {
            if let Some(target) = node.subgraph_ref() {
                if !all_subgraphs.contains(target) {
                    return Err(ConfigurationError::UnknownSubgraph(target.to_string()));
                }
            }
        }

        // Reachability from the start node, guards treated as traversable.
        let mut reachable: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        reachable.insert(start.clone());
        queue.push_back(start.clone());
        while let Some(current) = queue.pop_front() {
            for edge in self.edges.iter().filter(|e| e.from() == current) {
                if reachable.insert(edge.to().to_string()) {
                    queue.push_back(edge.to().to_string());
                }
            }
        }
        if !reachable.contains(finish.as_str()) {
            return Err(ConfigurationError::NoPathToFinish {
                subgraph: name,
                start,
                finish,
            });
        }
        for node in &self.nodes {
            if !reachable.contains(node.name()) {
                return Err(ConfigurationError::OrphanNode {
                    subgraph: name,
                    node: node.name().to_string(),
                });
            }
        }

        // Declared-type compatibility along every edge.
        for edge in &self.edges {
            let source = &self.nodes[node_index[edge.from()]];
            let target = &self.nodes[node_index[edge.to()]];
            let produced = edge.produced_type(source.output_type());
            let expected = target.input_type();
            if !types_compatible(produced, expected) {
                return Err(ConfigurationError::TypeMismatch {
                    subgraph: name,
                    from: edge.from().to_string(),
                    to: edge.to().to_string(),
                    produced: produced.to_string(),
                    expected: expected.to_string(),
                });
            }
        }
        let start_input = self.nodes[node_index[start.as_str()]].input_type();
        if !types_compatible(&self.input_type, start_input) {
            return Err(ConfigurationError::TypeMismatch {
                subgraph: name.clone(),
                from: "(subgraph input)".into(),
                to: start,
                produced: self.input_type,
                expected: start_input.to_string(),
            });
        }
        let finish_output = self.nodes[node_index[finish.as_str()]].output_type();
        if !types_compatible(finish_output, &self.output_type) {
            return Err(ConfigurationError::TypeMismatch {
                subgraph: name.clone(),
                from: finish,
                to: "(subgraph output)".into(),
                produced: finish_output.to_string(),
                expected: self.output_type,
            });
        }

        Ok(Subgraph {
            name,
            input_type: self.input_type,
            output_type: self.output_type,
            nodes: self.nodes,
            node_index,
            edges: self.edges,
            start_node: start,
            finish_node: finish,
        })
    }
}

impl std::fmt::Debug for SubgraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubgraphBuilder")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .finish()
    }
}

/// Builder for a whole strategy.
pub struct StrategyBuilder {
    name: String,
    subgraphs: Vec<SubgraphBuilder>,
    entry: Option<String>,
}

impl StrategyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subgraphs: Vec::new(),
            entry: None,
        }
    }

    pub fn subgraph(&mut self, subgraph: SubgraphBuilder) -> &mut Self {
        self.subgraphs.push(subgraph);
        self
    }

    /// Entry subgraph; defaults to the first one added.
    pub fn entry(&mut self, name: impl Into<String>) -> &mut Self {
        self.entry = Some(name.into());
        self
    }

    /// Validates the invariants and produces an immutable [`Strategy`].
    pub fn build(self) -> Result<Strategy, ConfigurationError> {
        if self.subgraphs.is_empty() {
            return Err(ConfigurationError::EmptyStrategy(self.name));
        }
        let mut names: HashSet<String> = HashSet::new();
        for sub in &self.subgraphs {
            if !names.insert(sub.name.clone()) {
                return Err(ConfigurationError::DuplicateSubgraph(sub.name.clone()));
            }
        }
        let entry = self
            .entry
            .unwrap_or_else(|| self.subgraphs[0].name.clone());
        if !names.contains(&entry) {
            return Err(ConfigurationError::UnknownSubgraph(entry));
        }

        let mut subgraphs = Vec::with_capacity(self.subgraphs.len());
        let mut subgraph_index = HashMap::new();
        for (i, builder) in self.subgraphs.into_iter().enumerate() {
            let built = builder.build(&names)?;
            subgraph_index.insert(built.name.clone(), i);
            subgraphs.push(built);
        }

        Ok(Strategy {
            name: self.name,
            subgraphs,
            subgraph_index,
            entry,
        })
    }
}

impl std::fmt::Debug for StrategyBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyBuilder")
            .field("name", &self.name)
            .field("subgraphs", &self.subgraphs.len())
            .finish()
    }
}
