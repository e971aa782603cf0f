//! Strategy visualization: Graphviz DOT and plain-text renderings.

use crate::strategy::subgraph::Strategy;

/// DOT digraph with one cluster per subgraph. Guarded edges are dashed;
/// start and finish nodes are marked.
pub fn generate_dot(strategy: &Strategy) -> String {
    let mut out = String::new();
    out.push_str(&format!("digraph \"{}\" {{\n", strategy.name()));
    out.push_str("  rankdir=LR;\n");
    for (i, subgraph) in strategy.subgraphs().enumerate() {
        out.push_str(&format!("  subgraph cluster_{} {{\n", i));
        out.push_str(&format!("    label=\"{}\";\n", subgraph.name()));
        for node in subgraph.nodes() {
            let shape = if node.name() == subgraph.start_node() {
                "circle"
            } else if node.name() == subgraph.finish_node() {
                "doublecircle"
            } else {
                "box"
            };
            out.push_str(&format!(
                "    \"{}::{}\" [label=\"{}\", shape={}];\n",
                subgraph.name(),
                node.name(),
                node.name(),
                shape
            ));
        }
        for edge in subgraph.edges() {
            let style = if edge.is_guarded() { " [style=dashed]" } else { "" };
            out.push_str(&format!(
                "    \"{}::{}\" -> \"{}::{}\"{};\n",
                subgraph.name(),
                edge.from(),
                subgraph.name(),
                edge.to(),
                style
            ));
        }
        out.push_str("  }\n");
    }
    out.push_str("}\n");
    out
}

/// Indented text listing of subgraphs, nodes, and edges.
pub fn generate_text(strategy: &Strategy) -> String {
    let mut out = String::new();
    out.push_str(&format!("strategy {} (entry: {})\n", strategy.name(), strategy.entry()));
    for subgraph in strategy.subgraphs() {
        out.push_str(&format!(
            "  subgraph {} [{} -> {}]\n",
            subgraph.name(),
            subgraph.start_node(),
            subgraph.finish_node()
        ));
        for node in subgraph.nodes() {
            out.push_str(&format!("    node {}\n", node.name()));
        }
        for edge in subgraph.edges() {
            let guard = if edge.is_guarded() { " (guarded)" } else { "" };
            out.push_str(&format!("    edge {} -> {}{}\n", edge.from(), edge.to(), guard));
        }
    }
    out
}
