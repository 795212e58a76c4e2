//! Declarative graph data structures
//!
//! This module defines the building blocks a tabular workflow spec parses into:
//!
//! - [`Node`]: one named step, bound to an agent type, with input/output state
//!   fields and outgoing edges
//! - [`EdgeLabel`]: the recognized edge kinds (`default`, `success`, `failure`,
//!   `func`)
//! - [`GraphSpec`]: an insertion-ordered collection of named graphs, each a
//!   sequence of nodes
//!
//! Nodes are created by the spec parser and are read-only afterwards; the
//! bundle analyzer and the assembler both consume them without mutation.
//!
//! # Structure
//!
//! ```text
//! GraphSpec
//! ├── "pipeline"            (graph name, declaration order preserved)
//! │   ├── Node "fetch"      default → "transform"
//! │   ├── Node "transform"  success → "store", failure → "report"
//! │   ├── Node "store"
//! │   └── Node "report"
//! └── "cleanup"
//!     └── Node "sweep"
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::error::{CoreError, Result};

/// Edge labels recognized on a node
///
/// `Default` is an unconditional transition. `Success`/`Failure` route on the
/// `last_action_success` state flag. `Func` names a routing function that is
/// resolved at assembly time and called with the success and failure targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeLabel {
    Default,
    Success,
    Failure,
    Func,
}

impl EdgeLabel {
    /// Label as it appears in persisted bundles and spec files
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeLabel::Default => "default",
            EdgeLabel::Success => "success",
            EdgeLabel::Failure => "failure",
            EdgeLabel::Func => "func",
        }
    }
}

impl std::fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single declared step in a graph
///
/// The shape mirrors one row of the tabular spec. `edges` maps each label to
/// an ordered list of targets; for `Func` the "target" is the routing-function
/// name rather than a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    /// Unique (within its graph) non-empty node name
    pub name: String,

    /// Key into the agent-type registry; empty resolves to `"default"`
    #[serde(default)]
    pub agent_type: String,

    /// Ordered state-field names read by the agent
    #[serde(default)]
    pub inputs: Vec<String>,

    /// State-field name the agent writes, empty when the agent has no output
    #[serde(default)]
    pub output: String,

    /// Free-form prompt interpreted by the agent
    #[serde(default)]
    pub prompt: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Free-form key/value context; may carry a `services` list
    #[serde(default)]
    pub context: HashMap<String, Value>,

    /// Outgoing edges by label
    #[serde(default)]
    pub edges: BTreeMap<EdgeLabel, Vec<String>>,

    /// Marks this node as the graph entry when the graph-level entry point
    /// is unset
    #[serde(default)]
    pub is_entry_point: bool,
}

impl Node {
    /// Create a node with the given name, leaving everything else empty
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an edge target under a label, preserving declaration order
    pub fn add_edge(&mut self, label: EdgeLabel, target: impl Into<String>) {
        self.edges.entry(label).or_default().push(target.into());
    }

    /// First target under a label, if any
    pub fn edge_target(&self, label: EdgeLabel) -> Option<&str> {
        self.edges
            .get(&label)
            .and_then(|targets| targets.first())
            .map(String::as_str)
    }

    /// All node names this node transitions to
    ///
    /// `Func` entries are excluded: they name routing functions, not nodes.
    pub fn target_nodes(&self) -> impl Iterator<Item = &str> {
        self.edges
            .iter()
            .filter(|(label, _)| **label != EdgeLabel::Func)
            .flat_map(|(_, targets)| targets.iter())
            .map(String::as_str)
    }

    /// Number of edge labels present on this node
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether this node routes on `success`/`failure`
    pub fn has_conditional_routing(&self) -> bool {
        self.edges.contains_key(&EdgeLabel::Success) || self.edges.contains_key(&EdgeLabel::Failure)
    }
}

/// Runtime metadata about one node, consumed by orchestration-capable agents
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeMetadata {
    pub description: String,
    pub prompt: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub input_fields: Vec<String>,
    pub output_field: Option<String>,
}

/// Catalog of node metadata for one graph, keyed by node name
pub type NodeRegistryMap = HashMap<String, NodeMetadata>;

/// Output of the spec parser: named graphs in declaration order
#[derive(Debug, Clone, Default)]
pub struct GraphSpec {
    graphs: Vec<(String, Vec<Node>)>,
}

impl GraphSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node to the named graph, creating the graph on first use
    pub fn push_node(&mut self, graph_name: impl Into<String>, node: Node) {
        let graph_name = graph_name.into();
        if let Some((_, nodes)) = self.graphs.iter_mut().find(|(name, _)| *name == graph_name) {
            nodes.push(node);
        } else {
            self.graphs.push((graph_name, vec![node]));
        }
    }

    /// Graph names in declaration order
    pub fn graph_names(&self) -> impl Iterator<Item = &str> {
        self.graphs.iter().map(|(name, _)| name.as_str())
    }

    /// Nodes of a graph in declaration order
    pub fn nodes(&self, graph_name: &str) -> Option<&[Node]> {
        self.graphs
            .iter()
            .find(|(name, _)| name == graph_name)
            .map(|(_, nodes)| nodes.as_slice())
    }

    /// First declared graph
    pub fn first(&self) -> Option<(&str, &[Node])> {
        self.graphs
            .first()
            .map(|(name, nodes)| (name.as_str(), nodes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Validate structural invariants across all graphs
    ///
    /// Checks that graph and node names are non-empty, node names are unique
    /// within their graph, every non-`func` edge target exists, and no node
    /// has a `default` edge to itself.
    pub fn validate(&self) -> Result<()> {
        for (graph_name, nodes) in &self.graphs {
            if graph_name.is_empty() {
                return Err(CoreError::InvalidInput("graph name is empty".into()));
            }
            if nodes.is_empty() {
                return Err(CoreError::InvalidInput(format!(
                    "graph '{graph_name}' has no nodes"
                )));
            }

            let mut seen = std::collections::HashSet::new();
            for node in nodes {
                if node.name.is_empty() {
                    return Err(CoreError::InvalidInput(format!(
                        "graph '{graph_name}' contains a node with an empty name"
                    )));
                }
                if !seen.insert(node.name.as_str()) {
                    return Err(CoreError::InvalidInput(format!(
                        "duplicate node '{}' in graph '{graph_name}'",
                        node.name
                    )));
                }
            }

            let names: std::collections::HashSet<&str> =
                nodes.iter().map(|n| n.name.as_str()).collect();
            for node in nodes {
                for target in node.target_nodes() {
                    if !target.is_empty() && !names.contains(target) {
                        return Err(CoreError::InvalidInput(format!(
                            "edge target '{target}' of node '{}' does not exist in graph '{graph_name}'",
                            node.name
                        )));
                    }
                }
                if node.edge_target(EdgeLabel::Default) == Some(node.name.as_str()) {
                    return Err(CoreError::InvalidInput(format!(
                        "node '{}' in graph '{graph_name}' has a default edge to itself",
                        node.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_graph() -> GraphSpec {
        let mut spec = GraphSpec::new();
        let mut n1 = Node::new("n1");
        n1.add_edge(EdgeLabel::Default, "n2");
        spec.push_node("main", n1);
        spec.push_node("main", Node::new("n2"));
        spec
    }

    #[test]
    fn test_push_preserves_declaration_order() {
        let spec = linear_graph();
        let nodes = spec.nodes("main").unwrap();
        assert_eq!(nodes[0].name, "n1");
        assert_eq!(nodes[1].name, "n2");
        assert_eq!(spec.graph_names().collect::<Vec<_>>(), vec!["main"]);
    }

    #[test]
    fn test_validate_accepts_linear_graph() {
        assert!(linear_graph().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_dangling_target() {
        let mut spec = GraphSpec::new();
        let mut n1 = Node::new("n1");
        n1.add_edge(EdgeLabel::Default, "missing");
        spec.push_node("main", n1);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_default_self_cycle() {
        let mut spec = GraphSpec::new();
        let mut n1 = Node::new("n1");
        n1.add_edge(EdgeLabel::Default, "n1");
        spec.push_node("main", n1);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_node() {
        let mut spec = GraphSpec::new();
        spec.push_node("main", Node::new("n1"));
        spec.push_node("main", Node::new("n1"));
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_func_edges_are_not_node_targets() {
        let mut node = Node::new("n1");
        node.add_edge(EdgeLabel::Func, "choose_route");
        node.add_edge(EdgeLabel::Success, "n2");
        let targets: Vec<&str> = node.target_nodes().collect();
        assert_eq!(targets, vec!["n2"]);
        assert_eq!(node.edge_count(), 2);
    }

    #[test]
    fn test_conditional_routing_detection() {
        let mut node = Node::new("n1");
        assert!(!node.has_conditional_routing());
        node.add_edge(EdgeLabel::Failure, "n3");
        assert!(node.has_conditional_routing());
    }
}
