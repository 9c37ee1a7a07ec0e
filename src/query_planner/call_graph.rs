//! The call graph: rule invocations wired together by paths.
//!
//! Nodes are rule invocations; edges are paths. An edge knows the node that
//! sets it and the nodes that read it, so the graph can be walked in either
//! direction. The graph owns its nodes exclusively; passes mutate it through
//! `add_node`/`remove_node`, which keep the edge indices consistent:
//!
//! - every incoming path of a node has that node among its edge's getters
//! - every outgoing path of a node has that node as its edge's setter
//! - an edge has at most one setter

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::path::Path;
use crate::relation::Relation;
use crate::rule_catalog::{Cardinality, RuleFn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Clone)]
pub struct Node {
    /// Paths this node reads, sorted for determinism.
    pub incoming_paths: Vec<Path>,
    /// Paths this node writes, in the order the function returns values.
    pub outgoing_paths: Vec<Path>,
    pub function: Arc<dyn RuleFn>,
    pub cardinality: Cardinality,
    /// One slot per outgoing path; a surviving relation filters the result
    /// set after the node runs.
    pub relations: Vec<Option<Relation>>,
}

impl Node {
    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn has_relations(&self) -> bool {
        self.relations.iter().any(Option::is_some)
    }

    /// The incoming path whose property is `property`: how a function's
    /// short argument name maps back onto the graph.
    pub fn input_path_by_property(&self, property: &str) -> Option<&Path> {
        self.incoming_paths
            .iter()
            .find(|path| path.property() == property)
    }

    /// One explain line: `outgoings = fn(incomings) [many] [<rel> ...]`.
    pub fn describe(&self) -> String {
        let mut line = format!(
            "{} = {}({})",
            join_paths(&self.outgoing_paths),
            self.name(),
            join_paths(&self.incoming_paths),
        );
        if self.cardinality == Cardinality::Many {
            line.push_str(" many");
        }
        for relation in self.relations.iter().flatten() {
            line.push_str(&format!(" <{relation}>"));
        }
        line
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.describe())
    }
}

fn join_paths(paths: &[Path]) -> String {
    paths
        .iter()
        .map(Path::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub path: Path,
    pub getters: BTreeSet<NodeId>,
    pub setter: Option<NodeId>,
    /// True when the path belongs to the user-requested output.
    pub out: bool,
}

impl Edge {
    fn new(path: Path) -> Self {
        Edge {
            path,
            getters: BTreeSet::new(),
            setter: None,
            out: false,
        }
    }
}

#[derive(Default)]
pub struct CallGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: IndexMap<Path, Edge>,
    next_id: usize,
}

impl CallGraph {
    pub fn new() -> Self {
        CallGraph::default()
    }

    /// Insert a node and index it on its edges. `relations` is padded with
    /// `None` up to the number of outgoing paths.
    pub fn add_node(
        &mut self,
        incoming_paths: Vec<Path>,
        outgoing_paths: Vec<Path>,
        function: Arc<dyn RuleFn>,
        cardinality: Cardinality,
        mut relations: Vec<Option<Relation>>,
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let mut incoming_paths = incoming_paths;
        incoming_paths.sort();
        incoming_paths.dedup();
        relations.resize(outgoing_paths.len(), None);

        for path in &outgoing_paths {
            self.edge_entry(path).setter = Some(id);
        }
        for path in &incoming_paths {
            self.edge_entry(path).getters.insert(id);
        }

        self.nodes.insert(
            id,
            Node {
                incoming_paths,
                outgoing_paths,
                function,
                cardinality,
                relations,
            },
        );
        id
    }

    /// Remove a node, unhooking it from its edges. The edges themselves
    /// (and their `out` flags) stay.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&id)?;
        for path in &node.incoming_paths {
            if let Some(edge) = self.edges.get_mut(path) {
                edge.getters.remove(&id);
            }
        }
        for path in &node.outgoing_paths {
            if let Some(edge) = self.edges.get_mut(path) {
                if edge.setter == Some(id) {
                    edge.setter = None;
                }
            }
        }
        Some(node)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(&id, node)| (id, node))
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge(&self, path: &Path) -> Option<&Edge> {
        self.edges.get(path)
    }

    fn edge_entry(&mut self, path: &Path) -> &mut Edge {
        self.edges
            .entry(path.clone())
            .or_insert_with(|| Edge::new(path.clone()))
    }

    pub fn edge_paths(&self) -> Vec<Path> {
        self.edges.keys().cloned().collect()
    }

    pub fn mark_out(&mut self, path: &Path) {
        self.edge_entry(path).out = true;
    }

    /// The paths the caller asked for, in edge insertion order.
    pub fn output_paths(&self) -> Vec<Path> {
        self.edges
            .values()
            .filter(|edge| edge.out)
            .map(|edge| edge.path.clone())
            .collect()
    }

    pub fn setter_of(&self, path: &Path) -> Option<NodeId> {
        self.edges.get(path).and_then(|edge| edge.setter)
    }

    pub fn nodes_depending_on(&self, path: &Path) -> Vec<NodeId> {
        self.edges
            .get(path)
            .map(|edge| edge.getters.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Human-readable dump, one line per node.
    pub fn explain(&self) -> String {
        self.nodes
            .values()
            .map(Node::describe)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Debug for CallGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallGraph[\n{}\n]", self.explain())
    }
}
