//! Parent/child fusion of fusible nodes.
//!
//! When a node's output feeds another node and both functions are of a
//! fusible kind, the pair collapses into one node evaluating a combined
//! function; for SQL-backed rules this turns two round trips into one
//! join. The pass is parameterised over [`FusionRule`] so the graph
//! machinery stays ignorant of what "fusible" means.

use crate::query_planner::call_graph::{CallGraph, Node, NodeId};

use super::errors::OptimizerError;
use super::NodeSpec;

/// Fusibility predicate plus the merge operation.
///
/// Merge input order is fixed: **the child produces, the parent consumes**.
/// `merge(parent, child)` receives the consumer first and the producer,
/// the setter of the connecting edge, second.
pub trait FusionRule {
    fn fusible(&self, function: &dyn crate::rule_catalog::RuleFn) -> bool;
    fn merge(&self, parent: &Node, child: &Node) -> Result<NodeSpec, OptimizerError>;
}

const MAX_PASSES: usize = 100;

/// Repeatedly collapse fusible producer/consumer pairs until a full scan
/// changes nothing. The pass bound guards against a merge that keeps
/// reintroducing fusible pairs.
pub fn fuse_parent_child(
    graph: &mut CallGraph,
    rule: &dyn FusionRule,
) -> Result<(), OptimizerError> {
    let mut passes = 0;
    loop {
        passes += 1;
        if passes > MAX_PASSES {
            return Err(OptimizerError::FusionLoop(MAX_PASSES));
        }
        if !fuse_one(graph, rule)? {
            return Ok(());
        }
    }
}

/// Scan the edges for one fusible pair; merge it and report whether
/// anything changed. Restarting the scan after each merge keeps the edge
/// snapshot honest while the graph mutates underneath.
fn fuse_one(graph: &mut CallGraph, rule: &dyn FusionRule) -> Result<bool, OptimizerError> {
    for path in graph.edge_paths() {
        let Some(edge) = graph.edge(&path) else {
            continue;
        };
        let Some(producer_id) = edge.setter else {
            continue;
        };
        let consumers: Vec<NodeId> = edge.getters.iter().copied().collect();

        if !is_fusible(graph, rule, producer_id) {
            continue;
        }
        for consumer_id in consumers {
            if consumer_id == producer_id || !is_fusible(graph, rule, consumer_id) {
                continue;
            }

            let spec = {
                let (Some(parent), Some(child)) =
                    (graph.node(consumer_id), graph.node(producer_id))
                else {
                    continue;
                };
                log::debug!("fusing `{}` into `{}`", child.describe(), parent.describe());
                rule.merge(parent, child)?
            };

            graph.remove_node(consumer_id);
            graph.remove_node(producer_id);
            graph.add_node(
                spec.incoming_paths,
                spec.outgoing_paths,
                spec.function,
                spec.cardinality,
                spec.relations,
            );
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_fusible(graph: &CallGraph, rule: &dyn FusionRule, id: NodeId) -> bool {
    graph
        .node(id)
        .is_some_and(|node| rule.fusible(node.function.as_ref()))
}
