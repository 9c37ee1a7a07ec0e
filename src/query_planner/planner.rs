//! Sequencing the call graph into an executable plan.
//!
//! The planner walks the graph in dependency order, preferring nodes that
//! carry relations so filters shrink the working set before unrelated work
//! runs. Each emitted node has its paths shaped against the query shape and
//! validated; the plan then executes over the seeded result set.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::path::Path;
use crate::query::{nested_subquery, Query};
use crate::result_set::{
    shape_path, ExecutionError, Mapper, Record, ResultSet, ResultValue,
};

use super::call_graph::{CallGraph, Node, NodeId};
use super::errors::PlannerError;

/// A scheduled node with its paths already shaped against the query shape.
pub struct PlanStep {
    pub node: Node,
    pub inputs: Vec<Vec<Path>>,
    pub outputs: Vec<Vec<Path>>,
}

pub struct QueryPlan {
    pub steps: Vec<PlanStep>,
    pub output_paths: Vec<Vec<Path>>,
    result_set: ResultSet,
    mapper: Arc<dyn Mapper>,
}

pub struct QueryPlanner<'a> {
    call_graph: &'a CallGraph,
    query: &'a Query,
    query_shape: &'a Value,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(call_graph: &'a CallGraph, query: &'a Query, query_shape: &'a Value) -> Self {
        QueryPlanner {
            call_graph,
            query,
            query_shape,
        }
    }

    pub fn plan(&self, mapper: Arc<dyn Mapper>) -> Result<QueryPlan, PlannerError> {
        let order = schedule(self.call_graph)?;

        let mut steps = Vec::with_capacity(order.len());
        for id in order {
            let Some(node) = self.call_graph.node(id) else {
                continue;
            };
            let inputs: Vec<Vec<Path>> = node
                .incoming_paths
                .iter()
                .map(|path| shape_path(path, self.query_shape))
                .collect();
            let outputs: Vec<Vec<Path>> = node
                .outgoing_paths
                .iter()
                .map(|path| shape_path(path, self.query_shape))
                .collect();
            validate_levels(node, &inputs, &outputs)?;
            log::debug!("plan step: {}", node.describe());
            steps.push(PlanStep {
                node: node.clone(),
                inputs,
                outputs,
            });
        }

        let output_paths = self
            .call_graph
            .output_paths()
            .iter()
            .map(|path| shape_path(path, self.query_shape))
            .collect();

        Ok(QueryPlan {
            steps,
            output_paths,
            result_set: initial_bindings(self.query, self.query_shape),
            mapper,
        })
    }
}

/// Emit nodes in dependency order: per pass, every ready node carrying a
/// relation as soon as it is seen (emissions unlock later nodes within the
/// same pass), then at most one plain ready node. An empty pass with nodes
/// left means a cycle or a missing producer.
fn schedule(call_graph: &CallGraph) -> Result<Vec<NodeId>, PlannerError> {
    let mut remaining: Vec<NodeId> = call_graph.node_ids();
    let mut emitted: BTreeSet<NodeId> = BTreeSet::new();
    let mut order = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let mut emitted_this_pass = false;
        let mut plain: Option<NodeId> = None;

        for &id in &remaining {
            if emitted.contains(&id) || !is_ready(call_graph, id, &emitted) {
                continue;
            }
            let Some(node) = call_graph.node(id) else {
                continue;
            };
            if node.has_relations() {
                order.push(id);
                emitted.insert(id);
                emitted_this_pass = true;
            } else if plain.is_none() {
                plain = Some(id);
            }
        }

        if let Some(id) = plain {
            order.push(id);
            emitted.insert(id);
            emitted_this_pass = true;
        }

        if !emitted_this_pass {
            let remaining = remaining
                .iter()
                .filter_map(|&id| call_graph.node(id))
                .map(Node::describe)
                .collect();
            return Err(PlannerError::Cycle { remaining });
        }
        remaining.retain(|id| !emitted.contains(id));
    }
    Ok(order)
}

fn is_ready(call_graph: &CallGraph, id: NodeId, emitted: &BTreeSet<NodeId>) -> bool {
    let Some(node) = call_graph.node(id) else {
        return false;
    };
    node.incoming_paths.iter().all(|path| {
        match call_graph.setter_of(path) {
            Some(setter) => emitted.contains(&setter),
            // no producer: the value comes from the initial bindings
            None => true,
        }
    })
}

/// Reject shapes the executor cannot express: all outputs must share one
/// nesting chain, and every input must lie on that chain no deeper than
/// the outputs.
fn validate_levels(
    node: &Node,
    inputs: &[Vec<Path>],
    outputs: &[Vec<Path>],
) -> Result<(), PlannerError> {
    let mixed = |paths: &[Vec<Path>]| PlannerError::MixedLevels {
        node: node.describe(),
        paths: paths
            .iter()
            .map(|shaped| {
                shaped
                    .iter()
                    .map(Path::to_string)
                    .collect::<Vec<_>>()
                    .join(" / ")
            })
            .collect(),
    };

    let Some(first) = outputs.first() else {
        return Err(mixed(outputs));
    };
    let chain = &first[..first.len() - 1];
    for output in outputs {
        if output.len() != first.len() || &output[..output.len() - 1] != chain {
            return Err(mixed(outputs));
        }
    }
    for input in inputs {
        let depth = input.len() - 1;
        if depth > chain.len() || input[..depth] != chain[..depth] {
            return Err(mixed(inputs));
        }
    }
    Ok(())
}

/// Seed the root result set from the query's ground clauses, mirroring the
/// query shape: a nested sub-query becomes a nested one-record result set
/// built from the clauses under its key.
fn initial_bindings(query: &Query, query_shape: &Value) -> ResultSet {
    match query_shape {
        Value::Array(items) if items.len() == 1 => initial_bindings(query, &items[0]),
        _ => ResultSet::from_records(vec![record_bindings(query, query_shape)]),
    }
}

fn record_bindings(query: &Query, shape: &Value) -> Record {
    let mut record = Record::new();
    let Some(entries) = shape.as_object() else {
        return record;
    };
    for (key, value) in entries {
        if let Some(inner) = nested_subquery(value) {
            let sub = query.subquery(&Path::new(key));
            let nested = ResultSet::from_records(vec![record_bindings(&sub, inner)]);
            record.set(key.clone(), ResultValue::Nested(nested));
        } else if let Some(clause) = query.get(&Path::new(key)) {
            if let Some(ground) = clause.ground_value() {
                record.set(key.clone(), ResultValue::Scalar(ground.clone()));
            }
        }
    }
    record
}

impl QueryPlan {
    /// Run every step, filter on surviving relations, apply the limit to
    /// the root record list, and assemble the output.
    pub fn execute(mut self, limit: Option<usize>) -> Result<Value, ExecutionError> {
        for (at, step) in self.steps.iter().enumerate() {
            log::debug!(
                "executing step {at}: {} over {} records",
                step.node.describe(),
                self.result_set.len()
            );

            let wrap = |source: ExecutionError| ExecutionError::PlanStep {
                node: step.node.describe(),
                step: at,
                source: Box::new(source),
            };

            let records = std::mem::take(&mut self.result_set);
            self.result_set = records
                .apply_rule(
                    step.node.function.as_ref(),
                    &step.inputs,
                    &step.outputs,
                    step.node.cardinality,
                    self.mapper.as_ref(),
                )
                .map_err(wrap)?;

            for (slot, relation) in step.node.relations.iter().enumerate() {
                if let Some(relation) = relation {
                    self.result_set
                        .filter(&step.outputs[slot], relation)
                        .map_err(wrap)?;
                }
            }
        }

        if let Some(limit) = limit {
            self.result_set.truncate(limit);
        }
        self.result_set.extract_json(&self.output_paths)
    }
}
