//! Call-graph optimisation passes, run in order:
//!
//! 1. [`fuse_parent_child`]: collapse adjacent SQL-backed nodes into one
//!    join query.
//! 2. [`push_down_relations`]: move surviving relations on SQL-backed
//!    nodes into their native where clauses.

use std::sync::Arc;

use crate::path::Path;
use crate::relation::Relation;
use crate::rule_catalog::{Cardinality, RuleFn};
use crate::sql_query::SqlFusion;

use super::call_graph::CallGraph;

pub mod errors;
mod fuse_parent_child;
mod push_down_relations;

pub use errors::OptimizerError;
pub use fuse_parent_child::{fuse_parent_child, FusionRule};
pub use push_down_relations::push_down_relations;

/// What a merge produces: the data for the replacement node.
#[derive(Clone)]
pub struct NodeSpec {
    pub incoming_paths: Vec<Path>,
    pub outgoing_paths: Vec<Path>,
    pub function: Arc<dyn RuleFn>,
    pub cardinality: Cardinality,
    pub relations: Vec<Option<Relation>>,
}

pub fn optimize(graph: &mut CallGraph) -> Result<(), OptimizerError> {
    fuse_parent_child(graph, &SqlFusion)?;
    push_down_relations(graph)?;
    Ok(())
}
