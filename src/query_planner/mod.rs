//! From query to executable plan: backward chaining builds the call
//! graph, the optimiser rewrites it, the planner sequences it.

pub mod call_graph;
pub mod errors;
pub mod optimizer;
pub mod planner;
pub mod query_search;

pub use call_graph::{CallGraph, Edge, Node, NodeId};
pub use errors::{PathNotFound, PlannerError, QuerySearchError};
pub use planner::{PlanStep, QueryPlan, QueryPlanner};
pub use query_search::{lookup_rule, QuerySearch};
