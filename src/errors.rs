//! The crate-level error: every module error surfaces through it.

use thiserror::Error;

use crate::query::QueryError;
use crate::query_planner::errors::{PlannerError, QuerySearchError};
use crate::query_planner::optimizer::OptimizerError;
use crate::result_set::ExecutionError;
use crate::rule_catalog::CatalogError;
use crate::sql_query::SqlError;

#[derive(Debug, Error)]
pub enum RuleGraphError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Search(#[from] QuerySearchError),
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Sql(#[from] SqlError),
}
