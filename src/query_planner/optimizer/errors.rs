use thiserror::Error;

use crate::sql_query::errors::SqlError;

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("parent/child fusion did not converge within {0} passes")]
    FusionLoop(usize),
    #[error("cannot merge nodes: {0}")]
    BadMerge(String),
    #[error(transparent)]
    Sql(#[from] SqlError),
}
