use thiserror::Error;

use crate::path::Path;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("query must be a JSON object, got {found}")]
    NotAnObject { found: String },
    #[error("conflicting clauses at `{path}`: {existing} vs {incoming}")]
    MergeConflict {
        path: Path,
        existing: String,
        incoming: String,
    },
}
