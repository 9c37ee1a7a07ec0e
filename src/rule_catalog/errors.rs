use thiserror::Error;

/// Errors raised by rule callables.
///
/// `NoResult` is not a failure: it signals that the rule has no value for
/// the given inputs and the enclosing record should be dropped, exactly as
/// if a filter had removed it. It never surfaces to the caller.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("no result for these inputs")]
    NoResult,
    #[error("missing argument `{0}`")]
    MissingArgument(String),
    #[error("argument `{name}` is not {expected}")]
    InvalidArgument { name: String, expected: &'static str },
    #[error("{0}")]
    Failed(String),
    #[error("{0}")]
    External(Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("cardinality must be `one` or `many`, got `{0}`")]
    UnknownCardinality(String),
}
