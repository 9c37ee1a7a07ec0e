use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SqlError {
    #[error("table `{0}` must not carry an alias")]
    AliasedTable(String),
    #[error("select `{0}` must be of the form table.column")]
    UnqualifiedSelect(String),
    #[error("where key `{0}` must be of the form table.column")]
    UnqualifiedWhere(String),
    #[error("where clauses overlap on: {0}")]
    OverlappingWhere(String),
    #[error("an embedded query must have exactly one select, found: {0}")]
    EmbeddedSelects(String),
    #[error("embedded query left in `{0}`; flatten before building SQL")]
    Unflattened(String),
    #[error("`|=` constraint on `{0}` requires an array value")]
    ContainsNeedsArray(String),
    #[error("no driver configured for this query")]
    NoDriver,
    #[error("driver error: {0}")]
    Driver(String),
}
