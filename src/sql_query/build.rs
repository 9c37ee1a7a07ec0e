//! The primitive SELECT builder.
//!
//! Renders one parameterised SELECT from tables, selects, and a where map.
//! Output is deterministic: tables are sorted, selects keep their order,
//! where clauses keep the map's insertion order.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde_json::Value;

use crate::relation::RelOp;

use super::errors::SqlError;
use super::{ParamStyle, WhereValue};

/// Split a where key into its column and operator; a bare key means
/// equality.
fn split_key(key: &str) -> (RelOp, &str) {
    match RelOp::strip_from(key) {
        Some((op, column)) => (op, column),
        None => (RelOp::Eq, key),
    }
}

fn sql_operator(op: RelOp) -> &'static str {
    match op {
        RelOp::Eq => "=",
        RelOp::Ne => "!=",
        RelOp::Gt => ">",
        RelOp::Lt => "<",
        RelOp::Ge => ">=",
        RelOp::Le => "<=",
        RelOp::In => "IN",
    }
}

pub fn build_select(
    tables: &BTreeSet<String>,
    selects: &[String],
    where_clauses: &IndexMap<String, WhereValue>,
    limit: Option<u64>,
    param_style: ParamStyle,
) -> Result<(String, Vec<Value>), SqlError> {
    let placeholder = param_style.as_str();
    let mut sql = format!(
        "SELECT {} FROM {}",
        selects.join(", "),
        tables.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    let mut params = Vec::new();

    if !where_clauses.is_empty() {
        let mut predicates = Vec::with_capacity(where_clauses.len());
        for (key, value) in where_clauses {
            let (op, column) = split_key(key);
            match value {
                WhereValue::Literal(literal) if op == RelOp::In => {
                    let Some(items) = literal.as_array() else {
                        return Err(SqlError::ContainsNeedsArray(column.to_owned()));
                    };
                    let slots = vec![placeholder; items.len()].join(", ");
                    predicates.push(format!("{column} IN ({slots})"));
                    params.extend(items.iter().cloned());
                }
                WhereValue::Literal(literal) => {
                    predicates.push(format!("{column} {} {placeholder}", sql_operator(op)));
                    params.push(literal.clone());
                }
                WhereValue::Column(other) if op == RelOp::In => {
                    return Err(SqlError::ContainsNeedsArray(other.clone()));
                }
                WhereValue::Column(other) => {
                    predicates.push(format!("{column} {} {other}", sql_operator(op)));
                }
                WhereValue::Subquery(_) => {
                    return Err(SqlError::Unflattened(key.clone()));
                }
            }
        }
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }

    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    Ok((sql, params))
}
