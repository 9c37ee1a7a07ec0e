//! SQL-backed rule functions, the engine's fusible kind.
//!
//! A [`SqlQuery`] is a declarative SELECT: tables, selects, a where map,
//! and an input mapping that turns call arguments into where clauses. Two
//! adjacent SQL-backed call-graph nodes fuse into one joined query
//! ([`SqlFusion`]); relations on SQL nodes push down into the where map.
//!
//! Where keys are qualified columns, optionally carrying an operator
//! suffix (`users.age>`); a bare key means equality. Where values are
//! literals, column references (a join), or embedded queries that
//! [`SqlQuery::flatten`] inlines.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::query_planner::call_graph::Node;
use crate::query_planner::optimizer::{FusionRule, NodeSpec, OptimizerError};
use crate::relation::RelOp;
use crate::rule_catalog::{Cardinality, RuleError, RuleFn, RuleOutput, Scope};

pub mod build;
pub mod errors;

pub use build::build_select;
pub use errors::SqlError;

/// The parameter placeholder the driver expects: `%s` (MySQL style) or `?`
/// (SQLite style).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamStyle {
    #[default]
    Percent,
    Question,
}

impl ParamStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamStyle::Percent => "%s",
            ParamStyle::Question => "?",
        }
    }
}

/// The right-hand side of a where clause.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereValue {
    Literal(Value),
    /// A reference to another selected column: a join.
    Column(String),
    /// An embedded query, inlined by [`SqlQuery::flatten`].
    Subquery(Box<SqlQuery>),
}

/// Executes SQL text against some database. Anything row-producing works;
/// the engine treats it as opaque.
pub trait SqlDriver: Send + Sync {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>, SqlError>;
}

#[derive(Clone, Default)]
pub struct SqlQuery {
    tables: BTreeSet<String>,
    selects: Vec<String>,
    where_clauses: IndexMap<String, WhereValue>,
    input_mapping: IndexMap<String, String>,
    limit: Option<u64>,
    one_column: bool,
    first: bool,
    param_style: ParamStyle,
    driver: Option<Arc<dyn SqlDriver>>,
}

impl SqlQuery {
    pub fn new(
        tables: impl IntoIterator<Item = impl Into<String>>,
        selects: impl IntoIterator<Item = impl Into<String>>,
        where_clauses: impl IntoIterator<Item = (String, WhereValue)>,
    ) -> Self {
        SqlQuery {
            tables: tables.into_iter().map(Into::into).collect(),
            selects: selects.into_iter().map(Into::into).collect(),
            where_clauses: where_clauses.into_iter().collect(),
            ..SqlQuery::default()
        }
    }

    /// Map call argument names onto where keys, e.g. `id` → `users.id`.
    pub fn with_input_mapping(
        mut self,
        mapping: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.input_mapping = mapping
            .into_iter()
            .map(|(kwarg, column)| (kwarg.into(), column.into()))
            .collect();
        self
    }

    pub fn with_driver(mut self, driver: Arc<dyn SqlDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_param_style(mut self, param_style: ParamStyle) -> Self {
        self.param_style = param_style;
        self
    }

    /// Return one value per row instead of a tuple.
    pub fn one_column(mut self) -> Self {
        self.one_column = true;
        self
    }

    /// Return only the first row; no row at all signals "no result" and
    /// drops the enclosing record.
    pub fn first(mut self) -> Self {
        self.first = true;
        self
    }

    pub fn tables(&self) -> &BTreeSet<String> {
        &self.tables
    }

    pub fn selects(&self) -> &[String] {
        &self.selects
    }

    pub fn where_clauses(&self) -> &IndexMap<String, WhereValue> {
        &self.where_clauses
    }

    pub fn input_mapping(&self) -> &IndexMap<String, String> {
        &self.input_mapping
    }

    pub fn is_first(&self) -> bool {
        self.first
    }

    pub fn where_contains(&self, key: &str) -> bool {
        self.where_clauses.contains_key(key)
    }

    pub(crate) fn set_where_literal(&mut self, key: String, value: Value) {
        self.where_clauses.insert(key, WhereValue::Literal(value));
    }

    /// The where key expressing a relation on a select: the bare column
    /// for equality, the column plus operator suffix otherwise.
    pub fn constraint_key(select: &str, op: RelOp) -> String {
        if op == RelOp::Eq {
            select.to_owned()
        } else {
            format!("{select}{op}")
        }
    }

    /// Flattening only handles plain queries: no table aliases, every
    /// select and where key qualified as `table.column`.
    pub fn assert_flattenable(&self) -> Result<(), SqlError> {
        for table in &self.tables {
            if table.contains(' ') {
                return Err(SqlError::AliasedTable(table.clone()));
            }
        }
        for select in &self.selects {
            if !select.contains('.') {
                return Err(SqlError::UnqualifiedSelect(select.clone()));
            }
        }
        for key in self.where_clauses.keys() {
            if !key.contains('.') {
                return Err(SqlError::UnqualifiedWhere(key.clone()));
            }
        }
        Ok(())
    }

    fn assert_no_overlapping_where(&self, other: &SqlQuery) -> Result<(), SqlError> {
        let overlap: Vec<&str> = self
            .where_clauses
            .keys()
            .filter(|key| other.where_clauses.contains_key(*key))
            .map(String::as_str)
            .collect();
        if overlap.is_empty() {
            Ok(())
        } else {
            Err(SqlError::OverlappingWhere(overlap.join(", ")))
        }
    }

    /// Inline any embedded queries in the where map: union their tables
    /// and where clauses, then replace the embedded value with a column
    /// reference to its single select. Inlining is a join, so `first` no
    /// longer holds.
    pub fn flatten(&mut self) -> Result<(), SqlError> {
        self.assert_flattenable()?;

        let keys: Vec<String> = self.where_clauses.keys().cloned().collect();
        for key in keys {
            let Some(WhereValue::Subquery(embedded)) = self.where_clauses.get(&key) else {
                continue;
            };
            let embedded = (**embedded).clone();
            embedded.assert_flattenable()?;
            self.assert_no_overlapping_where(&embedded)?;

            self.tables.extend(embedded.tables.iter().cloned());
            for (k, v) in &embedded.where_clauses {
                self.where_clauses.insert(k.clone(), v.clone());
            }
            let [select] = embedded.selects.as_slice() else {
                return Err(SqlError::EmbeddedSelects(embedded.selects.join(", ")));
            };
            self.where_clauses
                .insert(key, WhereValue::Column(select.clone()));
            self.first = false;
        }

        self.cleanup();
        Ok(())
    }

    /// Drop tautologies like `users.id = users.id` left behind by joins.
    pub fn cleanup(&mut self) {
        self.where_clauses.retain(|key, value| match value {
            WhereValue::Column(column) => key != column,
            _ => true,
        });
    }
}

impl PartialEq for SqlQuery {
    fn eq(&self, other: &Self) -> bool {
        // the driver is an opaque handle and does not take part
        self.tables == other.tables
            && self.selects == other.selects
            && self.where_clauses == other.where_clauses
            && self.input_mapping == other.input_mapping
            && self.limit == other.limit
            && self.one_column == other.one_column
            && self.first == other.first
            && self.param_style == other.param_style
    }
}

impl fmt::Debug for SqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SqlQuery(tables: {}; selects: {}; where: {:?}; input_mapping: {:?}; \
             limit: {:?}; one_column: {}; first: {})",
            self.tables.iter().cloned().collect::<Vec<_>>().join(", "),
            self.selects.join(", "),
            self.where_clauses,
            self.input_mapping,
            self.limit,
            self.one_column,
            self.first,
        )
    }
}

impl RuleFn for SqlQuery {
    fn name(&self) -> &str {
        "sql_query"
    }

    fn call(&self, args: &Scope) -> Result<RuleOutput, RuleError> {
        let mut expected: Vec<&str> = self.input_mapping.keys().map(String::as_str).collect();
        let mut got: Vec<&str> = args.names().collect();
        expected.sort_unstable();
        got.sort_unstable();
        if expected != got {
            return Err(RuleError::Failed(format!(
                "input mapping keys {expected:?} != arguments {got:?}"
            )));
        }

        let mut where_clauses = self.where_clauses.clone();
        for (kwarg, column) in &self.input_mapping {
            where_clauses.insert(column.clone(), WhereValue::Literal(args.get(kwarg)?.clone()));
        }

        let (sql, params) = build_select(
            &self.tables,
            &self.selects,
            &where_clauses,
            self.limit,
            self.param_style,
        )
        .map_err(boxed)?;

        let driver = self.driver.as_ref().ok_or(SqlError::NoDriver).map_err(boxed)?;
        log::debug!("executing: {sql} {params:?}");
        let mut rows = driver.execute(&sql, &params).map_err(boxed)?;

        if self.one_column {
            rows = rows
                .into_iter()
                .map(|row| vec![row.into_iter().next().unwrap_or(Value::Null)])
                .collect();
        }
        if self.first {
            match rows.into_iter().next() {
                Some(row) => Ok(RuleOutput::One(row)),
                None => Err(RuleError::NoResult),
            }
        } else {
            Ok(RuleOutput::Many(rows))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn boxed(error: SqlError) -> RuleError {
    RuleError::External(Box::new(error))
}

/// Parent/child fusion for SQL-backed nodes. The child produces the
/// connecting path, the parent consumes it; the merged query selects for
/// both and joins the parent's parameter columns onto the child's selects.
pub struct SqlFusion;

impl FusionRule for SqlFusion {
    fn fusible(&self, function: &dyn RuleFn) -> bool {
        function.as_any().downcast_ref::<SqlQuery>().is_some()
    }

    fn merge(&self, parent: &Node, child: &Node) -> Result<NodeSpec, OptimizerError> {
        let parent_sql = downcast(parent)?;
        let child_sql = downcast(child)?;
        parent_sql.assert_flattenable()?;
        child_sql.assert_flattenable()?;

        let mut merged = parent_sql.clone();
        merged.tables.extend(child_sql.tables.iter().cloned());
        for (key, value) in &child_sql.where_clauses {
            merged.where_clauses.insert(key.clone(), value.clone());
        }
        merged.selects.extend(child_sql.selects.iter().cloned());

        // join: each parameter column of the parent matches the child's
        // select for the connecting path
        for (kwarg, column) in &parent_sql.input_mapping {
            let connecting = parent.input_path_by_property(kwarg).ok_or_else(|| {
                OptimizerError::BadMerge(format!(
                    "no incoming path of the consumer matches argument `{kwarg}`"
                ))
            })?;
            let at = child
                .outgoing_paths
                .iter()
                .position(|path| path == connecting)
                .ok_or_else(|| {
                    OptimizerError::BadMerge(format!(
                        "connecting path `{connecting}` is not produced by the child"
                    ))
                })?;
            let select = child_sql.selects.get(at).ok_or_else(|| {
                OptimizerError::BadMerge(format!(
                    "child has no select for connecting path `{connecting}`"
                ))
            })?;
            merged
                .where_clauses
                .insert(column.clone(), WhereValue::Column(select.clone()));
        }

        merged.cleanup();
        merged.input_mapping = child_sql.input_mapping.clone();
        merged.one_column = false;
        merged.first = false;
        if merged.driver.is_none() {
            merged.driver = child_sql.driver.clone();
        }

        let mut outgoing_paths = parent.outgoing_paths.clone();
        outgoing_paths.extend(child.outgoing_paths.iter().cloned());
        let mut relations = parent.relations.clone();
        relations.extend(child.relations.iter().cloned());

        // a join generally returns multiple rows
        Ok(NodeSpec {
            incoming_paths: child.incoming_paths.clone(),
            outgoing_paths,
            function: Arc::new(merged),
            cardinality: Cardinality::Many,
            relations,
        })
    }
}

fn downcast(node: &Node) -> Result<&SqlQuery, OptimizerError> {
    node.function
        .as_any()
        .downcast_ref::<SqlQuery>()
        .ok_or_else(|| {
            OptimizerError::BadMerge(format!("node `{}` is not SQL-backed", node.describe()))
        })
}
