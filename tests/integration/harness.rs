//! Shared fixtures: a small library-domain rule set backed by closures,
//! and an in-memory SQL driver that evaluates the SELECTs the engine
//! builds, so fusion and push-down are observable end to end.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use serde_json::{json, Value};

use rulegraph::sql_query::SqlError;
use rulegraph::{rule_fn, Cardinality, RelOp, Relation, RuleError, RuleGraph, RuleOutput, SqlDriver};

/// The user/books/author rule set used across the query scenarios.
pub fn library_graph() -> RuleGraph {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut graph = RuleGraph::new();

    graph.register_rule(
        &["user.name"],
        "user.abbreviation",
        Cardinality::One,
        rule_fn("user_abbreviation", |args| {
            let initials: String = args
                .str("name")?
                .split_whitespace()
                .filter_map(|part| part.chars().next())
                .flat_map(char::to_uppercase)
                .collect();
            Ok(json!(initials).into())
        }),
    );

    graph.register_rule(
        &["user.id"],
        "user.name",
        Cardinality::One,
        rule_fn("user_name", |args| match args.i64("id")? {
            1 => Ok(json!("John Smith").into()),
            other => Err(RuleError::Failed(format!("unknown user {other}"))),
        }),
    );

    graph.property_type("user", "books", "book");

    graph.register_rule(
        &["user.id"],
        "user.books.id",
        Cardinality::Many,
        rule_fn("user_books_id", |_| {
            Ok(RuleOutput::values([json!(1), json!(2), json!(3)]))
        }),
    );

    graph.register_rule(
        &["book.id"],
        "book.name",
        Cardinality::One,
        rule_fn("book_name", |args| {
            let name = match args.i64("id")? {
                1 => "The Giver",
                2 => "REAMDE",
                3 => "The Diamond Age",
                other => return Err(RuleError::Failed(format!("unknown book {other}"))),
            };
            Ok(json!(name).into())
        }),
    );

    graph.register_rule(
        &["book.id"],
        "book.author.id",
        Cardinality::One,
        rule_fn("book_author_id", |args| {
            let author = match args.i64("id")? {
                1 => "Louis Lowry",
                2 | 3 => "Neal Stephenson",
                other => return Err(RuleError::Failed(format!("unknown book {other}"))),
            };
            Ok(json!(author).into())
        }),
    );

    graph
}

/// Evaluates the SELECT subset [`build_select`] emits (cartesian product
/// of tables, `AND`-joined predicates, positional `%s` parameters) over
/// rows held in memory, recording every statement it sees.
///
/// [`build_select`]: rulegraph::sql_query::build_select
pub struct MemoryDriver {
    tables: HashMap<String, Vec<IndexMap<String, Value>>>,
    seen: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MemoryDriver {
    /// `users(id, name)` and `books(id, user_id, name)` with the library
    /// fixture data.
    pub fn with_library_data() -> Arc<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut tables = HashMap::new();
        tables.insert(
            "users".to_owned(),
            vec![row(&[("users.id", json!(1)), ("users.name", json!("John Smith"))])],
        );
        tables.insert(
            "books".to_owned(),
            vec![
                row(&[
                    ("books.id", json!(1)),
                    ("books.user_id", json!(1)),
                    ("books.name", json!("The Giver")),
                ]),
                row(&[
                    ("books.id", json!(2)),
                    ("books.user_id", json!(1)),
                    ("books.name", json!("REAMDE")),
                ]),
                row(&[
                    ("books.id", json!(3)),
                    ("books.user_id", json!(1)),
                    ("books.name", json!("The Diamond Age")),
                ]),
            ],
        );
        Arc::new(MemoryDriver {
            tables,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn statements(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }
}

fn row(columns: &[(&str, Value)]) -> IndexMap<String, Value> {
    columns
        .iter()
        .map(|(column, value)| ((*column).to_owned(), value.clone()))
        .collect()
}

impl SqlDriver for MemoryDriver {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>, SqlError> {
        self.seen
            .lock()
            .unwrap()
            .push((sql.to_owned(), params.to_vec()));

        let bad = |detail: &str| SqlError::Driver(format!("{detail}: {sql}"));

        let rest = sql.strip_prefix("SELECT ").ok_or_else(|| bad("no select"))?;
        let (selects, rest) = rest.split_once(" FROM ").ok_or_else(|| bad("no from"))?;
        let (rest, limit) = match rest.split_once(" LIMIT ") {
            Some((rest, limit)) => (
                rest,
                Some(limit.parse::<usize>().map_err(|_| bad("bad limit"))?),
            ),
            None => (rest, None),
        };
        let (from, predicates) = match rest.split_once(" WHERE ") {
            Some((from, predicates)) => (from, Some(predicates)),
            None => (rest, None),
        };

        // cartesian product of the named tables
        let mut rows: Vec<IndexMap<String, Value>> = vec![IndexMap::new()];
        for table in from.split(", ") {
            let stored = self.tables.get(table).ok_or_else(|| bad("unknown table"))?;
            let mut joined = Vec::with_capacity(rows.len() * stored.len());
            for base in &rows {
                for extra in stored {
                    let mut merged = base.clone();
                    merged.extend(extra.clone());
                    joined.push(merged);
                }
            }
            rows = joined;
        }

        let mut params = params.iter();
        if let Some(predicates) = predicates {
            for predicate in predicates.split(" AND ") {
                rows = self.apply_predicate(predicate, &mut params, rows, &bad)?;
            }
        }

        let selects: Vec<&str> = selects.split(", ").collect();
        let mut projected: Vec<Vec<Value>> = rows
            .iter()
            .map(|row| {
                selects
                    .iter()
                    .map(|select| row.get(*select).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        if let Some(limit) = limit {
            projected.truncate(limit);
        }
        Ok(projected)
    }
}

impl MemoryDriver {
    fn apply_predicate<'p>(
        &self,
        predicate: &str,
        params: &mut impl Iterator<Item = &'p Value>,
        rows: Vec<IndexMap<String, Value>>,
        bad: &dyn Fn(&str) -> SqlError,
    ) -> Result<Vec<IndexMap<String, Value>>, SqlError> {
        if let Some((column, slots)) = predicate.split_once(" IN (") {
            let slots = slots.trim_end_matches(')');
            let values: Vec<Value> = slots
                .split(", ")
                .map(|_| params.next().cloned().ok_or_else(|| bad("missing param")))
                .collect::<Result<_, _>>()?;
            let relation = Relation::new(RelOp::In, Value::Array(values));
            return Ok(rows
                .into_iter()
                .filter(|row| {
                    row.get(column)
                        .is_some_and(|candidate| relation.test(candidate))
                })
                .collect());
        }

        let mut parts = predicate.splitn(3, ' ');
        let (Some(column), Some(op), Some(rhs)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(bad("bad predicate"));
        };
        let op = match op {
            "=" => RelOp::Eq,
            "!=" => RelOp::Ne,
            ">" => RelOp::Gt,
            "<" => RelOp::Lt,
            ">=" => RelOp::Ge,
            "<=" => RelOp::Le,
            _ => return Err(bad("bad operator")),
        };
        let param = if rhs == "%s" || rhs == "?" {
            Some(
                params
                    .next()
                    .cloned()
                    .ok_or_else(|| bad("missing param"))?,
            )
        } else {
            None
        };

        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            let value = match &param {
                Some(value) => value.clone(),
                // a bare right-hand side is a column reference: a join
                None => row.get(rhs).cloned().unwrap_or(Value::Null),
            };
            let keep = row
                .get(column)
                .is_some_and(|candidate| Relation::new(op, value).test(candidate));
            if keep {
                kept.push(row);
            }
        }
        Ok(kept)
    }
}
