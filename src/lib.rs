//! rulegraph - a rule-driven graph query engine
//!
//! This crate answers declarative path queries over a user-supplied set of
//! production rules through:
//! - Backward chaining from requested outputs to known inputs
//! - Call-graph optimisation, fusing adjacent SQL-backed rules into joins
//! - Dependency-ordered planning with relation-first scheduling
//! - Execution over a tree of records mirroring the query's nesting
//!
//! A query maps dotted paths to ground values, output markers (`?`), or
//! relational constraints (`<`, `>`, `<=`, `>=`, `==`, `!=`, `|=`):
//!
//! ```
//! use rulegraph::{Cardinality, RuleGraph, RuleOutput, rule_fn};
//! use serde_json::json;
//!
//! let mut graph = RuleGraph::new();
//! graph.register_rule(
//!     &["user.id"],
//!     "user.books.id",
//!     Cardinality::Many,
//!     rule_fn("user_books_id", |_| {
//!         Ok(RuleOutput::values([json!(1), json!(2), json!(3)]))
//!     }),
//! );
//!
//! let out = graph
//!     .query(&json!({"user.id": 1, "user.books.id?": null, "user.books.id>": 1}), None)
//!     .unwrap();
//! assert_eq!(out, json!([{"user.books.id": 2}, {"user.books.id": 3}]));
//! ```

pub mod engine;
pub mod errors;
pub mod path;
pub mod query;
pub mod query_planner;
pub mod relation;
pub mod result_set;
pub mod rule_catalog;
pub mod sql_query;

pub use engine::{RuleGraph, TypeBuilder};
pub use errors::RuleGraphError;
pub use path::Path;
pub use query::{Clause, Query, Rhs};
pub use relation::{RelOp, Relation};
pub use result_set::{Mapper, Record, ResultSet, ResultValue, SyncMapper};
pub use rule_catalog::{
    rule_fn, Cardinality, PropertyType, Rule, RuleError, RuleFn, RuleOutput, Schema, Scope,
};
pub use sql_query::{ParamStyle, SqlDriver, SqlFusion, SqlQuery, WhereValue};
