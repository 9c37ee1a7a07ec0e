//! End-to-end scenarios over SQL-backed rules: fusion collapses adjacent
//! database hops into one join, push-down moves relations into the where
//! clause, and both leave the returned rows unchanged.

use std::sync::Arc;

use serde_json::json;

use rulegraph::{Cardinality, RuleGraph, SqlQuery};

use crate::harness::MemoryDriver;

/// The rule set a schema reflector would produce for `users` and `books`.
fn sql_graph(driver: &Arc<MemoryDriver>) -> RuleGraph {
    let mut graph = RuleGraph::new();
    graph.property_type("user", "books", "book");

    graph.register_rule(
        &["user.id"],
        "user.name",
        Cardinality::One,
        Arc::new(
            SqlQuery::new(["users"], ["users.name"], [])
                .with_input_mapping([("id", "users.id")])
                .with_driver(driver.clone())
                .one_column()
                .first(),
        ),
    );
    graph.register_rule(
        &["user.id"],
        "user.books.id",
        Cardinality::Many,
        Arc::new(
            SqlQuery::new(["books"], ["books.id"], [])
                .with_input_mapping([("id", "books.user_id")])
                .with_driver(driver.clone()),
        ),
    );
    graph.register_rule(
        &["book.id"],
        "book.name",
        Cardinality::One,
        Arc::new(
            SqlQuery::new(["books"], ["books.name"], [])
                .with_input_mapping([("id", "books.id")])
                .with_driver(driver.clone())
                .one_column()
                .first(),
        ),
    );
    graph
}

#[test]
fn test_single_sql_rule() {
    let driver = MemoryDriver::with_library_data();
    let out = sql_graph(&driver)
        .query(&json!({"user.id": 1, "user.name?": null}), None)
        .unwrap();
    assert_eq!(out, json!([{"user.name": "John Smith"}]));
}

#[test]
fn test_adjacent_sql_rules_fuse_into_one_round_trip() {
    let driver = MemoryDriver::with_library_data();
    let out = sql_graph(&driver)
        .query(&json!({"user.id": 1, "user.books.name?": null}), None)
        .unwrap();

    assert_eq!(
        out,
        json!([
            {"user.books.name": "The Giver"},
            {"user.books.name": "REAMDE"},
            {"user.books.name": "The Diamond Age"},
        ])
    );

    let statements = driver.statements();
    assert_eq!(statements.len(), 1, "fusion should leave one round trip");
    assert_eq!(
        statements[0],
        "SELECT books.name, books.id FROM books WHERE books.user_id = %s"
    );
}

#[test]
fn test_fusion_survives_explain() {
    let driver = MemoryDriver::with_library_data();
    let explain = sql_graph(&driver)
        .explain(&json!({"user.id": 1, "user.books.name?": null}))
        .unwrap();

    // one fused node producing both paths
    assert_eq!(explain.lines().count(), 1);
    assert!(explain.contains("user.books.name, user.books.id = sql_query(user.id) many"));
}

#[test]
fn test_relation_pushes_into_where_clause() {
    let driver = MemoryDriver::with_library_data();
    let out = sql_graph(&driver)
        .query(
            &json!({"user.id": 1, "user.books.id>": 1, "user.books.id?": null}),
            None,
        )
        .unwrap();

    assert_eq!(out, json!([{"user.books.id": 2}, {"user.books.id": 3}]));
    let statements = driver.statements();
    assert_eq!(statements.len(), 1);
    assert!(
        statements[0].contains("books.id > %s"),
        "expected the relation in the where clause, got: {}",
        statements[0]
    );
}

#[test]
fn test_fused_join_with_pushed_relation() {
    let driver = MemoryDriver::with_library_data();
    let out = sql_graph(&driver)
        .query(
            &json!({"user.id": 1, "user.books.id>": 1, "user.books.name?": null}),
            None,
        )
        .unwrap();

    assert_eq!(
        out,
        json!([
            {"user.books.name": "REAMDE"},
            {"user.books.name": "The Diamond Age"},
        ])
    );
    let statements = driver.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].contains("books.id > %s"));
}

#[test]
fn test_push_down_is_per_query() {
    // the registered rule object must not accumulate where clauses
    let driver = MemoryDriver::with_library_data();
    let graph = sql_graph(&driver);

    let constrained = json!({"user.id": 1, "user.books.id>": 2, "user.books.id?": null});
    let open = json!({"user.id": 1, "user.books.id?": null});

    assert_eq!(
        graph.query(&constrained, None).unwrap(),
        json!([{"user.books.id": 3}])
    );
    assert_eq!(
        graph.query(&open, None).unwrap(),
        json!([
            {"user.books.id": 1},
            {"user.books.id": 2},
            {"user.books.id": 3},
        ])
    );
}

#[test]
fn test_sql_and_closure_rules_compose() {
    let driver = MemoryDriver::with_library_data();
    let mut graph = sql_graph(&driver);
    graph.register_rule(
        &["user.name"],
        "user.abbreviation",
        Cardinality::One,
        rulegraph::rule_fn("user_abbreviation", |args| {
            let initials: String = args
                .str("name")?
                .split_whitespace()
                .filter_map(|part| part.chars().next())
                .collect();
            Ok(json!(initials).into())
        }),
    );

    let out = graph
        .query(&json!({"user.id": 1, "user.abbreviation?": null}), None)
        .unwrap();
    assert_eq!(out, json!([{"user.abbreviation": "JS"}]));
}

#[test]
fn test_first_with_no_row_drops_the_record() {
    let driver = MemoryDriver::with_library_data();
    let out = sql_graph(&driver)
        .query(&json!({"user.id": 42, "user.name?": null}), None)
        .unwrap();
    assert_eq!(out, json!([]));
}
