//! End-to-end query scenarios over the closure-backed library fixtures.

use serde_json::json;

use rulegraph::{
    rule_fn, Cardinality, RuleGraph, RuleGraphError, RuleOutput,
};

use crate::harness::library_graph;

#[test]
fn test_single_hop_lookup() {
    let out = library_graph()
        .query(&json!({"user.id": 1, "user.name?": null}), None)
        .unwrap();
    assert_eq!(out, json!([{"user.name": "John Smith"}]));
}

#[test]
fn test_composed_rules() {
    let out = library_graph()
        .query(&json!({"user.id": 1, "user.abbreviation?": null}), None)
        .unwrap();
    assert_eq!(out, json!([{"user.abbreviation": "JS"}]));
}

#[test]
fn test_many_cardinality_preserves_order() {
    let out = library_graph()
        .query(&json!({"user.id": 1, "user.books.id?": null}), None)
        .unwrap();
    assert_eq!(
        out,
        json!([
            {"user.books.id": 1},
            {"user.books.id": 2},
            {"user.books.id": 3},
        ])
    );
}

#[test]
fn test_relation_constraint() {
    let out = library_graph()
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
}

#[test]
fn test_merged_relations() {
    let out = library_graph()
        .query(
            &json!({
                "user.id": 1,
                "user.books.id?": null,
                "user.books.id>": 1,
                "user.books.id<": 3,
            }),
            None,
        )
        .unwrap();
    assert_eq!(out, json!([{"user.books.id": 2}]));
}

#[test]
fn test_relation_on_otherwise_unrequested_path() {
    // user.books.name is only computed to filter on it
    let out = library_graph()
        .query(
            &json!({"user.id": 1, "user.books.id?": null, "user.books.name<": "S"}),
            None,
        )
        .unwrap();
    assert_eq!(out, json!([{"user.books.id": 2}]));
}

#[test]
fn test_two_hop_traversal() {
    let out = library_graph()
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
}

#[test]
fn test_three_deep_traversal() {
    let out = library_graph()
        .query(&json!({"user.id": 1, "user.books.author.id?": null}), None)
        .unwrap();
    assert_eq!(
        out,
        json!([
            {"user.books.author.id": "Louis Lowry"},
            {"user.books.author.id": "Neal Stephenson"},
            {"user.books.author.id": "Neal Stephenson"},
        ])
    );
}

#[test]
fn test_nested_result_shape() {
    let out = library_graph()
        .query(
            &json!({
                "user.id": 1,
                "user.books": [{"id?": null, "name?": null}],
            }),
            None,
        )
        .unwrap();
    assert_eq!(
        out,
        json!([{
            "user.books": [
                {"id": 1, "name": "The Giver"},
                {"id": 2, "name": "REAMDE"},
                {"id": 3, "name": "The Diamond Age"},
            ],
        }])
    );
}

#[test]
fn test_limit_truncates_root_records() {
    let out = library_graph()
        .query(&json!({"user.id": 1, "user.books.id?": null}), Some(2))
        .unwrap();
    assert_eq!(out, json!([{"user.books.id": 1}, {"user.books.id": 2}]));

    // nested sub-results are not limited
    let out = library_graph()
        .query(&json!({"user.id": 1, "user.books": [{"id?": null}]}), Some(1))
        .unwrap();
    assert_eq!(
        out,
        json!([{"user.books": [{"id": 1}, {"id": 2}, {"id": 3}]}])
    );
}

#[test]
fn test_unused_ground_fails_without_producer() {
    // nothing consumes or produces user.age, so the query must fail
    // loudly instead of silently dropping the fact
    let err = library_graph()
        .query(
            &json!({"user.age": 30, "user.id": 1, "user.name?": null}),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, RuleGraphError::Search(_)));
    assert!(err.to_string().contains("user.age"));
}

#[test]
fn test_unused_ground_filters_when_producible() {
    let mut graph = library_graph();
    graph.register_rule(
        &["user.id"],
        "user.age",
        Cardinality::One,
        rule_fn("user_age", |_| Ok(json!(30).into())),
    );

    let matching = graph
        .query(
            &json!({"user.age": 30, "user.id": 1, "user.name?": null}),
            None,
        )
        .unwrap();
    assert_eq!(matching, json!([{"user.name": "John Smith"}]));

    let failing = graph
        .query(
            &json!({"user.age": 31, "user.id": 1, "user.name?": null}),
            None,
        )
        .unwrap();
    assert_eq!(failing, json!([]));
}

#[test]
fn test_has_many_through_declared_property() {
    let mut graph = RuleGraph::new();
    graph.property_type("user", "book", "book");
    graph.register_rule(
        &["user.id"],
        "user.book.id",
        Cardinality::Many,
        rule_fn("user_book_id", |args| {
            Ok(RuleOutput::values([args.get("id")?.clone()]))
        }),
    );
    graph.register_rule(
        &["book.id"],
        "book.name",
        Cardinality::One,
        rule_fn("book_name", |args| {
            Ok(json!(args.i64("id")?.to_string()).into())
        }),
    );

    let out = graph
        .query(&json!({"user.id": 1, "user.book.name?": null}), None)
        .unwrap();
    assert_eq!(out, json!([{"user.book.name": "1"}]));
}

#[test]
fn test_ungrounded_query_from_zero_input_rule() {
    let mut graph = RuleGraph::new();
    graph.register_rule(
        &[],
        "user.id",
        Cardinality::Many,
        rule_fn("all_user_ids", |_| {
            Ok(RuleOutput::values([json!(1), json!(2), json!(3)]))
        }),
    );

    let out = graph.query(&json!({"user.id?": null}), None).unwrap();
    assert_eq!(
        out,
        json!([{"user.id": 1}, {"user.id": 2}, {"user.id": 3}])
    );
}

#[test]
fn test_zero_input_rule_rejected_below_root() {
    // matching book.user.id against the root user.id rule would assert
    // that every book has every user
    let mut graph = RuleGraph::new();
    graph.register_rule(
        &[],
        "user.id",
        Cardinality::Many,
        rule_fn("all_user_ids", |_| {
            Ok(RuleOutput::values([json!(1), json!(2), json!(3)]))
        }),
    );

    let err = graph
        .query(&json!({"book.id": 1, "book.user.id?": null}), None)
        .unwrap_err();
    assert!(matches!(err, RuleGraphError::Search(_)));
}

#[test]
fn test_long_rule_paths() {
    let mut graph = RuleGraph::new();
    graph.register_rule(
        &["a.b.c.d.e.f.in1"],
        "a.b.c.d.e.f.out1",
        Cardinality::One,
        rule_fn("copy", |args| Ok(args.get("in1")?.clone().into())),
    );

    let out = graph
        .query(
            &json!({"a.b.c.d.e.f.in1": 1, "a.b.c.d.e.f.out1?": null}),
            None,
        )
        .unwrap();
    assert_eq!(out, json!([{"a.b.c.d.e.f.out1": 1}]));
}

#[test]
fn test_long_prefix_reaches_short_rule() {
    let mut graph = RuleGraph::new();
    graph.register_rule(
        &["f.in1"],
        "f.out1",
        Cardinality::One,
        rule_fn("copy", |args| Ok(args.get("in1")?.clone().into())),
    );

    let out = graph
        .query(
            &json!({"a.b.c.d.e.f.in1": 1, "a.b.c.d.e.f.out1?": null}),
            None,
        )
        .unwrap();
    assert_eq!(out, json!([{"a.b.c.d.e.f.out1": 1}]));
}

#[test]
fn test_nested_property_type_resolution() {
    let mut graph = RuleGraph::new();
    graph.property_type("d", "es", "e");
    graph.register_rule(
        &["e.id"],
        "e.name",
        Cardinality::One,
        rule_fn("e_name", |args| {
            Ok(json!(args.i64("id")?.to_string()).into())
        }),
    );

    let out = graph
        .query(&json!({"c.d.es.id": 1, "c.d.es.name?": null}), None)
        .unwrap();
    assert_eq!(out, json!([{"c.d.es.name": "1"}]));
}

#[test]
fn test_grounded_value_inside_nested_query() {
    let mut graph = RuleGraph::new();
    graph.register_rule(
        &["x.y.id"],
        "x.z",
        Cardinality::One,
        rule_fn("copy", |args| Ok(args.get("id")?.clone().into())),
    );

    let out = graph
        .query(&json!({"x": [{"y.id": 1, "z?": null}]}), None)
        .unwrap();
    assert_eq!(out, json!([{"x": [{"z": 1}]}]));
}

#[test]
fn test_filter_inside_nested_query() {
    let mut graph = RuleGraph::new();
    graph.register_rule(
        &["x.y.id"],
        "x.z",
        Cardinality::Many,
        rule_fn("spread", |_| {
            Ok(RuleOutput::values([json!(1), json!(2), json!(3)]))
        }),
    );

    let out = graph
        .query(&json!({"x": [{"y.id": 1, "z>": 1, "z?": null}]}), None)
        .unwrap();
    assert_eq!(out, json!([{"x": [{"z": 2}, {"z": 3}]}]));
}

#[test]
fn test_explosion_above_a_nested_shape() {
    // x.id explodes at the root; each record gets its own copy of the
    // nested x.ys result set
    let mut graph = RuleGraph::new();
    graph.register_rule(
        &[],
        "x.id",
        Cardinality::Many,
        rule_fn("ids", |_| {
            Ok(RuleOutput::values([json!(1), json!(2), json!(3)]))
        }),
    );
    graph.register_rule(
        &["x.id"],
        "x.ys.z",
        Cardinality::One,
        rule_fn("copy", |args| Ok(args.get("id")?.clone().into())),
    );

    let out = graph
        .query(&json!({"x.ys": [{"z?": null}]}), None)
        .unwrap();
    assert_eq!(
        out,
        json!([
            {"x.ys": [{"z": 1}]},
            {"x.ys": [{"z": 2}]},
            {"x.ys": [{"z": 3}]},
        ])
    );
}

#[test]
fn test_rule_failure_carries_context() {
    let err = library_graph()
        .query(&json!({"user.id": 99, "user.name?": null}), None)
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("user_name"));
    assert!(message.contains("unknown user 99"));
}

#[test]
fn test_explain_lists_the_planned_nodes() {
    let explain = library_graph()
        .explain(&json!({"user.id": 1, "user.books.name?": null}))
        .unwrap();

    assert!(explain.contains("user.books.id = user_books_id(user.id) many"));
    assert!(explain.contains("user.books.name = book_name(user.books.id)"));
}

#[test]
fn test_contains_relation() {
    let out = library_graph()
        .query(
            &json!({"user.id": 1, "user.books.id|=": [1, 3, 5], "user.books.id?": null}),
            None,
        )
        .unwrap();
    assert_eq!(out, json!([{"user.books.id": 1}, {"user.books.id": 3}]));
}
