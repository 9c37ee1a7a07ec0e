//! Relation push-down into SQL where clauses.
//!
//! A relation left on a SQL-backed node would filter rows after they come
//! back from the database. Moving it into the function's `where` map lets
//! the database do the filtering. The function is copied first: the same
//! `SqlQuery` object backs the registered rule and must not change for
//! future queries.

use std::sync::Arc;

use crate::query_planner::call_graph::CallGraph;
use crate::sql_query::SqlQuery;

use super::errors::OptimizerError;

pub fn push_down_relations(graph: &mut CallGraph) -> Result<(), OptimizerError> {
    for id in graph.node_ids() {
        let Some(node) = graph.node(id) else {
            continue;
        };
        let Some(sql) = node.function.as_any().downcast_ref::<SqlQuery>() else {
            continue;
        };

        // one where key per relation term; a slot whose keys would collide
        // with existing clauses (or each other) stays on the node and
        // filters at execution time instead
        let mut pushes: Vec<(usize, Vec<(String, serde_json::Value)>)> = Vec::new();
        let mut taken: Vec<String> = Vec::new();
        for (slot, (select, relation)) in
            sql.selects().iter().zip(node.relations.iter()).enumerate()
        {
            let Some(relation) = relation else {
                continue;
            };
            let keys: Vec<(String, serde_json::Value)> = relation
                .terms()
                .iter()
                .map(|(op, value)| (SqlQuery::constraint_key(select, *op), value.clone()))
                .collect();
            let collides = keys.iter().any(|(key, _)| {
                sql.where_contains(key) || taken.iter().any(|t| t == key)
            });
            if collides {
                log::debug!("keeping relation on `{select}`: where key already taken");
                continue;
            }
            taken.extend(keys.iter().map(|(key, _)| key.clone()));
            pushes.push((slot, keys));
        }
        if pushes.is_empty() {
            continue;
        }

        let mut pushed = sql.clone();
        let Some(node) = graph.node_mut(id) else {
            continue;
        };
        for (slot, keys) in pushes {
            for (key, value) in keys {
                log::debug!("pushing `{key}` into where clause");
                pushed.set_where_literal(key, value);
            }
            node.relations[slot] = None;
        }
        node.function = Arc::new(pushed);
    }
    Ok(())
}
