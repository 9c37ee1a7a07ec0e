//! The engine façade: rule registration and the query entry points.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::RuleGraphError;
use crate::path::Path;
use crate::query::Query;
use crate::query_planner::{
    lookup_rule, optimizer, QueryPlan, QueryPlanner, QuerySearch, QuerySearchError,
};
use crate::result_set::{Mapper, SyncMapper};
use crate::rule_catalog::{
    rule_fn, Cardinality, PropertyType, Rule, RuleFn, Rules, Schema,
};

/// A rule library plus a type schema, ready to answer queries.
///
/// ```
/// use rulegraph::{Cardinality, RuleGraph, rule_fn};
/// use serde_json::json;
///
/// let mut graph = RuleGraph::new();
/// graph.register_rule(
///     &["user.id"],
///     "user.name",
///     Cardinality::One,
///     rule_fn("user_name", |args| {
///         Ok(json!(format!("user #{}", args.i64("id")?)).into())
///     }),
/// );
///
/// let out = graph
///     .query(&json!({"user.id": 1, "user.name?": null}), None)
///     .unwrap();
/// assert_eq!(out, json!([{"user.name": "user #1"}]));
/// ```
pub struct RuleGraph {
    rules: Rules,
    schema: Schema,
    mapper: Arc<dyn Mapper>,
}

impl Default for RuleGraph {
    fn default() -> Self {
        RuleGraph::new()
    }
}

impl RuleGraph {
    pub fn new() -> Self {
        RuleGraph::with_mapper(Arc::new(SyncMapper))
    }

    /// Use a custom mapper for the per-record map at the leaf level of
    /// rule application (e.g. a thread pool). It must preserve order.
    pub fn with_mapper(mapper: Arc<dyn Mapper>) -> Self {
        RuleGraph {
            rules: Rules::new(),
            schema: Schema::new(),
            mapper,
        }
    }

    /// Declare that `base_type.property` traverses to `other_type`.
    pub fn property_type(&mut self, base_type: &str, property: &str, other_type: &str) {
        self.schema.append(PropertyType {
            base_type: base_type.to_owned(),
            property: property.to_owned(),
            other_type: other_type.to_owned(),
        });
    }

    pub fn register_rule(
        &mut self,
        inputs: &[&str],
        output: &str,
        cardinality: Cardinality,
        function: Arc<dyn RuleFn>,
    ) {
        self.register_rule_with_outputs(inputs, &[output], cardinality, function);
    }

    pub fn register_rule_with_outputs(
        &mut self,
        inputs: &[&str],
        outputs: &[&str],
        cardinality: Cardinality,
        function: Arc<dyn RuleFn>,
    ) {
        self.rules.append(Rule {
            function,
            inputs: inputs.iter().map(|input| Path::new(input)).collect(),
            outputs: outputs.iter().map(|output| Path::new(output)).collect(),
            cardinality,
        });
    }

    /// Register an identity rule copying `input`'s value to `output`.
    pub fn direct_map(&mut self, input: &str, output: &str) {
        self.register_rule(
            &[input],
            output,
            Cardinality::One,
            rule_fn("direct_map", |args| {
                let name = args
                    .names()
                    .next()
                    .map(str::to_owned)
                    .ok_or_else(|| crate::rule_catalog::RuleError::MissingArgument("input".into()))?;
                Ok(args.get(&name)?.clone().into())
            }),
        );
    }

    /// Scoped registration sugar for one type:
    ///
    /// ```
    /// # let mut graph = rulegraph::RuleGraph::new();
    /// graph
    ///     .define_type("user")
    ///     .property_type("books", "book")
    ///     .direct_map("id", &["pk"]);
    /// ```
    pub fn define_type(&mut self, type_name: &str) -> TypeBuilder<'_> {
        TypeBuilder {
            graph: self,
            type_name: type_name.to_owned(),
        }
    }

    /// Schema-aware rule lookup; see [`lookup_rule`].
    pub fn lookup_rule(&self, path: &Path) -> Result<(Path, &Rule), QuerySearchError> {
        lookup_rule(&self.rules, &self.schema, path)
    }

    fn searched(&self, query: &Value) -> Result<QuerySearch<'_>, RuleGraphError> {
        let parsed = Query::from_value(query)?;
        let mut search = QuerySearch::new(&self.rules, &self.schema, parsed);
        search.backward()?;
        optimizer::optimize(&mut search.call_graph)?;
        Ok(search)
    }

    fn plan(&self, query: &Value) -> Result<QueryPlan, RuleGraphError> {
        let search = self.searched(query)?;
        let planner = QueryPlanner::new(&search.call_graph, &search.query, query);
        Ok(planner.plan(self.mapper.clone())?)
    }

    /// Answer a query: a list of records mirroring the query's shape, with
    /// values at the `?`-marked paths. `limit` truncates the root record
    /// list only.
    pub fn query(&self, query: &Value, limit: Option<usize>) -> Result<Value, RuleGraphError> {
        Ok(self.plan(query)?.execute(limit)?)
    }

    /// The optimised call graph for a query, one line per node.
    pub fn explain(&self, query: &Value) -> Result<String, RuleGraphError> {
        Ok(self.searched(query)?.call_graph.explain())
    }

    /// Registered outputs containing `search` and starting with `prefix`.
    /// Handy when exploring an unfamiliar rule library.
    pub fn search_outputs(&self, search: &str, prefix: &str) -> Vec<String> {
        let mut outputs = Vec::new();
        for rule in self.rules.iter() {
            for output in &rule.outputs {
                let text = output.to_string();
                if text.starts_with(prefix) && text.contains(search) {
                    outputs.push(text);
                }
            }
        }
        outputs
    }

    pub fn available_rules_string(&self) -> String {
        self.search_outputs("", "").join(", ")
    }

    /// Every type name appearing left of a property in some rule output.
    pub fn base_types(&self) -> Vec<String> {
        let mut types = BTreeSet::new();
        for rule in self.rules.iter() {
            for output in &rule.outputs {
                for part in &output.parts()[..output.len().saturating_sub(1)] {
                    types.insert(part.clone());
                }
            }
        }
        types.into_iter().collect()
    }
}

/// Registration scoped to one type name; see [`RuleGraph::define_type`].
pub struct TypeBuilder<'a> {
    graph: &'a mut RuleGraph,
    type_name: String,
}

impl TypeBuilder<'_> {
    pub fn property_type(self, property: &str, other_type: &str) -> Self {
        self.graph
            .property_type(&self.type_name, property, other_type);
        self
    }

    /// Declare a property whose entity type is itself.
    pub fn property(self, property: &str) -> Self {
        self.graph
            .property_type(&self.type_name, property, property);
        self
    }

    pub fn direct_map(self, input: &str, outputs: &[&str]) -> Self {
        let input = format!("{}.{input}", self.type_name);
        for output in outputs {
            self.graph
                .direct_map(&input, &format!("{}.{output}", self.type_name));
        }
        self
    }
}
