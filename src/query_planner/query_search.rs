//! Backward chaining from requested outputs to known inputs.
//!
//! The search repeatedly picks a clause whose value must be computed, finds
//! a rule producing that path, and records the invocation as a call-graph
//! node, appending the rule's inputs to the query as engine-introduced
//! clauses so the chain continues until everything rests on ground values.

use std::collections::HashSet;

use crate::path::Path;
use crate::query::{Clause, Query, Rhs};
use crate::rule_catalog::{Rule, Rules, Schema};

use super::call_graph::CallGraph;
use super::errors::QuerySearchError;

/// Find the rule producing `path`, searching the most specific suffix
/// first. For each `(prefix, suffix)` split, the suffix's leading type is
/// rewritten through the schema before lookup, so `user.books.name` finds a
/// rule declared as `book.name`. Prefixes longer than one part only match
/// rules with inputs: a zero-input rule applied below the root would
/// cross-join every context.
pub fn lookup_rule<'r>(
    rules: &'r Rules,
    schema: &Schema,
    path: &Path,
) -> Result<(Path, &'r Rule), QuerySearchError> {
    for (prefix, suffix) in path.subpaths() {
        let require_input = prefix.len() != 1;
        let base_type = schema.resolve_type(&prefix);
        let adjusted = Path::new(&base_type).join_tail(&suffix);

        if let Some(rule) = rules.lookup(&adjusted, require_input) {
            log::trace!("lookup `{path}`: matched `{adjusted}` under `{prefix}`");
            return Ok((prefix, rule));
        }
    }

    let base_types = known_base_types(rules);
    for part in &path.parts()[..path.len().saturating_sub(1)] {
        if !base_types.contains(part.as_str()) {
            return Err(QuerySearchError::BaseTypeNotFound {
                base: part.clone(),
                path: path.clone(),
            });
        }
    }

    Err(QuerySearchError::path_not_found(
        path.clone(),
        candidate_outputs(rules, path.property()),
    ))
}

fn known_base_types(rules: &Rules) -> HashSet<&str> {
    let mut types = HashSet::new();
    for rule in rules.iter() {
        for output in &rule.outputs {
            for part in &output.parts()[..output.len().saturating_sub(1)] {
                types.insert(part.as_str());
            }
        }
    }
    types
}

/// Registered outputs mentioning the missing property, for diagnostics.
fn candidate_outputs(rules: &Rules, property: &str) -> Vec<String> {
    const MAX_CANDIDATES: usize = 30;

    let mut candidates = Vec::new();
    for rule in rules.iter() {
        for output in &rule.outputs {
            if output.property() == property {
                candidates.push(output.to_string());
                if candidates.len() == MAX_CANDIDATES {
                    return candidates;
                }
            }
        }
    }
    candidates
}

/// One backward-chaining run: turns a [`Query`] into a [`CallGraph`].
#[derive(Debug)]
pub struct QuerySearch<'a> {
    rules: &'a Rules,
    schema: &'a Schema,
    pub query: Query,
    pub call_graph: CallGraph,
    /// Paths now produced by some node.
    grounded: HashSet<Path>,
    /// Paths referenced as inputs by some node.
    visited: HashSet<Path>,
}

impl<'a> QuerySearch<'a> {
    pub fn new(rules: &'a Rules, schema: &'a Schema, query: Query) -> Self {
        QuerySearch {
            rules,
            schema,
            query,
            call_graph: CallGraph::new(),
            grounded: HashSet::new(),
            visited: HashSet::new(),
        }
    }

    /// A clause whose value the engine must compute and which no node
    /// produces yet. Any one will do: the call graph fixes execution order
    /// later.
    fn next_unbound(&self) -> Option<usize> {
        self.query
            .iter()
            .position(|clause| clause.rhs.is_marker() && !self.grounded.contains(&clause.lhs))
    }

    /// Apply rules in reverse until every marker clause has a producer.
    /// Ground clauses nothing consumed are then reinterpreted as equality
    /// constraints and the search re-enters, so stray facts filter the
    /// result instead of being silently ignored.
    pub fn backward(&mut self) -> Result<(), QuerySearchError> {
        loop {
            while let Some(at) = self.next_unbound() {
                let lhs = self.query.clause(at).lhs.clone();
                match lookup_rule(self.rules, self.schema, &lhs) {
                    Ok((prefix, rule)) => {
                        let rule = rule.clone();
                        self.apply_rule_backwards(at, &prefix, &rule)?;
                    }
                    Err(QuerySearchError::PathNotFound(mut missing)) => {
                        missing.dependents = self
                            .call_graph
                            .nodes_depending_on(&lhs)
                            .into_iter()
                            .filter_map(|id| self.call_graph.node(id))
                            .map(|node| node.name().to_owned())
                            .collect();
                        missing.graph = Some(self.call_graph.explain());
                        return Err(QuerySearchError::PathNotFound(missing));
                    }
                    Err(other) => return Err(other),
                }
            }

            let unused: Vec<usize> = (0..self.query.len())
                .filter(|&at| {
                    let lhs = &self.query.clause(at).lhs;
                    !self.grounded.contains(lhs) && !self.visited.contains(lhs)
                })
                .collect();
            if unused.is_empty() {
                return Ok(());
            }
            for at in unused {
                let clause = self.query.clause_mut(at);
                log::debug!("no rule consumed `{}`; constraining on it instead", clause.lhs);
                clause.convert_to_constraint();
            }
        }
    }

    /// Bind `rule`'s matched output to the clause at `at`, appending the
    /// rule's inputs as engine-introduced clauses.
    fn apply_rule_backwards(
        &mut self,
        at: usize,
        prefix: &Path,
        rule: &Rule,
    ) -> Result<(), QuerySearchError> {
        let mut input_paths = Vec::with_capacity(rule.inputs.len());
        for input in &rule.inputs {
            let absolute = prefix.join_tail(input);
            self.query.append(Clause {
                lhs: absolute.clone(),
                rhs: Rhs::Temp,
                relation: None,
            })?;
            input_paths.push(absolute);
        }

        let clause = self.query.clause(at).clone();
        log::debug!(
            "grounding `{}` with `{}` under `{prefix}`",
            clause.lhs,
            rule.function.name()
        );

        self.call_graph.add_node(
            input_paths.clone(),
            vec![clause.lhs.clone()],
            rule.function.clone(),
            rule.cardinality,
            vec![clause.relation],
        );
        if matches!(clause.rhs, Rhs::Out) {
            self.call_graph.mark_out(&clause.lhs);
        }

        self.grounded.insert(clause.lhs);
        for path in input_paths {
            self.visited.insert(path);
        }
        Ok(())
    }
}
