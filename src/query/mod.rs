//! Parsed queries.
//!
//! A query arrives as a JSON object mapping dotted keys to values. The key's
//! trailing characters select the clause kind: `?` requests the path in the
//! output, a relational suffix (`<`, `>`, `<=`, `>=`, `==`, `!=`, `|=`)
//! attaches a constraint, and a bare key binds a ground value. A value that
//! is a one-element array holding an object is a nested sub-query whose keys
//! are prefixed by the enclosing key.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::path::Path;
use crate::relation::{RelOp, Relation};

pub mod errors;

pub use errors::QueryError;

/// The right-hand side of a clause. `Out` marks a user-requested output;
/// `Temp` marks an engine-introduced intermediate whose value is needed but
/// not emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum Rhs {
    Ground(Value),
    Out,
    Temp,
}

impl Rhs {
    /// True for `Out` and `Temp`: the value is produced by the engine, not
    /// supplied by the caller.
    pub fn is_marker(&self) -> bool {
        !matches!(self, Rhs::Ground(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub lhs: Path,
    pub rhs: Rhs,
    pub relation: Option<Relation>,
}

impl Clause {
    /// Parse one query entry. The `?` suffix wins over relational suffixes;
    /// a relational clause keeps its value in the relation and gets a `Temp`
    /// marker so the engine computes the path without emitting it.
    pub fn parse(key: &str, value: Value) -> Clause {
        if let Some(stripped) = key.strip_suffix('?') {
            return Clause {
                lhs: Path::new(stripped),
                rhs: Rhs::Out,
                relation: None,
            };
        }
        if let Some((op, stripped)) = RelOp::strip_from(key) {
            return Clause {
                lhs: Path::new(stripped),
                rhs: Rhs::Temp,
                relation: Some(Relation::new(op, value)),
            };
        }
        Clause {
            lhs: Path::new(key),
            rhs: Rhs::Ground(value),
            relation: None,
        }
    }

    /// Combine `other` into `self`. Relations conjoin; a `Temp` marker
    /// yields to the other side's RHS. Two non-temp right-hand sides at the
    /// same path are a conflict.
    pub fn merge(&mut self, other: Clause) -> Result<(), QueryError> {
        self.relation = match (self.relation.take(), other.relation) {
            (Some(a), Some(b)) => Some(a.merge(&b)),
            (a, b) => a.or(b),
        };

        if matches!(self.rhs, Rhs::Temp) {
            self.rhs = other.rhs;
        } else if !matches!(other.rhs, Rhs::Temp) {
            return Err(QueryError::MergeConflict {
                path: self.lhs.clone(),
                existing: format!("{:?}", self.rhs),
                incoming: format!("{:?}", other.rhs),
            });
        }
        Ok(())
    }

    /// Reinterpret a ground clause as an equality constraint on a computed
    /// path. Used when no rule consumed the ground value directly.
    pub fn convert_to_constraint(&mut self) {
        if let Rhs::Ground(value) = std::mem::replace(&mut self.rhs, Rhs::Temp) {
            self.relation = Some(Relation::new(RelOp::Eq, value));
        }
    }

    pub fn ground_value(&self) -> Option<&Value> {
        match &self.rhs {
            Rhs::Ground(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.rhs, &self.relation) {
            (Rhs::Ground(value), _) => write!(f, "{} = {}", self.lhs, value),
            (rhs, Some(relation)) => write!(f, "{} {} {:?}", self.lhs, relation, rhs),
            (rhs, None) => write!(f, "{} {:?}", self.lhs, rhs),
        }
    }
}

/// An ordered clause list indexed by path. Appending a clause for a path
/// already present merges the two.
#[derive(Debug, Clone, Default)]
pub struct Query {
    clauses: Vec<Clause>,
    index: HashMap<Path, usize>,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    pub fn from_value(query: &Value) -> Result<Self, QueryError> {
        let mut parsed = Query::new();
        parsed.extend(query, "")?;
        Ok(parsed)
    }

    fn extend(&mut self, query: &Value, prefix: &str) -> Result<(), QueryError> {
        let entries = query.as_object().ok_or_else(|| QueryError::NotAnObject {
            found: json_kind(query).to_owned(),
        })?;

        for (key, value) in entries {
            if let Some(inner) = nested_subquery(value) {
                self.extend(inner, &format!("{prefix}{key}."))?;
            } else {
                self.append(Clause::parse(&format!("{prefix}{key}"), value.clone()))?;
            }
        }
        Ok(())
    }

    /// Append a clause, merging into any existing clause at the same path.
    /// Returns the index of the resulting clause.
    pub fn append(&mut self, clause: Clause) -> Result<usize, QueryError> {
        if let Some(&at) = self.index.get(&clause.lhs) {
            self.clauses[at].merge(clause)?;
            Ok(at)
        } else {
            self.index.insert(clause.lhs.clone(), self.clauses.len());
            self.clauses.push(clause);
            Ok(self.clauses.len() - 1)
        }
    }

    pub fn get(&self, path: &Path) -> Option<&Clause> {
        self.index.get(path).map(|&at| &self.clauses[at])
    }

    pub fn clause(&self, at: usize) -> &Clause {
        &self.clauses[at]
    }

    pub fn clause_mut(&mut self, at: usize) -> &mut Clause {
        &mut self.clauses[at]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The clauses under `root`, re-rooted so their paths are relative to
    /// it. Used to seed nested result sets from nested sub-queries.
    pub fn subquery(&self, root: &Path) -> Query {
        let mut sub = Query::new();
        for clause in &self.clauses {
            if let Some(relative) = clause.lhs.strip_prefix(root) {
                let mut clause = clause.clone();
                clause.lhs = relative;
                // paths are unique within a query, so this cannot conflict
                let _ = sub.append(clause);
            }
        }
        sub
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[")?;
        for clause in &self.clauses {
            writeln!(f, "  {clause}")?;
        }
        write!(f, "]")
    }
}

/// A one-element array holding an object denotes a nested sub-query.
pub fn nested_subquery(value: &Value) -> Option<&Value> {
    match value.as_array() {
        Some(items) if items.len() == 1 && items[0].is_object() => Some(&items[0]),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
