//! The rule library: declared producers and the callable seam.
//!
//! A [`Rule`] maps input paths to output paths through an opaque callable.
//! Callables receive a [`Scope`] of short argument names and return a
//! [`RuleOutput`]; they never get reflected on. The library is populated
//! before queries run and is read-only while one executes.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::Path;

pub mod errors;
pub mod schema;

pub use errors::{CatalogError, RuleError};
pub use schema::{PropertyType, Schema};

/// How many tuples a rule produces per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

impl FromStr for Cardinality {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one" => Ok(Cardinality::One),
            "many" => Ok(Cardinality::Many),
            other => Err(CatalogError::UnknownCardinality(other.to_owned())),
        }
    }
}

/// The argument mapping handed to a rule callable: short names to values.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    values: IndexMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    pub fn from_values(values: IndexMap<String, Value>) -> Self {
        Scope { values }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Result<&Value, RuleError> {
        self.values
            .get(name)
            .ok_or_else(|| RuleError::MissingArgument(name.to_owned()))
    }

    pub fn i64(&self, name: &str) -> Result<i64, RuleError> {
        self.get(name)?
            .as_i64()
            .ok_or(RuleError::InvalidArgument {
                name: name.to_owned(),
                expected: "an integer",
            })
    }

    pub fn str(&self, name: &str) -> Result<&str, RuleError> {
        self.get(name)?.as_str().ok_or(RuleError::InvalidArgument {
            name: name.to_owned(),
            expected: "a string",
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// What a rule invocation produced. `One` is a single tuple of output
/// values, positionally matching the node's outputs; `Many` is a sequence
/// of such tuples and is only legal for many-cardinality rules.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutput {
    One(Vec<Value>),
    Many(Vec<Vec<Value>>),
}

impl RuleOutput {
    /// A single value for a single-output rule.
    pub fn value(value: impl Into<Value>) -> Self {
        RuleOutput::One(vec![value.into()])
    }

    /// One tuple for a multi-output rule.
    pub fn row(values: Vec<Value>) -> Self {
        RuleOutput::One(values)
    }

    /// Many single values for a many-cardinality, single-output rule.
    pub fn values(values: impl IntoIterator<Item = Value>) -> Self {
        RuleOutput::Many(values.into_iter().map(|value| vec![value]).collect())
    }

    /// Many tuples for a many-cardinality, multi-output rule.
    pub fn rows(rows: Vec<Vec<Value>>) -> Self {
        RuleOutput::Many(rows)
    }
}

impl From<Value> for RuleOutput {
    fn from(value: Value) -> Self {
        RuleOutput::One(vec![value])
    }
}

/// The opaque-callable seam. `as_any` lets the optimiser recognise fusible
/// function kinds (the SQL query case) without the library knowing about
/// them.
pub trait RuleFn: Send + Sync {
    fn name(&self) -> &str;
    fn call(&self, args: &Scope) -> Result<RuleOutput, RuleError>;
    fn as_any(&self) -> &dyn Any;
}

struct FnRule<F> {
    name: String,
    function: F,
}

impl<F> RuleFn for FnRule<F>
where
    F: Fn(&Scope) -> Result<RuleOutput, RuleError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: &Scope) -> Result<RuleOutput, RuleError> {
        (self.function)(args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Wrap a closure as a named rule callable.
pub fn rule_fn<F>(name: &str, function: F) -> Arc<dyn RuleFn>
where
    F: Fn(&Scope) -> Result<RuleOutput, RuleError> + Send + Sync + 'static,
{
    Arc::new(FnRule {
        name: name.to_owned(),
        function,
    })
}

#[derive(Clone)]
pub struct Rule {
    pub function: Arc<dyn RuleFn>,
    pub inputs: Vec<Path>,
    pub outputs: Vec<Path>,
    pub cardinality: Cardinality,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rule({} = {}({}) {:?})",
            self.outputs
                .iter()
                .map(Path::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            self.function.name(),
            self.inputs
                .iter()
                .map(Path::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            self.cardinality,
        )
    }
}

/// The rule library, indexed by output path. A second index holds only
/// rules with at least one input: zero-input rules may only bind at the
/// query root, so nested lookups go through the restricted index.
#[derive(Clone, Default, Debug)]
pub struct Rules {
    rules: Vec<Rule>,
    by_output: HashMap<String, usize>,
    by_output_with_inputs: HashMap<String, usize>,
}

impl Rules {
    pub fn new() -> Self {
        Rules::default()
    }

    pub fn append(&mut self, rule: Rule) {
        let at = self.rules.len();
        for output in &rule.outputs {
            self.by_output.insert(output.to_string(), at);
            if !rule.inputs.is_empty() {
                self.by_output_with_inputs.insert(output.to_string(), at);
            }
        }
        self.rules.push(rule);
    }

    pub fn lookup(&self, path: &Path, require_input: bool) -> Option<&Rule> {
        let index = if require_input {
            &self.by_output_with_inputs
        } else {
            &self.by_output
        };
        index.get(&path.to_string()).map(|&at| &self.rules[at])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
