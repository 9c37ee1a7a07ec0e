//! The result set: a tree of records the plan executes over.
//!
//! A [`Record`] maps path-segment keys to scalars or nested result sets;
//! the nesting mirrors the query's shape. Applying a rule descends to the
//! level its shaped paths address, calls the function once per record
//! there, and writes the outputs back, duplicating records when a
//! many-cardinality rule explodes.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;

use crate::path::Path;
use crate::relation::Relation;
use crate::rule_catalog::{Cardinality, RuleError, RuleFn, RuleOutput, Scope};

pub mod errors;

pub use errors::ExecutionError;

/// Split `path` into the segment chain the data tree uses, following the
/// query's shape:
///
/// ```text
/// shape [{"a": [{}]}], path a.b.c   ->  ("a", "b.c")
/// shape [{"a": [{}]}], path x.y     ->  ("x.y",)
/// ```
pub fn shape_path(path: &Path, query_shape: &Value) -> Vec<Path> {
    match query_shape {
        Value::Array(items) => match items.first() {
            Some(inner) => shape_path(path, inner),
            None => vec![path.clone()],
        },
        Value::Object(shape) => {
            for at in 1..path.len() {
                let (prefix, suffix) = path.split_at(at);
                if let Some(sub_shape) = shape.get(&prefix.to_string()) {
                    if branches(sub_shape) {
                        let mut shaped = vec![prefix];
                        shaped.extend(shape_path(&suffix, sub_shape));
                        return shaped;
                    }
                }
            }
            vec![path.clone()]
        }
        _ => vec![path.clone()],
    }
}

/// Whether a shape value denotes structure worth descending into.
fn branches(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64() != Some(0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

/// Derive short argument names from full path keys: the last part alone
/// when unique, widened leftwards (joined with `_`) on collision.
pub fn input_mapping(keys: &[String]) -> HashMap<String, String> {
    fn build(keys: &[String], parts: usize, mapping: &mut HashMap<String, String>) {
        let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();
        for key in keys {
            let path = Path::new(key);
            let start = path.len().saturating_sub(parts);
            let short = path.parts()[start..].join("_");
            groups.entry(short).or_default().push(key.clone());
        }
        for (short, group) in groups {
            if group.len() == 1 {
                mapping.insert(group[0].clone(), short);
            } else {
                build(&group, parts + 1, mapping);
            }
        }
    }

    let mut mapping = HashMap::new();
    build(keys, 1, &mut mapping);
    mapping
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Scalar(Value),
    Nested(ResultSet),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: IndexMap<String, ResultValue>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    pub fn get(&self, key: &str) -> Option<&ResultValue> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ResultValue> {
        self.fields.get_mut(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: ResultValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<ResultValue> {
        self.fields.shift_remove(key)
    }

    pub fn scalar(&self, key: &str) -> Result<&Value, ExecutionError> {
        match self.fields.get(key) {
            Some(ResultValue::Scalar(value)) => Ok(value),
            Some(ResultValue::Nested(_)) => Err(ExecutionError::NotAScalar {
                path: key.to_owned(),
            }),
            None => Err(ExecutionError::MissingInput {
                path: key.to_owned(),
            }),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut entries = serde_json::Map::new();
        for (key, value) in &self.fields {
            let value = match value {
                ResultValue::Scalar(value) => value.clone(),
                ResultValue::Nested(nested) => nested.to_json(),
            };
            entries.insert(key.clone(), value);
        }
        Value::Object(entries)
    }

    /// Apply `function` to this record, descending along the shaped paths.
    /// Returns the records replacing this one: empty when filtered out,
    /// one for cardinality-one writes, several after explosion.
    fn apply_rule(
        mut self,
        function: &dyn RuleFn,
        inputs: &[Vec<Path>],
        outputs: &[Vec<Path>],
        cardinality: Cardinality,
        mut scope: IndexMap<String, Value>,
    ) -> Result<ResultSet, ExecutionError> {
        for input in inputs {
            if input.len() == 1 {
                let key = input[0].to_string();
                let value = self.scalar(&key)?.clone();
                scope.insert(key, value);
            }
        }

        let Some(first_output) = outputs.first() else {
            return Err(ExecutionError::ShapeMismatch {
                path: String::new(),
            });
        };
        if first_output.len() == 1 {
            return self.call_at_leaf(function, outputs, cardinality, scope);
        }

        // descend: inputs at this level are in scope, the rest travel down
        let deeper_inputs: Vec<Vec<Path>> = inputs
            .iter()
            .filter(|input| input.len() > 1)
            .map(|input| input[1..].to_vec())
            .collect();
        let deeper_outputs: Vec<Vec<Path>> =
            outputs.iter().map(|output| output[1..].to_vec()).collect();
        let sub_key = first_output[0].to_string();

        let nested = match self.remove(&sub_key) {
            Some(ResultValue::Nested(nested)) => nested,
            Some(ResultValue::Scalar(_)) => {
                return Err(ExecutionError::NotNested { path: sub_key });
            }
            None => ResultSet::from_records(vec![Record::new()]),
        };
        let nested = nested.apply_rule_with_scope(
            function,
            &deeper_inputs,
            &deeper_outputs,
            cardinality,
            &SyncMapper,
            scope,
        )?;
        self.set(sub_key, ResultValue::Nested(nested));

        Ok(ResultSet::from_records(vec![self]))
    }

    fn call_at_leaf(
        self,
        function: &dyn RuleFn,
        outputs: &[Vec<Path>],
        cardinality: Cardinality,
        scope: IndexMap<String, Value>,
    ) -> Result<ResultSet, ExecutionError> {
        let keys: Vec<String> = scope.keys().cloned().collect();
        let mapping = input_mapping(&keys);
        let mut args = Scope::new();
        for (key, value) in scope {
            let short = mapping.get(&key).cloned().unwrap_or(key);
            args.insert(short, value);
        }

        let output_keys: Vec<String> = outputs
            .iter()
            .map(|output| output[0].to_string())
            .collect();
        log::trace!("calling `{}` with {args}", function.name());

        let produced = match function.call(&args) {
            Ok(produced) => produced,
            Err(RuleError::NoResult) => return Ok(ResultSet::default()),
            Err(cause) => {
                return Err(ExecutionError::RuleApplication {
                    function: function.name().to_owned(),
                    scope: args.to_string(),
                    cause,
                });
            }
        };

        match (cardinality, produced) {
            (Cardinality::One, RuleOutput::One(values)) => {
                let mut record = self;
                write_values(&mut record, function, &output_keys, values)?;
                Ok(ResultSet::from_records(vec![record]))
            }
            (Cardinality::Many, RuleOutput::Many(rows)) => {
                let mut records = Vec::with_capacity(rows.len());
                for values in rows {
                    let mut record = self.clone();
                    write_values(&mut record, function, &output_keys, values)?;
                    records.push(record);
                }
                Ok(ResultSet::from_records(records))
            }
            (Cardinality::One, RuleOutput::Many(_)) => Err(ExecutionError::CardinalityMismatch {
                function: function.name().to_owned(),
                returned: "many",
                declared: "one",
            }),
            (Cardinality::Many, RuleOutput::One(_)) => Err(ExecutionError::CardinalityMismatch {
                function: function.name().to_owned(),
                returned: "one",
                declared: "many",
            }),
        }
    }

    fn extract_json(&self, paths: &[Vec<Path>]) -> Result<Value, ExecutionError> {
        let mut groups: IndexMap<String, Vec<Vec<Path>>> = IndexMap::new();
        for path in paths {
            let Some(head) = path.first() else {
                return Err(ExecutionError::ShapeMismatch {
                    path: String::new(),
                });
            };
            groups
                .entry(head.to_string())
                .or_default()
                .push(path[1..].to_vec());
        }

        let mut entries = serde_json::Map::new();
        for (key, suffixes) in groups {
            match self.get(&key) {
                Some(ResultValue::Nested(nested)) => {
                    if suffixes.iter().any(Vec::is_empty) {
                        return Err(ExecutionError::ShapeMismatch { path: key });
                    }
                    entries.insert(key, nested.extract_json(&suffixes)?);
                }
                Some(ResultValue::Scalar(value)) => {
                    if suffixes.iter().any(|suffix| !suffix.is_empty()) {
                        return Err(ExecutionError::ShapeMismatch { path: key });
                    }
                    entries.insert(key, value.clone());
                }
                None => {
                    if suffixes.iter().any(|suffix| !suffix.is_empty()) {
                        return Err(ExecutionError::ShapeMismatch { path: key });
                    }
                    entries.insert(key, Value::Null);
                }
            }
        }
        Ok(Value::Object(entries))
    }
}

fn write_values(
    record: &mut Record,
    function: &dyn RuleFn,
    output_keys: &[String],
    values: Vec<Value>,
) -> Result<(), ExecutionError> {
    if values.len() != output_keys.len() {
        return Err(ExecutionError::OutputArity {
            function: function.name().to_owned(),
            got: values.len(),
            expected: output_keys.len(),
        });
    }
    for (key, value) in output_keys.iter().zip(values) {
        record.set(key.clone(), ResultValue::Scalar(value));
    }
    Ok(())
}

/// The per-record map at the leaf level of rule application. Implementors
/// may parallelise; the returned sets must keep the input order, and each
/// record is owned by its call.
pub trait Mapper: Send + Sync {
    fn map_records(
        &self,
        apply: &(dyn Fn(Record) -> Result<ResultSet, ExecutionError> + Sync),
        records: Vec<Record>,
    ) -> Result<Vec<ResultSet>, ExecutionError>;
}

/// The default in-process mapper.
pub struct SyncMapper;

impl Mapper for SyncMapper {
    fn map_records(
        &self,
        apply: &(dyn Fn(Record) -> Result<ResultSet, ExecutionError> + Sync),
        records: Vec<Record>,
    ) -> Result<Vec<ResultSet>, ExecutionError> {
        records.into_iter().map(apply).collect()
    }
}

/// An ordered list of records. Order is preserved through every operation;
/// explosion inserts the produced records where the source record was, in
/// the order the rule returned them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    records: Vec<Record>,
}

impl ResultSet {
    pub fn from_records(records: Vec<Record>) -> Self {
        ResultSet { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn truncate(&mut self, limit: usize) {
        self.records.truncate(limit);
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.records.iter().map(Record::to_json).collect())
    }

    /// Apply a rule to every record, at the level the shaped paths address.
    /// The `mapper` only runs the leaf-level map; recursive descent below
    /// the top level is always sequential.
    pub fn apply_rule(
        self,
        function: &dyn RuleFn,
        inputs: &[Vec<Path>],
        outputs: &[Vec<Path>],
        cardinality: Cardinality,
        mapper: &dyn Mapper,
    ) -> Result<ResultSet, ExecutionError> {
        self.apply_rule_with_scope(function, inputs, outputs, cardinality, mapper, IndexMap::new())
    }

    fn apply_rule_with_scope(
        self,
        function: &dyn RuleFn,
        inputs: &[Vec<Path>],
        outputs: &[Vec<Path>],
        cardinality: Cardinality,
        mapper: &dyn Mapper,
        scope: IndexMap<String, Value>,
    ) -> Result<ResultSet, ExecutionError> {
        let at_leaf = outputs.first().map(Vec::len) == Some(1);

        let apply = |record: Record| {
            record.apply_rule(function, inputs, outputs, cardinality, scope.clone())
        };

        let produced = if at_leaf {
            mapper.map_records(&apply, self.records)?
        } else {
            self.records
                .into_iter()
                .map(apply)
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut records = Vec::new();
        for set in produced {
            records.extend(set.records);
        }
        Ok(ResultSet { records })
    }

    /// Drop records whose value at the shaped path fails the relation.
    /// Intermediate segments recurse into nested result sets.
    pub fn filter(
        &mut self,
        shaped: &[Path],
        relation: &Relation,
    ) -> Result<(), ExecutionError> {
        match shaped {
            [] => Err(ExecutionError::ShapeMismatch {
                path: String::new(),
            }),
            [leaf] => {
                let key = leaf.to_string();
                let mut kept = Vec::with_capacity(self.records.len());
                for record in self.records.drain(..) {
                    if relation.test(record.scalar(&key)?) {
                        kept.push(record);
                    }
                }
                self.records = kept;
                Ok(())
            }
            [head, rest @ ..] => {
                let key = head.to_string();
                for record in &mut self.records {
                    match record.get_mut(&key) {
                        Some(ResultValue::Nested(nested)) => nested.filter(rest, relation)?,
                        Some(ResultValue::Scalar(_)) => {
                            return Err(ExecutionError::NotNested { path: key });
                        }
                        None => {
                            return Err(ExecutionError::MissingInput { path: key });
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Assemble the output JSON for the shaped paths. A path with no value
    /// in a record emits `null`.
    pub fn extract_json(&self, paths: &[Vec<Path>]) -> Result<Value, ExecutionError> {
        let rows: Result<Vec<Value>, _> = self
            .records
            .iter()
            .map(|record| record.extract_json(paths))
            .collect();
        Ok(Value::Array(rows?))
    }
}
