//! Relational constraints attached to query clauses and call-graph nodes.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of relational operators. `In` is spelled `|=` in query
/// keys and means "value contained in".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    In,
}

impl RelOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelOp::Gt => ">",
            RelOp::Lt => "<",
            RelOp::Ge => ">=",
            RelOp::Le => "<=",
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
            RelOp::In => "|=",
        }
    }

    /// Split a trailing operator off a query key. Two-character operators
    /// are tried before `<` and `>` so `id>=` parses as `id` + `>=`.
    pub fn strip_from(key: &str) -> Option<(RelOp, &str)> {
        const TWO_CHAR: [(&str, RelOp); 5] = [
            ("==", RelOp::Eq),
            ("!=", RelOp::Ne),
            ("<=", RelOp::Le),
            (">=", RelOp::Ge),
            ("|=", RelOp::In),
        ];
        for (suffix, op) in TWO_CHAR {
            if let Some(stripped) = key.strip_suffix(suffix) {
                return Some((op, stripped));
            }
        }
        if let Some(stripped) = key.strip_suffix('<') {
            return Some((RelOp::Lt, stripped));
        }
        if let Some(stripped) = key.strip_suffix('>') {
            return Some((RelOp::Gt, stripped));
        }
        None
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicate over a single value: the conjunction of one or more
/// `(operator, value)` terms. Merging two relations concatenates their
/// terms, so `>1` merged with `<3` tests `1 < x < 3`.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    terms: Vec<(RelOp, Value)>,
}

impl Relation {
    pub fn new(op: RelOp, value: Value) -> Self {
        Relation {
            terms: vec![(op, value)],
        }
    }

    pub fn terms(&self) -> &[(RelOp, Value)] {
        &self.terms
    }

    pub fn merge(&self, other: &Relation) -> Relation {
        let mut terms = self.terms.clone();
        terms.extend(other.terms.iter().cloned());
        Relation { terms }
    }

    /// Evaluate the conjunction against a candidate value. Incomparable
    /// operands fail the term rather than erroring: a relation is a
    /// filter, not a type check.
    pub fn test(&self, candidate: &Value) -> bool {
        self.terms.iter().all(|(op, value)| match op {
            RelOp::Eq => values_equal(candidate, value),
            RelOp::Ne => !values_equal(candidate, value),
            RelOp::Gt => matches!(compare_values(candidate, value), Some(Ordering::Greater)),
            RelOp::Lt => matches!(compare_values(candidate, value), Some(Ordering::Less)),
            RelOp::Ge => matches!(
                compare_values(candidate, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            RelOp::Le => matches!(
                compare_values(candidate, value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            RelOp::In => value
                .as_array()
                .is_some_and(|values| values.iter().any(|v| values_equal(candidate, v))),
        })
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (op, value) in &self.terms {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{op} {value}")?;
            first = false;
        }
        Ok(())
    }
}

/// Equality that treats `1` and `1.0` as the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match compare_values(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Ordering over JSON scalars: numbers compare numerically, strings
/// lexically. Mixed or non-scalar operands are incomparable.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                Some(x.cmp(&y))
            } else {
                x.as_f64().zip(y.as_f64()).and_then(|(x, y)| x.partial_cmp(&y))
            }
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
