use thiserror::Error;

use crate::rule_catalog::RuleError;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("rule `{function}` failed with arguments {scope}: {cause}")]
    RuleApplication {
        function: String,
        scope: String,
        #[source]
        cause: RuleError,
    },
    #[error("no value at `{path}` in record")]
    MissingInput { path: String },
    #[error("expected a scalar at `{path}`, found a nested result set")]
    NotAScalar { path: String },
    #[error("expected a nested result set at `{path}`, found a scalar")]
    NotNested { path: String },
    #[error("rule `{function}` returned {got} values for {expected} outputs")]
    OutputArity {
        function: String,
        got: usize,
        expected: usize,
    },
    #[error("rule `{function}` returned {returned} tuples but the node is declared `{declared}`")]
    CardinalityMismatch {
        function: String,
        returned: &'static str,
        declared: &'static str,
    },
    #[error("output path `{path}` does not match the result shape")]
    ShapeMismatch { path: String },
    #[error("plan step {step} (`{node}`) failed: {source}")]
    PlanStep {
        node: String,
        step: usize,
        #[source]
        source: Box<ExecutionError>,
    },
}
