use std::fmt;

use thiserror::Error;

use crate::path::Path;
use crate::query::QueryError;

/// No rule produces the requested path, directly or via the schema.
///
/// Carries everything needed to debug a miss: the partial call graph, the
/// nodes that were waiting on the path, and registered outputs that mention
/// the missing property.
#[derive(Debug, Clone, PartialEq)]
pub struct PathNotFound {
    pub path: Path,
    /// Registered outputs containing the missing property name.
    pub candidates: Vec<String>,
    /// Names of nodes already in the graph that depend on this path.
    pub dependents: Vec<String>,
    /// Dump of the partial call graph at the time of the miss.
    pub graph: Option<String>,
}

impl PathNotFound {
    pub fn new(path: Path, candidates: Vec<String>) -> Self {
        PathNotFound {
            path,
            candidates,
            dependents: Vec::new(),
            graph: None,
        }
    }
}

impl fmt::Display for PathNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` not found", self.path)?;
        if self.dependents.is_empty() {
            write!(f, "; no node depends on this path")?;
        } else {
            write!(
                f,
                "; nodes depending on this path: {}",
                self.dependents.join(", ")
            )?;
        }
        if let Some(graph) = &self.graph {
            write!(f, "\ncall graph so far:\n{graph}")?;
        }
        if !self.candidates.is_empty() {
            write!(
                f,
                "\n`{}` found in the following outputs:",
                self.path.property()
            )?;
            for candidate in &self.candidates {
                write!(f, "\n    {candidate}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QuerySearchError {
    #[error("{0}")]
    PathNotFound(Box<PathNotFound>),
    #[error("`{base}` type not found; occurred in `{path}`")]
    BaseTypeNotFound { base: String, path: Path },
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl QuerySearchError {
    pub fn path_not_found(path: Path, candidates: Vec<String>) -> Self {
        QuerySearchError::PathNotFound(Box::new(PathNotFound::new(path, candidates)))
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlannerError {
    #[error(
        "call graph cannot be linearised; these nodes never became ready: {}",
        remaining.join("; ")
    )]
    Cycle { remaining: Vec<String> },
    #[error(
        "node `{node}` mixes nesting levels; its shaped paths do not share one lineage: {}",
        paths.join(", ")
    )]
    MixedLevels { node: String, paths: Vec<String> },
}
