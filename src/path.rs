//! Dotted property paths.
//!
//! A [`Path`] names a value location in a query, e.g. `user.books.name`.
//! Paths are immutable; every traversal helper returns a new path.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Path {
    parts: Vec<String>,
}

impl Path {
    pub fn new(path: &str) -> Self {
        if path.is_empty() {
            Path { parts: Vec::new() }
        } else {
            Path {
                parts: path.split('.').map(str::to_owned).collect(),
            }
        }
    }

    pub fn from_parts(parts: Vec<String>) -> Self {
        Path { parts }
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.parts.first().map(String::as_str)
    }

    /// The property this path addresses: its last part.
    pub fn property(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or("")
    }

    /// The last two parts, i.e. `type.property` relative to the innermost
    /// prefix.
    pub fn relative(&self) -> Path {
        let start = self.parts.len().saturating_sub(2);
        Path {
            parts: self.parts[start..].to_vec(),
        }
    }

    /// All `(prefix, suffix)` splits usable for rule lookup, longest suffix
    /// first. The prefix overlaps the suffix by one part (the suffix's
    /// leading type), so prefix + suffix[1..] reconstructs the path:
    ///
    /// ```text
    /// user.books.name  ->  (user, user.books.name), (user.books, books.name)
    /// ```
    pub fn subpaths(&self) -> impl Iterator<Item = (Path, Path)> + '_ {
        let n = self.parts.len();
        (0..n.saturating_sub(1)).map(move |i| {
            (
                Path {
                    parts: self.parts[..i + 1].to_vec(),
                },
                Path {
                    parts: self.parts[i..].to_vec(),
                },
            )
        })
    }

    /// Append `tail`'s parts after its leading type part. This is the
    /// reconstruction dual of [`Path::subpaths`]: a lookup prefix joined
    /// with a rule-relative path yields the absolute path.
    pub fn join_tail(&self, tail: &Path) -> Path {
        let mut parts = self.parts.clone();
        parts.extend(tail.parts.iter().skip(1).cloned());
        Path { parts }
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.parts.len() >= prefix.parts.len() && self.parts[..prefix.parts.len()] == prefix.parts
    }

    /// The remainder of this path after `prefix`, if `prefix` leads it and
    /// the remainder is non-empty.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        if self.starts_with(prefix) && self.parts.len() > prefix.parts.len() {
            Some(Path {
                parts: self.parts[prefix.parts.len()..].to_vec(),
            })
        } else {
            None
        }
    }

    /// Split into `(parts[..at], parts[at..])`.
    pub fn split_at(&self, at: usize) -> (Path, Path) {
        (
            Path {
                parts: self.parts[..at].to_vec(),
            },
            Path {
                parts: self.parts[at..].to_vec(),
            },
        )
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join("."))
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Path::new(path)
    }
}

impl From<String> for Path {
    fn from(path: String) -> Self {
        Path::new(&path)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}
