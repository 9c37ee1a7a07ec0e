//! The type schema: which entity type a property traverses to.
//!
//! `property_type("user", "books", "book")` declares that `user.books` is a
//! collection of `book`s, which is how a query path `user.books.name` finds
//! a rule declared as `book.name`.

use std::collections::HashMap;
use std::fmt;

use crate::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyType {
    pub base_type: String,
    pub property: String,
    pub other_type: String,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} is type {}",
            self.base_type, self.property, self.other_type
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    property_types: Vec<PropertyType>,
    index: HashMap<(String, String), String>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn append(&mut self, property_type: PropertyType) {
        self.index.insert(
            (
                property_type.base_type.clone(),
                property_type.property.clone(),
            ),
            property_type.other_type.clone(),
        );
        self.property_types.push(property_type);
    }

    pub fn lookup(&self, base_type: &str, property: &str) -> Option<&str> {
        self.index
            .get(&(base_type.to_owned(), property.to_owned()))
            .map(String::as_str)
    }

    /// The entity type of the last part of `prefix`, folding declared
    /// property types left to right. A property with no declared type is
    /// its own type.
    pub fn resolve_type(&self, prefix: &Path) -> String {
        let mut parts = prefix.parts().iter();
        let Some(first) = parts.next() else {
            return String::new();
        };
        parts.fold(first.clone(), |base, property| {
            self.lookup(&base, property)
                .map(str::to_owned)
                .unwrap_or_else(|| property.clone())
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyType> {
        self.property_types.iter()
    }
}
