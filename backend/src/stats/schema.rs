//! Attribute schema
//!
//! The set of attribute paths a member archetype declares. Paths are
//! dot-separated identifiers (`hp.current`, `atk.physical`) and are unique
//! within a schema.

use super::graph::BASE_IDENT;
use super::StatError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared attribute paths with their default base values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSchema {
    attributes: BTreeMap<String, f64>,
}

fn valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Whether `path` is a well-formed attribute path
pub fn is_valid_path(path: &str) -> bool {
    path != BASE_IDENT && path.split('.').all(valid_segment)
}

impl AttributeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a path with its default base value
    ///
    /// # Errors
    /// * `DuplicatePath` if the path is already declared
    /// * `InvalidPath` if a segment is not an identifier, or the path is the
    ///   reserved name `base`
    pub fn declare(&mut self, path: &str, base: f64) -> Result<(), StatError> {
        if !is_valid_path(path) {
            return Err(StatError::InvalidPath(path.to_string()));
        }
        if self.attributes.contains_key(path) {
            return Err(StatError::DuplicatePath(path.to_string()));
        }
        self.attributes.insert(path.to_string(), base);
        Ok(())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.attributes.contains_key(path)
    }

    pub fn default_value(&self, path: &str) -> Option<f64> {
        self.attributes.get(path).copied()
    }

    /// Declared paths with defaults, in sorted order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.attributes.iter().map(|(p, v)| (p.as_str(), *v))
    }

    /// Paths nested under `prefix` (`hp` -> `hp.current`, `hp.max`)
    pub fn children<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.attributes.keys().filter_map(move |path| {
            path.strip_prefix(prefix)
                .filter(|rest| rest.starts_with('.'))
                .map(|_| path.as_str())
        })
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_path_rejected() {
        let mut schema = AttributeSchema::new();
        schema.declare("hp.current", 500.0).unwrap();
        assert_eq!(
            schema.declare("hp.current", 1.0),
            Err(StatError::DuplicatePath("hp.current".to_string()))
        );
        assert_eq!(schema.default_value("hp.current"), Some(500.0));
    }

    #[test]
    fn test_invalid_paths() {
        let mut schema = AttributeSchema::new();
        for bad in ["", "hp.", ".hp", "1hp", "hp-max", "base", "a..b"] {
            assert!(
                matches!(schema.declare(bad, 0.0), Err(StatError::InvalidPath(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(schema.declare("base.value", 0.0).is_ok());
    }

    #[test]
    fn test_children() {
        let mut schema = AttributeSchema::new();
        schema.declare("hp.current", 0.0).unwrap();
        schema.declare("hp.max", 0.0).unwrap();
        schema.declare("hpx", 0.0).unwrap();
        let children: Vec<&str> = schema.children("hp").collect();
        assert_eq!(children, vec!["hp.current", "hp.max"]);
    }
}
