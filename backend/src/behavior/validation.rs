//! Tree definition validation
//!
//! Structural checks run before a tree is bound to capabilities:
//! - Node ID presence and uniqueness
//! - Tree depth limit
//! - Composites have at least one child

use super::types::NodeDef;
use super::TreeDefinitionError;
use std::collections::HashSet;

/// Maximum allowed tree depth (root is depth 1)
pub const MAX_TREE_DEPTH: usize = 64;

/// Validate a tree definition, collecting every error found
///
/// # Example
///
/// ```rust
/// use battle_sim_core_rs::behavior::{validate_definition, NodeDef, TreeDefinitionError};
///
/// let root: NodeDef = serde_json::from_str(r#"{
///   "type": "sequence", "id": "root",
///   "children": [
///     { "type": "action", "id": "a", "function": "wait" },
///     { "type": "action", "id": "a", "function": "wait" }
///   ]
/// }"#).unwrap();
///
/// let errors = validate_definition(&root).unwrap_err();
/// assert_eq!(errors, vec![TreeDefinitionError::DuplicateNodeId("a".to_string())]);
/// ```
pub fn validate_definition(root: &NodeDef) -> Result<(), Vec<TreeDefinitionError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut max_depth = 0;
    walk(root, 1, &mut seen, &mut max_depth, &mut errors);

    if max_depth > MAX_TREE_DEPTH {
        errors.push(TreeDefinitionError::ExcessiveDepth {
            actual: max_depth,
            max: MAX_TREE_DEPTH,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn walk<'a>(
    node: &'a NodeDef,
    depth: usize,
    seen: &mut HashSet<&'a str>,
    max_depth: &mut usize,
    errors: &mut Vec<TreeDefinitionError>,
) {
    *max_depth = (*max_depth).max(depth);

    let id = node.id();
    if id.is_empty() {
        errors.push(TreeDefinitionError::EmptyNodeId);
    } else if !seen.insert(id) {
        errors.push(TreeDefinitionError::DuplicateNodeId(id.to_string()));
    }

    if let NodeDef::Sequence { children, .. } | NodeDef::Selector { children, .. } = node {
        if children.is_empty() {
            errors.push(TreeDefinitionError::EmptyComposite(id.to_string()));
        }
    }

    for child in node.children() {
        walk(child, depth + 1, seen, max_depth, errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str) -> NodeDef {
        NodeDef::Action {
            id: id.to_string(),
            function: "wait".to_string(),
            config: serde_json::Value::Null,
        }
    }

    fn chain(depth: usize) -> NodeDef {
        (1..depth).fold(leaf("n0"), |child, n| NodeDef::Decorator {
            id: format!("n{n}"),
            variant: super::super::DecoratorKind::Flip,
            child: Box::new(child),
        })
    }

    #[test]
    fn test_valid_tree() {
        let root = NodeDef::Selector {
            id: "root".to_string(),
            children: vec![leaf("a"), leaf("b")],
        };
        assert!(validate_definition(&root).is_ok());
    }

    #[test]
    fn test_depth_limit() {
        assert!(validate_definition(&chain(MAX_TREE_DEPTH)).is_ok());
        assert_eq!(
            validate_definition(&chain(MAX_TREE_DEPTH + 1)).unwrap_err(),
            vec![TreeDefinitionError::ExcessiveDepth {
                actual: MAX_TREE_DEPTH + 1,
                max: MAX_TREE_DEPTH
            }]
        );
    }

    #[test]
    fn test_collects_all_errors() {
        let root = NodeDef::Sequence {
            id: "".to_string(),
            children: vec![
                NodeDef::Selector {
                    id: "s".to_string(),
                    children: vec![],
                },
                leaf("s"),
            ],
        };
        let errors = validate_definition(&root).unwrap_err();
        assert_eq!(
            errors,
            vec![
                TreeDefinitionError::EmptyNodeId,
                TreeDefinitionError::EmptyComposite("s".to_string()),
                TreeDefinitionError::DuplicateNodeId("s".to_string()),
            ]
        );
    }
}
