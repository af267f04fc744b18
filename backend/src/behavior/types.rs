//! Behavior tree definition types
//!
//! Trees are authored as JSON. Node kinds are a closed tagged union:
//!
//! ```json
//! {
//!   "type": "sequence",
//!   "id": "root",
//!   "children": [
//!     { "type": "condition", "id": "low_hp", "function": "stat_below",
//!       "config": { "path": "hp.current", "value": 100 } },
//!     { "type": "action", "id": "rest", "function": "wait",
//!       "config": { "frames": 30 } }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Runtime state of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Ready,
    Running,
    Succeeded,
    Failed,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Succeeded | NodeStatus::Failed)
    }

    pub fn from_bool(ok: bool) -> Self {
        if ok {
            NodeStatus::Succeeded
        } else {
            NodeStatus::Failed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Ready => "ready",
            NodeStatus::Running => "running",
            NodeStatus::Succeeded => "succeeded",
            NodeStatus::Failed => "failed",
        }
    }
}

/// Decorator variants and their terminal-state mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoratorKind {
    /// Succeeded <-> Failed
    Flip,
    /// Any terminal state becomes Succeeded
    Succeed,
    /// Any terminal state becomes Failed
    Fail,
}

impl DecoratorKind {
    /// Map the child's state; non-terminal states pass through
    pub fn map(self, child: NodeStatus) -> NodeStatus {
        if !child.is_terminal() {
            return child;
        }
        match self {
            DecoratorKind::Flip => match child {
                NodeStatus::Succeeded => NodeStatus::Failed,
                _ => NodeStatus::Succeeded,
            },
            DecoratorKind::Succeed => NodeStatus::Succeeded,
            DecoratorKind::Fail => NodeStatus::Failed,
        }
    }
}

/// Authored tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeDef {
    Sequence {
        id: String,
        children: Vec<NodeDef>,
    },
    Selector {
        id: String,
        children: Vec<NodeDef>,
    },
    Decorator {
        id: String,
        variant: DecoratorKind,
        child: Box<NodeDef>,
    },
    Action {
        id: String,
        function: String,
        #[serde(default)]
        config: serde_json::Value,
    },
    Condition {
        id: String,
        function: String,
        #[serde(default)]
        config: serde_json::Value,
    },
}

impl NodeDef {
    pub fn id(&self) -> &str {
        match self {
            NodeDef::Sequence { id, .. }
            | NodeDef::Selector { id, .. }
            | NodeDef::Decorator { id, .. }
            | NodeDef::Action { id, .. }
            | NodeDef::Condition { id, .. } => id,
        }
    }

    pub fn children(&self) -> Vec<&NodeDef> {
        match self {
            NodeDef::Sequence { children, .. } | NodeDef::Selector { children, .. } => {
                children.iter().collect()
            }
            NodeDef::Decorator { child, .. } => vec![child.as_ref()],
            NodeDef::Action { .. } | NodeDef::Condition { .. } => Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeDef::Action { .. } | NodeDef::Condition { .. })
    }
}

/// Behavior-tree document consumed at agent construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDocument {
    pub name: String,
    /// Tree structure as JSON text (a single root `NodeDef`)
    pub definition: String,
    /// Capability set the leaves bind against
    #[serde(default = "default_agent")]
    pub agent: String,
}

fn default_agent() -> String {
    super::registry::STANDARD_SET.to_string()
}

impl TreeDocument {
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
            agent: default_agent(),
        }
    }

    /// Parse the definition text
    pub fn parse(&self) -> Result<NodeDef, super::TreeDefinitionError> {
        serde_json::from_str(&self.definition)
            .map_err(|e| super::TreeDefinitionError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_law() {
        let flip = DecoratorKind::Flip;
        assert_eq!(flip.map(NodeStatus::Succeeded), NodeStatus::Failed);
        assert_eq!(flip.map(NodeStatus::Failed), NodeStatus::Succeeded);
        assert_eq!(flip.map(NodeStatus::Running), NodeStatus::Running);
    }

    #[test]
    fn test_forcing_decorators() {
        assert_eq!(DecoratorKind::Succeed.map(NodeStatus::Failed), NodeStatus::Succeeded);
        assert_eq!(DecoratorKind::Fail.map(NodeStatus::Succeeded), NodeStatus::Failed);
        assert_eq!(DecoratorKind::Fail.map(NodeStatus::Running), NodeStatus::Running);
    }

    #[test]
    fn test_parse_definition() {
        let doc = TreeDocument::new(
            "guard",
            r#"{"type":"decorator","id":"d","variant":"flip",
                "child":{"type":"condition","id":"c","function":"expr","config":{"expr":"1"}}}"#,
        );
        let root = doc.parse().unwrap();
        assert_eq!(root.id(), "d");
        assert_eq!(root.children().len(), 1);
        assert!(root.children()[0].is_leaf());
        assert_eq!(doc.agent, "standard");
    }

    #[test]
    fn test_parse_failure_is_definition_error() {
        let doc = TreeDocument::new("bad", r#"{"type":"loop","id":"x"}"#);
        assert!(matches!(doc.parse(), Err(super::super::TreeDefinitionError::Parse(_))));
    }
}
