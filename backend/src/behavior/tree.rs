//! Arena-allocated behavior tree instance
//!
//! Nodes are stored in one `Vec` in depth-first order (root at index 0) and
//! refer to their children by index. Runtime state lives in a parallel
//! `Vec`, so resetting or discarding a tree never walks pointers.

use super::registry::{Action, CapabilitySet, Condition, PreparedConfig};
use super::types::{DecoratorKind, NodeDef, NodeStatus};
use super::validation::validate_definition;
use super::{TreeDefinitionError, TreeLoadError};
use crate::core::ids::EventId;
use std::fmt;
use std::sync::Arc;

/// Index of a node in its tree's arena
pub type NodeIndex = usize;

#[derive(Clone)]
pub(crate) enum NodeKind {
    Sequence,
    Selector,
    Decorator(DecoratorKind),
    Action(Arc<dyn Action>),
    Condition(Arc<dyn Condition>),
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Sequence => f.write_str("Sequence"),
            NodeKind::Selector => f.write_str("Selector"),
            NodeKind::Decorator(kind) => f.debug_tuple("Decorator").field(kind).finish(),
            NodeKind::Action(_) => f.write_str("Action"),
            NodeKind::Condition(_) => f.write_str("Condition"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TreeNode {
    pub id: String,
    pub kind: NodeKind,
    pub children: Vec<NodeIndex>,
    pub config: serde_json::Value,
    pub prepared: Option<PreparedConfig>,
}

/// Mutable per-node state
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeRuntime {
    pub status: NodeStatus,
    /// Composite: index into `children` to resume from
    pub cursor: usize,
    /// Leaf: delayed outcome event this node waits for
    pub awaiting: Option<EventId>,
    /// Leaf: outcome delivered by the drained event
    pub delivered: Option<NodeStatus>,
}

/// A loaded behavior tree with its runtime state
#[derive(Debug, Clone)]
pub struct BehaviorTree {
    name: String,
    pub(crate) nodes: Vec<TreeNode>,
    pub(crate) state: Vec<NodeRuntime>,
}

impl BehaviorTree {
    /// Validate `root` and bind its leaves against `capabilities`
    ///
    /// # Errors
    /// * `Definition` for structural problems or invalid leaf configs
    /// * `UnknownCapability` if a leaf names an unregistered function
    pub fn build(
        name: &str,
        root: &NodeDef,
        capabilities: &CapabilitySet,
    ) -> Result<Self, TreeLoadError> {
        validate_definition(root).map_err(TreeLoadError::Definition)?;

        let mut tree = Self {
            name: name.to_string(),
            nodes: Vec::new(),
            state: Vec::new(),
        };
        let mut config_errors = Vec::new();
        tree.allocate(root, capabilities, &mut config_errors)?;
        if !config_errors.is_empty() {
            return Err(TreeLoadError::Definition(config_errors));
        }
        tree.state = vec![NodeRuntime::default(); tree.nodes.len()];
        Ok(tree)
    }

    fn allocate(
        &mut self,
        def: &NodeDef,
        capabilities: &CapabilitySet,
        config_errors: &mut Vec<TreeDefinitionError>,
    ) -> Result<NodeIndex, TreeLoadError> {
        let unknown = |kind: &str, function: &str| TreeLoadError::UnknownCapability {
            node: def.id().to_string(),
            kind: kind.to_string(),
            function: function.to_string(),
        };
        let mut prepare = |result: Result<Option<PreparedConfig>, String>| match result {
            Ok(prepared) => prepared,
            Err(message) => {
                config_errors.push(TreeDefinitionError::InvalidConfig {
                    node: def.id().to_string(),
                    message,
                });
                None
            }
        };

        let (kind, config, prepared) = match def {
            NodeDef::Sequence { .. } => (NodeKind::Sequence, serde_json::Value::Null, None),
            NodeDef::Selector { .. } => (NodeKind::Selector, serde_json::Value::Null, None),
            NodeDef::Decorator { variant, .. } => {
                (NodeKind::Decorator(*variant), serde_json::Value::Null, None)
            }
            NodeDef::Action {
                function, config, ..
            } => {
                let action = capabilities
                    .action(function)
                    .ok_or_else(|| unknown("action", function.as_str()))?;
                let prepared = prepare(action.prepare(config));
                (NodeKind::Action(action), config.clone(), prepared)
            }
            NodeDef::Condition {
                function, config, ..
            } => {
                let condition = capabilities
                    .condition(function)
                    .ok_or_else(|| unknown("condition", function.as_str()))?;
                let prepared = prepare(condition.prepare(config));
                (NodeKind::Condition(condition), config.clone(), prepared)
            }
        };

        let idx = self.nodes.len();
        self.nodes.push(TreeNode {
            id: def.id().to_string(),
            kind,
            children: Vec::new(),
            config,
            prepared,
        });
        for child in def.children() {
            let child_idx = self.allocate(child, capabilities, config_errors)?;
            self.nodes[idx].children.push(child_idx);
        }
        Ok(idx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> NodeIndex {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn status(&self, node: NodeIndex) -> Option<NodeStatus> {
        self.state.get(node).map(|s| s.status)
    }

    pub fn root_status(&self) -> NodeStatus {
        self.state
            .first()
            .map(|s| s.status)
            .unwrap_or(NodeStatus::Failed)
    }

    /// Look up a node's index by its authored id
    pub fn find(&self, id: &str) -> Option<NodeIndex> {
        self.nodes.iter().position(|n| n.id == id)
    }

    pub fn node_id(&self, node: NodeIndex) -> Option<&str> {
        self.nodes.get(node).map(|n| n.id.as_str())
    }

    /// Deliver a delayed outcome to the leaf that scheduled `event`
    ///
    /// Returns false (and changes nothing) if the leaf is no longer waiting
    /// for that event, e.g. because its subtree was reset in between.
    pub fn deliver(&mut self, node: NodeIndex, event: EventId, outcome: NodeStatus) -> bool {
        match self.state.get_mut(node) {
            Some(state) if state.awaiting == Some(event) => {
                state.delivered = Some(outcome);
                true
            }
            _ => false,
        }
    }

    /// Delayed outcome events the tree is still waiting for
    pub fn pending_outcomes(&self) -> Vec<EventId> {
        self.state
            .iter()
            .filter(|s| s.delivered.is_none())
            .filter_map(|s| s.awaiting)
            .collect()
    }

    /// Reset `node` and its whole subtree to `Ready`
    ///
    /// Returns the delayed outcome events the subtree was still waiting
    /// for; the caller cancels them.
    pub(crate) fn reset(&mut self, node: NodeIndex) -> Vec<EventId> {
        let mut orphaned = Vec::new();
        let mut stack = vec![node];
        while let Some(idx) = stack.pop() {
            let state = std::mem::take(&mut self.state[idx]);
            if let (Some(event), None) = (state.awaiting, state.delivered) {
                orphaned.push(event);
            }
            stack.extend(self.nodes[idx].children.iter().copied());
        }
        orphaned
    }
}
