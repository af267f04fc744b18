//! Behavior Tree Engine
//!
//! Interprets authored behavior trees once per frame for every agent.
//!
//! # Architecture
//!
//! - **types**: Authored node definitions, `NodeStatus`, `TreeDocument`
//! - **validation**: Load-time structural checks
//! - **registry**: Explicit per-simulation registry of named actions and
//!   conditions, plus the standard capability set
//! - **context**: `BehaviorContext` (the host surface a tree may use) and
//!   the `LeafCall` handed to leaf implementations
//! - **tree**: Arena-allocated tree instance with per-node runtime state
//! - **interpreter**: The tick algorithm
//! - **agent**: Binds one tree and its scratch variables to one member
//!
//! # Failure Model
//!
//! Every definition problem surfaces when the tree is loaded
//! (`TreeLoadError`). An agent whose tree failed to load has no tree and
//! ticks as `Failed` until reloaded. Ticking never returns an error.

pub mod agent;
pub mod context;
pub mod interpreter;
pub mod registry;
pub mod tree;
pub mod types;
pub mod validation;

pub use agent::Agent;
pub use context::{BehaviorContext, Blackboard, LeafCall, LocalContext, TargetInfo};
pub use interpreter::tick_tree;
pub use registry::{
    Action, CapabilityRegistry, CapabilitySet, Condition, PreparedConfig, STANDARD_SET,
};
pub use tree::{BehaviorTree, NodeIndex};
pub use types::{DecoratorKind, NodeDef, NodeStatus, TreeDocument};
pub use validation::{validate_definition, MAX_TREE_DEPTH};

use thiserror::Error;

/// Structural problems in a tree definition
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TreeDefinitionError {
    #[error("Tree definition failed to parse: {0}")]
    Parse(String),

    #[error("Node with empty id")]
    EmptyNodeId,

    #[error("Duplicate node ID: {0}")]
    DuplicateNodeId(String),

    #[error("Tree depth {actual} exceeds maximum {max}")]
    ExcessiveDepth { actual: usize, max: usize },

    #[error("Composite node {0} has no children")]
    EmptyComposite(String),

    #[error("Node {node} has invalid config: {message}")]
    InvalidConfig { node: String, message: String },
}

fn join_errors(errors: &[TreeDefinitionError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while loading a tree document into an agent
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TreeLoadError {
    #[error("Invalid tree definition: {}", join_errors(.0))]
    Definition(Vec<TreeDefinitionError>),

    #[error("Node {node} references unregistered {kind} '{function}'")]
    UnknownCapability {
        node: String,
        kind: String,
        function: String,
    },

    #[error("Unknown capability set: {0}")]
    UnknownCapabilitySet(String),
}

impl From<TreeDefinitionError> for TreeLoadError {
    fn from(e: TreeDefinitionError) -> Self {
        TreeLoadError::Definition(vec![e])
    }
}
