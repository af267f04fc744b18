//! Agent: one member's behavior tree plus scratch variables

use super::context::{BehaviorContext, Blackboard};
use super::interpreter::tick_tree;
use super::registry::CapabilityRegistry;
use super::tree::{BehaviorTree, NodeIndex};
use super::types::{NodeStatus, TreeDocument};
use super::TreeLoadError;
use crate::core::ids::EventId;

/// Binds a behavior tree to one member
///
/// # Example
///
/// ```rust
/// use battle_sim_core_rs::behavior::{
///     Agent, CapabilityRegistry, LocalContext, NodeStatus, TreeDocument,
/// };
///
/// let registry = CapabilityRegistry::with_standard();
/// let doc = TreeDocument::new(
///     "idle",
///     r#"{"type": "action", "id": "rest", "function": "wait", "config": {"frames": 30}}"#,
/// );
///
/// let mut agent = Agent::new("boss");
/// agent.load(&doc, &registry).unwrap();
///
/// let mut ctx = LocalContext::new("boss");
/// assert_eq!(agent.tick(&mut ctx), NodeStatus::Running);
/// ```
#[derive(Debug, Clone)]
pub struct Agent {
    member_id: String,
    tree: Option<BehaviorTree>,
    vars: Blackboard,
}

impl Agent {
    /// Agent with no tree (ticks as `Failed`)
    pub fn new(member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            tree: None,
            vars: Blackboard::new(),
        }
    }

    /// Load (or reload) a tree document
    ///
    /// Any previous tree and scratch variables are discarded first; on error
    /// the agent is left without a tree.
    pub fn load(
        &mut self,
        doc: &TreeDocument,
        registry: &CapabilityRegistry,
    ) -> Result<(), TreeLoadError> {
        self.tree = None;
        self.vars.clear();

        let capabilities = registry
            .set(&doc.agent)
            .ok_or_else(|| TreeLoadError::UnknownCapabilitySet(doc.agent.clone()))?;
        let root = doc.parse()?;
        let tree = BehaviorTree::build(&doc.name, &root, capabilities)?;

        tracing::info!(
            member = %self.member_id,
            tree = %doc.name,
            nodes = tree.len(),
            "behavior tree loaded"
        );
        self.tree = Some(tree);
        Ok(())
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn has_tree(&self) -> bool {
        self.tree.is_some()
    }

    pub fn tree(&self) -> Option<&BehaviorTree> {
        self.tree.as_ref()
    }

    pub fn blackboard(&self) -> &Blackboard {
        &self.vars
    }

    pub fn blackboard_mut(&mut self) -> &mut Blackboard {
        &mut self.vars
    }

    /// Delayed outcome events the current tree still waits for
    pub fn pending_outcomes(&self) -> Vec<EventId> {
        self.tree
            .as_ref()
            .map(BehaviorTree::pending_outcomes)
            .unwrap_or_default()
    }

    /// Root state after the last tick; `Failed` without a tree
    pub fn status(&self) -> NodeStatus {
        self.tree
            .as_ref()
            .map(BehaviorTree::root_status)
            .unwrap_or(NodeStatus::Failed)
    }

    /// Tick the tree once
    pub fn tick(&mut self, ctx: &mut dyn BehaviorContext) -> NodeStatus {
        match self.tree.as_mut() {
            Some(tree) => tick_tree(tree, ctx, &mut self.vars),
            None => NodeStatus::Failed,
        }
    }

    /// Hand a drained delayed outcome to the waiting leaf
    ///
    /// Stale outcomes (the leaf was reset or the tree reloaded since the
    /// event was scheduled) are ignored and return false.
    pub fn deliver(&mut self, node: NodeIndex, event: EventId, outcome: NodeStatus) -> bool {
        let delivered = self
            .tree
            .as_mut()
            .is_some_and(|tree| tree.deliver(node, event, outcome));
        if !delivered {
            tracing::debug!(member = %self.member_id, node, %event, "stale behavior outcome ignored");
        }
        delivered
    }
}
