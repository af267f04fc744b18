//! Host surface for behavior trees
//!
//! A tree needs the frame number and a way to insert events; leaves may
//! additionally run pipelines, read their own member's stats, roll the
//! deterministic RNG and ask about nearby enemies. Nothing else of the
//! host is reachable from a tree.

use super::registry::PreparedConfig;
use super::tree::NodeIndex;
use super::types::NodeStatus;
use crate::core::ids::EventId;
use crate::events::{EventQueue, Priority, SchedulerError, SimEvent};
use crate::expr::{EvalError, Expr, ExpressionCache, MapScope, Scope};
use crate::pipeline::{PipelineError, PipelineManager, PipelineOutput};
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Closest hostile member as seen from the ticking member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub id: String,
    pub distance: f64,
}

/// Everything a behavior tree may ask of its host member
pub trait BehaviorContext {
    fn member_id(&self) -> &str;

    fn current_frame(&self) -> u64;

    /// Schedule an event on the engine's queue
    fn insert_event(
        &mut self,
        execute_frame: u64,
        priority: Priority,
        event: SimEvent,
    ) -> Result<EventId, SchedulerError>;

    /// Withdraw a pending event; false if it already ran or never existed
    fn cancel_event(&mut self, id: EventId) -> bool;

    /// Run one of the member's pipelines
    fn run_pipeline(
        &mut self,
        name: &str,
        ctx: BTreeMap<String, f64>,
        params: Option<&dyn Scope>,
    ) -> Result<PipelineOutput, PipelineError>;

    /// Read-only view of the member's own attributes
    fn stats(&self) -> &dyn Scope;

    /// Deterministic uniform roll in [0, 1)
    fn roll(&mut self) -> f64;

    fn nearest_enemy(&self) -> Option<TargetInfo>;

    /// Parsed form of a formula, shared through the host's expression cache
    fn formula(&mut self, source: &str) -> Result<Arc<Expr>, EvalError>;
}

/// Per-agent scratch variables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blackboard {
    vars: BTreeMap<String, f64>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.vars.get(name).copied()
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.vars.insert(name.into(), value);
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl Scope for Blackboard {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.get(name)
    }
}

/// Arguments of one leaf invocation
pub struct LeafCall<'a> {
    pub ctx: &'a mut dyn BehaviorContext,
    pub config: &'a serde_json::Value,
    pub vars: &'a mut Blackboard,
    prepared: Option<&'a PreparedConfig>,
    node: NodeIndex,
    node_id: &'a str,
    scheduled: Option<EventId>,
}

impl<'a> LeafCall<'a> {
    pub(crate) fn new(
        ctx: &'a mut dyn BehaviorContext,
        config: &'a serde_json::Value,
        prepared: Option<&'a PreparedConfig>,
        vars: &'a mut Blackboard,
        node: NodeIndex,
        node_id: &'a str,
    ) -> Self {
        Self {
            ctx,
            config,
            vars,
            prepared,
            node,
            node_id,
            scheduled: None,
        }
    }

    pub fn node_id(&self) -> &str {
        self.node_id
    }

    /// Finish this leaf with `outcome` after `frames` frames
    ///
    /// Returns `Running`; the leaf is not invoked again until the scheduled
    /// event is drained. A delay below one frame is raised to one. If the
    /// event cannot be scheduled the leaf fails.
    pub fn finish_after(&mut self, frames: u64, outcome: NodeStatus) -> NodeStatus {
        let execute_frame = self.ctx.current_frame() + frames.max(1);
        let event = SimEvent::ResumeBehavior {
            member: self.ctx.member_id().to_string(),
            node: self.node,
            outcome,
        };
        match self.ctx.insert_event(execute_frame, Priority::High, event) {
            Ok(id) => {
                self.scheduled = Some(id);
                NodeStatus::Running
            }
            Err(e) => {
                tracing::warn!(node = self.node_id, error = %e, "delayed finish could not be scheduled");
                NodeStatus::Failed
            }
        }
    }

    pub(crate) fn scheduled(&self) -> Option<EventId> {
        self.scheduled
    }

    /// Config decoded by the capability's `prepare` when the tree loaded
    ///
    /// `None` if nothing was prepared or it has another type.
    pub fn prepared<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(self.prepared?).downcast::<T>().ok()
    }

    /// Typed view of the leaf config
    pub fn config_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        parse_config(self.config)
    }
}

/// Deserialize a leaf config, treating `null` as an empty object
pub(crate) fn parse_config<T: serde::de::DeserializeOwned>(
    config: &serde_json::Value,
) -> Result<T, serde_json::Error> {
    if config.is_null() {
        serde_json::from_value(serde_json::Value::Object(Default::default()))
    } else {
        T::deserialize(config)
    }
}

// ============================================================================
// LOCAL CONTEXT
// ============================================================================

/// Self-contained context for driving one tree outside the engine
///
/// Owns its own event queue, pipelines and RNG; stats are a plain map.
/// Used by tools that dry-run trees and by tests.
pub struct LocalContext {
    pub member_id: String,
    pub frame: u64,
    pub queue: EventQueue,
    pub stats: MapScope,
    pub pipelines: PipelineManager,
    pub rng: RngManager,
    pub enemy: Option<TargetInfo>,
    pub exprs: ExpressionCache,
}

impl LocalContext {
    pub fn new(member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            frame: 0,
            queue: EventQueue::new(),
            stats: MapScope::new(),
            pipelines: PipelineManager::with_defaults(),
            rng: RngManager::new(1),
            enemy: None,
            exprs: ExpressionCache::new(),
        }
    }
}

impl BehaviorContext for LocalContext {
    fn member_id(&self) -> &str {
        &self.member_id
    }

    fn current_frame(&self) -> u64 {
        self.frame
    }

    fn insert_event(
        &mut self,
        execute_frame: u64,
        priority: Priority,
        event: SimEvent,
    ) -> Result<EventId, SchedulerError> {
        self.queue.insert(execute_frame, priority, event)
    }

    fn cancel_event(&mut self, id: EventId) -> bool {
        self.queue.cancel(id)
    }

    fn run_pipeline(
        &mut self,
        name: &str,
        ctx: BTreeMap<String, f64>,
        params: Option<&dyn Scope>,
    ) -> Result<PipelineOutput, PipelineError> {
        self.pipelines.run(name, ctx, params)
    }

    fn stats(&self) -> &dyn Scope {
        &self.stats
    }

    fn roll(&mut self) -> f64 {
        self.rng.next_f64()
    }

    fn nearest_enemy(&self) -> Option<TargetInfo> {
        self.enemy.clone()
    }

    fn formula(&mut self, source: &str) -> Result<Arc<Expr>, EvalError> {
        self.exprs.get_or_parse(source)
    }
}
