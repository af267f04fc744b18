//! Capability registry
//!
//! Leaves name their implementation (`"function": "wait"`); the names
//! resolve against a `CapabilitySet` chosen by the tree document's `agent`
//! field. Registries are plain values built per simulation and passed into
//! agent loading.

use super::context::{parse_config, LeafCall};
use super::types::NodeStatus;
use crate::events::{Priority, SimEvent};
use crate::expr::{evaluate_expr, ChainScope};
use serde::Deserialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Name of the built-in capability set
pub const STANDARD_SET: &str = "standard";

/// Leaf config decoded once when the tree is loaded
///
/// Reached during a tick through [`LeafCall::prepared`].
pub type PreparedConfig = Arc<dyn Any + Send + Sync>;

/// Leaf action implementation
pub trait Action: Send + Sync {
    fn run(&self, call: &mut LeafCall<'_>) -> NodeStatus;

    /// Check and decode a node's config when the tree is loaded
    ///
    /// An `Err` rejects the tree. The returned value is stored on the node.
    fn prepare(&self, _config: &serde_json::Value) -> Result<Option<PreparedConfig>, String> {
        Ok(None)
    }
}

/// Leaf condition implementation
pub trait Condition: Send + Sync {
    fn check(&self, call: &mut LeafCall<'_>) -> bool;

    fn prepare(&self, _config: &serde_json::Value) -> Result<Option<PreparedConfig>, String> {
        Ok(None)
    }
}

struct FnAction<F>(F);

impl<F> Action for FnAction<F>
where
    F: Fn(&mut LeafCall<'_>) -> NodeStatus + Send + Sync,
{
    fn run(&self, call: &mut LeafCall<'_>) -> NodeStatus {
        (self.0)(call)
    }
}

struct FnCondition<F>(F);

impl<F> Condition for FnCondition<F>
where
    F: Fn(&mut LeafCall<'_>) -> bool + Send + Sync,
{
    fn check(&self, call: &mut LeafCall<'_>) -> bool {
        (self.0)(call)
    }
}

/// Named actions and conditions available to one kind of agent
#[derive(Clone, Default)]
pub struct CapabilitySet {
    actions: BTreeMap<String, Arc<dyn Action>>,
    conditions: BTreeMap<String, Arc<dyn Condition>>,
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("conditions", &self.conditions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in leaves
    ///
    /// Actions: `wait`, `cast_skill`, `set_var`.
    /// Conditions: `expr`, `stat_below`, `chance`, `has_target_in_range`.
    pub fn standard() -> Self {
        let mut set = Self::new();
        set.register_action("wait", WaitAction);
        set.register_action("cast_skill", CastSkillAction);
        set.register_action("set_var", SetVarAction);
        set.register_condition("expr", ExprCondition);
        set.register_condition("stat_below", StatBelowCondition);
        set.register_condition("chance", ChanceCondition);
        set.register_condition("has_target_in_range", TargetInRangeCondition);
        set
    }

    pub fn register_action(&mut self, name: &str, action: impl Action + 'static) {
        self.actions.insert(name.to_string(), Arc::new(action));
    }

    pub fn register_condition(&mut self, name: &str, condition: impl Condition + 'static) {
        self.conditions.insert(name.to_string(), Arc::new(condition));
    }

    pub fn register_action_fn(
        &mut self,
        name: &str,
        f: impl Fn(&mut LeafCall<'_>) -> NodeStatus + Send + Sync + 'static,
    ) {
        self.register_action(name, FnAction(f));
    }

    pub fn register_condition_fn(
        &mut self,
        name: &str,
        f: impl Fn(&mut LeafCall<'_>) -> bool + Send + Sync + 'static,
    ) {
        self.register_condition(name, FnCondition(f));
    }

    pub fn action(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn condition(&self, name: &str) -> Option<Arc<dyn Condition>> {
        self.conditions.get(name).cloned()
    }
}

/// Capability sets by name, owned by one simulation
///
/// # Example
///
/// ```rust
/// use battle_sim_core_rs::behavior::{CapabilityRegistry, NodeStatus, STANDARD_SET};
///
/// let mut registry = CapabilityRegistry::with_standard();
/// registry
///     .set_mut(STANDARD_SET)
///     .register_action_fn("taunt", |_call| NodeStatus::Succeeded);
///
/// assert!(registry.set(STANDARD_SET).unwrap().action("taunt").is_some());
/// assert!(registry.set("scripted").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    sets: BTreeMap<String, CapabilitySet>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the standard set under [`STANDARD_SET`]
    pub fn with_standard() -> Self {
        let mut registry = Self::new();
        registry.insert(STANDARD_SET, CapabilitySet::standard());
        registry
    }

    pub fn insert(&mut self, name: &str, set: CapabilitySet) {
        self.sets.insert(name.to_string(), set);
    }

    pub fn set(&self, name: &str) -> Option<&CapabilitySet> {
        self.sets.get(name)
    }

    /// Mutable access, creating an empty set if needed
    pub fn set_mut(&mut self, name: &str) -> &mut CapabilitySet {
        self.sets.entry(name.to_string()).or_default()
    }
}

// ============================================================================
// STANDARD CAPABILITIES
// ============================================================================

fn decode<T>(config: &serde_json::Value) -> Result<Option<PreparedConfig>, String>
where
    T: serde::de::DeserializeOwned + Send + Sync + 'static,
{
    let parsed: PreparedConfig = Arc::new(parse_config::<T>(config).map_err(|e| e.to_string())?);
    Ok(Some(parsed))
}

/// Fetch the config decoded at load time, failing the leaf without one
macro_rules! leaf_config {
    ($call:expr, $ty:ty, $fail:expr) => {
        match $call.prepared::<$ty>() {
            Some(config) => config,
            None => {
                tracing::warn!(node = $call.node_id(), "leaf config was not prepared");
                return $fail;
            }
        }
    };
}

#[derive(Deserialize)]
struct WaitConfig {
    #[serde(default = "one")]
    frames: u64,
}

fn one() -> u64 {
    1
}

/// Succeeds after `frames` frames
struct WaitAction;

impl Action for WaitAction {
    fn run(&self, call: &mut LeafCall<'_>) -> NodeStatus {
        let config = leaf_config!(call, WaitConfig, NodeStatus::Failed);
        call.finish_after(config.frames, NodeStatus::Succeeded)
    }

    fn prepare(&self, config: &serde_json::Value) -> Result<Option<PreparedConfig>, String> {
        decode::<WaitConfig>(config)
    }
}

#[derive(Deserialize)]
struct CastSkillConfig {
    skill: String,
    /// Cast at the nearest enemy (default) or without a target
    #[serde(default = "yes")]
    target_enemy: bool,
}

fn yes() -> bool {
    true
}

/// Requests a skill cast on the next frame
struct CastSkillAction;

impl Action for CastSkillAction {
    fn run(&self, call: &mut LeafCall<'_>) -> NodeStatus {
        let config = leaf_config!(call, CastSkillConfig, NodeStatus::Failed);
        let target = if config.target_enemy {
            call.ctx.nearest_enemy().map(|t| t.id)
        } else {
            None
        };
        let event = SimEvent::CastSkill {
            member: call.ctx.member_id().to_string(),
            skill: config.skill.clone(),
            target,
        };
        let frame = call.ctx.current_frame() + 1;
        match call.ctx.insert_event(frame, Priority::Normal, event) {
            Ok(_) => NodeStatus::Succeeded,
            Err(e) => {
                tracing::warn!(node = call.node_id(), error = %e, "cast request dropped");
                NodeStatus::Failed
            }
        }
    }

    fn prepare(&self, config: &serde_json::Value) -> Result<Option<PreparedConfig>, String> {
        decode::<CastSkillConfig>(config)
    }
}

#[derive(Deserialize)]
struct SetVarConfig {
    name: String,
    value: String,
}

/// Stores a formula result in the agent's scratch variables
struct SetVarAction;

impl Action for SetVarAction {
    fn run(&self, call: &mut LeafCall<'_>) -> NodeStatus {
        let config = leaf_config!(call, SetVarConfig, NodeStatus::Failed);
        let result = call.ctx.formula(&config.value).and_then(|expr| {
            let scope = ChainScope::new(&*call.vars, call.ctx.stats());
            evaluate_expr(&expr, &scope)
        });
        match result {
            Ok(value) => {
                call.vars.set(config.name.clone(), value);
                NodeStatus::Succeeded
            }
            Err(e) => {
                tracing::warn!(node = call.node_id(), error = %e, "set_var formula failed");
                NodeStatus::Failed
            }
        }
    }

    fn prepare(&self, config: &serde_json::Value) -> Result<Option<PreparedConfig>, String> {
        decode::<SetVarConfig>(config)
    }
}

#[derive(Deserialize)]
struct ExprConfig {
    expr: String,
}

/// Formula over scratch variables and own stats
struct ExprCondition;

impl Condition for ExprCondition {
    fn check(&self, call: &mut LeafCall<'_>) -> bool {
        let config = leaf_config!(call, ExprConfig, false);
        let result = call.ctx.formula(&config.expr).and_then(|expr| {
            let scope = ChainScope::new(&*call.vars, call.ctx.stats());
            evaluate_expr(&expr, &scope)
        });
        match result {
            Ok(value) => value.abs() >= 1e-9,
            Err(e) => {
                tracing::warn!(node = call.node_id(), error = %e, "condition formula failed");
                false
            }
        }
    }

    fn prepare(&self, config: &serde_json::Value) -> Result<Option<PreparedConfig>, String> {
        let parsed: ExprConfig = parse_config(config).map_err(|e| e.to_string())?;
        crate::expr::parse(&parsed.expr).map_err(|e| e.to_string())?;
        let prepared: PreparedConfig = Arc::new(parsed);
        Ok(Some(prepared))
    }
}

#[derive(Deserialize)]
struct StatBelowConfig {
    path: String,
    value: f64,
}

struct StatBelowCondition;

impl Condition for StatBelowCondition {
    fn check(&self, call: &mut LeafCall<'_>) -> bool {
        let config = leaf_config!(call, StatBelowConfig, false);
        call.ctx
            .stats()
            .lookup(&config.path)
            .is_some_and(|v| v < config.value)
    }

    fn prepare(&self, config: &serde_json::Value) -> Result<Option<PreparedConfig>, String> {
        decode::<StatBelowConfig>(config)
    }
}

#[derive(Deserialize)]
struct ChanceConfig {
    p: f64,
}

/// Succeeds with probability `p` using the simulation RNG
struct ChanceCondition;

impl Condition for ChanceCondition {
    fn check(&self, call: &mut LeafCall<'_>) -> bool {
        let config = leaf_config!(call, ChanceConfig, false);
        call.ctx.roll() < config.p
    }

    fn prepare(&self, config: &serde_json::Value) -> Result<Option<PreparedConfig>, String> {
        decode::<ChanceConfig>(config)
    }
}

#[derive(Deserialize)]
struct RangeConfig {
    range: f64,
}

struct TargetInRangeCondition;

impl Condition for TargetInRangeCondition {
    fn check(&self, call: &mut LeafCall<'_>) -> bool {
        let config = leaf_config!(call, RangeConfig, false);
        call.ctx
            .nearest_enemy()
            .is_some_and(|t| t.distance <= config.range)
    }

    fn prepare(&self, config: &serde_json::Value) -> Result<Option<PreparedConfig>, String> {
        decode::<RangeConfig>(config)
    }
}
