//! Member model
//!
//! A member is one simulated participant. It exclusively owns:
//! - its stat graph (every attribute, including `hp.current`)
//! - its pipeline manager (shared definitions, member-local hooks)
//! - its agent (behavior tree plus scratch variables)
//!
//! Other members see its attributes only through [`StatReader`] /
//! [`Scope`] on a shared reference.

use crate::behavior::{Agent, NodeStatus};
use crate::expr::Scope;
use crate::pipeline::PipelineManager;
use crate::skill::Vec2;
use crate::stats::{StatError, StatGraph, StatReader};

/// Current hit points
pub const HP_PATH: &str = "hp.current";
/// Upper bound for `hp.current`, when declared
pub const HP_MAX_PATH: &str = "hp.max";
/// Current mana
pub const MP_PATH: &str = "mp.current";

/// A simulated participant
///
/// # Example
/// ```
/// use battle_sim_core_rs::models::Member;
/// use battle_sim_core_rs::pipeline::PipelineManager;
/// use battle_sim_core_rs::skill::Vec2;
/// use battle_sim_core_rs::stats::{AttributeSchema, StatGraph};
///
/// let mut schema = AttributeSchema::new();
/// schema.declare("hp.current", 100.0).unwrap();
/// schema.declare("hp.max", 100.0).unwrap();
///
/// let mut hero = Member::new(
///     "hero",
///     "players",
///     Vec2::ZERO,
///     StatGraph::new(&schema),
///     PipelineManager::with_defaults(),
/// );
/// assert_eq!(hero.apply_hp_delta(-30.0).unwrap(), 70.0);
/// assert_eq!(hero.apply_hp_delta(500.0).unwrap(), 100.0);
/// ```
#[derive(Debug, Clone)]
pub struct Member {
    id: String,
    team: String,
    position: Vec2,
    stats: StatGraph,
    pipelines: PipelineManager,
    agent: Agent,
    defeated: bool,
    /// Root status observed after the previous tick
    last_status: NodeStatus,
}

impl Member {
    pub fn new(
        id: impl Into<String>,
        team: impl Into<String>,
        position: Vec2,
        stats: StatGraph,
        pipelines: PipelineManager,
    ) -> Self {
        let id = id.into();
        Self {
            agent: Agent::new(id.clone()),
            id,
            team: team.into(),
            position,
            stats,
            pipelines,
            defeated: false,
            last_status: NodeStatus::Ready,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn team(&self) -> &str {
        &self.team
    }

    /// Members on different teams are hostile to each other
    pub fn is_hostile_to(&self, other: &Member) -> bool {
        self.team != other.team
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn stats(&self) -> &StatGraph {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut StatGraph {
        &mut self.stats
    }

    pub fn pipelines(&self) -> &PipelineManager {
        &self.pipelines
    }

    pub fn pipelines_mut(&mut self) -> &mut PipelineManager {
        &mut self.pipelines
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agent
    }

    /// Borrow the pieces a behavior tick needs at once
    pub(crate) fn tick_parts(&mut self) -> (&mut Agent, &StatGraph, &mut PipelineManager) {
        (&mut self.agent, &self.stats, &mut self.pipelines)
    }

    pub fn is_defeated(&self) -> bool {
        self.defeated
    }

    pub(crate) fn mark_defeated(&mut self) {
        self.defeated = true;
    }

    pub(crate) fn last_status(&self) -> NodeStatus {
        self.last_status
    }

    pub(crate) fn set_last_status(&mut self, status: NodeStatus) {
        self.last_status = status;
    }

    /// Current hp; 0 when the archetype declares no `hp.current`
    pub fn hp(&self) -> f64 {
        self.stats.stat(HP_PATH).unwrap_or(0.0)
    }

    /// Current mp; 0 when the archetype declares no `mp.current`
    pub fn mp(&self) -> f64 {
        self.stats.stat(MP_PATH).unwrap_or(0.0)
    }

    /// Change `hp.current` by `delta`, clamped to `[0, hp.max]`
    ///
    /// Returns the resulting hp.
    ///
    /// # Errors
    /// `UnknownPath` if the archetype declares no `hp.current`.
    pub fn apply_hp_delta(&mut self, delta: f64) -> Result<f64, StatError> {
        let current = self.stats.base(HP_PATH)?;
        let mut next = (current + delta).max(0.0);
        if let Some(max) = self.stats.stat(HP_MAX_PATH) {
            next = next.min(max);
        }
        self.stats.set(HP_PATH, next)?;
        self.stats.get(HP_PATH)
    }

    /// Subtract a cost from a resource path
    ///
    /// # Errors
    /// `UnknownPath` if the path is not declared.
    pub fn spend(&mut self, path: &str, cost: f64) -> Result<f64, StatError> {
        if cost == 0.0 {
            return self.stats.get(path);
        }
        self.stats.adjust(path, -cost)
    }
}

impl StatReader for Member {
    fn stat(&self, path: &str) -> Option<f64> {
        self.stats.stat(path)
    }
}

impl Scope for Member {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.stats.lookup(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::AttributeSchema;

    fn member(team: &str) -> Member {
        let mut schema = AttributeSchema::new();
        schema.declare("hp.current", 50.0).unwrap();
        schema.declare("mp.current", 20.0).unwrap();
        Member::new(
            "m",
            team,
            Vec2::new(1.0, 2.0),
            StatGraph::new(&schema),
            PipelineManager::with_defaults(),
        )
    }

    #[test]
    fn test_hp_floor_without_max() {
        let mut m = member("a");
        assert_eq!(m.apply_hp_delta(-80.0).unwrap(), 0.0);
        assert_eq!(m.apply_hp_delta(1000.0).unwrap(), 1000.0);
    }

    #[test]
    fn test_spend() {
        let mut m = member("a");
        assert_eq!(m.spend(MP_PATH, 15.0).unwrap(), 5.0);
        assert_eq!(m.mp(), 5.0);
        assert!(m.spend("rage", 1.0).is_err());
    }

    #[test]
    fn test_hostility_and_scope() {
        let a = member("red");
        let b = member("blue");
        assert!(a.is_hostile_to(&b));
        assert!(!a.is_hostile_to(&a.clone()));
        assert_eq!(a.lookup("hp.current"), Some(50.0));
        assert_eq!(a.hp(), 50.0);
        assert!(!a.is_defeated());
        assert_eq!(a.agent().member_id(), "m");
    }

    #[test]
    fn test_missing_hp_path() {
        let mut m = Member::new(
            "ghost",
            "x",
            Vec2::ZERO,
            StatGraph::new(&AttributeSchema::new()),
            PipelineManager::new(),
        );
        assert_eq!(m.hp(), 0.0);
        assert!(matches!(
            m.apply_hp_delta(-1.0),
            Err(StatError::UnknownPath(_))
        ));
    }
}
